// src/utils/time.rs
//! Timestamps attached to snapshots

use std::time::{SystemTime, UNIX_EPOCH};

/// Wall-clock time in nanoseconds since the Unix epoch
pub fn current_timestamp_nanos() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64
}

pub fn current_timestamp_micros() -> u64 {
    current_timestamp_nanos() / 1000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamps_advance() {
        let first = current_timestamp_nanos();
        std::thread::sleep(std::time::Duration::from_millis(1));
        let second = current_timestamp_nanos();
        assert!(second > first);
        assert!(current_timestamp_micros() >= second / 1000);
    }
}
