// src/acquisition/telemetry.rs
//! Orientation/temperature telemetry buffers
//!
//! Seven parallel rings sized by reading count. A snapshot is only handed out once every
//! ring is full; partial windows report [`IngestError::TelemetryNotReady`].

use super::ring_buffer::RingBuffer;
use crate::codec::TelemetryReading;
use crate::config::constants::telemetry::{FIELD_COUNT, MAX_BUFFER_SIZE};
use crate::error::{IngestError, IngestResult};
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::debug;

/// Full telemetry window, oldest reading first in every series
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetrySnapshot {
    pub accel_x: Vec<f64>,
    pub accel_y: Vec<f64>,
    pub accel_z: Vec<f64>,
    pub temperature: Vec<f64>,
    pub gyro_x: Vec<f64>,
    pub gyro_y: Vec<f64>,
    pub gyro_z: Vec<f64>,
}

impl TelemetrySnapshot {
    pub fn len(&self) -> usize {
        self.temperature.len()
    }

    pub fn is_empty(&self) -> bool {
        self.temperature.is_empty()
    }
}

#[derive(Debug)]
pub struct TelemetryChannel {
    rings: Vec<RingBuffer<f64>>,
    latest: Option<TelemetryReading>,
    total_pushed: u64,
}

fn check_buffer_size(buffer_size: usize) -> IngestResult<()> {
    if !(1..=MAX_BUFFER_SIZE).contains(&buffer_size) {
        return Err(IngestError::config(
            "telemetry_buffer_size",
            format!("{} readings (must be 1..={})", buffer_size, MAX_BUFFER_SIZE),
        ));
    }
    Ok(())
}

impl TelemetryChannel {
    pub fn new(buffer_size: usize) -> IngestResult<Self> {
        check_buffer_size(buffer_size)?;
        let rings = (0..FIELD_COUNT)
            .map(|_| RingBuffer::new(buffer_size))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            rings,
            latest: None,
            total_pushed: 0,
        })
    }

    /// Resize all seven rings, discarding buffered readings
    pub fn configure(&mut self, buffer_size: usize) -> IngestResult<()> {
        *self = Self::new(buffer_size)?;
        debug!("Telemetry buffers resized to {} readings", buffer_size);
        Ok(())
    }

    /// Decode a 14-byte record and buffer it
    pub fn push(&mut self, record: &[u8]) -> IngestResult<TelemetryReading> {
        let reading = TelemetryReading::decode(record)?;
        self.push_reading(reading);
        Ok(reading)
    }

    pub fn push_reading(&mut self, reading: TelemetryReading) {
        for (ring, value) in self.rings.iter_mut().zip(reading.fields()) {
            ring.push(value);
        }
        self.latest = Some(reading);
        self.total_pushed += 1;
    }

    pub fn snapshot(&self) -> IngestResult<TelemetrySnapshot> {
        if !self.is_ready() {
            return Err(IngestError::TelemetryNotReady {
                have: self.len(),
                need: self.buffer_size(),
            });
        }

        let series = |field: usize| self.rings[field].snapshot();
        Ok(TelemetrySnapshot {
            accel_x: series(0),
            accel_y: series(1),
            accel_z: series(2),
            temperature: series(3),
            gyro_x: series(4),
            gyro_y: series(5),
            gyro_z: series(6),
        })
    }

    pub fn latest(&self) -> Option<TelemetryReading> {
        self.latest
    }

    /// True once `buffer_size` readings have arrived; stays true afterwards
    pub fn is_ready(&self) -> bool {
        self.rings.iter().all(RingBuffer::is_full)
    }

    pub fn len(&self) -> usize {
        self.rings[0].len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn buffer_size(&self) -> usize {
        self.rings[0].capacity()
    }

    pub fn total_pushed(&self) -> u64 {
        self.total_pushed
    }
}

/// Shared handle to a session's telemetry channel
///
/// The ingest worker pushes in-band records; side-channel transports may push through
/// the same handle.
#[derive(Debug, Clone)]
pub struct TelemetryHandle {
    inner: Arc<RwLock<TelemetryChannel>>,
}

impl TelemetryHandle {
    pub fn new(buffer_size: usize) -> IngestResult<Self> {
        Ok(Self {
            inner: Arc::new(RwLock::new(TelemetryChannel::new(buffer_size)?)),
        })
    }

    pub fn configure(&self, buffer_size: usize) -> IngestResult<()> {
        self.inner.write().configure(buffer_size)
    }

    pub fn push(&self, record: &[u8]) -> IngestResult<TelemetryReading> {
        self.inner.write().push(record)
    }

    pub fn push_reading(&self, reading: TelemetryReading) {
        self.inner.write().push_reading(reading);
    }

    /// Read-only view sharing the same buffers
    pub fn view(&self) -> TelemetryView {
        TelemetryView {
            inner: Arc::clone(&self.inner),
        }
    }

    pub fn snapshot(&self) -> IngestResult<TelemetrySnapshot> {
        self.inner.read().snapshot()
    }

    pub fn latest(&self) -> Option<TelemetryReading> {
        self.inner.read().latest()
    }

    pub fn is_ready(&self) -> bool {
        self.inner.read().is_ready()
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Telemetry access for session readers; cannot push or resize
#[derive(Debug, Clone)]
pub struct TelemetryView {
    inner: Arc<RwLock<TelemetryChannel>>,
}

impl TelemetryView {
    pub fn snapshot(&self) -> IngestResult<TelemetrySnapshot> {
        self.inner.read().snapshot()
    }

    pub fn latest(&self) -> Option<TelemetryReading> {
        self.inner.read().latest()
    }

    pub fn is_ready(&self) -> bool {
        self.inner.read().is_ready()
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn buffer_size(&self) -> usize {
        self.inner.read().buffer_size()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reading(seed: f64) -> TelemetryReading {
        TelemetryReading::from_fields([seed, seed + 1.0, seed + 2.0, 25.0, -seed, 0.0, 1.0])
    }

    #[test]
    fn test_not_ready_until_full() {
        let mut channel = TelemetryChannel::new(3).unwrap();
        for i in 0..2 {
            channel.push_reading(reading(i as f64));
            let err = channel.snapshot().unwrap_err();
            assert!(matches!(err, IngestError::TelemetryNotReady { need: 3, .. }));
        }

        channel.push_reading(reading(2.0));
        let snapshot = channel.snapshot().unwrap();
        assert_eq!(snapshot.accel_x, vec![0.0, 1.0, 2.0]);
        assert_eq!(snapshot.gyro_x, vec![0.0, -1.0, -2.0]);

        channel.push_reading(reading(3.0));
        assert_eq!(channel.snapshot().unwrap().accel_x, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_configure_bounds() {
        let mut channel = TelemetryChannel::new(10).unwrap();
        assert!(channel.configure(0).is_err());
        assert!(channel.configure(MAX_BUFFER_SIZE + 1).is_err());
        assert!(channel.configure(MAX_BUFFER_SIZE).is_ok());
        assert_eq!(channel.buffer_size(), MAX_BUFFER_SIZE);
    }

    #[test]
    fn test_configure_resets_window() {
        let mut channel = TelemetryChannel::new(1).unwrap();
        channel.push_reading(reading(1.0));
        assert!(channel.is_ready());

        channel.configure(2).unwrap();
        assert!(!channel.is_ready());
        assert!(channel.latest().is_none());
    }

    #[test]
    fn test_push_record() {
        let handle = TelemetryHandle::new(1).unwrap();
        let record: Vec<u8> = [8192i16, 0, 0, 0, 0, 0, 0].iter().flat_map(|w| w.to_be_bytes()).collect();
        let decoded = handle.push(&record).unwrap();
        assert!((decoded.accel[0] - 1.0).abs() < 1e-12);
        assert_eq!(handle.latest(), Some(decoded));
        assert!(handle.is_ready());
        assert!(handle.push(&record[..10]).is_err());
    }

    #[test]
    fn test_view_follows_handle() {
        let handle = TelemetryHandle::new(2).unwrap();
        let view = handle.view();
        assert!(view.is_empty());

        handle.push_reading(reading(1.0));
        handle.push_reading(reading(2.0));
        assert!(view.is_ready());
        assert_eq!(view.snapshot().unwrap().accel_x, vec![1.0, 2.0]);

        handle.configure(5).unwrap();
        assert_eq!(view.buffer_size(), 5);
        assert!(view.latest().is_none());
    }
}
