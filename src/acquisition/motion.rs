// src/acquisition/motion.rs
//! Attitude and GPS history from the extended layout

use super::ring_buffer::{RingBuffer, RingBufferError};
use crate::codec::{Attitude, AuxiliaryBlock, GpsFix};
use crate::config::constants::telemetry::GPS_HISTORY;
use parking_lot::RwLock;
use std::sync::Arc;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MotionSnapshot {
    /// Attitude per valid frame, oldest first
    pub attitude: Vec<Attitude>,
    /// Most recent GPS fixes, oldest first
    pub gps: Vec<GpsFix>,
}

#[derive(Debug)]
struct MotionTrack {
    attitude: RingBuffer<Attitude>,
    gps: RingBuffer<GpsFix>,
}

/// Attitude ring sized like the sample window, plus a short GPS history
#[derive(Debug, Clone)]
pub struct MotionHandle {
    inner: Arc<RwLock<MotionTrack>>,
}

impl MotionHandle {
    pub fn new(attitude_capacity: usize) -> Result<Self, RingBufferError> {
        Ok(Self {
            inner: Arc::new(RwLock::new(MotionTrack {
                attitude: RingBuffer::new(attitude_capacity)?,
                gps: RingBuffer::new(GPS_HISTORY)?,
            })),
        })
    }

    pub fn record(&self, block: AuxiliaryBlock) {
        if block.attitude.is_none() && block.gps.is_none() {
            return;
        }
        let mut track = self.inner.write();
        if let Some(attitude) = block.attitude {
            track.attitude.push(attitude);
        }
        if let Some(fix) = block.gps {
            track.gps.push(fix);
        }
    }

    pub fn snapshot(&self) -> MotionSnapshot {
        let track = self.inner.read();
        MotionSnapshot {
            attitude: track.attitude.snapshot(),
            gps: track.gps.snapshot(),
        }
    }

    pub fn latest_attitude(&self) -> Option<Attitude> {
        self.inner.read().attitude.latest()
    }

    pub fn latest_fix(&self) -> Option<GpsFix> {
        self.inner.read().gps.latest()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gps_history_is_bounded() {
        let motion = MotionHandle::new(4).unwrap();
        for i in 0..15 {
            motion.record(AuxiliaryBlock {
                gps: Some(GpsFix {
                    latitude: i as f64,
                    longitude: 0.0,
                    lat_hemisphere: Some('N'),
                    lon_hemisphere: None,
                }),
                attitude: None,
            });
        }
        let snapshot = motion.snapshot();
        assert_eq!(snapshot.gps.len(), GPS_HISTORY);
        assert_eq!(snapshot.gps[0].latitude, 5.0);
        assert!(snapshot.attitude.is_empty());
        assert_eq!(motion.latest_fix().unwrap().latitude, 14.0);
    }

    #[test]
    fn test_attitude_window() {
        let motion = MotionHandle::new(2).unwrap();
        for yaw in [1.0, 2.0, 3.0] {
            motion.record(AuxiliaryBlock {
                gps: None,
                attitude: Some(Attitude { roll: 0.0, pitch: 0.0, yaw }),
            });
        }
        let yaws: Vec<f64> = motion.snapshot().attitude.iter().map(|a| a.yaw).collect();
        assert_eq!(yaws, vec![2.0, 3.0]);
    }
}
