// src/store/playback.rs
//! Timed re-emission of capture frames

use super::CaptureBytes;
use crate::config::constants::runtime::{PLAYBACK_MAX_BATCH_FRAMES, SOURCE_POLL_INTERVAL};
use crate::session::{ByteSource, Pull, StopSignal};
use std::io;
use std::ops::Range;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

const NANOS_PER_SEC: u128 = 1_000_000_000;

/// Frame schedule at a fixed rate, anchored at the start of the run
#[derive(Debug, Clone)]
pub(crate) struct Pacer {
    rate: u32,
    origin: Instant,
    emitted: u64,
}

impl Pacer {
    pub fn new(rate: u32) -> Self {
        Self {
            rate,
            origin: Instant::now(),
            emitted: 0,
        }
    }

    pub fn reset(&mut self, now: Instant) {
        self.origin = now;
        self.emitted = 0;
    }

    /// Frames owed at `now`; the first frame is due immediately
    pub fn due(&self, now: Instant) -> u64 {
        let elapsed = now.saturating_duration_since(self.origin).as_nanos();
        let scheduled = (elapsed * self.rate as u128 / NANOS_PER_SEC) as u64 + 1;
        scheduled.saturating_sub(self.emitted).min(PLAYBACK_MAX_BATCH_FRAMES)
    }

    /// Time left until the next frame falls due
    pub fn until_next(&self, now: Instant) -> Duration {
        let offset = self.emitted as u128 * NANOS_PER_SEC / self.rate as u128;
        let target = self.origin + Duration::from_nanos(offset as u64);
        target.saturating_duration_since(now)
    }

    pub fn advance(&mut self, frames: u64) {
        self.emitted += frames;
    }
}

/// Byte source replaying a frame range of a mapped capture
pub(crate) struct PlaybackSource {
    bytes: Arc<CaptureBytes>,
    width: usize,
    range: Range<u64>,
    next: u64,
    looping: bool,
    pacer: Pacer,
}

impl PlaybackSource {
    pub fn new(bytes: Arc<CaptureBytes>, width: usize, range: Range<u64>, looping: bool, rate: u32) -> Self {
        debug!("Playback source: frames {}..{}, looping {}", range.start, range.end, looping);
        Self {
            bytes,
            width,
            next: range.start,
            range,
            looping,
            pacer: Pacer::new(rate),
        }
    }
}

impl ByteSource for PlaybackSource {
    fn pull(&mut self, buf: &mut Vec<u8>, stop: &StopSignal) -> io::Result<Pull> {
        if self.next >= self.range.end {
            if !self.looping || self.range.is_empty() {
                info!("Playback reached frame {}", self.range.end);
                return Ok(Pull::Closed);
            }
            debug!("Playback looping to frame {}", self.range.start);
            self.next = self.range.start;
            self.pacer.reset(Instant::now());
        }

        let now = Instant::now();
        let due = self.pacer.due(now);
        if due == 0 {
            stop.wait_timeout(self.pacer.until_next(now).min(SOURCE_POLL_INTERVAL));
            return Ok(Pull::Idle);
        }

        let count = due.min(self.range.end - self.next);
        let from = self.next as usize * self.width;
        let to = (self.next + count) as usize * self.width;
        buf.extend_from_slice(&self.bytes[from..to]);

        self.next += count;
        self.pacer.advance(count);
        Ok(Pull::Data)
    }
}
