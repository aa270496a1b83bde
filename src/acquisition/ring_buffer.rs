// src/acquisition/ring_buffer.rs
//! Fixed-capacity sliding-window buffers
//!
//! [`RingBuffer`] keeps the most recent `capacity` values, overwriting the oldest once full.
//! [`ChannelBank`] groups one ring per channel behind a single lock so every snapshot is
//! frame-aligned across channels. The writer half is not `Clone`: one ingest
//! worker owns it, any number of readers observe.

use parking_lot::RwLock;
use std::sync::Arc;

/// Ring buffer error types
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RingBufferError {
    InvalidCapacity(usize),
    ChannelMismatch { expected: usize, actual: usize },
}

impl std::fmt::Display for RingBufferError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RingBufferError::InvalidCapacity(capacity) => {
                write!(f, "Invalid buffer capacity {} (must be at least 1)", capacity)
            }
            RingBufferError::ChannelMismatch { expected, actual } => {
                write!(f, "Frame has {} channels, bank has {}", actual, expected)
            }
        }
    }
}

impl std::error::Error for RingBufferError {}

/// Overwrite-oldest ring of `Copy` values
#[derive(Debug, Clone)]
pub struct RingBuffer<T> {
    slots: Vec<T>,
    capacity: usize,
    /// Next slot to write once `slots` is full
    head: usize,
}

impl<T: Copy> RingBuffer<T> {
    pub fn new(capacity: usize) -> Result<Self, RingBufferError> {
        if capacity == 0 {
            return Err(RingBufferError::InvalidCapacity(capacity));
        }
        Ok(Self {
            slots: Vec::with_capacity(capacity),
            capacity,
            head: 0,
        })
    }

    /// Append one value, evicting the oldest when full
    #[inline]
    pub fn push(&mut self, value: T) {
        if self.slots.len() < self.capacity {
            self.slots.push(value);
        } else {
            self.slots[self.head] = value;
            self.head = (self.head + 1) % self.capacity;
        }
    }

    pub fn extend_from_slice(&mut self, values: &[T]) {
        // only the last `capacity` values survive
        let skip = values.len().saturating_sub(self.capacity);
        for &value in &values[skip..] {
            self.push(value);
        }
    }

    /// Contents, oldest first
    pub fn snapshot(&self) -> Vec<T> {
        let mut out = Vec::with_capacity(self.slots.len());
        self.copy_into(&mut out);
        out
    }

    /// Append contents, oldest first, to `out`
    pub fn copy_into(&self, out: &mut Vec<T>) {
        out.extend_from_slice(&self.slots[self.head..]);
        out.extend_from_slice(&self.slots[..self.head]);
    }

    /// Append the newest `count` values (fewer if not held), oldest first, to `out`
    pub fn copy_recent_into(&self, count: usize, out: &mut Vec<T>) {
        let count = count.min(self.slots.len());
        let (older, newer) = (&self.slots[self.head..], &self.slots[..self.head]);
        if count <= newer.len() {
            out.extend_from_slice(&newer[newer.len() - count..]);
        } else {
            out.extend_from_slice(&older[older.len() - (count - newer.len())..]);
            out.extend_from_slice(newer);
        }
    }

    /// Most recently pushed value
    pub fn latest(&self) -> Option<T> {
        if self.slots.is_empty() {
            return None;
        }
        let index = if self.head == 0 { self.slots.len() - 1 } else { self.head - 1 };
        Some(self.slots[index])
    }

    pub fn clear(&mut self) {
        self.slots.clear();
        self.head = 0;
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.slots.len() == self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Fill level (0.0 to 1.0)
    pub fn utilization(&self) -> f32 {
        self.slots.len() as f32 / self.capacity as f32
    }
}

/// Frames written after a reader's cursor
#[derive(Debug, Clone, PartialEq)]
pub struct FrameBatch {
    /// One series per channel, oldest first
    pub channels: Vec<Vec<f64>>,
    /// Stream index of the first frame in the batch
    pub first_frame: u64,
    /// Frames written after the cursor but evicted before this read
    pub missed: u64,
}

impl FrameBatch {
    /// Frames per channel
    pub fn len(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Cursor value that continues after this batch
    pub fn next_cursor(&self) -> u64 {
        self.first_frame + self.len() as u64
    }
}

/// One ring per channel, written a whole frame at a time
#[derive(Debug, Clone)]
pub struct ChannelBank {
    rings: Vec<RingBuffer<f64>>,
    frames_written: u64,
}

impl ChannelBank {
    pub fn new(channels: usize, capacity: usize) -> Result<Self, RingBufferError> {
        let rings = (0..channels)
            .map(|_| RingBuffer::new(capacity))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { rings, frames_written: 0 })
    }

    pub fn push_frame(&mut self, frame: &[f64]) -> Result<(), RingBufferError> {
        self.check_width(frame.len())?;
        for (ring, &value) in self.rings.iter_mut().zip(frame) {
            ring.push(value);
        }
        self.frames_written += 1;
        Ok(())
    }

    /// Push raw counts, scaling each by `scale` on the way in
    pub fn push_scaled(&mut self, raw: &[i32], scale: f64) -> Result<(), RingBufferError> {
        self.check_width(raw.len())?;
        for (ring, &count) in self.rings.iter_mut().zip(raw) {
            ring.push(count as f64 * scale);
        }
        self.frames_written += 1;
        Ok(())
    }

    /// Per-channel copies, oldest first
    pub fn snapshot(&self) -> Vec<Vec<f64>> {
        self.rings.iter().map(RingBuffer::snapshot).collect()
    }

    /// Frames written after stream index `cursor` that are still held
    pub fn frames_since(&self, cursor: u64) -> FrameBatch {
        let unread = self.frames_written.saturating_sub(cursor);
        let held = unread.min(self.len() as u64);
        let channels = self
            .rings
            .iter()
            .map(|ring| {
                let mut series = Vec::with_capacity(held as usize);
                ring.copy_recent_into(held as usize, &mut series);
                series
            })
            .collect();

        FrameBatch {
            channels,
            first_frame: self.frames_written - held,
            missed: unread - held,
        }
    }

    pub fn clear(&mut self) {
        self.rings.iter_mut().for_each(RingBuffer::clear);
        self.frames_written = 0;
    }

    pub fn channels(&self) -> usize {
        self.rings.len()
    }

    /// Frames currently held (identical for every channel)
    pub fn len(&self) -> usize {
        self.rings.first().map_or(0, RingBuffer::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.rings.first().map_or(0, RingBuffer::capacity)
    }

    /// Frames pushed since creation or the last clear
    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    fn check_width(&self, actual: usize) -> Result<(), RingBufferError> {
        if actual != self.rings.len() {
            return Err(RingBufferError::ChannelMismatch {
                expected: self.rings.len(),
                actual,
            });
        }
        Ok(())
    }
}

/// Create a shared bank and its single writer
pub fn shared_bank(channels: usize, capacity: usize) -> Result<(BankWriter, BankReader), RingBufferError> {
    let shared = Arc::new(RwLock::new(ChannelBank::new(channels, capacity)?));
    Ok((
        BankWriter { shared: Arc::clone(&shared) },
        BankReader { shared },
    ))
}

/// Exclusive write access to a shared bank
#[derive(Debug)]
pub struct BankWriter {
    shared: Arc<RwLock<ChannelBank>>,
}

impl BankWriter {
    pub fn push_frame(&mut self, frame: &[f64]) -> Result<(), RingBufferError> {
        self.shared.write().push_frame(frame)
    }

    pub fn push_scaled(&mut self, raw: &[i32], scale: f64) -> Result<(), RingBufferError> {
        self.shared.write().push_scaled(raw, scale)
    }

    pub fn clear(&mut self) {
        self.shared.write().clear();
    }

    pub fn reader(&self) -> BankReader {
        BankReader { shared: Arc::clone(&self.shared) }
    }
}

/// Read-only handle to a shared bank, cheap to clone
#[derive(Debug, Clone)]
pub struct BankReader {
    shared: Arc<RwLock<ChannelBank>>,
}

impl BankReader {
    /// Frame-aligned copy of every channel
    pub fn snapshot(&self) -> Vec<Vec<f64>> {
        self.shared.read().snapshot()
    }

    /// Snapshot together with the number of frames written when it was taken
    pub fn snapshot_with_count(&self) -> (Vec<Vec<f64>>, u64) {
        let bank = self.shared.read();
        (bank.snapshot(), bank.frames_written())
    }

    /// Frames written after stream index `cursor`; never modifies the bank
    pub fn frames_since(&self, cursor: u64) -> FrameBatch {
        self.shared.read().frames_since(cursor)
    }

    pub fn len(&self) -> usize {
        self.shared.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn frames_written(&self) -> u64 {
        self.shared.read().frames_written()
    }

    pub fn channels(&self) -> usize {
        self.shared.read().channels()
    }

    pub fn capacity(&self) -> usize {
        self.shared.read().capacity()
    }
}
