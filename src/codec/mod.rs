// src/codec/mod.rs
//! Incremental frame decoder
//!
//! [`FrameCodec`] accepts arbitrary chunks of a byte stream and emits every complete frame
//! exactly once, in order. Bytes that do not yet form a frame are carried to the next call,
//! so the decoded output does not depend on how the stream was chunked.

pub mod format;
pub mod framing;
pub mod records;

pub use format::{decode_i24, decode_sample_block, encode_i24, sample_block_len, FrameLayout};
pub use framing::Delimiters;
pub use records::{Attitude, AuxiliaryBlock, GpsFix, TelemetryReading};

use crate::config::SessionConfig;
use crate::config::constants::framing::DISCRIMINATOR_BYTES;
use crate::error::IngestResult;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

/// One decoded frame borrowed from the codec's scratch space
#[derive(Debug, Clone, Copy)]
pub struct FrameRef<'a> {
    /// Position of the frame in the stream, starting at 0
    pub index: u64,
    /// Raw 24-bit counts, one per channel
    pub raw: &'a [i32],
}

/// Owned copy of a decoded frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleFrame {
    pub index: u64,
    pub raw: Vec<i32>,
}

impl SampleFrame {
    pub fn millivolts(&self, mv_per_count: f64) -> Vec<f64> {
        self.raw.iter().map(|&count| count as f64 * mv_per_count).collect()
    }
}

/// Receiver of decoded frames and their side-channel records
///
/// For a frame carrying a record, `on_frame` is called first.
pub trait FrameSink {
    fn on_frame(&mut self, frame: FrameRef<'_>);

    fn on_telemetry(&mut self, _reading: TelemetryReading) {}

    /// Called once per frame of the `extended` layout
    fn on_auxiliary(&mut self, _block: AuxiliaryBlock) {}
}

impl FrameSink for Vec<SampleFrame> {
    fn on_frame(&mut self, frame: FrameRef<'_>) {
        self.push(SampleFrame {
            index: frame.index,
            raw: frame.raw.to_vec(),
        });
    }
}

/// Decoder counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodecStats {
    pub frames_decoded: u64,
    pub bytes_consumed: u64,
    /// Bytes discarded while hunting for a frame boundary
    pub resync_bytes_skipped: u64,
    /// Number of times the decoder lost frame alignment
    pub resync_events: u64,
    /// Delimited frames with a bad length or a lost tail, each replaced by a zero frame
    pub malformed_frames: u64,
    pub telemetry_records: u64,
    pub auxiliary_blocks: u64,
    /// Bytes of an incomplete final frame discarded by [`FrameCodec::finish`]
    pub truncated_tail_bytes: u64,
}

/// Stateful stream decoder for one [`FrameLayout`]
#[derive(Debug)]
pub struct FrameCodec {
    layout: FrameLayout,
    channels: usize,
    sample_bytes: usize,
    max_wire_len: usize,
    carry: Vec<u8>,
    scratch: Vec<i32>,
    unescaped: Vec<u8>,
    next_index: u64,
    resyncing: bool,
    stats: CodecStats,
}

impl FrameCodec {
    pub fn new(layout: FrameLayout, channels: usize) -> IngestResult<Self> {
        layout.validate()?;
        if channels == 0 {
            return Err(crate::error::IngestError::config("channels", "a frame needs at least one channel"));
        }

        let sample_bytes = sample_block_len(channels);
        let max_wire_len = layout.max_wire_len(channels);
        debug!("Frame codec: {} layout, {} channels, max frame {} bytes", layout.name(), channels, max_wire_len);

        Ok(Self {
            layout,
            channels,
            sample_bytes,
            max_wire_len,
            carry: Vec::with_capacity(max_wire_len * 2),
            scratch: vec![0; channels],
            unescaped: Vec::with_capacity(sample_bytes),
            next_index: 0,
            resyncing: false,
            stats: CodecStats::default(),
        })
    }

    pub fn for_session(config: &SessionConfig) -> IngestResult<Self> {
        Self::new(config.layout, config.channels)
    }

    pub fn layout(&self) -> FrameLayout {
        self.layout
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn stats(&self) -> &CodecStats {
        &self.stats
    }

    /// Bytes held over for the next chunk; always below the layout's max wire length
    pub fn pending(&self) -> usize {
        self.carry.len()
    }

    /// Decode `bytes`, handing each complete frame to `sink`
    pub fn feed_into<S: FrameSink + ?Sized>(&mut self, bytes: &[u8], sink: &mut S) {
        self.stats.bytes_consumed += bytes.len() as u64;

        if self.carry.is_empty() {
            let used = self.process(bytes, sink);
            self.carry.extend_from_slice(&bytes[used..]);
        } else {
            let mut buffer = std::mem::take(&mut self.carry);
            buffer.extend_from_slice(bytes);
            let used = self.process(&buffer, sink);
            buffer.drain(..used);
            self.carry = buffer;
        }

        debug_assert!(self.carry.len() <= self.max_wire_len);
    }

    /// Decode `bytes` into owned frames
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<SampleFrame> {
        let mut frames = Vec::new();
        self.feed_into(bytes, &mut frames);
        frames
    }

    /// Discard the incomplete tail at end of stream, returning its length
    pub fn finish(&mut self) -> usize {
        let tail = self.carry.len();
        if tail > 0 {
            warn!("Discarding {} bytes of an incomplete final frame", tail);
            self.stats.truncated_tail_bytes += tail as u64;
            self.carry.clear();
        }
        tail
    }

    fn process<S: FrameSink + ?Sized>(&mut self, data: &[u8], sink: &mut S) -> usize {
        match self.layout {
            FrameLayout::Raw => self.process_fixed(data, self.sample_bytes, sink, |_, _, _| {}),
            FrameLayout::Extended { valid_marker } => {
                self.process_fixed(data, self.max_wire_len, sink, |codec, frame, sink| {
                    let block = AuxiliaryBlock::decode(&frame[codec.sample_bytes..], valid_marker);
                    codec.stats.auxiliary_blocks += 1;
                    sink.on_auxiliary(block);
                })
            }
            FrameLayout::Telemetry { present_marker, absent_marker } => {
                self.process_telemetry(data, present_marker, absent_marker, sink)
            }
            FrameLayout::Delimited { head, tail, escape } => {
                self.process_delimited(data, Delimiters { head, tail, escape }, sink)
            }
        }
    }

    fn process_fixed<S, F>(&mut self, data: &[u8], width: usize, sink: &mut S, mut trailer: F) -> usize
    where
        S: FrameSink + ?Sized,
        F: FnMut(&mut Self, &[u8], &mut S),
    {
        let mut pos = 0;
        for frame in data.chunks_exact(width) {
            self.emit(&frame[..self.sample_bytes], sink);
            trailer(self, frame, sink);
            pos += width;
        }
        pos
    }

    fn process_telemetry<S: FrameSink + ?Sized>(
        &mut self,
        data: &[u8],
        present_marker: u16,
        absent_marker: u16,
        sink: &mut S,
    ) -> usize {
        let width = self.max_wire_len;
        let mut pos = 0;

        while data.len() - pos >= width {
            let frame = &data[pos..pos + width];
            let marker = u16::from_be_bytes([frame[self.sample_bytes], frame[self.sample_bytes + 1]]);

            if marker != present_marker && marker != absent_marker {
                if !self.resyncing {
                    self.resyncing = true;
                    self.stats.resync_events += 1;
                    debug!("Lost frame alignment at frame {}, marker 0x{:04X}", self.next_index, marker);
                }
                self.stats.resync_bytes_skipped += 1;
                pos += 1;
                continue;
            }

            if self.resyncing {
                trace!("Frame alignment recovered");
                self.resyncing = false;
            }

            self.emit(&frame[..self.sample_bytes], sink);
            if marker == present_marker {
                let record = &frame[self.sample_bytes + DISCRIMINATOR_BYTES..];
                match TelemetryReading::decode(record) {
                    Ok(reading) => {
                        self.stats.telemetry_records += 1;
                        sink.on_telemetry(reading);
                    }
                    Err(e) => warn!("Dropping telemetry record: {}", e),
                }
            }
            pos += width;
        }
        pos
    }

    fn process_delimited<S: FrameSink + ?Sized>(&mut self, data: &[u8], delims: Delimiters, sink: &mut S) -> usize {
        let mut pos = 0;

        loop {
            // align on a head byte
            match data[pos..].iter().position(|&b| b == delims.head) {
                Some(0) => {}
                Some(offset) => {
                    self.skip(offset);
                    pos += offset;
                }
                None => {
                    self.skip(data.len() - pos);
                    return data.len();
                }
            }

            // next delimiter within one escaped frame after the head decides the frame
            let body = &data[pos + 1..];
            let reach = body.len().min(self.max_wire_len - 1);
            match body[..reach].iter().position(|&b| b == delims.tail || b == delims.head) {
                Some(offset) if body[offset] == delims.tail => {
                    let payload = &body[..offset];
                    let mut unescaped = std::mem::take(&mut self.unescaped);
                    delims.unescape_into(payload, &mut unescaped);
                    if unescaped.len() == self.sample_bytes {
                        self.emit(&unescaped, sink);
                    } else {
                        debug!("Malformed frame: {} bytes after unescaping", unescaped.len());
                        self.emit_placeholder(sink);
                    }
                    self.unescaped = unescaped;
                    pos += offset + 2;
                }
                Some(offset) => {
                    // a second head before any tail: the first frame lost its tail
                    self.skip(offset + 1);
                    self.emit_placeholder(sink);
                    pos += offset + 1;
                }
                None if reach == self.max_wire_len - 1 => {
                    // no tail within reach, the head byte was noise
                    self.skip(1);
                    pos += 1;
                }
                None => return pos,
            }
        }
    }

    fn skip(&mut self, count: usize) {
        if count == 0 {
            return;
        }
        self.stats.resync_bytes_skipped += count as u64;
        self.stats.resync_events += 1;
    }

    fn emit<S: FrameSink + ?Sized>(&mut self, samples: &[u8], sink: &mut S) {
        decode_sample_block(samples, &mut self.scratch);
        self.deliver(sink);
    }

    /// Zero frame standing in for a damaged one, so frame count keeps pace with time
    fn emit_placeholder<S: FrameSink + ?Sized>(&mut self, sink: &mut S) {
        self.stats.malformed_frames += 1;
        self.scratch.fill(0);
        self.deliver(sink);
    }

    fn deliver<S: FrameSink + ?Sized>(&mut self, sink: &mut S) {
        sink.on_frame(FrameRef {
            index: self.next_index,
            raw: &self.scratch,
        });
        self.next_index += 1;
        self.stats.frames_decoded += 1;
    }
}
