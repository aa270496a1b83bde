// src/codec/format.rs
//! Wire layouts and 24-bit sample conversion

use crate::config::constants::{framing, signal};
use crate::error::{IngestError, IngestResult};
use serde::{Deserialize, Serialize};

/// How sample frames are laid out on the byte stream
///
/// Every layout starts a frame with `channels x 3` big-endian 24-bit samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum FrameLayout {
    /// Bare sample block, no sync word (TCP stream, capture files)
    #[default]
    Raw,

    /// Sample block, 2-byte discriminator, 14-byte telemetry block.
    /// A discriminator matching neither marker triggers a byte-wise resync.
    Telemetry {
        #[serde(default = "defaults::present_marker")]
        present_marker: u16,
        #[serde(default = "defaults::absent_marker")]
        absent_marker: u16,
    },

    /// Sample block followed by an 18-byte GPS/attitude block
    Extended {
        #[serde(default = "defaults::valid_marker")]
        valid_marker: u8,
    },

    /// Serial framing: `head payload tail` with escaped payload bytes
    Delimited {
        #[serde(default = "defaults::head")]
        head: u8,
        #[serde(default = "defaults::tail")]
        tail: u8,
        #[serde(default = "defaults::escape")]
        escape: u8,
    },
}

mod defaults {
    use crate::config::constants::framing;

    pub fn present_marker() -> u16 { framing::TELEMETRY_PRESENT_MARKER }
    pub fn absent_marker() -> u16 { framing::TELEMETRY_ABSENT_MARKER }
    pub fn valid_marker() -> u8 { framing::EXTENDED_VALID_MARKER }
    pub fn head() -> u8 { framing::SERIAL_FRAME_HEAD }
    pub fn tail() -> u8 { framing::SERIAL_FRAME_TAIL }
    pub fn escape() -> u8 { framing::SERIAL_ESCAPE }
}

impl FrameLayout {
    /// Telemetry layout with the firmware's default markers
    pub fn telemetry() -> Self {
        FrameLayout::Telemetry {
            present_marker: framing::TELEMETRY_PRESENT_MARKER,
            absent_marker: framing::TELEMETRY_ABSENT_MARKER,
        }
    }

    pub fn extended() -> Self {
        FrameLayout::Extended {
            valid_marker: framing::EXTENDED_VALID_MARKER,
        }
    }

    pub fn delimited() -> Self {
        FrameLayout::Delimited {
            head: framing::SERIAL_FRAME_HEAD,
            tail: framing::SERIAL_FRAME_TAIL,
            escape: framing::SERIAL_ESCAPE,
        }
    }

    pub fn validate(&self) -> IngestResult<()> {
        match *self {
            FrameLayout::Telemetry { present_marker, absent_marker } if present_marker == absent_marker => {
                Err(IngestError::config(
                    "layout",
                    format!("telemetry markers must differ (both 0x{:04X})", present_marker),
                ))
            }
            FrameLayout::Delimited { head, tail, escape } if head == tail || head == escape || tail == escape => {
                Err(IngestError::config(
                    "layout",
                    format!(
                        "delimiter bytes must be distinct (head 0x{:02X}, tail 0x{:02X}, escape 0x{:02X})",
                        head, tail, escape
                    ),
                ))
            }
            _ => Ok(()),
        }
    }

    /// Fixed frame width in bytes, `None` for delimited framing
    pub fn frame_width(&self, channels: usize) -> Option<usize> {
        let samples = sample_block_len(channels);
        match self {
            FrameLayout::Raw => Some(samples),
            FrameLayout::Telemetry { .. } => Some(
                samples + framing::DISCRIMINATOR_BYTES + crate::config::constants::telemetry::RECORD_BYTES,
            ),
            FrameLayout::Extended { .. } => Some(samples + framing::EXTENDED_BLOCK_BYTES),
            FrameLayout::Delimited { .. } => None,
        }
    }

    /// Longest run of bytes one frame can occupy on the wire
    pub fn max_wire_len(&self, channels: usize) -> usize {
        match self.frame_width(channels) {
            Some(width) => width,
            // every payload byte escaped, plus head and tail
            None => sample_block_len(channels) * 2 + 2,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            FrameLayout::Raw => "raw",
            FrameLayout::Telemetry { .. } => "telemetry",
            FrameLayout::Extended { .. } => "extended",
            FrameLayout::Delimited { .. } => "delimited",
        }
    }
}

/// Bytes occupied by the sample block of one frame
pub fn sample_block_len(channels: usize) -> usize {
    channels * signal::BYTES_PER_SAMPLE
}

/// Sign-extend one big-endian 24-bit sample
#[inline]
pub fn decode_i24(bytes: [u8; 3]) -> i32 {
    i32::from_be_bytes([bytes[0], bytes[1], bytes[2], 0]) >> 8
}

/// Decode a whole sample block into `out`, one value per channel
///
/// `block` must hold at least `out.len() * 3` bytes.
#[inline]
pub fn decode_sample_block(block: &[u8], out: &mut [i32]) {
    for (value, bytes) in out.iter_mut().zip(block.chunks_exact(signal::BYTES_PER_SAMPLE)) {
        *value = decode_i24([bytes[0], bytes[1], bytes[2]]);
    }
}

/// Inverse of [`decode_i24`], used by tests and the demo recorder
pub fn encode_i24(value: i32) -> [u8; 3] {
    let bytes = value.to_be_bytes();
    [bytes[1], bytes[2], bytes[3]]
}
