// src/config/mod.rs
//! Session and capture configuration
//!
//! Every recognized option is a field of a fixed structure; unknown keys in a TOML file are
//! rejected and invalid combinations fail at construction, not deep inside the ingest loop.

pub mod constants;
pub mod loader;

pub use constants::*;
pub use loader::ConfigLoader;

pub use crate::codec::FrameLayout;

use crate::error::{IngestError, IngestResult};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration of one live session or playback run
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SessionConfig {
    #[serde(default = "defaults::channels")]
    pub channels: usize,

    /// Per-channel sample rate in Hz
    #[serde(default = "defaults::sample_rate")]
    pub sample_rate: u32,

    /// Sliding window length in seconds
    #[serde(default = "defaults::duration")]
    pub duration: u32,

    /// Playback wraps to the segment start instead of stopping
    #[serde(default)]
    pub is_looping: bool,

    #[serde(default = "defaults::full_scale_volts")]
    pub full_scale_volts: f64,

    #[serde(default = "defaults::telemetry_buffer_size")]
    pub telemetry_buffer_size: usize,

    /// Wire framing; kept last so it serializes as a trailing TOML table
    #[serde(default)]
    pub layout: FrameLayout,
}

/// Capture file options
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CaptureConfig {
    pub path: PathBuf,

    /// Fail the load on a truncated tail instead of keeping the valid prefix
    #[serde(default)]
    pub strict_length: bool,
}

/// Top-level configuration document
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CoreConfig {
    #[serde(default)]
    pub session: SessionConfig,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capture: Option<CaptureConfig>,
}

mod defaults {
    use crate::config::constants::*;

    pub fn channels() -> usize { signal::DEFAULT_CHANNEL_COUNT }
    pub fn sample_rate() -> u32 { signal::DEFAULT_SAMPLE_RATE_HZ }
    pub fn duration() -> u32 { signal::DEFAULT_DURATION_SECS }
    pub fn full_scale_volts() -> f64 { signal::DEFAULT_FULL_SCALE_VOLTS }
    pub fn telemetry_buffer_size() -> usize { telemetry::DEFAULT_BUFFER_SIZE }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            channels: defaults::channels(),
            sample_rate: defaults::sample_rate(),
            duration: defaults::duration(),
            is_looping: false,
            full_scale_volts: defaults::full_scale_volts(),
            telemetry_buffer_size: defaults::telemetry_buffer_size(),
            layout: FrameLayout::default(),
        }
    }
}

impl SessionConfig {
    /// Config with the given window and defaults elsewhere
    pub fn new(channels: usize, sample_rate: u32, duration: u32) -> Self {
        Self {
            channels,
            sample_rate,
            duration,
            ..Self::default()
        }
    }

    pub fn with_layout(mut self, layout: FrameLayout) -> Self {
        self.layout = layout;
        self
    }

    pub fn looping(mut self, is_looping: bool) -> Self {
        self.is_looping = is_looping;
        self
    }

    pub fn with_telemetry_buffer(mut self, size: usize) -> Self {
        self.telemetry_buffer_size = size;
        self
    }

    /// Check every field and the combination of fields
    pub fn validate(&self) -> IngestResult<()> {
        use constants::{signal, telemetry};

        if !(signal::MIN_CHANNEL_COUNT..=signal::MAX_CHANNEL_COUNT).contains(&self.channels) {
            return Err(IngestError::config(
                "channels",
                format!(
                    "{} channels (must be {}..={})",
                    self.channels,
                    signal::MIN_CHANNEL_COUNT,
                    signal::MAX_CHANNEL_COUNT
                ),
            ));
        }

        if !signal::SUPPORTED_SAMPLE_RATES_HZ.contains(&self.sample_rate) {
            return Err(IngestError::config(
                "sample_rate",
                format!(
                    "unsupported sample rate {} Hz (supported: {:?})",
                    self.sample_rate,
                    signal::SUPPORTED_SAMPLE_RATES_HZ
                ),
            ));
        }

        if !(signal::MIN_DURATION_SECS..=signal::MAX_DURATION_SECS).contains(&self.duration) {
            return Err(IngestError::config(
                "duration",
                format!(
                    "{} s (must be {}..={})",
                    self.duration,
                    signal::MIN_DURATION_SECS,
                    signal::MAX_DURATION_SECS
                ),
            ));
        }

        if !(self.full_scale_volts > 0.0 && self.full_scale_volts <= signal::MAX_FULL_SCALE_VOLTS) {
            return Err(IngestError::config(
                "full_scale_volts",
                format!("{} V is outside (0, {}]", self.full_scale_volts, signal::MAX_FULL_SCALE_VOLTS),
            ));
        }

        if !(1..=telemetry::MAX_BUFFER_SIZE).contains(&self.telemetry_buffer_size) {
            return Err(IngestError::config(
                "telemetry_buffer_size",
                format!(
                    "{} readings (must be 1..={})",
                    self.telemetry_buffer_size,
                    telemetry::MAX_BUFFER_SIZE
                ),
            ));
        }

        self.layout.validate()
    }

    /// Ring buffer capacity per channel: `sample_rate x duration`
    pub fn capacity(&self) -> usize {
        self.sample_rate as usize * self.duration as usize
    }

    /// Millivolts represented by one 24-bit count
    pub fn millivolts_per_count(&self) -> f64 {
        self.full_scale_volts / constants::signal::I24_SPAN * constants::signal::MILLIVOLTS_PER_VOLT
    }

    /// Bytes per frame on the wire, `None` for variable-width framing
    pub fn frame_width(&self) -> Option<usize> {
        self.layout.frame_width(self.channels)
    }
}

impl CoreConfig {
    pub fn validate(&self) -> IngestResult<()> {
        self.session.validate()?;
        if self.capture.is_some() && self.session.frame_width().is_none() {
            return Err(IngestError::config(
                "layout",
                "capture files require a fixed-width layout",
            ));
        }
        Ok(())
    }
}
