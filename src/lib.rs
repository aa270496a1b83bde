//! NXBCI-Core: multichannel biosignal ingest for 24-bit acquisition boards
//!
//! This library turns the byte stream of a 24-bit multichannel acquisition board into
//! per-channel millivolt series. It features:
//!
//! - A resynchronizing frame codec for the raw, telemetry, extended and delimited wire layouts
//! - Live sessions that ingest from any byte source on a worker thread into rolling windows
//! - Telemetry and motion (GPS and attitude) side channels
//! - Memory-mapped capture files with whole-file load and paced playback
//! - Frame-count alignment of several boards with background CSV recording
//! - Layered TOML configuration with environment overrides
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use nxbci_core::{CaptureFile, SessionConfig};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = SessionConfig::new(16, 500, 4);
//!     let mut capture = CaptureFile::new("recording.bin", config)?;
//!
//!     // Load mode: decode the whole file once
//!     let report = capture.load()?;
//!     println!("{} samples", report.total_samples);
//!     let first_second = capture.segment(0, 500)?;
//!     println!("channel 0: {:?}", &first_second[0][..10]);
//!
//!     // Playback mode: re-emit frames at the sample rate
//!     capture.start_playback()?;
//!     std::thread::sleep(std::time::Duration::from_millis(200));
//!     let window = capture.get_data()?;
//!     println!("{} frames ingested", window.frames_ingested);
//!     capture.stop();
//!
//!     Ok(())
//! }
//! ```

#![warn(clippy::all)]
#![allow(clippy::module_inception)]

pub mod acquisition;
pub mod codec;
pub mod config;
pub mod error;
pub mod session;
pub mod store;
pub mod utils;

// Re-export commonly used types for convenience
pub use codec::{CodecStats, FrameCodec, FrameLayout, FrameSink, SampleFrame, TelemetryReading};
pub use config::{CaptureConfig, ConfigLoader, CoreConfig, SessionConfig};
pub use error::{IngestError, IngestResult};
pub use acquisition::{FrameBatch, TelemetryView};
pub use session::{
    ByteFeeder, ByteSource, ChannelSnapshot, LiveSession, Pull, SessionReader, SessionState, SessionStatus,
    SourceAligner, StopReason,
};
pub use store::{CaptureFile, CsvRecorder, LoadReport, SampleTable};

pub use utils::time::{current_timestamp_micros, current_timestamp_nanos};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Get library information
pub fn version_info() -> VersionInfo {
    let mut features = vec![
        "Resynchronizing frame codec".to_string(),
        "Live ingest sessions".to_string(),
        "Telemetry and motion side channels".to_string(),
        "Capture file load and playback".to_string(),
        "Multi-source alignment and CSV recording".to_string(),
    ];
    if cfg!(feature = "desktop") {
        features.push("Async reader pump".to_string());
    }

    VersionInfo {
        name: NAME.to_string(),
        version: VERSION.to_string(),
        description: "Multichannel biosignal ingest for 24-bit acquisition boards".to_string(),
        features,
    }
}

/// Library version information
#[derive(Debug, Clone)]
pub struct VersionInfo {
    /// Library name
    pub name: String,
    /// Version string
    pub version: String,
    /// Description
    pub description: String,
    /// List of features
    pub features: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_info() {
        let info = version_info();
        assert_eq!(info.name, NAME);
        assert_eq!(info.version, VERSION);
        assert!(!info.features.is_empty());
    }

    #[test]
    fn test_constants() {
        assert!(!VERSION.is_empty());
        assert_eq!(NAME, "nxbci-core");
    }
}
