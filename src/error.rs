// src/error.rs
//! Unified error handling for the ingestion core
//!
//! Errors fall into three groups:
//!
//! - **Configuration**: invalid buffer sizes, unsupported sample rates, out-of-range
//!   segment indices. Rejected synchronously by the call that introduced them.
//! - **Resource**: missing or corrupt capture files, I/O failures. Surfaced at load time,
//!   with the usable sample count attached when a capture is merely truncated.
//! - **Runtime state**: reading a session that is not running, reading load-mode data before
//!   a load, telemetry that has not filled yet.
//!
//! Transient decode gaps (partial trailing frames, resynchronization) are never errors; they are
//! counted in [`CodecStats`](crate::codec::CodecStats) instead.

use crate::acquisition::ring_buffer::RingBufferError;
use crate::session::SessionState;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for ingestion operations
pub type IngestResult<T> = Result<T, IngestError>;

/// Crate-wide error type
#[derive(Debug, Error)]
pub enum IngestError {
    /// A configuration value or combination was rejected
    #[error("[CONFIG] invalid {component}: {reason}")]
    Configuration {
        component: &'static str,
        reason: String,
    },

    /// A sample index or range lies outside `[0, total]`
    #[error("[RANGE] sample range {start}..{end} is outside 0..={total}")]
    OutOfRange { start: usize, end: usize, total: usize },

    /// Capture file does not exist or is not a regular file
    #[error("[FILE] capture file not found: {}", .0.display())]
    NotFound(PathBuf),

    /// Capture length is not an exact multiple of the frame width
    #[error("[FILE] corrupt capture: {valid_samples} complete frames followed by {trailing_bytes} trailing bytes")]
    CorruptCapture {
        valid_samples: usize,
        trailing_bytes: usize,
    },

    #[error("[IO] {0}")]
    Io(#[from] std::io::Error),

    #[error("[CONFIG] failed to parse configuration: {0}")]
    Parse(String),

    /// Load-mode accessor called before `load`
    #[error("[STORE] capture data has not been loaded")]
    NotLoaded,

    /// Snapshot requested from a session that is not running
    #[error("[SESSION] data unavailable while session is {0}")]
    Unavailable(SessionState),

    #[error("[SESSION] cannot {operation} while session is {state}")]
    InvalidState {
        operation: &'static str,
        state: SessionState,
    },

    /// Telemetry buffers have not filled yet
    #[error("[TELEMETRY] not ready: {have} of {need} readings buffered")]
    TelemetryNotReady { have: usize, need: usize },

    #[error("[TELEMETRY] record must be {expected} bytes, got {actual}")]
    TelemetryRecord { expected: usize, actual: usize },

    #[error("[BUFFER] {0}")]
    Buffer(#[from] RingBufferError),

    /// The ingest worker could not be spawned or died
    #[error("[WORKER] {0}")]
    Worker(String),
}

impl IngestError {
    /// Shorthand for a configuration error
    pub fn config(component: &'static str, reason: impl Into<String>) -> Self {
        IngestError::Configuration {
            component,
            reason: reason.into(),
        }
    }

    /// True for errors caused by the caller's arguments rather than the environment
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            IngestError::Configuration { .. } | IngestError::OutOfRange { .. } | IngestError::Buffer(_)
        )
    }
}

impl From<toml::de::Error> for IngestError {
    fn from(err: toml::de::Error) -> Self {
        IngestError::Parse(err.to_string())
    }
}
