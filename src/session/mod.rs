// src/session/mod.rs
//! Live ingest session
//!
//! A [`LiveSession`] owns one frame codec, one channel bank and the worker that connects
//! them to a byte source. Lifecycle is `Idle -> Running -> Stopped`; `Stopped` is terminal
//! and a new session must be built to ingest again.
//!
//! ```rust,no_run
//! use nxbci_core::config::SessionConfig;
//! use nxbci_core::session::LiveSession;
//!
//! # fn main() -> nxbci_core::IngestResult<()> {
//! let mut session = LiveSession::new(SessionConfig::default())?;
//! let feeder = session.start_channel()?;
//! feeder.feed(&[0u8; 48])?;
//! feeder.flush()?;
//!
//! let snapshot = session.get_data()?;
//! assert_eq!(snapshot.channels.len(), 16);
//! session.stop();
//! # Ok(())
//! # }
//! ```

pub mod align;
pub mod source;
pub mod worker;

pub use align::SourceAligner;
pub use source::{ByteFeeder, ByteSource, ChannelSource, Pull, ReaderSource};
#[cfg(feature = "desktop")]
pub use source::pump_async;
pub use worker::StopSignal;

use crate::acquisition::{
    shared_bank, BankReader, BankWriter, FrameBatch, MotionHandle, MotionSnapshot, TelemetryHandle, TelemetryView,
};
use crate::codec::{CodecStats, FrameCodec};
use crate::config::SessionConfig;
use crate::error::{IngestError, IngestResult};
use crate::utils::time::current_timestamp_nanos;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Read;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};
use worker::{SessionSink, Worker};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionState {
    Idle,
    Running,
    Stopped,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::Running => "running",
            SessionState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Why a session reached `Stopped`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopReason {
    /// `stop` was called
    Requested,
    /// The byte source reached end of stream
    SourceClosed,
    /// The worker hit an I/O error or panicked
    Fatal(String),
}

/// Frame-aligned copy of every channel window, in millivolts
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelSnapshot {
    /// One series per channel, oldest sample first
    pub channels: Vec<Vec<f64>>,
    /// Frames written to the session since start
    pub frames_ingested: u64,
    pub timestamp_ns: u64,
}

impl ChannelSnapshot {
    /// Samples per channel
    pub fn len(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionStatus {
    pub state: SessionState,
    /// Reported by the transport, not derived from the stream
    pub connected: bool,
    /// At least one frame decoded since start; cleared on stop
    pub receiving: bool,
    pub frames_ingested: u64,
    pub codec: CodecStats,
    pub stop_reason: Option<StopReason>,
}

#[derive(Debug)]
struct Lifecycle {
    state: SessionState,
    stop_reason: Option<StopReason>,
}

/// State shared between the session, its worker and its readers
#[derive(Debug)]
pub(crate) struct SessionShared {
    lifecycle: Mutex<Lifecycle>,
    pub(crate) connected: AtomicBool,
    pub(crate) receiving: AtomicBool,
    pub(crate) codec_stats: Mutex<CodecStats>,
}

impl SessionShared {
    fn new() -> Self {
        Self {
            lifecycle: Mutex::new(Lifecycle {
                state: SessionState::Idle,
                stop_reason: None,
            }),
            connected: AtomicBool::new(false),
            receiving: AtomicBool::new(false),
            codec_stats: Mutex::new(CodecStats::default()),
        }
    }

    fn state(&self) -> SessionState {
        self.lifecycle.lock().state
    }

    /// Move to `Stopped`, keeping the first recorded reason
    pub(crate) fn finish(&self, reason: StopReason) {
        let mut lifecycle = self.lifecycle.lock();
        if lifecycle.state != SessionState::Stopped {
            match &reason {
                StopReason::Fatal(message) => warn!("Session stopped: {}", message),
                other => info!("Session stopped: {:?}", other),
            }
            lifecycle.state = SessionState::Stopped;
            lifecycle.stop_reason = Some(reason);
        }
        self.receiving.store(false, Ordering::Relaxed);
    }
}

/// Cloneable read-only view of a session
///
/// Each handle carries its own cursor for [`pop_new_data`](SessionReader::pop_new_data); a
/// clone starts at the cursor of the handle it was cloned from.
#[derive(Debug, Clone)]
pub struct SessionReader {
    shared: Arc<SessionShared>,
    bank: BankReader,
    telemetry: TelemetryView,
    motion: MotionHandle,
    cursor: u64,
}

impl SessionReader {
    pub fn state(&self) -> SessionState {
        self.shared.state()
    }

    pub fn is_running(&self) -> bool {
        self.state() == SessionState::Running
    }

    /// Current channel windows; unavailable unless the session is running
    pub fn get_data(&self) -> IngestResult<ChannelSnapshot> {
        let state = self.state();
        if state != SessionState::Running {
            return Err(IngestError::Unavailable(state));
        }
        let (channels, frames_ingested) = self.bank.snapshot_with_count();
        Ok(ChannelSnapshot {
            channels,
            frames_ingested,
            timestamp_ns: current_timestamp_nanos(),
        })
    }

    pub fn status(&self) -> SessionStatus {
        let lifecycle = self.shared.lifecycle.lock();
        SessionStatus {
            state: lifecycle.state,
            connected: self.shared.connected.load(Ordering::Relaxed),
            receiving: self.shared.receiving.load(Ordering::Relaxed),
            frames_ingested: self.bank.frames_written(),
            codec: self.shared.codec_stats.lock().clone(),
            stop_reason: lifecycle.stop_reason.clone(),
        }
    }

    /// Frames ingested since the previous call on this handle, `None` if there are none
    ///
    /// Works in every state, so the tail of a stopped session can still be drained. The
    /// shared windows are not modified; frames evicted before they were read are counted in
    /// [`FrameBatch::missed`].
    pub fn pop_new_data(&mut self) -> Option<FrameBatch> {
        let batch = self.bank.frames_since(self.cursor);
        if batch.missed > 0 {
            debug!("Reader fell behind: {} frames evicted unread", batch.missed);
        }
        self.cursor = batch.next_cursor();
        (!batch.is_empty()).then_some(batch)
    }

    /// Move the cursor past every frame ingested so far
    pub fn skip_to_latest(&mut self) {
        self.cursor = self.bank.frames_written();
    }

    pub fn channels(&self) -> usize {
        self.bank.channels()
    }

    pub fn telemetry(&self) -> &TelemetryView {
        &self.telemetry
    }

    /// Attitude and GPS history (extended layout only)
    pub fn motion(&self) -> MotionSnapshot {
        self.motion.snapshot()
    }
}

/// One ingest session bound to at most one byte source
#[derive(Debug)]
pub struct LiveSession {
    config: SessionConfig,
    reader: SessionReader,
    telemetry: TelemetryHandle,
    writer: Option<BankWriter>,
    worker: Option<Worker>,
}

impl LiveSession {
    /// Validate `config` and allocate the buffers; no thread is started yet
    pub fn new(config: SessionConfig) -> IngestResult<Self> {
        config.validate()?;
        let (writer, bank) = shared_bank(config.channels, config.capacity())?;
        let telemetry = TelemetryHandle::new(config.telemetry_buffer_size)?;
        let motion = MotionHandle::new(config.capacity())?;

        debug!(
            "Live session: {} channels x {} samples ({} Hz, {} s)",
            config.channels,
            config.capacity(),
            config.sample_rate,
            config.duration
        );

        Ok(Self {
            config,
            reader: SessionReader {
                shared: Arc::new(SessionShared::new()),
                bank,
                telemetry: telemetry.view(),
                motion,
                cursor: 0,
            },
            telemetry,
            writer: Some(writer),
            worker: None,
        })
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Start ingesting from `source` on a background thread
    pub fn start<S>(&mut self, source: S) -> IngestResult<()>
    where
        S: ByteSource + Send + 'static,
    {
        let state = self.reader.state();
        if state != SessionState::Idle {
            return Err(IngestError::InvalidState { operation: "start", state });
        }
        let writer = self.writer.take().ok_or(IngestError::InvalidState { operation: "start", state })?;

        let codec = FrameCodec::for_session(&self.config)?;
        let sink = SessionSink {
            writer,
            millivolts_per_count: self.config.millivolts_per_count(),
            telemetry: self.telemetry.clone(),
            motion: self.reader.motion.clone(),
            shared: Arc::clone(&self.reader.shared),
        };

        // Running before the thread exists, so an instant source close lands on Stopped
        self.reader.shared.lifecycle.lock().state = SessionState::Running;
        match Worker::spawn(source, codec, sink) {
            Ok(worker) => {
                self.worker = Some(worker);
                Ok(())
            }
            Err(e) => {
                self.reader.shared.finish(StopReason::Fatal(e.to_string()));
                Err(e)
            }
        }
    }

    /// Start with a push-style feeder; dropping the feeder closes the stream
    pub fn start_channel(&mut self) -> IngestResult<ByteFeeder> {
        let (feeder, source) = source::feeder_pair(Arc::clone(&self.reader.shared));
        self.start(source)?;
        Ok(feeder)
    }

    /// Start reading from a blocking reader (see [`ReaderSource`])
    pub fn start_reader<R>(&mut self, reader: R) -> IngestResult<()>
    where
        R: Read + Send + 'static,
    {
        self.start(ReaderSource::new(reader))
    }

    /// Stop the worker and wait for it to exit
    ///
    /// Returns the reason the session stopped, which differs from `Requested` when the source
    /// closed or failed first. Calling `stop` on a stopped session is a no-op.
    pub fn stop(&mut self) -> StopReason {
        if let Some(mut worker) = self.worker.take() {
            worker.stop_and_join();
        }
        self.reader.shared.finish(StopReason::Requested);
        self.reader.shared.connected.store(false, Ordering::Relaxed);
        self.writer = None;

        self.reader
            .shared
            .lifecycle
            .lock()
            .stop_reason
            .clone()
            .unwrap_or(StopReason::Requested)
    }

    pub fn state(&self) -> SessionState {
        self.reader.state()
    }

    pub fn is_running(&self) -> bool {
        self.reader.is_running()
    }

    pub fn get_data(&self) -> IngestResult<ChannelSnapshot> {
        self.reader.get_data()
    }

    pub fn status(&self) -> SessionStatus {
        self.reader.status()
    }

    /// Writable telemetry handle, for transports delivering telemetry on a side channel
    pub fn telemetry(&self) -> &TelemetryHandle {
        &self.telemetry
    }

    /// See [`SessionReader::pop_new_data`]
    pub fn pop_new_data(&mut self) -> Option<FrameBatch> {
        self.reader.pop_new_data()
    }

    pub fn motion(&self) -> MotionSnapshot {
        self.reader.motion()
    }

    /// Record the transport's connection status
    pub fn set_connected(&self, connected: bool) {
        self.reader.shared.connected.store(connected, Ordering::Relaxed);
    }

    /// Read-only handle for other threads
    pub fn reader(&self) -> SessionReader {
        self.reader.clone()
    }
}

impl Drop for LiveSession {
    fn drop(&mut self) {
        if self.worker.is_some() {
            self.stop();
        }
    }
}
