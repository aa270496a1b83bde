// src/store/mod.rs
//! File-backed capture store
//!
//! A capture file is a headerless concatenation of fixed-width frames. [`CaptureFile`] offers
//! two independent modes over the same memory map:
//!
//! - **Load mode**: [`load`](CaptureFile::load) decodes the whole file once into an immutable
//!   [`SampleTable`]; later reads never touch the file again.
//! - **Playback mode**: a background worker re-emits frames at the configured sample rate into
//!   a fresh [`LiveSession`] per run, so a cancelled run can never leak frames into the next.

mod playback;
pub mod recorder;
pub mod table;

pub use recorder::CsvRecorder;
pub use table::SampleTable;

use crate::config::{CoreConfig, SessionConfig};
use crate::error::{IngestError, IngestResult};
use crate::session::{ChannelSnapshot, LiveSession, SessionReader, SessionState, SessionStatus};
use crate::acquisition::{MotionSnapshot, TelemetryView};
use memmap2::Mmap;
use playback::PlaybackSource;
use std::fs::File;
use std::io::ErrorKind;
use std::ops::{Deref, Range};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Read-only view of the capture bytes
#[derive(Debug)]
pub enum CaptureBytes {
    Mapped(Mmap),
    /// Zero-length files cannot be mapped
    Empty,
}

impl Deref for CaptureBytes {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match self {
            CaptureBytes::Mapped(map) => map,
            CaptureBytes::Empty => &[],
        }
    }
}

/// Outcome of a load
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadReport {
    /// Frames the codec accepted
    pub total_samples: usize,
    /// Bytes after the last whole frame, ignored by every mode
    pub truncated_tail_bytes: usize,
    /// Times the codec lost frame alignment inside the file
    pub resync_events: u64,
    pub resync_bytes_skipped: u64,
}

/// Frame slots of the mapped file, as measured from its length
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Geometry {
    frames: usize,
    tail_bytes: usize,
}

/// A capture file and its playback state
#[derive(Debug)]
pub struct CaptureFile {
    path: PathBuf,
    config: SessionConfig,
    width: usize,
    strict: bool,
    bytes: Option<Arc<CaptureBytes>>,
    geometry: Option<Geometry>,
    table: Option<Arc<SampleTable>>,
    report: Option<LoadReport>,
    range: Option<Range<u64>>,
    playback: Option<LiveSession>,
}

impl CaptureFile {
    /// Describe a capture without touching the filesystem
    pub fn new(path: impl AsRef<Path>, config: SessionConfig) -> IngestResult<Self> {
        config.validate()?;
        let width = config
            .frame_width()
            .ok_or_else(|| IngestError::config("layout", "capture files require a fixed-width layout"))?;

        Ok(Self {
            path: path.as_ref().to_path_buf(),
            config,
            width,
            strict: false,
            bytes: None,
            geometry: None,
            table: None,
            report: None,
            range: None,
            playback: None,
        })
    }

    /// Build from the `[capture]` section of a configuration document
    pub fn from_config(config: &CoreConfig) -> IngestResult<Self> {
        config.validate()?;
        let capture = config
            .capture
            .as_ref()
            .ok_or_else(|| IngestError::config("capture", "no [capture] section configured"))?;
        Ok(Self::new(&capture.path, config.session.clone())?.strict(capture.strict_length))
    }

    /// Reject captures with a partial trailing frame instead of keeping the valid prefix
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn frame_width(&self) -> usize {
        self.width
    }

    /// Map the file on first use and validate its length
    fn open(&mut self) -> IngestResult<(Arc<CaptureBytes>, Geometry)> {
        if let (Some(bytes), Some(geometry)) = (&self.bytes, self.geometry) {
            return Ok((Arc::clone(bytes), geometry));
        }

        let file = File::open(&self.path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => IngestError::NotFound(self.path.clone()),
            _ => IngestError::Io(e),
        })?;
        let metadata = file.metadata()?;
        if !metadata.is_file() {
            return Err(IngestError::NotFound(self.path.clone()));
        }

        let bytes = if metadata.len() == 0 {
            CaptureBytes::Empty
        } else {
            // SAFETY: the map is read-only; a capture truncated by another process while mapped
            // is outside the supported use
            CaptureBytes::Mapped(unsafe { Mmap::map(&file)? })
        };

        let geometry = measure(bytes.len(), self.width, self.strict)?;
        info!(
            "Opened capture {}: {} frames of {} bytes, {} trailing",
            self.path.display(),
            geometry.frames,
            self.width,
            geometry.tail_bytes
        );

        let bytes = Arc::new(bytes);
        self.bytes = Some(Arc::clone(&bytes));
        self.geometry = Some(geometry);
        Ok((bytes, geometry))
    }

    /// Whole frame slots in the file (opens it if needed); playback ranges index these
    pub fn frame_count(&mut self) -> IngestResult<usize> {
        Ok(self.open()?.1.frames)
    }

    // --- Load mode ---

    /// Decode the entire capture; repeated calls return the first report
    ///
    /// Frames go through the same codec as playback, so a capture with corrupt frames
    /// yields the same samples in both modes.
    pub fn load(&mut self) -> IngestResult<LoadReport> {
        let (bytes, _) = self.open()?;
        if let Some(report) = self.report {
            debug!("Capture already loaded");
            return Ok(report);
        }

        let started = Instant::now();
        let (table, stats) = SampleTable::decode(&bytes, &self.config)?;
        let report = LoadReport {
            total_samples: table.total_samples(),
            truncated_tail_bytes: stats.truncated_tail_bytes as usize,
            resync_events: stats.resync_events,
            resync_bytes_skipped: stats.resync_bytes_skipped,
        };
        if report.resync_events > 0 {
            warn!(
                "Capture {} lost frame alignment {} times, {} bytes skipped",
                self.path.display(),
                report.resync_events,
                report.resync_bytes_skipped
            );
        }
        info!(
            "Loaded {} samples x {} channels in {:?}",
            table.total_samples(),
            table.channel_count(),
            started.elapsed()
        );

        self.table = Some(Arc::new(table));
        self.report = Some(report);
        Ok(report)
    }

    pub fn is_loaded(&self) -> bool {
        self.table.is_some()
    }

    /// Shared handle to the loaded table
    pub fn dataset(&self) -> IngestResult<Arc<SampleTable>> {
        self.table.clone().ok_or(IngestError::NotLoaded)
    }

    pub fn total_samples(&self) -> IngestResult<usize> {
        Ok(self.loaded()?.total_samples())
    }

    /// Every channel of the loaded capture, in millivolts
    pub fn full_dataset(&self) -> IngestResult<&[Vec<f64>]> {
        Ok(self.loaded()?.channels())
    }

    /// Samples `start..end` of every channel; `end` is exclusive
    pub fn segment(&self, start: usize, end: usize) -> IngestResult<Vec<Vec<f64>>> {
        self.loaded()?.segment(start, end)
    }

    fn loaded(&self) -> IngestResult<&SampleTable> {
        self.table.as_deref().ok_or(IngestError::NotLoaded)
    }

    // --- Playback mode ---

    /// Start playback of the current range (the whole file until another range is chosen);
    /// a no-op while a run is active
    pub fn start_playback(&mut self) -> IngestResult<()> {
        if self.is_running() {
            warn!("Playback already running");
            return Ok(());
        }
        let total = self.frame_count()? as u64;
        let range = self.range.clone().unwrap_or(0..total);
        self.run(range)
    }

    /// Cancel any run and play the whole file from the first frame
    pub fn restart_playback(&mut self) -> IngestResult<()> {
        let total = self.frame_count()? as u64;
        info!("Restarting playback from frame 0");
        self.run(0..total)
    }

    /// Cancel any run and play from `start` to the end of the file
    pub fn play_from(&mut self, start: usize) -> IngestResult<()> {
        let total = self.frame_count()?;
        if start >= total {
            return Err(IngestError::OutOfRange { start, end: total, total });
        }
        self.run(start as u64..total as u64)
    }

    /// Cancel any run and play `start..end`, stopping at `end` unless looping
    pub fn play_segment(&mut self, start: usize, end: usize) -> IngestResult<()> {
        let total = self.frame_count()?;
        if start >= end || end > total {
            return Err(IngestError::OutOfRange { start, end, total });
        }
        self.run(start as u64..end as u64)
    }

    fn run(&mut self, range: Range<u64>) -> IngestResult<()> {
        self.stop();
        let (bytes, _) = self.open()?;

        let source = PlaybackSource::new(
            bytes,
            self.width,
            range.clone(),
            self.config.is_looping,
            self.config.sample_rate,
        );
        let mut session = LiveSession::new(self.config.clone())?;
        session.set_connected(true);
        session.start(source)?;

        info!("Playback started: frames {}..{}", range.start, range.end);
        self.range = Some(range);
        self.playback = Some(session);
        Ok(())
    }

    /// Cancel the current run; returns once the worker has exited
    pub fn stop(&mut self) {
        if let Some(session) = self.playback.as_mut() {
            if session.is_running() {
                let reason = session.stop();
                debug!("Playback stopped: {:?}", reason);
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.playback.as_ref().is_some_and(LiveSession::is_running)
    }

    /// Channel windows of the current run
    pub fn get_data(&self) -> IngestResult<ChannelSnapshot> {
        match &self.playback {
            Some(session) => session.get_data(),
            None => Err(IngestError::Unavailable(SessionState::Idle)),
        }
    }

    /// Status of the latest run, `None` before the first one
    pub fn status(&self) -> Option<SessionStatus> {
        self.playback.as_ref().map(LiveSession::status)
    }

    /// Telemetry of the latest run
    pub fn telemetry(&self) -> Option<TelemetryView> {
        self.playback.as_ref().map(|session| session.telemetry().view())
    }

    /// Attitude and GPS history of the latest run
    pub fn motion(&self) -> Option<MotionSnapshot> {
        self.playback.as_ref().map(LiveSession::motion)
    }

    /// Read handle to the latest run; a later run gets a new handle
    pub fn playback_reader(&self) -> Option<SessionReader> {
        self.playback.as_ref().map(LiveSession::reader)
    }
}

impl Drop for CaptureFile {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Split a capture length into whole frames and a trailing remainder
fn measure(len: usize, width: usize, strict: bool) -> IngestResult<Geometry> {
    let frames = len / width;
    let tail_bytes = len % width;

    if tail_bytes > 0 && (strict || frames == 0) {
        return Err(IngestError::CorruptCapture {
            valid_samples: frames,
            trailing_bytes: tail_bytes,
        });
    }
    if tail_bytes > 0 {
        warn!(
            "Capture ends with a partial frame: {} trailing bytes ignored after {} frames",
            tail_bytes, frames
        );
    }

    Ok(Geometry { frames, tail_bytes })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_measure() {
        assert_eq!(measure(0, 48, true).unwrap(), Geometry { frames: 0, tail_bytes: 0 });
        assert_eq!(measure(96, 48, true).unwrap().frames, 2);
        assert_eq!(measure(98, 48, false).unwrap().tail_bytes, 2);
        assert!(matches!(
            measure(98, 48, true),
            Err(IngestError::CorruptCapture { valid_samples: 2, trailing_bytes: 2 })
        ));
        assert!(matches!(
            measure(10, 48, false),
            Err(IngestError::CorruptCapture { valid_samples: 0, trailing_bytes: 10 })
        ));
    }

    #[test]
    fn test_construction_does_no_io() {
        let capture = CaptureFile::new("/nonexistent/capture.bin", SessionConfig::default());
        assert!(capture.is_ok());
    }

    #[test]
    fn test_delimited_layout_rejected() {
        let config = SessionConfig::default().with_layout(crate::codec::FrameLayout::delimited());
        assert!(CaptureFile::new("capture.bin", config).is_err());
    }

    #[test]
    fn test_accessors_require_load() {
        let capture = CaptureFile::new("capture.bin", SessionConfig::default()).unwrap();
        assert!(matches!(capture.total_samples(), Err(IngestError::NotLoaded)));
        assert!(matches!(capture.get_data(), Err(IngestError::Unavailable(SessionState::Idle))));
    }
}
