// src/session/worker.rs
//! Ingest worker thread and its stop signal

use super::source::{ByteSource, Pull};
use super::{SessionShared, StopReason};
use crate::acquisition::{BankWriter, MotionHandle, TelemetryHandle};
use crate::codec::{AuxiliaryBlock, FrameCodec, FrameRef, FrameSink, TelemetryReading};
use crate::config::constants::runtime::READ_CHUNK_BYTES;
use crate::error::{IngestError, IngestResult};
use crossbeam::channel::{bounded, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Cooperative stop flag observed by the worker and its byte source
///
/// Raised by dropping the paired sender, so it stays raised for every observer.
#[derive(Debug, Clone)]
pub struct StopSignal {
    rx: Receiver<()>,
}

impl StopSignal {
    pub fn pair() -> (Sender<()>, StopSignal) {
        let (tx, rx) = bounded(0);
        (tx, StopSignal { rx })
    }

    pub fn is_raised(&self) -> bool {
        matches!(self.rx.try_recv(), Err(TryRecvError::Disconnected))
    }

    /// Sleep up to `timeout`, returning early with `true` once raised
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        matches!(self.rx.recv_timeout(timeout), Err(RecvTimeoutError::Disconnected))
    }

    /// For `crossbeam::select!` alongside a data channel
    pub fn receiver(&self) -> &Receiver<()> {
        &self.rx
    }
}

/// Frame sink writing into the session's buffers
pub(crate) struct SessionSink {
    pub writer: BankWriter,
    pub millivolts_per_count: f64,
    pub telemetry: TelemetryHandle,
    pub motion: MotionHandle,
    pub shared: Arc<SessionShared>,
}

impl FrameSink for SessionSink {
    fn on_frame(&mut self, frame: FrameRef<'_>) {
        if let Err(e) = self.writer.push_scaled(frame.raw, self.millivolts_per_count) {
            error!("Dropping frame {}: {}", frame.index, e);
            return;
        }
        self.shared.receiving.store(true, Ordering::Relaxed);
    }

    fn on_telemetry(&mut self, reading: TelemetryReading) {
        self.telemetry.push_reading(reading);
    }

    fn on_auxiliary(&mut self, block: AuxiliaryBlock) {
        self.motion.record(block);
    }
}

/// Handle to a running ingest thread
#[derive(Debug)]
pub(crate) struct Worker {
    stop_tx: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl Worker {
    pub fn spawn<S>(mut source: S, mut codec: FrameCodec, mut sink: SessionSink) -> IngestResult<Self>
    where
        S: ByteSource + Send + 'static,
    {
        let (stop_tx, stop) = StopSignal::pair();
        let shared = Arc::clone(&sink.shared);

        let handle = thread::Builder::new()
            .name("nxbci-ingest".into())
            .spawn(move || {
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                    ingest_loop(&mut source, &mut codec, &mut sink, &stop)
                }));

                let reason = match outcome {
                    Ok(reason) => reason,
                    Err(payload) => {
                        let message = panic_message(payload.as_ref());
                        error!("Ingest worker panicked: {}", message);
                        StopReason::Fatal(message)
                    }
                };

                *shared.codec_stats.lock() = codec.stats().clone();
                shared.finish(reason);
            })
            .map_err(|e| IngestError::Worker(format!("failed to spawn ingest thread: {}", e)))?;

        Ok(Self {
            stop_tx: Some(stop_tx),
            handle: Some(handle),
        })
    }

    /// Raise the stop signal and wait for the thread to exit
    pub fn stop_and_join(&mut self) {
        self.stop_tx.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("Ingest thread terminated abnormally");
            }
        }
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        self.stop_and_join();
    }
}

fn ingest_loop<S: ByteSource>(
    source: &mut S,
    codec: &mut FrameCodec,
    sink: &mut SessionSink,
    stop: &StopSignal,
) -> StopReason {
    let mut chunk = Vec::with_capacity(READ_CHUNK_BYTES);
    info!("Ingest worker started ({} layout, {} channels)", codec.layout().name(), codec.channels());

    loop {
        if stop.is_raised() {
            debug!("Ingest worker stop requested");
            return StopReason::Requested;
        }

        chunk.clear();
        match source.pull(&mut chunk, stop) {
            Ok(Pull::Data) => {
                codec.feed_into(&chunk, sink);
                *sink.shared.codec_stats.lock() = codec.stats().clone();
            }
            Ok(Pull::Idle) => {}
            Ok(Pull::Closed) => {
                codec.finish();
                info!("Byte source closed after {} frames", codec.stats().frames_decoded);
                return StopReason::SourceClosed;
            }
            Err(e) => {
                error!("Byte source failed: {}", e);
                return StopReason::Fatal(e.to_string());
            }
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "ingest worker panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stop_signal_stays_raised() {
        let (tx, stop) = StopSignal::pair();
        assert!(!stop.is_raised());
        assert!(!stop.wait_timeout(Duration::from_millis(1)));

        drop(tx);
        assert!(stop.is_raised());
        assert!(stop.is_raised());
        assert!(stop.wait_timeout(Duration::from_secs(5)));
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn std::any::Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");
        let payload: Box<dyn std::any::Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(payload.as_ref()), "bang");
    }
}
