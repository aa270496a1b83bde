// src/session/source.rs
//! Byte sources: the seam between transports and the ingest worker
//!
//! A transport only has to deliver raw bytes. Pull-style transports (a socket, a file)
//! implement [`ByteSource`] directly or go through [`ReaderSource`]; push-style transports
//! (broker callbacks, async sockets) hand chunks to a [`ByteFeeder`].

use super::worker::StopSignal;
use super::{SessionShared, SessionState};
use crate::config::constants::runtime::{FEEDER_QUEUE_CHUNKS, READ_CHUNK_BYTES, SOURCE_POLL_INTERVAL};
#[cfg(feature = "desktop")]
use crate::config::constants::runtime::FEEDER_RETRY_INTERVAL;
use crate::error::{IngestError, IngestResult};
use crossbeam::channel::{bounded, select, Receiver, Sender, TrySendError};
use std::io::{self, ErrorKind, Read};
use std::net::TcpStream;
use std::sync::atomic::Ordering;
use std::sync::Arc;

/// Outcome of one [`ByteSource::pull`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pull {
    /// Bytes were appended to the buffer
    Data,
    /// Nothing arrived within the poll interval
    Idle,
    /// End of stream
    Closed,
}

/// Producer of raw stream bytes, driven by the ingest worker
///
/// `pull` must return within roughly [`SOURCE_POLL_INTERVAL`] so the worker can observe a stop
/// request; implementations that sleep should wait on `stop` instead.
pub trait ByteSource {
    fn pull(&mut self, buf: &mut Vec<u8>, stop: &StopSignal) -> io::Result<Pull>;
}

impl<F> ByteSource for F
where
    F: FnMut(&mut Vec<u8>, &StopSignal) -> io::Result<Pull>,
{
    fn pull(&mut self, buf: &mut Vec<u8>, stop: &StopSignal) -> io::Result<Pull> {
        self(buf, stop)
    }
}

/// Adapter for any blocking [`Read`]
///
/// The reader should time out periodically (e.g. a socket read timeout); a read that blocks
/// forever also blocks `stop`.
#[derive(Debug)]
pub struct ReaderSource<R> {
    reader: R,
}

impl<R: Read> ReaderSource<R> {
    pub fn new(reader: R) -> Self {
        Self { reader }
    }

    pub fn into_inner(self) -> R {
        self.reader
    }
}

impl ReaderSource<TcpStream> {
    /// Wrap a connected socket, arming a read timeout of [`SOURCE_POLL_INTERVAL`]
    pub fn tcp(stream: TcpStream) -> io::Result<Self> {
        stream.set_read_timeout(Some(SOURCE_POLL_INTERVAL))?;
        stream.set_nodelay(true)?;
        Ok(Self::new(stream))
    }
}

impl<R: Read> ByteSource for ReaderSource<R> {
    fn pull(&mut self, buf: &mut Vec<u8>, _stop: &StopSignal) -> io::Result<Pull> {
        buf.resize(READ_CHUNK_BYTES, 0);
        match self.reader.read(buf) {
            Ok(0) => {
                buf.clear();
                Ok(Pull::Closed)
            }
            Ok(n) => {
                buf.truncate(n);
                Ok(Pull::Data)
            }
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut | ErrorKind::Interrupted) => {
                buf.clear();
                Ok(Pull::Idle)
            }
            Err(e) => {
                buf.clear();
                Err(e)
            }
        }
    }
}

#[derive(Debug)]
pub(crate) enum FeedMessage {
    Chunk(Vec<u8>),
    /// Acknowledged once every earlier chunk has been ingested
    Barrier(Sender<()>),
}

/// Worker end of a [`ByteFeeder`]
#[derive(Debug)]
pub struct ChannelSource {
    rx: Receiver<FeedMessage>,
}

impl ByteSource for ChannelSource {
    fn pull(&mut self, buf: &mut Vec<u8>, stop: &StopSignal) -> io::Result<Pull> {
        select! {
            recv(stop.receiver()) -> _ => Ok(Pull::Idle),
            recv(self.rx) -> message => match message {
                Ok(FeedMessage::Chunk(bytes)) => {
                    *buf = bytes;
                    Ok(Pull::Data)
                }
                Ok(FeedMessage::Barrier(ack)) => {
                    // earlier chunks were fed before this pull
                    let _ = ack.send(());
                    Ok(Pull::Idle)
                }
                Err(_) => Ok(Pull::Closed),
            },
            default(SOURCE_POLL_INTERVAL) => Ok(Pull::Idle),
        }
    }
}

/// Push handle for callback-driven transports
///
/// Dropping the feeder (or calling [`close`](Self::close)) ends the stream; the session then
/// stops with [`StopReason::SourceClosed`](super::StopReason::SourceClosed).
#[derive(Debug)]
pub struct ByteFeeder {
    tx: Sender<FeedMessage>,
    shared: Arc<SessionShared>,
}

pub(crate) fn feeder_pair(shared: Arc<SessionShared>) -> (ByteFeeder, ChannelSource) {
    let (tx, rx) = bounded(FEEDER_QUEUE_CHUNKS);
    (ByteFeeder { tx, shared }, ChannelSource { rx })
}

impl ByteFeeder {
    /// Queue a chunk for ingestion, waiting if the queue is full
    pub fn feed(&self, bytes: &[u8]) -> IngestResult<()> {
        self.feed_owned(bytes.to_vec())
    }

    pub fn feed_owned(&self, bytes: Vec<u8>) -> IngestResult<()> {
        if bytes.is_empty() {
            return Ok(());
        }
        self.tx
            .send(FeedMessage::Chunk(bytes))
            .map_err(|_| IngestError::Unavailable(SessionState::Stopped))
    }

    /// Non-blocking variant of [`feed_owned`](Self::feed_owned); hands the chunk back when the queue is full
    pub fn try_feed(&self, bytes: Vec<u8>) -> IngestResult<Option<Vec<u8>>> {
        match self.tx.try_send(FeedMessage::Chunk(bytes)) {
            Ok(()) => Ok(None),
            Err(TrySendError::Full(FeedMessage::Chunk(bytes))) => Ok(Some(bytes)),
            Err(TrySendError::Full(_)) => Ok(None),
            Err(TrySendError::Disconnected(_)) => Err(IngestError::Unavailable(SessionState::Stopped)),
        }
    }

    /// Block until every chunk fed so far has been decoded into the session's buffers
    pub fn flush(&self) -> IngestResult<()> {
        let (ack_tx, ack_rx) = bounded(1);
        self.tx
            .send(FeedMessage::Barrier(ack_tx))
            .map_err(|_| IngestError::Unavailable(SessionState::Stopped))?;
        ack_rx
            .recv()
            .map_err(|_| IngestError::Worker("session stopped before the flush completed".into()))
    }

    /// Connection status reported by the transport
    pub fn set_connected(&self, connected: bool) {
        self.shared.connected.store(connected, Ordering::Relaxed);
    }

    /// End the stream
    pub fn close(self) {
        self.shared.connected.store(false, Ordering::Relaxed);
    }
}

/// Copy an async reader into a feeder until end of stream
///
/// While the feeder queue is full the pump backs off with timed sleeps, so the runtime needs
/// its time driver enabled. Returns the number of bytes forwarded. The feeder is dropped on return, which closes the
/// session's stream.
#[cfg(feature = "desktop")]
pub async fn pump_async<R>(mut reader: R, feeder: ByteFeeder) -> IngestResult<u64>
where
    R: tokio::io::AsyncRead + Unpin,
{
    use tokio::io::AsyncReadExt;

    let mut total = 0u64;
    feeder.set_connected(true);
    loop {
        let mut chunk = vec![0u8; READ_CHUNK_BYTES];
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        chunk.truncate(n);
        total += n as u64;

        let mut pending = Some(chunk);
        let mut backoff = FEEDER_RETRY_INTERVAL;
        while let Some(chunk) = pending.take() {
            pending = feeder.try_feed(chunk)?;
            if pending.is_some() {
                // queue full: sleep instead of holding the runtime worker
                tokio::time::sleep(backoff).await;
                backoff = (backoff * 2).min(SOURCE_POLL_INTERVAL);
            }
        }
    }
    feeder.close();
    Ok(total)
}
