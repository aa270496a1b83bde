// src/store/recorder.rs
//! Background CSV recording of sample blocks
//!
//! [`CsvRecorder`] accepts channel-major blocks without blocking the caller and writes them
//! as rows on a dedicated thread: `Index,ch0,ch1,...` followed by one line per sample with
//! four decimals.

use crate::acquisition::RingBufferError;
use crate::error::{IngestError, IngestResult};
use crossbeam::channel::{unbounded, Receiver, Sender};
use std::fs::{self, File};
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info};

type Block = Vec<Vec<f64>>;

/// Writer thread fed through an unbounded queue
#[derive(Debug)]
pub struct CsvRecorder {
    path: PathBuf,
    channels: usize,
    tx: Option<Sender<Block>>,
    handle: Option<JoinHandle<IngestResult<u64>>>,
}

impl CsvRecorder {
    /// Create (or truncate) `path`, write the header and start the writer thread
    ///
    /// Missing parent directories are created.
    pub fn create(path: impl AsRef<Path>, channels: usize) -> IngestResult<Self> {
        if channels == 0 {
            return Err(IngestError::config("channels", "a recording needs at least one channel"));
        }
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let mut writer = csv::Writer::from_writer(BufWriter::new(File::create(&path)?));
        let header = std::iter::once("Index".to_string()).chain((0..channels).map(|c| format!("ch{}", c)));
        writer.write_record(header).map_err(csv_error)?;
        writer.flush()?;

        let (tx, rx) = unbounded();
        let handle = thread::Builder::new()
            .name("nxbci-recorder".into())
            .spawn(move || write_rows(writer, rx))
            .map_err(|e| IngestError::Worker(format!("failed to spawn recorder thread: {}", e)))?;

        info!("Recording {} channels to {}", channels, path.display());
        Ok(Self {
            path,
            channels,
            tx: Some(tx),
            handle: Some(handle),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Queue a channel-major block; returns without waiting for the disk
    pub fn push(&self, block: &[Vec<f64>]) -> IngestResult<()> {
        if block.len() != self.channels {
            return Err(RingBufferError::ChannelMismatch {
                expected: self.channels,
                actual: block.len(),
            }
            .into());
        }
        let samples = block[0].len();
        if block.iter().any(|series| series.len() != samples) {
            return Err(IngestError::config("block", "channel series differ in length"));
        }
        if samples == 0 {
            return Ok(());
        }

        let tx = self
            .tx
            .as_ref()
            .ok_or_else(|| IngestError::Worker("recorder already stopped".into()))?;
        tx.send(block.to_vec())
            .map_err(|_| IngestError::Worker("recorder thread has exited".into()))
    }

    /// Write everything still queued, close the file and return the rows written
    pub fn stop(&mut self) -> IngestResult<u64> {
        self.tx.take();
        let handle = self
            .handle
            .take()
            .ok_or_else(|| IngestError::Worker("recorder already stopped".into()))?;
        let rows = handle
            .join()
            .map_err(|_| IngestError::Worker("recorder thread panicked".into()))??;
        info!("Recording stopped: {} rows in {}", rows, self.path.display());
        Ok(rows)
    }
}

impl Drop for CsvRecorder {
    fn drop(&mut self) {
        if self.handle.is_some() {
            if let Err(e) = self.stop() {
                error!("Recorder did not finish cleanly: {}", e);
            }
        }
    }
}

fn write_rows(mut writer: csv::Writer<BufWriter<File>>, rx: Receiver<Block>) -> IngestResult<u64> {
    let mut index = 0u64;
    let mut row = Vec::new();

    for block in rx.iter() {
        for n in 0..block[0].len() {
            row.clear();
            row.push(index.to_string());
            row.extend(block.iter().map(|series| format!("{:.4}", series[n])));
            writer.write_record(&row).map_err(csv_error)?;
            index += 1;
        }
        debug!("Recorder wrote {} rows", index);
    }

    writer.flush()?;
    Ok(index)
}

fn csv_error(err: csv::Error) -> IngestError {
    IngestError::Io(io::Error::from(err))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_rows_follow_header() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/record.csv");

        let mut recorder = CsvRecorder::create(&path, 2).unwrap();
        recorder.push(&[vec![1.0, 2.5], vec![-0.125, 0.0]]).unwrap();
        recorder.push(&[vec![], vec![]]).unwrap();
        recorder.push(&[vec![1.23456], vec![1.0]]).unwrap();
        assert_eq!(recorder.stop().unwrap(), 3);

        let text = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines,
            vec!["Index,ch0,ch1", "0,1.0000,-0.1250", "1,2.5000,0.0000", "2,1.2346,1.0000"]
        );
    }

    #[test]
    fn test_block_shape_checked() {
        let dir = TempDir::new().unwrap();
        let recorder = CsvRecorder::create(dir.path().join("r.csv"), 2).unwrap();
        assert!(recorder.push(&[vec![1.0]]).is_err());
        assert!(recorder.push(&[vec![1.0], vec![1.0, 2.0]]).is_err());
        assert!(CsvRecorder::create(dir.path().join("z.csv"), 0).is_err());
    }

    #[test]
    fn test_push_after_stop_rejected() {
        let dir = TempDir::new().unwrap();
        let mut recorder = CsvRecorder::create(dir.path().join("r.csv"), 1).unwrap();
        assert_eq!(recorder.stop().unwrap(), 0);
        assert!(recorder.push(&[vec![1.0]]).is_err());
        assert!(recorder.stop().is_err());
    }
}
