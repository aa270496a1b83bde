// src/session/align.rs
//! Frame-count alignment across several sessions
//!
//! Boards streaming side by side deliver frames in bursts of different sizes. The aligner
//! drains every reader, keeps what one board delivered ahead of the others, and hands out only
//! the stretch of frames that every board has covered, stacked into one channel-major block.

use super::SessionReader;
use crate::error::{IngestError, IngestResult};
use crate::store::CsvRecorder;
use std::collections::VecDeque;
use tracing::{debug, info, warn};

#[derive(Debug)]
struct AlignedSource {
    reader: SessionReader,
    /// Frames read but not yet handed out, one queue per channel
    pending: Vec<VecDeque<f64>>,
}

impl AlignedSource {
    fn backlog(&self) -> usize {
        self.pending.first().map_or(0, VecDeque::len)
    }

    fn pull(&mut self) {
        if let Some(batch) = self.reader.pop_new_data() {
            if batch.missed > 0 {
                warn!("Aligner lost {} frames of one source to window eviction", batch.missed);
            }
            for (queue, series) in self.pending.iter_mut().zip(batch.channels) {
                queue.extend(series);
            }
        }
    }
}

/// Aligns several sessions on their common frame count
#[derive(Debug)]
pub struct SourceAligner {
    sources: Vec<AlignedSource>,
    recorder: Option<CsvRecorder>,
}

impl SourceAligner {
    pub fn new(readers: Vec<SessionReader>) -> IngestResult<Self> {
        if readers.is_empty() {
            return Err(IngestError::config("sources", "alignment needs at least one session"));
        }
        let sources = readers
            .into_iter()
            .map(|reader| AlignedSource {
                pending: vec![VecDeque::new(); reader.channels()],
                reader,
            })
            .collect::<Vec<_>>();
        debug!("Aligning {} sources", sources.len());
        Ok(Self { sources, recorder: None })
    }

    /// Send every aligned block to `recorder`, whose channel count must match
    pub fn with_recorder(mut self, recorder: CsvRecorder) -> IngestResult<Self> {
        if recorder.channels() != self.total_channels() {
            return Err(IngestError::config(
                "recorder",
                format!("{} columns for {} aligned channels", recorder.channels(), self.total_channels()),
            ));
        }
        self.recorder = Some(recorder);
        Ok(self)
    }

    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    /// Channels of all sources together, in source order
    pub fn total_channels(&self) -> usize {
        self.sources.iter().map(|source| source.pending.len()).sum()
    }

    /// Frames held back per source, waiting for the others
    pub fn backlog(&self) -> Vec<usize> {
        self.sources.iter().map(AlignedSource::backlog).collect()
    }

    /// Forget everything ingested so far, so all sources start counting together
    pub fn sync_reset(&mut self) {
        for source in &mut self.sources {
            source.reader.skip_to_latest();
            source.pending.iter_mut().for_each(VecDeque::clear);
        }
        info!("Aligner reset");
    }

    /// Drain every source and return the frames all of them have delivered
    ///
    /// The block holds [`total_channels`](Self::total_channels) series of equal length.
    /// Returns `None` while any source has nothing pending; frames beyond the shortest
    /// source stay queued for the next call.
    pub fn get_aligned_data(&mut self) -> IngestResult<Option<Vec<Vec<f64>>>> {
        self.sources.iter_mut().for_each(AlignedSource::pull);

        let common = self.sources.iter().map(AlignedSource::backlog).min().unwrap_or(0);
        if common == 0 {
            return Ok(None);
        }

        let block: Vec<Vec<f64>> = self
            .sources
            .iter_mut()
            .flat_map(|source| source.pending.iter_mut())
            .map(|queue| queue.drain(..common).collect())
            .collect();

        if let Some(recorder) = &self.recorder {
            recorder.push(&block)?;
        }
        Ok(Some(block))
    }

    /// Stop the recorder, if any, returning the rows it wrote
    pub fn finish(&mut self) -> IngestResult<Option<u64>> {
        match self.recorder.take() {
            Some(mut recorder) => recorder.stop().map(Some),
            None => Ok(None),
        }
    }
}
