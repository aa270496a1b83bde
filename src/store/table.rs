// src/store/table.rs
//! Materialized capture contents

use crate::codec::{
    Attitude, AuxiliaryBlock, CodecStats, FrameCodec, FrameLayout, FrameRef, FrameSink, GpsFix, TelemetryReading,
};
use crate::config::SessionConfig;
use crate::error::{IngestError, IngestResult};
use rayon::prelude::*;
use std::ops::Range;

/// Per-channel sample table of a loaded capture, immutable once built
#[derive(Debug, Clone, PartialEq)]
pub struct SampleTable {
    channels: Vec<Vec<f64>>,
    /// One block per frame for the extended layout
    auxiliary: Option<Vec<AuxiliaryBlock>>,
    /// One slot per frame for the telemetry layout
    telemetry: Option<Vec<Option<TelemetryReading>>>,
    sample_rate: u32,
}

/// Frame-major accumulation of codec output, transposed once decoding is done
#[derive(Debug, Default)]
struct FrameRows {
    raw: Vec<i32>,
    auxiliary: Vec<AuxiliaryBlock>,
    telemetry: Vec<Option<TelemetryReading>>,
}

impl FrameSink for FrameRows {
    fn on_frame(&mut self, frame: FrameRef<'_>) {
        self.raw.extend_from_slice(frame.raw);
        self.telemetry.push(None);
    }

    fn on_telemetry(&mut self, reading: TelemetryReading) {
        // the reading belongs to the frame just emitted
        if let Some(slot) = self.telemetry.last_mut() {
            *slot = Some(reading);
        }
    }

    fn on_auxiliary(&mut self, block: AuxiliaryBlock) {
        self.auxiliary.push(block);
    }
}

impl SampleTable {
    /// Run the whole capture through a fresh codec and build the columns
    ///
    /// Decoding follows the same rules as live ingestion, so frames lost to resync are
    /// absent here too. The returned stats carry the resync counters and discarded tail.
    pub(crate) fn decode(data: &[u8], config: &SessionConfig) -> IngestResult<(Self, CodecStats)> {
        let mut codec = FrameCodec::for_session(config)?;
        let mut rows = FrameRows::default();
        if let Some(width) = config.frame_width() {
            rows.raw.reserve(data.len() / width * config.channels);
        }

        codec.feed_into(data, &mut rows);
        codec.finish();

        let width = config.channels;
        let scale = config.millivolts_per_count();
        let raw = &rows.raw;
        let channels = (0..width)
            .into_par_iter()
            .map(|channel| {
                raw.chunks_exact(width)
                    .map(|frame| frame[channel] as f64 * scale)
                    .collect::<Vec<f64>>()
            })
            .collect::<Vec<_>>();

        let auxiliary = matches!(config.layout, FrameLayout::Extended { .. }).then_some(rows.auxiliary);
        let telemetry = matches!(config.layout, FrameLayout::Telemetry { .. }).then_some(rows.telemetry);

        let table = Self {
            channels,
            auxiliary,
            telemetry,
            sample_rate: config.sample_rate,
        };
        Ok((table, codec.stats().clone()))
    }

    pub fn total_samples(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Recording length in seconds
    pub fn duration_secs(&self) -> f64 {
        self.total_samples() as f64 / self.sample_rate as f64
    }

    /// Every channel, in millivolts
    pub fn channels(&self) -> &[Vec<f64>] {
        &self.channels
    }

    pub fn channel(&self, index: usize) -> Option<&[f64]> {
        self.channels.get(index).map(Vec::as_slice)
    }

    /// Validate a half-open sample range
    pub fn check_range(&self, start: usize, end: usize) -> IngestResult<Range<usize>> {
        let total = self.total_samples();
        if start > end || end > total {
            return Err(IngestError::OutOfRange { start, end, total });
        }
        Ok(start..end)
    }

    /// Samples `start..end` of every channel
    pub fn segment(&self, start: usize, end: usize) -> IngestResult<Vec<Vec<f64>>> {
        let range = self.check_range(start, end)?;
        Ok(self.channels.iter().map(|channel| channel[range.clone()].to_vec()).collect())
    }

    /// GPS fix per sample; all `None` unless the capture uses the extended layout
    pub fn gps_segment(&self, start: usize, end: usize) -> IngestResult<Vec<Option<GpsFix>>> {
        let range = self.check_range(start, end)?;
        Ok(match &self.auxiliary {
            Some(blocks) => blocks[range].iter().map(|block| block.gps).collect(),
            None => vec![None; range.len()],
        })
    }

    /// Attitude per sample; all `None` unless the capture uses the extended layout
    pub fn attitude_segment(&self, start: usize, end: usize) -> IngestResult<Vec<Option<Attitude>>> {
        let range = self.check_range(start, end)?;
        Ok(match &self.auxiliary {
            Some(blocks) => blocks[range].iter().map(|block| block.attitude).collect(),
            None => vec![None; range.len()],
        })
    }

    /// Telemetry reading per sample; all `None` unless the capture uses the telemetry layout
    pub fn telemetry_segment(&self, start: usize, end: usize) -> IngestResult<Vec<Option<TelemetryReading>>> {
        let range = self.check_range(start, end)?;
        Ok(match &self.telemetry {
            Some(readings) => readings[range].to_vec(),
            None => vec![None; range.len()],
        })
    }
}
