// tests/multi_source_tests.rs
//! Several boards aligned on frame count, with and without recording

use nxbci_core::codec::encode_i24;
use nxbci_core::{CsvRecorder, LiveSession, SessionConfig, SourceAligner};
use std::fs;
use tempfile::TempDir;

fn raw_frames(range: std::ops::Range<usize>, channels: usize, offset: i32) -> Vec<u8> {
    range
        .flat_map(|f| (0..channels).flat_map(move |c| encode_i24(offset + (f * channels + c) as i32)))
        .collect()
}

fn session(channels: usize) -> LiveSession {
    LiveSession::new(SessionConfig::new(channels, 250, 4)).unwrap()
}

#[test]
fn test_aligned_block_follows_shortest_source() {
    let mut left = session(2);
    let mut right = session(1);
    let mut aligner = SourceAligner::new(vec![left.reader(), right.reader()]).unwrap();
    assert_eq!(aligner.total_channels(), 3);

    let left_feed = left.start_channel().unwrap();
    let right_feed = right.start_channel().unwrap();
    let scale = left.config().millivolts_per_count();

    left_feed.feed(&raw_frames(0..5, 2, 0)).unwrap();
    left_feed.flush().unwrap();
    // nothing from the right board yet
    assert!(aligner.get_aligned_data().unwrap().is_none());
    assert_eq!(aligner.backlog(), vec![5, 0]);

    right_feed.feed(&raw_frames(0..3, 1, 1000)).unwrap();
    right_feed.flush().unwrap();
    let block = aligner.get_aligned_data().unwrap().unwrap();
    assert_eq!(block.len(), 3);
    assert!(block.iter().all(|series| series.len() == 3));
    assert!((block[1][2] - 5.0 * scale).abs() < 1e-12);
    assert!((block[2][0] - 1000.0 * scale).abs() < 1e-12);
    assert_eq!(aligner.backlog(), vec![2, 0]);

    right_feed.feed(&raw_frames(3..6, 1, 1000)).unwrap();
    right_feed.flush().unwrap();
    let block = aligner.get_aligned_data().unwrap().unwrap();
    // left frames 3 and 4 were held back and come out first
    assert_eq!(block[0].len(), 2);
    assert!((block[0][0] - 6.0 * scale).abs() < 1e-12);
    assert!((block[2][1] - 1004.0 * scale).abs() < 1e-12);
    assert_eq!(aligner.backlog(), vec![0, 1]);

    left.stop();
    right.stop();
}

#[test]
fn test_sync_reset_discards_earlier_frames() {
    let mut left = session(1);
    let mut right = session(1);
    let left_feed = left.start_channel().unwrap();
    let right_feed = right.start_channel().unwrap();

    left_feed.feed(&raw_frames(0..10, 1, 0)).unwrap();
    left_feed.flush().unwrap();
    right_feed.feed(&raw_frames(0..4, 1, 0)).unwrap();
    right_feed.flush().unwrap();

    let mut aligner = SourceAligner::new(vec![left.reader(), right.reader()]).unwrap();
    aligner.sync_reset();
    assert!(aligner.get_aligned_data().unwrap().is_none());

    left_feed.feed(&raw_frames(10..12, 1, 0)).unwrap();
    left_feed.flush().unwrap();
    right_feed.feed(&raw_frames(4..6, 1, 0)).unwrap();
    right_feed.flush().unwrap();

    let block = aligner.get_aligned_data().unwrap().unwrap();
    assert_eq!(block[0].len(), 2);
    assert_eq!(block[1].len(), 2);
}

#[test]
fn test_aligned_blocks_are_recorded() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("aligned.csv");

    let mut left = session(1);
    let mut right = session(1);
    let recorder = CsvRecorder::create(&path, 2).unwrap();
    let mut aligner = SourceAligner::new(vec![left.reader(), right.reader()])
        .unwrap()
        .with_recorder(recorder)
        .unwrap();

    let left_feed = left.start_channel().unwrap();
    let right_feed = right.start_channel().unwrap();
    left_feed.feed(&raw_frames(0..4, 1, 0)).unwrap();
    left_feed.flush().unwrap();
    right_feed.feed(&raw_frames(0..4, 1, 0)).unwrap();
    right_feed.flush().unwrap();

    assert_eq!(aligner.get_aligned_data().unwrap().unwrap()[0].len(), 4);
    assert_eq!(aligner.finish().unwrap(), Some(4));

    let text = fs::read_to_string(&path).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 5);
    assert_eq!(lines[0], "Index,ch0,ch1");
    assert!(lines[4].starts_with("3,"));
}

#[test]
fn test_recorder_width_must_match() {
    let dir = TempDir::new().unwrap();
    let recorder = CsvRecorder::create(dir.path().join("r.csv"), 3).unwrap();
    let left = session(1);
    let aligner = SourceAligner::new(vec![left.reader()]).unwrap();
    assert!(aligner.with_recorder(recorder).unwrap_err().is_configuration());
    assert!(SourceAligner::new(Vec::new()).is_err());
}
