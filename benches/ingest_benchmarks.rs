// benches/ingest_benchmarks.rs
//! Throughput of the frame codec, the channel bank and capture loading

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use nxbci_core::acquisition::ChannelBank;
use nxbci_core::codec::{encode_i24, Delimiters, FrameCodec, FrameLayout, FrameRef, FrameSink};
use nxbci_core::{CaptureFile, SessionConfig};
use std::io::Write;

const CHANNEL_COUNTS: &[usize] = &[1, 8, 16, 32];
const CHUNK_SIZES: &[usize] = &[64, 512, 4096];
const FRAMES: usize = 4000;

/// Sink that only counts, so the benchmark measures decoding alone
struct Counter(u64);

impl FrameSink for Counter {
    fn on_frame(&mut self, frame: FrameRef<'_>) {
        self.0 += frame.raw[0] as u64 & 1;
    }
}

fn raw_stream(channels: usize) -> Vec<u8> {
    (0..FRAMES)
        .flat_map(|f| (0..channels).flat_map(move |c| encode_i24((f * channels + c) as i32 - 100_000)))
        .collect()
}

fn telemetry_stream(channels: usize) -> Vec<u8> {
    let mut stream = Vec::new();
    for frame in raw_stream(channels).chunks(channels * 3) {
        stream.extend_from_slice(frame);
        stream.extend([0xFF, 0xFF]);
        stream.extend([0x10u8; 14]);
    }
    stream
}

fn delimited_stream(channels: usize) -> Vec<u8> {
    let delims = Delimiters {
        head: 0x0A,
        tail: 0x0D,
        escape: 0x1B,
    };
    raw_stream(channels)
        .chunks(channels * 3)
        .flat_map(|frame| delims.encode_frame(frame))
        .collect()
}

fn benchmark_codec(c: &mut Criterion) {
    let mut group = c.benchmark_group("codec");

    for &channels in CHANNEL_COUNTS {
        let layouts = [
            (FrameLayout::Raw, raw_stream(channels)),
            (FrameLayout::telemetry(), telemetry_stream(channels)),
            (FrameLayout::delimited(), delimited_stream(channels)),
        ];

        for (layout, stream) in layouts {
            group.throughput(Throughput::Bytes(stream.len() as u64));
            for &chunk in CHUNK_SIZES {
                group.bench_with_input(
                    BenchmarkId::new(layout.name(), format!("{}ch_{}B", channels, chunk)),
                    &stream,
                    |b, stream| {
                        b.iter(|| {
                            let mut codec = FrameCodec::new(layout, channels).unwrap();
                            let mut sink = Counter(0);
                            for piece in stream.chunks(chunk) {
                                codec.feed_into(black_box(piece), &mut sink);
                            }
                            sink.0
                        });
                    },
                );
            }
        }
    }

    group.finish();
}

fn benchmark_channel_bank(c: &mut Criterion) {
    let mut group = c.benchmark_group("channel_bank");
    group.throughput(Throughput::Elements(FRAMES as u64));

    for &channels in CHANNEL_COUNTS {
        let raw: Vec<i32> = (0..channels as i32).collect();

        group.bench_with_input(BenchmarkId::new("push_scaled", channels), &raw, |b, raw| {
            let mut bank = ChannelBank::new(channels, 2000).unwrap();
            b.iter(|| {
                for _ in 0..FRAMES {
                    bank.push_scaled(black_box(raw), 1.788e-4).unwrap();
                }
            });
        });

        group.bench_with_input(BenchmarkId::new("snapshot", channels), &raw, |b, raw| {
            let mut bank = ChannelBank::new(channels, 2000).unwrap();
            for _ in 0..2000 {
                bank.push_scaled(raw, 1.0).unwrap();
            }
            b.iter(|| black_box(bank.snapshot()));
        });
    }

    group.finish();
}

fn benchmark_capture_load(c: &mut Criterion) {
    let mut group = c.benchmark_group("capture_load");
    group.sample_size(20);

    for &channels in &[8usize, 32] {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        for _ in 0..10 {
            file.write_all(&raw_stream(channels)).unwrap();
        }
        file.flush().unwrap();

        group.throughput(Throughput::Elements((FRAMES * 10) as u64));
        group.bench_function(BenchmarkId::new("load", channels), |b| {
            b.iter(|| {
                let config = SessionConfig::new(channels, 500, 4);
                let mut capture = CaptureFile::new(file.path(), config).unwrap();
                capture.load().unwrap().total_samples
            });
        });
    }

    group.finish();
}

criterion_group!(benches, benchmark_codec, benchmark_channel_bank, benchmark_capture_load);
criterion_main!(benches);
