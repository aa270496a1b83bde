// demos/replay_demo.rs
//! Load a capture file and replay it at its recorded rate
//!
//! ```text
//! cargo run --example replay_demo -- [capture.bin]
//! ```
//!
//! Without an argument a one-minute synthetic 16-channel capture is generated first.
//! Configuration is read from `nxbci.toml` / `config/nxbci.toml` and `NXBCI_*` variables.

use nxbci_core::codec::encode_i24;
use nxbci_core::{CaptureFile, ConfigLoader, IngestResult, SessionConfig};
use std::f64::consts::TAU;
use std::io::Write;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn synthesize(config: &SessionConfig, seconds: usize) -> std::io::Result<tempfile::NamedTempFile> {
    let mut file = tempfile::NamedTempFile::new()?;
    let rate = config.sample_rate as f64;
    let counts_per_mv = 1.0 / config.millivolts_per_count();

    for n in 0..config.sample_rate as usize * seconds {
        let t = n as f64 / rate;
        let frame: Vec<u8> = (0..config.channels)
            .flat_map(|c| {
                // 0.05 mV sine, one frequency per channel
                let mv = 0.05 * (TAU * (5.0 + c as f64) * t).sin();
                encode_i24((mv * counts_per_mv) as i32)
            })
            .collect();
        file.write_all(&frame)?;
    }
    file.flush()?;
    Ok(file)
}

fn main() -> IngestResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = ConfigLoader::new().load()?;
    let session = config.session.clone();

    let synthetic;
    let path = match std::env::args().nth(1) {
        Some(path) => PathBuf::from(path),
        None => {
            synthetic = synthesize(&session, 60)?;
            synthetic.path().to_path_buf()
        }
    };

    let mut capture = CaptureFile::new(&path, session)?;
    let report = capture.load()?;
    let table = capture.dataset()?;
    info!(
        "{}: {} samples, {:.1} s, {} trailing bytes",
        path.display(),
        report.total_samples,
        table.duration_secs(),
        report.truncated_tail_bytes
    );

    for (channel, series) in table.channels().iter().enumerate().take(4) {
        let peak = series.iter().fold(0.0f64, |acc, v| acc.max(v.abs()));
        info!("channel {:2}: peak {:.4} mV", channel, peak);
    }

    capture.start_playback()?;
    for _ in 0..5 {
        thread::sleep(Duration::from_millis(500));
        if !capture.is_running() {
            break;
        }
        let snapshot = capture.get_data()?;
        info!(
            "window {} samples, {} frames ingested, ch0 latest {:.4} mV",
            snapshot.len(),
            snapshot.frames_ingested,
            snapshot.channels[0].last().copied().unwrap_or_default()
        );
    }

    if let Some(status) = capture.status() {
        info!("codec: {:?}", status.codec);
    }
    capture.stop();
    Ok(())
}
