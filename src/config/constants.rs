// src/config/constants.rs
//! System-wide constants grouped by concern

/// Sample stream constants
pub mod signal {
    pub const DEFAULT_CHANNEL_COUNT: usize = 16;
    pub const MIN_CHANNEL_COUNT: usize = 1;
    pub const MAX_CHANNEL_COUNT: usize = 32;

    pub const DEFAULT_SAMPLE_RATE_HZ: u32 = 500;
    /// Rates the acquisition firmware can be switched to
    pub const SUPPORTED_SAMPLE_RATES_HZ: [u32; 5] = [250, 500, 1000, 2000, 4000];

    pub const DEFAULT_DURATION_SECS: u32 = 4;
    pub const MIN_DURATION_SECS: u32 = 1;
    pub const MAX_DURATION_SECS: u32 = 600;

    pub const BYTES_PER_SAMPLE: usize = 3;

    /// ADC reference span: one LSB is `FULL_SCALE / 2^23` volts
    pub const DEFAULT_FULL_SCALE_VOLTS: f64 = 1.5;
    pub const MAX_FULL_SCALE_VOLTS: f64 = 10.0;
    pub const MILLIVOLTS_PER_VOLT: f64 = 1000.0;

    /// 2^23, the magnitude of the most negative 24-bit value
    pub const I24_SPAN: f64 = 8_388_608.0;
}

/// Wire framing constants
pub mod framing {
    /// Discriminator announcing a telemetry block in the `telemetry` layout
    pub const TELEMETRY_PRESENT_MARKER: u16 = 0xFFFF;
    /// Discriminator announcing an empty telemetry block
    pub const TELEMETRY_ABSENT_MARKER: u16 = 0x0000;
    pub const DISCRIMINATOR_BYTES: usize = 2;

    /// Validity marker for the GPS and attitude blocks of the `extended` layout
    pub const EXTENDED_VALID_MARKER: u8 = 0x59;
    /// marker + lat(4) + dir + lon(4) + dir + marker + roll/pitch/yaw(6)
    pub const EXTENDED_BLOCK_BYTES: usize = 18;

    pub const SERIAL_FRAME_HEAD: u8 = 0x0A;
    pub const SERIAL_FRAME_TAIL: u8 = 0x0D;
    pub const SERIAL_ESCAPE: u8 = 0x1B;
    pub const SERIAL_ESCAPED_HEAD: u8 = 0x01;
    pub const SERIAL_ESCAPED_TAIL: u8 = 0x02;
    pub const SERIAL_ESCAPED_ESCAPE: u8 = 0x03;
}

/// Orientation/temperature telemetry constants
pub mod telemetry {
    pub const FIELD_COUNT: usize = 7;
    pub const RECORD_BYTES: usize = FIELD_COUNT * 2;

    pub const DEFAULT_BUFFER_SIZE: usize = 100;
    pub const MAX_BUFFER_SIZE: usize = 1000;

    /// g per LSB at the +-4 g range
    pub const ACCEL_LSB_G: f64 = 4.0 / 32768.0;
    /// deg/s per LSB at the +-1000 deg/s range
    pub const GYRO_LSB_DPS: f64 = 1000.0 / 32768.0;
    pub const TEMPERATURE_LSB_PER_DEGREE: f64 = 333.87;
    pub const TEMPERATURE_OFFSET_C: f64 = 21.0;

    /// Attitude angles are signed 16-bit fractions of a half turn
    pub const ATTITUDE_LSB_DEGREES: f64 = 180.0 / 32768.0;
    pub const GPS_HISTORY: usize = 10;
}

/// Ingest worker and playback timing constants
pub mod runtime {
    use std::time::Duration;

    /// Upper bound on how long a byte source may block before the worker re-checks for stop
    pub const SOURCE_POLL_INTERVAL: Duration = Duration::from_millis(50);
    pub const READ_CHUNK_BYTES: usize = 4096;
    pub const FEEDER_QUEUE_CHUNKS: usize = 1024;
    /// First back-off of the async pump when the feeder queue is full
    pub const FEEDER_RETRY_INTERVAL: Duration = Duration::from_millis(1);
    /// Frames a playback wake-up may emit at most, bounding catch-up bursts
    pub const PLAYBACK_MAX_BATCH_FRAMES: u64 = 256;
}

/// Configuration file locations and environment prefix
pub mod paths {
    pub const DEFAULT_CONFIG_FILE: &str = "nxbci.toml";
    pub const LOCAL_CONFIG_FILE: &str = "config/nxbci.toml";
    pub const ENV_PREFIX: &str = "NXBCI_";
}
