// src/codec/records.rs
//! Side-channel records carried next to the sample block

use crate::config::constants::{framing, telemetry};
use crate::error::{IngestError, IngestResult};
use serde::{Deserialize, Serialize};

/// One orientation/temperature reading in physical units
///
/// Wire order: accel x/y/z, temperature, gyro x/y/z, each a big-endian `i16`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct TelemetryReading {
    /// Acceleration in g
    pub accel: [f64; 3],
    /// Die temperature in degrees Celsius
    pub temperature: f64,
    /// Angular rate in deg/s
    pub gyro: [f64; 3],
}

impl TelemetryReading {
    /// Decode a 14-byte record
    pub fn decode(record: &[u8]) -> IngestResult<Self> {
        if record.len() != telemetry::RECORD_BYTES {
            return Err(IngestError::TelemetryRecord {
                expected: telemetry::RECORD_BYTES,
                actual: record.len(),
            });
        }

        let word = |i: usize| i16::from_be_bytes([record[2 * i], record[2 * i + 1]]) as f64;

        Ok(Self {
            accel: [
                word(0) * telemetry::ACCEL_LSB_G,
                word(1) * telemetry::ACCEL_LSB_G,
                word(2) * telemetry::ACCEL_LSB_G,
            ],
            temperature: word(3) / telemetry::TEMPERATURE_LSB_PER_DEGREE + telemetry::TEMPERATURE_OFFSET_C,
            gyro: [
                word(4) * telemetry::GYRO_LSB_DPS,
                word(5) * telemetry::GYRO_LSB_DPS,
                word(6) * telemetry::GYRO_LSB_DPS,
            ],
        })
    }

    /// Fields in wire order
    pub fn fields(&self) -> [f64; telemetry::FIELD_COUNT] {
        [
            self.accel[0],
            self.accel[1],
            self.accel[2],
            self.temperature,
            self.gyro[0],
            self.gyro[1],
            self.gyro[2],
        ]
    }

    pub fn from_fields(fields: [f64; telemetry::FIELD_COUNT]) -> Self {
        Self {
            accel: [fields[0], fields[1], fields[2]],
            temperature: fields[3],
            gyro: [fields[4], fields[5], fields[6]],
        }
    }
}

/// GPS position in decimal degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GpsFix {
    pub latitude: f64,
    pub longitude: f64,
    /// `'N'` or `'S'` when the receiver reported one
    pub lat_hemisphere: Option<char>,
    /// `'E'` or `'W'` when the receiver reported one
    pub lon_hemisphere: Option<char>,
}

impl GpsFix {
    /// Signed latitude, negative in the southern hemisphere
    pub fn signed_latitude(&self) -> f64 {
        match self.lat_hemisphere {
            Some('S') => -self.latitude,
            _ => self.latitude,
        }
    }

    /// Signed longitude, negative in the western hemisphere
    pub fn signed_longitude(&self) -> f64 {
        match self.lon_hemisphere {
            Some('W') => -self.longitude,
            _ => self.longitude,
        }
    }
}

/// Head attitude in degrees
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Attitude {
    pub roll: f64,
    pub pitch: f64,
    pub yaw: f64,
}

/// The 18-byte block of the `extended` layout
///
/// Offsets: 0 GPS marker, 1..5 latitude (BE `f32`, NMEA ddmm.mmmm), 5 hemisphere,
/// 6..10 longitude, 10 hemisphere, 11 attitude marker, 12..18 roll/pitch/yaw (LE `i16`).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AuxiliaryBlock {
    pub gps: Option<GpsFix>,
    pub attitude: Option<Attitude>,
}

impl AuxiliaryBlock {
    /// Decode the block; a field whose marker differs from `valid_marker` is `None`
    ///
    /// `block` must hold at least 18 bytes.
    pub fn decode(block: &[u8], valid_marker: u8) -> Self {
        debug_assert!(block.len() >= framing::EXTENDED_BLOCK_BYTES);

        let gps = (block[0] == valid_marker).then(|| GpsFix {
            latitude: nmea_to_degrees(f32::from_be_bytes([block[1], block[2], block[3], block[4]])),
            lat_hemisphere: hemisphere(block[5], b'N', b'S'),
            longitude: nmea_to_degrees(f32::from_be_bytes([block[6], block[7], block[8], block[9]])),
            lon_hemisphere: hemisphere(block[10], b'E', b'W'),
        });

        let angle = |at: usize| i16::from_le_bytes([block[at], block[at + 1]]) as f64 * telemetry::ATTITUDE_LSB_DEGREES;
        let attitude = (block[11] == valid_marker).then(|| Attitude {
            roll: angle(12),
            pitch: angle(14),
            yaw: angle(16),
        });

        Self { gps, attitude }
    }
}

/// NMEA `dddmm.mmmm` to decimal degrees
fn nmea_to_degrees(raw: f32) -> f64 {
    let raw = (raw as f64).abs();
    let degrees = (raw / 100.0).trunc();
    degrees + (raw - degrees * 100.0) / 60.0
}

fn hemisphere(byte: u8, positive: u8, negative: u8) -> Option<char> {
    (byte == positive || byte == negative).then_some(byte as char)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(words: [i16; 7]) -> Vec<u8> {
        words.iter().flat_map(|w| w.to_be_bytes()).collect()
    }

    #[test]
    fn test_telemetry_scaling() {
        let reading = TelemetryReading::decode(&record([8192, -8192, 0, 0, 32767, 0, -32768])).unwrap();
        assert!((reading.accel[0] - 1.0).abs() < 1e-12);
        assert!((reading.accel[1] + 1.0).abs() < 1e-12);
        assert!((reading.temperature - 21.0).abs() < 1e-12);
        assert!((reading.gyro[0] - 1000.0 * 32767.0 / 32768.0).abs() < 1e-9);
        assert!((reading.gyro[2] + 1000.0).abs() < 1e-12);
    }

    #[test]
    fn test_telemetry_wrong_length() {
        let err = TelemetryReading::decode(&[0u8; 13]).unwrap_err();
        assert!(matches!(err, IngestError::TelemetryRecord { expected: 14, actual: 13 }));
    }

    #[test]
    fn test_fields_order() {
        let reading = TelemetryReading::from_fields([1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0]);
        assert_eq!(reading.temperature, 4.0);
        assert_eq!(reading.fields(), [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0]);
    }

    #[test]
    fn test_auxiliary_block() {
        let mut block = vec![0u8; 18];
        block[0] = 0x59;
        block[1..5].copy_from_slice(&3130.5_f32.to_be_bytes());
        block[5] = b'S';
        block[6..10].copy_from_slice(&12130.0_f32.to_be_bytes());
        block[10] = b'E';
        block[11] = 0x59;
        block[12..14].copy_from_slice(&16384i16.to_le_bytes());
        block[14..16].copy_from_slice(&(-16384i16).to_le_bytes());

        let aux = AuxiliaryBlock::decode(&block, 0x59);
        let gps = aux.gps.unwrap();
        assert!((gps.latitude - (31.0 + 30.5 / 60.0)).abs() < 1e-4);
        assert!((gps.longitude - 121.5).abs() < 1e-4);
        assert_eq!(gps.lat_hemisphere, Some('S'));
        assert!(gps.signed_latitude() < 0.0);

        let attitude = aux.attitude.unwrap();
        assert!((attitude.roll - 90.0).abs() < 1e-9);
        assert!((attitude.pitch + 90.0).abs() < 1e-9);
        assert_eq!(attitude.yaw, 0.0);
    }

    #[test]
    fn test_auxiliary_markers_invalid() {
        let block = vec![0u8; 18];
        let aux = AuxiliaryBlock::decode(&block, 0x59);
        assert!(aux.gps.is_none());
        assert!(aux.attitude.is_none());
    }
}
