// src/acquisition/mod.rs
//! Sliding-window buffers fed by the ingest worker

pub mod motion;
pub mod ring_buffer;
pub mod telemetry;

pub use motion::{MotionHandle, MotionSnapshot};
pub use ring_buffer::*;
pub use telemetry::{TelemetryChannel, TelemetryHandle, TelemetrySnapshot, TelemetryView};
