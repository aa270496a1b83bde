//! Common utility functions

pub mod time;

pub use time::{current_timestamp_micros, current_timestamp_nanos};
