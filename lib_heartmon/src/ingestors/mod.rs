//! # Sample Ingestors
//!
//! Front doors for raw sensor data. An ingestor turns whatever the sensor
//! emits into `u16` samples and hands them to the broadcast engine through a
//! `DispatcherHandle`; it never touches engine state directly.
//!
//! - **`line_sensor`**: newline-delimited decimal readings, as an analog
//!   sensor board prints them over a serial port.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

/// Decimal-per-line serial sensor reader.
pub mod line_sensor;

pub use line_sensor::{IngestStats, LineSensorIngestor, ParsedLine, MAX_SENSOR_VALUE};
