//! # Line Sensor Ingestor
//!
//! The sensor board prints one analog reading per line. Its ADC tops out at
//! 1023, and an overloaded serial link occasionally delivers two readings
//! run together, which shows up as a much larger number. Those lines are
//! dropped: a missing sample does less damage to beat detection than a
//! spurious spike.

use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use crate::core::DispatcherHandle;

/// Readings at or above this are out of range for the sensor.
pub const MAX_SENSOR_VALUE: u16 = 1024;

/// What one line of sensor output turned out to be.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedLine {
    /// Nothing but whitespace.
    Blank,
    /// A usable reading.
    Sample(u16),
    /// A number the sensor cannot produce.
    OutOfRange(i64),
    /// Not a number at all.
    Garbled(String),
}

/// Classifies one line, ignoring surrounding whitespace and a trailing `\r`.
pub fn parse_line(line: &str) -> ParsedLine {
    let text = line.trim();
    if text.is_empty() {
        return ParsedLine::Blank;
    }
    match text.parse::<i64>() {
        Ok(value) if (0..i64::from(MAX_SENSOR_VALUE)).contains(&value) => ParsedLine::Sample(value as u16),
        Ok(value) => ParsedLine::OutOfRange(value),
        Err(_) => ParsedLine::Garbled(text.to_string()),
    }
}

/// Line counts for one ingestor run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct IngestStats {
    /// Samples handed to the engine.
    pub accepted: u64,
    /// Lines dropped as out of range or unparsable.
    pub rejected: u64,
}

/// # Line Sensor Ingestor
///
/// Feeds a dispatcher from a line-oriented reader, typically the serial
/// device opened as a file.
pub struct LineSensorIngestor {
    handle: DispatcherHandle,
    stats: IngestStats,
}

impl LineSensorIngestor {
    /// An ingestor feeding the dispatcher behind `handle`.
    pub fn new(handle: DispatcherHandle) -> Self {
        Self {
            handle,
            stats: IngestStats::default(),
        }
    }

    /// # Run
    ///
    /// Reads until end of input or until the dispatcher stops accepting
    /// samples. A read error ends the run and is returned.
    pub async fn run<R>(mut self, mut reader: R) -> std::io::Result<IngestStats>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut line = Vec::with_capacity(16);
        loop {
            line.clear();
            if reader.read_until(b'\n', &mut line).await? == 0 {
                log::info!("Sensor input ended after {} samples", self.stats.accepted);
                break;
            }

            match parse_line(&String::from_utf8_lossy(&line)) {
                ParsedLine::Blank => {}
                ParsedLine::Sample(sample) => {
                    if self.handle.ingest(sample).await.is_err() {
                        log::info!("Dispatcher stopped; sensor ingestor exiting");
                        break;
                    }
                    self.stats.accepted += 1;
                }
                ParsedLine::OutOfRange(value) => {
                    self.stats.rejected += 1;
                    log::debug!("Dropping out-of-range sensor reading {}", value);
                }
                ParsedLine::Garbled(text) => {
                    self.stats.rejected += 1;
                    log::warn!("Dropping unparsable sensor line {:?}", text);
                }
            }
        }
        Ok(self.stats)
    }
}
