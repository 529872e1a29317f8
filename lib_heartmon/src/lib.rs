//! # lib_heartmon
//!
//! Heart-rate telemetry building blocks:
//!
//! - **`records`**: the binary record protocol used by persisted logs and
//!   live transports.
//! - **`core`**: the broadcast engine. One ingest point, durable periodic
//!   persistence, and a fan-out to live subscribers that evicts anyone too
//!   slow to keep up.
//! - **`detector`**: beat counting, BPM hysteresis and the alarm.
//! - **`render`**: diagnostic text views of a record stream.
//! - **`ingestors`**: sensor input adapters.
//! - **`loggers`** (feature `loggers`): tracing subscriber setup for binaries.

pub mod core;
pub mod detector;
pub mod ingestors;
#[cfg(feature = "loggers")]
pub mod loggers;
pub mod records;
pub mod render;

pub use crate::core::{Dispatcher, DispatcherHandle, EngineOptions, Subscription};
pub use records::{Record, RecordError, RecordReader, RecordWriter};
