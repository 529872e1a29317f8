//! # Heart Record Protocol
//!
//! The binary record format shared by the persisted heart logs and every live
//! transport. A stream is a flat sequence of self-describing frames:
//!
//! ```text
//! [1-byte type][2-byte big-endian payload length L][L bytes payload]
//! ```
//!
//! | Tag | Record      | Payload                                                  |
//! |-----|-------------|----------------------------------------------------------|
//! | 1   | `Timestamp` | `i64` nanoseconds since the Unix epoch (legacy: `u32` s)  |
//! | 2   | `HeartData` | `N` big-endian `u16` samples                             |
//! | 3   | `Error`     | UTF-8 message bytes                                      |
//!
//! An unknown tag is fatal for the stream: the reader cannot know whether the
//! rest of the bytes still line up with frame boundaries.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

/// Frame encoding and the blocking reader/writer pair.
pub mod codec;
/// `tokio_util` codec for async byte streams.
pub mod framed;

use std::fmt;

use chrono::{DateTime, Utc};
use thiserror::Error;

pub use codec::{decode, RecordReader, RecordWriter};
pub use framed::RecordCodec;

/// Size of the `[type][length]` frame header in bytes.
pub const FRAME_HEADER_LEN: usize = 3;
/// Largest payload a single frame can describe.
pub const MAX_PAYLOAD_LEN: usize = u16::MAX as usize;
/// Largest number of samples a single `HeartData` frame can carry.
pub const MAX_SAMPLES_PER_RECORD: usize = MAX_PAYLOAD_LEN / 2;

/// # Record Type Tag
///
/// The one-byte discriminant written at the start of every frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum RecordType {
    /// A point in time.
    Timestamp = 1,
    /// A batch of raw sensor samples.
    HeartData = 2,
    /// An upstream diagnostic message.
    Error = 3,
}

impl TryFrom<u8> for RecordType {
    type Error = RecordError;

    fn try_from(tag: u8) -> Result<Self, RecordError> {
        match tag {
            1 => Ok(RecordType::Timestamp),
            2 => Ok(RecordType::HeartData),
            3 => Ok(RecordType::Error),
            other => Err(RecordError::UnknownRecordType(other)),
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RecordType::Timestamp => "timestamp",
            RecordType::HeartData => "heart data",
            RecordType::Error => "error",
        };
        f.write_str(name)
    }
}

/// # Record
///
/// One unit of the heart protocol. Records are plain values: built when a
/// frame is written, dropped once a consumer has handled them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    /// A wall-clock marker with nanosecond resolution.
    Timestamp(DateTime<Utc>),
    /// Samples in arrival order. Range filtering happens before samples get here.
    HeartData(Vec<u16>),
    /// Malformed upstream input, reported without tearing down the stream.
    Error(String),
}

impl Record {
    /// A `Timestamp` record for the current instant.
    pub fn now() -> Self {
        Record::Timestamp(Utc::now())
    }

    /// The tag this record is framed with.
    pub fn record_type(&self) -> RecordType {
        match self {
            Record::Timestamp(_) => RecordType::Timestamp,
            Record::HeartData(_) => RecordType::HeartData,
            Record::Error(_) => RecordType::Error,
        }
    }
}

/// # Record Error
///
/// Everything that can go wrong while turning bytes back into records.
#[derive(Debug, Error)]
pub enum RecordError {
    /// The stream ended. `mid_frame` is `false` when it ended cleanly on a
    /// frame boundary, `true` when a frame had been started but not finished.
    #[error("unexpected end of stream (mid_frame: {mid_frame})")]
    UnexpectedEndOfStream {
        /// Whether any byte of the unfinished frame had been read.
        mid_frame: bool,
    },

    /// The type tag is not one of the known record kinds.
    #[error("unknown record type {0}")]
    UnknownRecordType(u8),

    /// The payload length does not fit the record kind.
    #[error("malformed {kind} record: illegal payload size {len}")]
    MalformedRecord {
        /// The record kind named by the tag.
        kind: RecordType,
        /// The offending payload length.
        len: usize,
    },

    /// The underlying reader failed.
    #[error("I/O error while reading records: {0}")]
    Io(#[from] std::io::Error),
}

impl RecordError {
    /// `true` when the stream ended exactly on a frame boundary.
    pub fn is_clean_end(&self) -> bool {
        matches!(self, RecordError::UnexpectedEndOfStream { mid_frame: false })
    }
}
