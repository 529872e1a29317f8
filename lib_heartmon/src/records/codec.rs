//! # Frame Codec
//!
//! Encoding is total: a record always produces a frame. Payloads longer than a
//! frame can describe are cut down (messages on a UTF-8 boundary, sample
//! batches to `MAX_SAMPLES_PER_RECORD`); the broadcast engine chunks its
//! flushes so it never relies on that.
//!
//! Decoding reads exactly one frame per call and never reads ahead, so it is
//! safe on a live, append-only stream. Wrap files in a `BufReader` yourself.

use std::io::{self, BufWriter, ErrorKind, Read, Write};

use bytes::BufMut;
use chrono::{DateTime, Utc};

use super::{Record, RecordError, RecordType, FRAME_HEADER_LEN, MAX_PAYLOAD_LEN, MAX_SAMPLES_PER_RECORD};

impl Record {
    /// Encodes this record as a single frame.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(FRAME_HEADER_LEN + self.payload_len());
        self.encode_into(&mut out);
        out
    }

    /// Appends this record's frame to `dst`.
    pub fn encode_into<B: BufMut>(&self, dst: &mut B) {
        let len = self.payload_len();
        dst.put_u8(self.record_type() as u8);
        dst.put_u16(len as u16);

        match self {
            Record::Timestamp(instant) => dst.put_i64(unix_nanos(instant)),
            Record::HeartData(samples) => {
                for sample in &samples[..len / 2] {
                    dst.put_u16(*sample);
                }
            }
            Record::Error(message) => dst.put_slice(&message.as_bytes()[..len]),
        }
    }

    /// Rebuilds a record from a frame's tag and payload.
    pub fn decode_payload(tag: u8, payload: &[u8]) -> Result<Record, RecordError> {
        let kind = RecordType::try_from(tag)?;
        let malformed = || RecordError::MalformedRecord { kind, len: payload.len() };

        match kind {
            RecordType::Timestamp => match payload.len() {
                8 => {
                    let mut raw = [0u8; 8];
                    raw.copy_from_slice(payload);
                    Ok(Record::Timestamp(DateTime::from_timestamp_nanos(i64::from_be_bytes(raw))))
                }
                // Older logs stored whole seconds.
                4 => {
                    let mut raw = [0u8; 4];
                    raw.copy_from_slice(payload);
                    DateTime::from_timestamp(i64::from(u32::from_be_bytes(raw)), 0)
                        .map(Record::Timestamp)
                        .ok_or_else(malformed)
                }
                _ => Err(malformed()),
            },
            RecordType::HeartData => {
                if payload.len() % 2 != 0 {
                    return Err(malformed());
                }
                Ok(Record::HeartData(
                    payload
                        .chunks_exact(2)
                        .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
                        .collect(),
                ))
            }
            RecordType::Error => Ok(Record::Error(String::from_utf8_lossy(payload).into_owned())),
        }
    }

    fn payload_len(&self) -> usize {
        match self {
            Record::Timestamp(_) => 8,
            Record::HeartData(samples) => samples.len().min(MAX_SAMPLES_PER_RECORD) * 2,
            Record::Error(message) => utf8_prefix_len(message, MAX_PAYLOAD_LEN),
        }
    }
}

fn unix_nanos(instant: &DateTime<Utc>) -> i64 {
    // Saturate outside the i64 nanosecond range (roughly 1677..2262).
    instant
        .timestamp_nanos_opt()
        .unwrap_or(if instant.timestamp() < 0 { i64::MIN } else { i64::MAX })
}

fn utf8_prefix_len(s: &str, max: usize) -> usize {
    let mut end = s.len().min(max);
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    end
}

/// # Decode
///
/// Reads exactly one frame from `reader`.
///
/// A stream that ends before the type byte yields
/// `UnexpectedEndOfStream { mid_frame: false }`; one that ends anywhere after
/// it yields `mid_frame: true`.
pub fn decode<R: Read + ?Sized>(reader: &mut R) -> Result<Record, RecordError> {
    let mut tag = [0u8; 1];
    loop {
        match reader.read(&mut tag) {
            Ok(0) => return Err(RecordError::UnexpectedEndOfStream { mid_frame: false }),
            Ok(_) => break,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }

    let mut len = [0u8; 2];
    read_frame_part(reader, &mut len)?;

    let mut payload = vec![0u8; usize::from(u16::from_be_bytes(len))];
    read_frame_part(reader, &mut payload)?;

    Record::decode_payload(tag[0], &payload)
}

fn read_frame_part<R: Read + ?Sized>(reader: &mut R, buf: &mut [u8]) -> Result<(), RecordError> {
    reader.read_exact(buf).map_err(|e| match e.kind() {
        ErrorKind::UnexpectedEof => RecordError::UnexpectedEndOfStream { mid_frame: true },
        _ => RecordError::Io(e),
    })
}

/// # Record Reader
///
/// Pulls records one frame at a time. A clean end of stream is `Ok(None)`;
/// truncation and corruption are errors, after which the stream should be
/// abandoned.
pub struct RecordReader<R> {
    inner: R,
}

impl<R: Read> RecordReader<R> {
    /// Wraps a byte source. No buffering is added.
    pub fn new(inner: R) -> Self {
        Self { inner }
    }

    /// The next record, or `None` once the stream ends on a frame boundary.
    pub fn next_record(&mut self) -> Result<Option<Record>, RecordError> {
        match decode(&mut self.inner) {
            Ok(record) => Ok(Some(record)),
            Err(e) if e.is_clean_end() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Gives back the wrapped reader.
    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read> Iterator for RecordReader<R> {
    type Item = Result<Record, RecordError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_record().transpose()
    }
}

/// # Record Writer
///
/// Buffered frame writer for persisted logs. Nothing reaches the underlying
/// writer until `flush` (or the buffer fills).
pub struct RecordWriter<W: Write> {
    buf: BufWriter<W>,
    scratch: Vec<u8>,
}

impl<W: Write> RecordWriter<W> {
    /// Wraps `inner` in a buffered writer.
    pub fn new(inner: W) -> Self {
        Self {
            buf: BufWriter::new(inner),
            scratch: Vec::with_capacity(512),
        }
    }

    /// Appends one frame.
    pub fn write_record(&mut self, record: &Record) -> io::Result<()> {
        self.scratch.clear();
        record.encode_into(&mut self.scratch);
        self.buf.write_all(&self.scratch)
    }

    /// Appends a `Timestamp` frame for the current instant.
    pub fn write_timestamp(&mut self) -> io::Result<()> {
        self.write_record(&Record::now())
    }

    /// Pushes buffered frames to the underlying writer.
    pub fn flush(&mut self) -> io::Result<()> {
        self.buf.flush()
    }

    /// The underlying writer. Frames still buffered are not visible through it.
    pub fn get_ref(&self) -> &W {
        self.buf.get_ref()
    }

    /// Flushes and gives back the underlying writer.
    pub fn into_inner(self) -> io::Result<W> {
        self.buf.into_inner().map_err(|e| e.into_error())
    }
}
