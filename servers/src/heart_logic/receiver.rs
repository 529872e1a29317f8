//! # Record Receiver
//!
//! Accepts record streams over TCP. Every connection gets two files named
//! after its start time: the raw bytes exactly as received
//! (`heartbeat_starting_<ts>.hrt`) and a rendered text view
//! (`human_heartbeat_<ts>.txt`), which is also mirrored to stderr.
//!
//! The raw copy never stops early. Rendering stops at the first frame that
//! does not decode, since nothing after it can be trusted to line up.

use std::io;
use std::path::{Path, PathBuf};

use bytes::BytesMut;
use chrono::{DateTime, SecondsFormat, Utc};
use lib_heartmon::records::RecordCodec;
use lib_heartmon::render::render_record;
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufWriter};
use tokio_util::codec::Decoder;

/// What one connection delivered.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReceiveStats {
    pub bytes: u64,
    pub records: u64,
    /// Why rendering stopped early, if it did.
    pub decode_error: Option<String>,
}

/// The two files one connection is persisted to.
pub struct SessionFiles {
    pub raw_path: PathBuf,
    pub human_path: PathBuf,
    pub raw: BufWriter<File>,
    pub human: BufWriter<File>,
}

/// Creates the session files for a connection that started at `started`.
pub async fn open_session(out_dir: &Path, started: DateTime<Utc>) -> io::Result<SessionFiles> {
    let ts = started.to_rfc3339_opts(SecondsFormat::Millis, true);
    let raw_path = out_dir.join(format!("heartbeat_starting_{}.hrt", ts));
    let human_path = out_dir.join(format!("human_heartbeat_{}.txt", ts));

    let raw = File::create(&raw_path).await.map_err(|e| with_path(e, &raw_path))?;
    let human = File::create(&human_path).await.map_err(|e| with_path(e, &human_path))?;
    Ok(SessionFiles {
        raw_path,
        human_path,
        raw: BufWriter::new(raw),
        human: BufWriter::new(human),
    })
}

fn with_path(e: io::Error, path: &Path) -> io::Error {
    io::Error::new(e.kind(), format!("couldn't create {}: {}", path.display(), e))
}

/// # Receiver
///
/// Copies one connection to a raw sink and renders it to a text sink,
/// optionally mirroring the text to stderr.
pub struct Receiver<R, H> {
    raw: R,
    human: H,
    mirror_stderr: bool,
}

impl<R, H> Receiver<R, H>
where
    R: AsyncWrite + Unpin,
    H: AsyncWrite + Unpin,
{
    pub fn new(raw: R, human: H, mirror_stderr: bool) -> Self {
        Self {
            raw,
            human,
            mirror_stderr,
        }
    }

    /// Runs until the connection closes. Only I/O failures on the
    /// connection or the sinks are errors; a bad frame just ends rendering.
    pub async fn receive<C: AsyncRead + Unpin>(&mut self, mut conn: C) -> io::Result<ReceiveStats> {
        let mut stats = ReceiveStats::default();
        let mut codec = RecordCodec;
        let mut pending = BytesMut::with_capacity(8 * 1024);
        let mut rendering = true;

        loop {
            let start = pending.len();
            let read = conn.read_buf(&mut pending).await?;
            self.raw.write_all(&pending[start..]).await?;
            stats.bytes += read as u64;

            while rendering {
                let decoded = if read == 0 {
                    codec.decode_eof(&mut pending)
                } else {
                    codec.decode(&mut pending)
                };
                match decoded {
                    Ok(Some(record)) => {
                        stats.records += 1;
                        self.emit(&render_record(&record)).await?;
                    }
                    Ok(None) => break,
                    Err(e) => {
                        self.emit(&format!("Can't read from stream: {}", e)).await?;
                        stats.decode_error = Some(e.to_string());
                        rendering = false;
                    }
                }
            }
            if !rendering {
                pending.clear();
            }
            if read == 0 {
                break;
            }
        }

        self.raw.flush().await?;
        self.human.flush().await?;
        Ok(stats)
    }

    async fn emit(&mut self, text: &str) -> io::Result<()> {
        let line = format!("{}\n", text);
        self.human.write_all(line.as_bytes()).await?;
        if self.mirror_stderr {
            tokio::io::stderr().write_all(line.as_bytes()).await?;
        }
        Ok(())
    }

    pub fn into_inner(self) -> (R, H) {
        (self.raw, self.human)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lib_heartmon::records::Record;

    #[tokio::test]
    async fn test_copies_raw_and_renders_each_record() {
        let at = DateTime::from_timestamp(1_600_000_000, 0).unwrap();
        let mut bytes = Record::Timestamp(at).encode();
        bytes.extend(Record::HeartData(vec![3, 4]).encode());

        // Deliver the stream in awkward pieces.
        let conn = chunked_reader(&bytes, 2);
        let mut receiver = Receiver::new(Vec::new(), Vec::new(), false);
        let stats = receiver.receive(conn).await.unwrap();
        let (raw, human) = receiver.into_inner();

        assert_eq!(raw, bytes);
        assert_eq!(stats.records, 2);
        assert_eq!(stats.bytes, bytes.len() as u64);
        assert_eq!(
            String::from_utf8(human).unwrap(),
            "Time: 2020-09-13 12:26:40 UTC\nHeart data: [3 4]\n"
        );
    }

    #[tokio::test]
    async fn test_bad_frame_stops_rendering_but_not_copying() {
        let mut bytes = Record::HeartData(vec![9]).encode();
        bytes.extend_from_slice(&[42, 0, 0]);
        bytes.extend(Record::HeartData(vec![10]).encode());

        let mut receiver = Receiver::new(Vec::new(), Vec::new(), false);
        let stats = receiver.receive(&bytes[..]).await.unwrap();
        let (raw, human) = receiver.into_inner();

        assert_eq!(raw, bytes);
        assert_eq!(stats.records, 1);
        assert_eq!(stats.decode_error.as_deref(), Some("unknown record type 42"));
        assert_eq!(
            String::from_utf8(human).unwrap(),
            "Heart data: [9]\nCan't read from stream: unknown record type 42\n"
        );
    }

    #[tokio::test]
    async fn test_truncated_tail_is_reported() {
        let mut bytes = Record::HeartData(vec![1]).encode();
        bytes.extend_from_slice(&[2, 0, 4, 0]);

        let mut receiver = Receiver::new(Vec::new(), Vec::new(), false);
        let stats = receiver.receive(&bytes[..]).await.unwrap();
        assert_eq!(stats.records, 1);
        assert!(stats.decode_error.is_some());
    }

    #[tokio::test]
    async fn test_open_session_names_files_by_start_time() {
        let dir = tempfile::tempdir().unwrap();
        let started = DateTime::from_timestamp(1_600_000_000, 0).unwrap();
        let session = open_session(dir.path(), started).await.unwrap();
        assert_eq!(
            session.raw_path,
            dir.path().join("heartbeat_starting_2020-09-13T12:26:40.000Z.hrt")
        );
        assert!(session.human_path.exists());
    }

    /// A reader that hands out at most `step` bytes per read.
    fn chunked_reader(bytes: &[u8], step: usize) -> impl AsyncRead + Unpin {
        let (client, mut server) = tokio::io::duplex(step);
        let bytes = bytes.to_vec();
        tokio::spawn(async move {
            server.write_all(&bytes).await.unwrap();
        });
        client
    }
}
