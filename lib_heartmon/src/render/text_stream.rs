use std::fmt::Write as _;
use std::io::{self, Read, Write};

use crate::records::{Record, RecordReader};

/// Formats samples as `[a b c]`.
pub fn format_samples(samples: &[u16]) -> String {
    let mut out = String::with_capacity(samples.len() * 4 + 2);
    out.push('[');
    for (idx, sample) in samples.iter().enumerate() {
        if idx > 0 {
            out.push(' ');
        }
        let _ = write!(out, "{}", sample);
    }
    out.push(']');
    out
}

/// Renders one record. Error records span three lines so they stand out in
/// a scrolling log.
pub fn render_record(record: &Record) -> String {
    match record {
        Record::Timestamp(at) => format!("Time: {}", at),
        Record::HeartData(samples) => format!("Heart data: {}", format_samples(samples)),
        Record::Error(message) => format!("***\n*** ERROR: {}\n***", message),
    }
}

/// # Human Readable Output
///
/// Renders every record from `input` to `out`, one per line, until the
/// stream ends. A decode failure is written as a final
/// `Can't read from stream: ...` line and ends the rendering; only failures
/// to write `out` are returned.
pub fn human_readable_output<R: Read, W: Write + ?Sized>(input: R, out: &mut W) -> io::Result<()> {
    let mut records = RecordReader::new(input);
    loop {
        match records.next_record() {
            Ok(Some(record)) => writeln!(out, "{}", render_record(&record))?,
            Ok(None) => break,
            Err(e) => {
                writeln!(out, "Can't read from stream: {}", e)?;
                break;
            }
        }
    }
    out.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;
    use std::io::Cursor;

    #[test]
    fn test_render_each_kind() {
        let at = DateTime::from_timestamp(1_600_000_000, 0).unwrap();
        assert_eq!(render_record(&Record::Timestamp(at)), "Time: 2020-09-13 12:26:40 UTC");
        assert_eq!(render_record(&Record::HeartData(vec![1, 22, 333])), "Heart data: [1 22 333]");
        assert_eq!(render_record(&Record::HeartData(vec![])), "Heart data: []");
        assert_eq!(
            render_record(&Record::Error("lost sync".into())),
            "***\n*** ERROR: lost sync\n***"
        );
    }

    #[test]
    fn test_stream_rendering_stops_at_bad_frame() {
        let mut bytes = Record::HeartData(vec![5, 6]).encode();
        bytes.extend(Record::Error("overrun".into()).encode());
        bytes.extend_from_slice(&[2, 0, 3, 0, 0, 0]);
        bytes.extend(Record::HeartData(vec![7]).encode());

        let mut out = Vec::new();
        human_readable_output(Cursor::new(bytes), &mut out).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "Heart data: [5 6]\n***\n*** ERROR: overrun\n***\nCan't read from stream: malformed heart data record: illegal payload size 3\n"
        );
    }
}
