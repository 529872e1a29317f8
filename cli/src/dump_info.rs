//! Prints every sample in a heart log as an `index value` line, numbering
//! across all `HeartData` records. Timestamps and sensor errors are skipped.
//! Nothing is printed if the log does not decode cleanly to the end.

use anyhow::{Context, Result};
use clap::{Parser, ValueHint};
use lib_heartmon::records::{Record, RecordError, RecordReader};
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::PathBuf;

#[derive(Parser)]
#[clap(name = "dump_info", version, about = "Lists every sample in a heart log as `index value`.")]
pub struct Cli {
    #[clap(value_parser, value_hint = ValueHint::FilePath)]
    pub log: PathBuf,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args = Cli::parse();
    if let Err(e) = run(&args) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(args: &Cli) -> Result<()> {
    let file = File::open(&args.log).with_context(|| format!("Can't open file {}", args.log.display()))?;
    let samples = collect_samples(BufReader::new(file))
        .with_context(|| format!("Error while reading {}", args.log.display()))?;

    let mut out = BufWriter::new(io::stdout().lock());
    write_index(&samples, &mut out)?;
    out.flush()?;
    Ok(())
}

fn collect_samples<R: Read>(input: R) -> Result<Vec<u16>, RecordError> {
    let mut samples = Vec::new();
    for record in RecordReader::new(input) {
        if let Record::HeartData(data) = record? {
            samples.extend(data);
        }
    }
    Ok(samples)
}

fn write_index<W: Write>(samples: &[u16], out: &mut W) -> io::Result<()> {
    for (idx, sample) in samples.iter().enumerate() {
        writeln!(out, "{} {}", idx, sample)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;
    use std::io::Cursor;

    #[test]
    fn test_indexes_run_across_records() {
        let mut bytes = Record::HeartData(vec![500, 510]).encode();
        bytes.extend(Record::Timestamp(DateTime::from_timestamp(1_600_000_000, 0).unwrap()).encode());
        bytes.extend(Record::Error("glitch".into()).encode());
        bytes.extend(Record::HeartData(vec![520]).encode());

        let samples = collect_samples(Cursor::new(bytes)).unwrap();
        let mut out = Vec::new();
        write_index(&samples, &mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "0 500\n1 510\n2 520\n");
    }

    #[test]
    fn test_decode_error_fails() {
        let mut bytes = Record::HeartData(vec![1]).encode();
        bytes.extend_from_slice(&[7, 0, 0]);
        assert!(matches!(
            collect_samples(Cursor::new(bytes)),
            Err(RecordError::UnknownRecordType(7))
        ));
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let args = Cli { log: dir.path().join("absent.hrt") };
        let err = run(&args).unwrap_err();
        assert!(format!("{:#}", err).starts_with("Can't open file"));
    }
}
