//! Replays a heart log through the rate detector, printing the report lines
//! (`Time: ...`, `Beats per minute: N`) and sounding the alarm exactly when
//! the live monitor would have.

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, ValueHint};
use lib_heartmon::detector::{
    AlarmOptions, AlarmPlayer, Alerter, DetectorOptions, ProcessAlarm, RateDetector, SilentAlarm,
};
use lib_heartmon::records::RecordReader;
use std::fs::File;
use std::io::{self, BufReader, Read, Write};
use std::path::PathBuf;

#[derive(Parser)]
#[clap(name = "replay_alert", version, about = "Runs the heart rate detector and alarm over a heart log.")]
pub struct Cli {
    #[clap(value_parser, value_hint = ValueHint::FilePath)]
    pub log: PathBuf,

    /// Log alarm transitions instead of playing the alarm.
    #[clap(long, short = 'm', action = ArgAction::SetTrue)]
    pub mute: bool,

    #[clap(long, default_value = "mplayer")]
    pub program: String,

    #[clap(long, value_hint = ValueHint::FilePath, default_value = "StormSounds.m4a")]
    pub sound: PathBuf,

    #[clap(long, default_value_t = 50)]
    pub sample_rate_hz: u32,

    #[clap(long, default_value_t = 90)]
    pub bpm_limit: u32,

    #[clap(long, default_value_t = 20)]
    pub alert_after: u32,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Cli::parse();
    if let Err(e) = run(&args) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(args: &Cli) -> Result<()> {
    let file = File::open(&args.log).with_context(|| format!("Can't open file {:?}", args.log))?;
    let input = BufReader::new(file);
    let options = DetectorOptions {
        sample_rate_hz: args.sample_rate_hz,
        bpm_limit: args.bpm_limit,
        alert_after: args.alert_after,
        ..Default::default()
    };
    let stdout = io::stdout().lock();

    if args.mute {
        replay(input, &options, SilentAlarm, stdout)
    } else {
        let alarm = ProcessAlarm::new(AlarmOptions {
            program: args.program.clone(),
            sound_file: args.sound.clone(),
        });
        replay(input, &options, alarm, stdout)
    }
}

fn replay<R: Read, P: AlarmPlayer, W: Write>(input: R, options: &DetectorOptions, player: P, out: W) -> Result<()> {
    let mut detector = RateDetector::new(options, Alerter::new(player), out);
    detector
        .run(&mut RecordReader::new(input))
        .context("replay stopped early")
}
