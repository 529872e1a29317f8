//! Sounds the alarm once and stops it again, to check the player and sound
//! file work on this machine before trusting the monitor with them.

use anyhow::{Result, bail};
use chrono::Utc;
use clap::{Parser, ValueHint};
use lib_heartmon::detector::{AlarmOptions, Alerter, ProcessAlarm};
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

#[derive(Parser)]
#[clap(name = "test_alert", version, about = "Plays the heart monitor alarm for a few seconds.")]
pub struct Cli {
    #[clap(long, default_value = "mplayer")]
    pub program: String,

    #[clap(long, value_hint = ValueHint::FilePath, default_value = "StormSounds.m4a")]
    pub sound: PathBuf,

    #[clap(long, short = 's', default_value_t = 5)]
    pub seconds: u64,
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
    let mut alerter = Alerter::new(ProcessAlarm::new(AlarmOptions {
        program: args.program.clone(),
        sound_file: args.sound.clone(),
    }));

    alerter.alert(Some(Utc::now()));
    if !alerter.is_sounding() {
        bail!("the alarm did not start; is {} installed?", args.program);
    }
    log::info!("Alarm sounding for {}s", args.seconds);
    thread::sleep(Duration::from_secs(args.seconds));
    alerter.stop(Some(Utc::now()));
    Ok(())
}
