//! Renders a heart log as text, one record per line, for eyeballing what a
//! monitor or receiver actually wrote.

use anyhow::{Context, Result};
use clap::{Parser, ValueHint};
use lib_heartmon::render::human_readable_output;
use std::fs::File;
use std::io::{self, BufReader, BufWriter};
use std::path::PathBuf;

#[derive(Parser)]
#[clap(name = "render_log", version, about = "Prints a heart log in human-readable form.")]
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
    let mut out = BufWriter::new(io::stdout().lock());
    human_readable_output(BufReader::new(file), &mut out).context("can't write to stdout")
}
