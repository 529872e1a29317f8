use anyhow::{Context, Result, bail};
use chrono::{DateTime, Duration, Utc};
use clap::Parser;
use futures_util::StreamExt;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::time::sleep;

#[derive(Parser, Debug)]
#[clap(author, version, about = "Measures the live sample rate seen through heart_monitor's event relay", long_about = None)]
struct Args {
    /// Event relay URL
    #[clap(short, long, default_value = "http://127.0.0.1:18499/events")]
    url: String,

    /// Report interval in seconds
    #[clap(short, long, default_value_t = 10)]
    report_interval_seconds: u64,
}

#[derive(Default)]
struct Stats {
    /// Arrival time and sample count of every event in the last minute.
    events: VecDeque<(DateTime<Utc>, usize)>,
    lowest: Option<u16>,
    highest: Option<u16>,
}

impl Stats {
    fn record(&mut self, at: DateTime<Utc>, samples: &[u16]) {
        self.events.push_back((at, samples.len()));
        for &sample in samples {
            self.lowest = Some(self.lowest.map_or(sample, |low| low.min(sample)));
            self.highest = Some(self.highest.map_or(sample, |high| high.max(sample)));
        }
    }

    /// Drops events older than a minute; returns (events, samples) per minute.
    fn rates(&mut self, now: DateTime<Utc>) -> (usize, usize) {
        let one_minute_ago = now - Duration::minutes(1);
        while self.events.front().is_some_and(|&(t, _)| t < one_minute_ago) {
            self.events.pop_front();
        }
        (self.events.len(), self.events.iter().map(|&(_, n)| n).sum())
    }
}

/// Splits complete `\n\n`-terminated events off `buffer` and returns the
/// samples in their `data:` lines. Comments and keep-alives carry none.
fn take_events(buffer: &mut String) -> Vec<Vec<u16>> {
    let mut events = Vec::new();
    while let Some(end) = buffer.find("\n\n") {
        let block: String = buffer.drain(..end + 2).collect();
        let samples: Vec<u16> = block
            .lines()
            .filter_map(|line| line.strip_prefix("data:"))
            .flat_map(|data| {
                data.trim()
                    .trim_start_matches('[')
                    .trim_end_matches(']')
                    .split_whitespace()
                    .filter_map(|n| n.parse().ok())
                    .collect::<Vec<u16>>()
            })
            .collect();
        if block.lines().any(|line| line.starts_with("data:")) {
            events.push(samples);
        }
    }
    events
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let stats = Arc::new(Mutex::new(Stats::default()));

    // Clone for the reporter task
    let stats_reporter = Arc::clone(&stats);
    let report_interval = std::time::Duration::from_secs(args.report_interval_seconds.max(1));
    tokio::spawn(async move {
        loop {
            sleep(report_interval).await;
            let Ok(mut data) = stats_reporter.lock() else { return };
            let (event_rate, sample_rate) = data.rates(Utc::now());

            println!("\n----- 1-Minute Summary -----");
            println!("Events: {} /min", event_rate);
            println!("Samples: {} /min ({:.1} Hz)", sample_rate, sample_rate as f64 / 60.0);
            match (data.lowest, data.highest) {
                (Some(low), Some(high)) => println!("Sample range: {}..={}", low, high),
                _ => println!("Sample range: no data"),
            }
            println!("----------------------------\n");
        }
    });

    println!("Connecting to {}...", args.url);
    let response = reqwest::get(&args.url).await.context("Failed to connect")?;
    if !response.status().is_success() {
        bail!("relay answered {}", response.status());
    }
    println!("Subscribed. Press Ctrl+C to stop.");

    let mut body = response.bytes_stream();
    let mut buffer = String::new();
    while let Some(chunk) = body.next().await {
        let chunk = chunk.context("event stream failed")?;
        buffer.push_str(&String::from_utf8_lossy(&chunk));

        let now = Utc::now();
        let mut data = stats.lock().map_err(|_| anyhow::anyhow!("stats lock poisoned"))?;
        for samples in take_events(&mut buffer) {
            data.record(now, &samples);
        }
    }

    println!("Relay closed the stream (stopped, or this client was evicted).");
    Ok(())
}
