//! # Rate Detector
//!
//! Consumes a record stream, live or replayed from a log, and drives the
//! alarm. The same code runs in both cases, which is what makes a replay
//! show exactly when the alarm would have gone off.
//!
//! Per record:
//! - `Timestamp`: remembered as the time alarms are reported at.
//! - `Error`: clears the window. Continuity is gone, so the old samples no
//!   longer describe a rhythm.
//! - `HeartData`: appended, trimmed to the newest `window_len` samples, then
//!   the whole window is rescanned for beats and the policy decides whether
//!   the alarm sounds.

use std::io::{Read, Write};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::alerter::{AlarmPlayer, Alerter};
use super::beats::{beats_per_minute, detect_heartbeats};
use super::hysteresis::{AlertDecision, AlertPolicy};
use super::window::DetectionWindow;
use crate::records::{Record, RecordError, RecordReader};

/// # Detector Options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DetectorOptions {
    /// Assumed sensor rate in samples per second.
    pub sample_rate_hz: u32,
    /// Seconds of signal the window spans.
    pub window_secs: u32,
    /// BPM above which a window counts as high.
    pub bpm_limit: u32,
    /// The alarm sounds once more than this many consecutive windows are high.
    pub alert_after: u32,
}

impl DetectorOptions {
    /// Samples retained: one per sample period over the span, plus one so
    /// every retained period has a difference.
    pub fn window_len(&self) -> usize {
        self.window_secs as usize * self.sample_rate_hz as usize + 1
    }
}

impl Default for DetectorOptions {
    fn default() -> Self {
        Self {
            sample_rate_hz: 50,
            window_secs: 60,
            bpm_limit: 90,
            alert_after: 20,
        }
    }
}

/// # Rate Detector
///
/// Window, policy and alerter for one run. Report lines (`Time: ...`,
/// `Beats per minute: N`) go to `output`.
pub struct RateDetector<P: AlarmPlayer, W: Write> {
    window: DetectionWindow,
    policy: AlertPolicy,
    alerter: Alerter<P>,
    output: W,
    window_secs: u32,
    last_time: Option<DateTime<Utc>>,
    last_bpm: Option<u32>,
}

impl<P: AlarmPlayer, W: Write> RateDetector<P, W> {
    /// A detector with an empty window and an idle alarm.
    pub fn new(options: &DetectorOptions, alerter: Alerter<P>, output: W) -> Self {
        Self {
            window: DetectionWindow::new(options.window_len()),
            policy: AlertPolicy::new(options.bpm_limit, options.alert_after),
            alerter,
            output,
            window_secs: options.window_secs,
            last_time: None,
            last_bpm: None,
        }
    }

    /// # Process
    ///
    /// Handles one record. Returns the recomputed BPM for `HeartData`.
    pub fn process(&mut self, record: &Record) -> Option<u32> {
        match record {
            Record::Timestamp(at) => {
                self.report(format_args!("Time: {}", at.format("%a, %d %b %Y %H:%M:%S %Z")));
                self.last_time = Some(*at);
                None
            }
            Record::Error(message) => {
                log::debug!("Sensor error, resetting detection window: {}", message);
                self.window.clear();
                None
            }
            Record::HeartData(samples) => {
                self.window.extend(samples);
                let beats = detect_heartbeats(self.window.samples());
                let bpm = beats_per_minute(beats, self.window_secs);
                self.report(format_args!("Beats per minute: {}", bpm));
                self.last_bpm = Some(bpm);

                match self.policy.observe(bpm) {
                    AlertDecision::Sound => self.alerter.alert(self.last_time),
                    AlertDecision::Silence => self.alerter.stop(self.last_time),
                }
                Some(bpm)
            }
        }
    }

    /// # Run
    ///
    /// Processes every record until the stream ends, then silences the alarm.
    /// A decode error is reported to `output` and ends the run; the error is
    /// returned so callers can set an exit status.
    pub fn run<R: Read>(&mut self, records: &mut RecordReader<R>) -> Result<(), RecordError> {
        let outcome = loop {
            match records.next_record() {
                Ok(Some(record)) => {
                    self.process(&record);
                }
                Ok(None) => break Ok(()),
                Err(e) => {
                    self.report(format_args!("Can't read from stream: {}", e));
                    log::error!("Rate detector stopped: {}", e);
                    break Err(e);
                }
            }
        };
        self.finish();
        outcome
    }

    /// Ends the run: the alarm must not outlive its stream.
    pub fn finish(&mut self) {
        self.alerter.stop(self.last_time);
        if let Err(e) = self.output.flush() {
            log::debug!("Couldn't flush detector output: {}", e);
        }
    }

    /// The last BPM computed.
    pub fn last_bpm(&self) -> Option<u32> {
        self.last_bpm
    }

    /// The last timestamp seen.
    pub fn last_time(&self) -> Option<DateTime<Utc>> {
        self.last_time
    }

    /// The detection window.
    pub fn window(&self) -> &DetectionWindow {
        &self.window
    }

    /// The hysteresis state.
    pub fn policy(&self) -> &AlertPolicy {
        &self.policy
    }

    /// The alerter.
    pub fn alerter(&self) -> &Alerter<P> {
        &self.alerter
    }

    /// The report sink.
    pub fn output(&self) -> &W {
        &self.output
    }

    fn report(&mut self, line: std::fmt::Arguments<'_>) {
        if let Err(e) = writeln!(self.output, "{}", line) {
            log::debug!("Couldn't write detector report: {}", e);
        }
    }
}
