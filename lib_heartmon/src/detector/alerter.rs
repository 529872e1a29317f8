//! # Alarm Control
//!
//! The alerter is a two-state machine, `Idle` or `Sounding`, with `alert` and
//! `stop` as its only transitions. Both are total: alerting while sounding
//! and stopping while idle do nothing, so one alerter never has two alarm
//! sounds running at once.
//!
//! The sound itself comes from an `AlarmPlayer`. In production that is an
//! external player process (`ProcessAlarm`), started with the sound file as
//! its only argument and killed on stop.

use std::path::PathBuf;
use std::process::{Child, Command, Stdio};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failures starting or silencing the alarm sound. Never fatal to detection.
#[derive(Debug, Error)]
pub enum AlarmError {
    /// The player could not be launched.
    #[error("couldn't start audio with {program}: {source}")]
    Spawn {
        /// The player program.
        program: String,
        /// The launch failure.
        #[source]
        source: std::io::Error,
    },

    /// The running player could not be killed or reaped.
    #[error("can't kill alarm player: {0}")]
    Kill(#[source] std::io::Error),
}

/// # Alarm Player
///
/// Produces and silences the alarm sound. `Sound` is whatever the player
/// needs to stop what it started.
pub trait AlarmPlayer {
    /// A handle to a sound in progress.
    type Sound;

    /// Starts the alarm sound.
    fn start(&mut self) -> Result<Self::Sound, AlarmError>;

    /// Silences a sound returned by `start`.
    fn stop(&mut self, sound: Self::Sound) -> Result<(), AlarmError>;
}

/// # Alarm Options
///
/// Which player to run and what it plays.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AlarmOptions {
    /// Player executable, looked up on `PATH`.
    pub program: String,
    /// The audio file handed to the player as its single argument.
    pub sound_file: PathBuf,
}

impl Default for AlarmOptions {
    fn default() -> Self {
        Self {
            program: "mplayer".to_string(),
            sound_file: PathBuf::from("StormSounds.m4a"),
        }
    }
}

/// Plays the alarm by running an external player process.
#[derive(Debug, Clone)]
pub struct ProcessAlarm {
    options: AlarmOptions,
}

impl ProcessAlarm {
    /// A player for the given program and sound file.
    pub fn new(options: AlarmOptions) -> Self {
        Self { options }
    }
}

impl AlarmPlayer for ProcessAlarm {
    type Sound = Child;

    fn start(&mut self) -> Result<Child, AlarmError> {
        Command::new(&self.options.program)
            .arg(&self.options.sound_file)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|source| AlarmError::Spawn {
                program: self.options.program.clone(),
                source,
            })
    }

    fn stop(&mut self, mut child: Child) -> Result<(), AlarmError> {
        // kill() fails with InvalidInput once the player has already exited;
        // reaping it is all that is left to do then.
        let killed = match child.kill() {
            Err(e) if e.kind() != std::io::ErrorKind::InvalidInput => Err(AlarmError::Kill(e)),
            _ => Ok(()),
        };
        child.wait().map_err(AlarmError::Kill)?;
        killed
    }
}

/// Logs alarm transitions instead of playing anything. For replays where
/// only the timing matters.
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentAlarm;

impl AlarmPlayer for SilentAlarm {
    type Sound = ();

    fn start(&mut self) -> Result<(), AlarmError> {
        log::info!("(silent) alarm would sound now");
        Ok(())
    }

    fn stop(&mut self, _sound: ()) -> Result<(), AlarmError> {
        log::info!("(silent) alarm would stop now");
        Ok(())
    }
}

/// Where the alerter is.
#[derive(Debug)]
pub enum AlarmState<S> {
    /// Quiet.
    Idle,
    /// Sounding since `since`.
    Sounding {
        /// The sound in progress.
        sound: S,
        /// The stream time the alarm was raised at.
        since: Option<DateTime<Utc>>,
    },
}

/// # Alerter
///
/// Owns the alarm sound for one detector run. Dropping a sounding alerter
/// silences it.
pub struct Alerter<P: AlarmPlayer> {
    player: P,
    state: AlarmState<P::Sound>,
}

impl<P: AlarmPlayer> Alerter<P> {
    /// An idle alerter using `player`.
    pub fn new(player: P) -> Self {
        Self {
            player,
            state: AlarmState::Idle,
        }
    }

    /// # Alert
    ///
    /// Starts the alarm unless it is already sounding. A player that fails to
    /// start is logged and the alerter stays idle, so the next high reading
    /// tries again.
    pub fn alert(&mut self, at: Option<DateTime<Utc>>) {
        if self.is_sounding() {
            return;
        }

        log::warn!("Starting alert at {}", describe(at));
        match self.player.start() {
            Ok(sound) => self.state = AlarmState::Sounding { sound, since: at },
            Err(e) => log::error!("{}", e),
        }
    }

    /// # Stop
    ///
    /// Silences the alarm if it is sounding.
    pub fn stop(&mut self, at: Option<DateTime<Utc>>) {
        if let AlarmState::Sounding { sound, .. } = std::mem::replace(&mut self.state, AlarmState::Idle) {
            log::warn!("Stopping alert at {}", describe(at));
            if let Err(e) = self.player.stop(sound) {
                log::error!("{}", e);
            }
        }
    }

    /// `true` while the alarm is sounding.
    pub fn is_sounding(&self) -> bool {
        matches!(self.state, AlarmState::Sounding { .. })
    }

    /// When the current alarm was raised, if one is sounding.
    pub fn sounding_since(&self) -> Option<DateTime<Utc>> {
        match &self.state {
            AlarmState::Sounding { since, .. } => *since,
            AlarmState::Idle => None,
        }
    }

    /// The current state.
    pub fn state(&self) -> &AlarmState<P::Sound> {
        &self.state
    }

    /// The player, for inspection.
    pub fn player(&self) -> &P {
        &self.player
    }
}

impl<P: AlarmPlayer> Drop for Alerter<P> {
    fn drop(&mut self) {
        self.stop(None);
    }
}

fn describe(at: Option<DateTime<Utc>>) -> String {
    match at {
        Some(at) => at.to_rfc3339(),
        None => "an unknown time".to_string(),
    }
}
