use clap::Parser;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use lib_heartmon::core::EngineOptions;
use lib_heartmon::detector::{AlarmOptions, DetectorOptions};

#[derive(Parser, Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
#[clap(about = "Heart monitor: sensor ingest, heart log, live detector and event relay", version)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[clap(long, env = "HEARTMON_CONFIG_PATH", help = "Path to the JSON configuration file.")]
    pub config_path: Option<PathBuf>,

    #[clap(long, env = "HEARTMON_SERIAL", help = "The serial device the sensor board prints readings to.")]
    pub serial: Option<PathBuf>,

    #[clap(long, env = "HEARTMON_OUTFILE", help = "Heart log to write. Defaults to a timestamped file in the data directory.")]
    pub outfile: Option<PathBuf>,

    #[clap(long, env = "HEARTMON_DATA_DIR", help = "Directory for heart logs when no outfile is given.")]
    pub data_dir: Option<PathBuf>,

    #[clap(long, env = "HEARTMON_PORT", help = "Port the live event relay listens on.")]
    pub port: Option<u16>,

    #[clap(long, env = "HEARTMON_LOG_DIR", help = "Directory for log files.")]
    pub log_dir: Option<PathBuf>,

    #[clap(long, env = "HEARTMON_LOG_LEVEL", help = "Logging level (trace, debug, info, warn, error).")]
    pub log_level: Option<String>,

    #[clap(long, env = "HEARTMON_TICK_INTERVAL_MS", help = "Milliseconds between heart log flushes.")]
    pub tick_interval_ms: Option<u64>,

    #[clap(long, env = "HEARTMON_QUEUE_CAPACITY", help = "Samples a live subscriber may fall behind before it is evicted.")]
    pub queue_capacity: Option<usize>,

    #[clap(long, env = "HEARTMON_EVENTS_INTERVAL_MS", help = "Milliseconds between event relay batches.")]
    pub events_interval_ms: Option<u64>,

    #[clap(long, env = "HEARTMON_SAMPLE_RATE_HZ", help = "Sensor sample rate assumed by the detector.")]
    pub sample_rate_hz: Option<u32>,

    #[clap(long, env = "HEARTMON_WINDOW_SECS", help = "Seconds of signal in the detection window.")]
    pub window_secs: Option<u32>,

    #[clap(long, env = "HEARTMON_BPM_LIMIT", help = "Beats per minute above which a window counts as high.")]
    pub bpm_limit: Option<u32>,

    #[clap(long, env = "HEARTMON_ALERT_AFTER", help = "Consecutive high windows tolerated before the alarm sounds.")]
    pub alert_after: Option<u32>,

    #[clap(long, env = "HEARTMON_ALARM_PROGRAM", help = "Audio player used to sound the alarm.")]
    pub alarm_program: Option<String>,

    #[clap(long, env = "HEARTMON_ALARM_SOUND", help = "Sound file the alarm plays.")]
    pub alarm_sound: Option<PathBuf>,
}

impl Config {
    // Merge two Config structs, where 'other' overrides 'self' for Some values
    fn merge(self, other: Config) -> Config {
        Config {
            config_path: other.config_path.or(self.config_path),
            serial: other.serial.or(self.serial),
            outfile: other.outfile.or(self.outfile),
            data_dir: other.data_dir.or(self.data_dir),
            port: other.port.or(self.port),
            log_dir: other.log_dir.or(self.log_dir),
            log_level: other.log_level.or(self.log_level),
            tick_interval_ms: other.tick_interval_ms.or(self.tick_interval_ms),
            queue_capacity: other.queue_capacity.or(self.queue_capacity),
            events_interval_ms: other.events_interval_ms.or(self.events_interval_ms),
            sample_rate_hz: other.sample_rate_hz.or(self.sample_rate_hz),
            window_secs: other.window_secs.or(self.window_secs),
            bpm_limit: other.bpm_limit.or(self.bpm_limit),
            alert_after: other.alert_after.or(self.alert_after),
            alarm_program: other.alarm_program.or(self.alarm_program),
            alarm_sound: other.alarm_sound.or(self.alarm_sound),
        }
    }

    fn defaults() -> Config {
        let engine = EngineOptions::default();
        let detector = DetectorOptions::default();
        let alarm = AlarmOptions::default();
        Config {
            serial: Some(PathBuf::from("/dev/ttyACM0")),
            data_dir: Some(
                dirs::data_local_dir()
                    .map(|dir| dir.join("heartmon"))
                    .unwrap_or_else(|| PathBuf::from("./data")),
            ),
            port: Some(18499),
            log_dir: Some(PathBuf::from("./logs")),
            log_level: Some("info".to_string()),
            tick_interval_ms: Some(engine.tick_interval_ms),
            queue_capacity: Some(engine.queue_capacity),
            events_interval_ms: Some(250),
            sample_rate_hz: Some(detector.sample_rate_hz),
            window_secs: Some(detector.window_secs),
            bpm_limit: Some(detector.bpm_limit),
            alert_after: Some(detector.alert_after),
            alarm_program: Some(alarm.program),
            alarm_sound: Some(alarm.sound_file),
            ..Default::default()
        }
    }

    /// Broadcast engine settings, falling back to the engine defaults.
    pub fn engine_options(&self) -> EngineOptions {
        let defaults = EngineOptions::default();
        EngineOptions {
            queue_capacity: self.queue_capacity.unwrap_or(defaults.queue_capacity),
            tick_interval_ms: self.tick_interval_ms.unwrap_or(defaults.tick_interval_ms),
            ..defaults
        }
    }

    pub fn detector_options(&self) -> DetectorOptions {
        let defaults = DetectorOptions::default();
        DetectorOptions {
            sample_rate_hz: self.sample_rate_hz.unwrap_or(defaults.sample_rate_hz),
            window_secs: self.window_secs.unwrap_or(defaults.window_secs),
            bpm_limit: self.bpm_limit.unwrap_or(defaults.bpm_limit),
            alert_after: self.alert_after.unwrap_or(defaults.alert_after),
        }
    }

    pub fn alarm_options(&self) -> AlarmOptions {
        let defaults = AlarmOptions::default();
        AlarmOptions {
            program: self.alarm_program.clone().unwrap_or(defaults.program),
            sound_file: self.alarm_sound.clone().unwrap_or(defaults.sound_file),
        }
    }

    pub fn events_interval(&self) -> Duration {
        Duration::from_millis(self.events_interval_ms.unwrap_or(250).max(1))
    }

    /// The heart log to write: the configured outfile, or a file named after
    /// the start time in the data directory.
    pub fn heart_log_path(&self, started: DateTime<Utc>) -> PathBuf {
        if let Some(outfile) = &self.outfile {
            return outfile.clone();
        }
        let dir = self.data_dir.clone().unwrap_or_else(|| PathBuf::from("."));
        dir.join(format!(
            "heart_data_starting_{}.hrt",
            started.to_rfc3339_opts(SecondsFormat::Secs, true)
        ))
    }
}

/// What became of the config file layer. Loading runs before logging is set
/// up, so the caller reports this once it can.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileLayer {
    Loaded(PathBuf),
    NotFound(PathBuf),
    Unusable { path: PathBuf, reason: String },
}

impl FileLayer {
    pub fn log(&self) {
        match self {
            FileLayer::Loaded(path) => log::info!("Loaded config file {}", path.display()),
            FileLayer::NotFound(path) => {
                log::info!("Config file not found at {}. Using defaults and environment/CLI variables.", path.display())
            }
            FileLayer::Unusable { path, reason } => {
                log::warn!("Failed to load config file {}: {}. Falling back to other sources.", path.display(), reason)
            }
        }
    }
}

pub fn load_config() -> (Config, FileLayer) {
    // Values in a .env file count as environment variables.
    dotenvy::dotenv().ok();
    load_config_with(Config::parse())
}

/// Defaults, then the config file, then environment variables and CLI
/// arguments (already folded together by clap in `cli_args`).
pub fn load_config_with(cli_args: Config) -> (Config, FileLayer) {
    let config_file_path = cli_args
        .config_path
        .clone()
        .unwrap_or_else(|| PathBuf::from("heart_monitor.conf"));

    let mut current_config = Config::defaults();
    let file_layer = match read_config_file(&config_file_path) {
        Ok(Some(file_config)) => {
            current_config = current_config.merge(file_config);
            FileLayer::Loaded(config_file_path)
        }
        Ok(None) => FileLayer::NotFound(config_file_path),
        Err(reason) => FileLayer::Unusable {
            path: config_file_path,
            reason,
        },
    };
    (current_config.merge(cli_args), file_layer)
}

fn read_config_file(path: &Path) -> Result<Option<Config>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let config_str = fs::read_to_string(path).map_err(|e| e.to_string())?;
    serde_json::from_str::<Config>(&config_str)
        .map(Some)
        .map_err(|e| e.to_string())
}
