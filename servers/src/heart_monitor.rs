//! # Heart Monitor
//!
//! The live side of the system. Reads sensor readings from a serial device
//! and pushes them through the broadcast engine, which:
//! - appends them to a heart log once per tick,
//! - feeds a live rate detector that sounds the alarm on a sustained high
//!   heart rate,
//! - relays them to HTTP clients as server-sent events (`/events`).
//!
//! Configuration comes from defaults, `heart_monitor.conf`, then
//! `HEARTMON_*` environment variables and CLI flags. Ctrl-C, SIGTERM or the
//! sensor going away shut everything down; buffered samples are flushed to
//! the log first.

use std::fs::File;
use std::io;

use anyhow::{Context, Result};
use chrono::Utc;
use tokio::io::BufReader;
use tokio::net::TcpListener;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use lib_heartmon::core::Dispatcher;
use lib_heartmon::detector::{Alerter, LiveDetector, ProcessAlarm, RateDetector};
use lib_heartmon::ingestors::LineSensorIngestor;
use lib_heartmon::loggers::setup_logging;

mod heart_logic {
    pub mod config;
    pub mod events;
}
use heart_logic::{config, events};

#[tokio::main]
async fn main() -> Result<()> {
    let (config, file_layer) = config::load_config();
    let log_dir = config.log_dir.clone().unwrap_or_else(|| "./logs".into());
    let log_level = config.log_level.clone().unwrap_or_else(|| "info".to_string());
    let _log_guard = setup_logging("heart_monitor", &log_dir, &log_level)?;
    file_layer.log();
    info!("Starting with {:?}", config);

    let engine_options = config.engine_options();

    let heart_log_path = config.heart_log_path(Utc::now());
    if let Some(parent) = heart_log_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("can't create data directory {}", parent.display()))?;
    }
    let heart_log = File::create(&heart_log_path)
        .with_context(|| format!("can't create heart log {}", heart_log_path.display()))?;
    info!("Writing heart log to {}", heart_log_path.display());

    let serial_path = config.serial.clone().unwrap_or_else(|| "/dev/ttyACM0".into());
    let serial = tokio::fs::File::open(&serial_path)
        .await
        .with_context(|| format!("can't open serial device {}", serial_path.display()))?;

    let port = config.port.unwrap_or(18499);
    let listener = TcpListener::bind(("0.0.0.0", port))
        .await
        .with_context(|| format!("can't bind event relay to port {}", port))?;

    let (dispatcher, handle) = Dispatcher::new(heart_log, &engine_options);
    let engine_task = tokio::spawn(dispatcher.run());

    let ingest_handle = handle.clone();
    let ingest_task = tokio::spawn(async move {
        let stop = ingest_handle.stop_token();
        let ingestor = LineSensorIngestor::new(ingest_handle.clone());
        tokio::select! {
            _ = stop.cancelled() => {}
            result = ingestor.run(BufReader::new(serial)) => {
                match result {
                    Ok(stats) => info!("Sensor input ended: {} samples, {} lines rejected", stats.accepted, stats.rejected),
                    Err(e) => error!("Can't read from serial device: {}", e),
                }
                // Nothing left to monitor.
                ingest_handle.stop();
            }
        }
    });

    let detector = RateDetector::new(
        &config.detector_options(),
        Alerter::new(ProcessAlarm::new(config.alarm_options())),
        io::stdout(),
    );
    let live_task = tokio::spawn(
        LiveDetector::new(
            detector,
            handle.clone(),
            engine_options.tick_interval(),
            engine_options.queue_capacity,
        )
        .run(),
    );

    let relay_state = events::RelayState::new(handle.clone(), config.events_interval(), engine_options.queue_capacity);
    let relay_task = tokio::spawn(events::serve(listener, relay_state));

    wait_for_shutdown(handle.stop_token()).await;
    handle.stop();

    if let Err(e) = ingest_task.await {
        warn!("Sensor ingestor task failed: {}", e);
    }
    match live_task.await {
        Ok(detector) => info!("Live detector stopped; last BPM {:?}", detector.last_bpm()),
        Err(e) => warn!("Live detector task failed: {}", e),
    }
    match relay_task.await {
        Ok(Err(e)) => warn!("Event relay stopped with error: {}", e),
        Err(e) => warn!("Event relay task failed: {}", e),
        Ok(Ok(())) => {}
    }
    let heart_log = engine_task.await?.context("heart log flush failed")?;
    heart_log.sync_all().context("heart log sync failed")?;

    info!("Shutdown complete.");
    Ok(())
}

/// Resolves on Ctrl-C, SIGTERM, or once something else stops the engine.
async fn wait_for_shutdown(stop: CancellationToken) {
    let terminate = async {
        #[cfg(unix)]
        {
            match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                Ok(mut term_signal) => {
                    term_signal.recv().await;
                    info!("SIGTERM received, initiating shutdown.");
                }
                Err(e) => {
                    warn!("Can't listen for SIGTERM: {}", e);
                    std::future::pending::<()>().await;
                }
            }
        }
        #[cfg(not(unix))]
        {
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        _ = signal::ctrl_c() => info!("Ctrl-C received, initiating shutdown."),
        _ = terminate => {}
        _ = stop.cancelled() => info!("Engine stopped, shutting down."),
    }
}
