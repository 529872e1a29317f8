//! # Heart Record Server
//!
//! A TCP receiver for remote monitors that stream heart records over the
//! network instead of writing them locally. Every connection is persisted
//! byte-for-byte to `heartbeat_starting_<ts>.hrt` and rendered as text to
//! `human_heartbeat_<ts>.txt` and to stderr.
//!
//! Shutdown is handled by `tokio-graceful`: on Ctrl-C or SIGTERM the accept
//! loop stops and open connections get a few seconds to finish.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use tokio::net::{TcpListener, TcpStream};
use tokio_graceful::{Shutdown, ShutdownGuard};
use tracing::{error, info, warn};

use lib_heartmon::loggers::setup_logging;

mod heart_logic {
    pub mod receiver;
}
use heart_logic::receiver::{Receiver, open_session};

#[derive(Parser, Debug, Clone)]
#[clap(about = "Receives heart record streams over TCP and persists them", version)]
struct Args {
    #[clap(long, env = "HEARTMON_SERVER_ADDRESS", default_value = "0.0.0.0:18498", help = "The address to bind the server to.")]
    address: SocketAddr,

    #[clap(long, env = "HEARTMON_SERVER_OUT_DIR", default_value = ".", help = "Directory the received logs are written to.")]
    out_dir: PathBuf,

    #[clap(long, env = "HEARTMON_LOG_DIR", default_value = "./logs", help = "Directory for log files.")]
    log_dir: PathBuf,

    #[clap(long, env = "HEARTMON_LOG_LEVEL", default_value = "info", help = "Logging level (trace, debug, info, warn, error).")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();
    let _log_guard = setup_logging("heart_server", &args.log_dir, &args.log_level)?;

    std::fs::create_dir_all(&args.out_dir)
        .with_context(|| format!("can't create output directory {}", args.out_dir.display()))?;
    let listener = TcpListener::bind(args.address)
        .await
        .with_context(|| format!("can't bind {}", args.address))?;
    info!("Beginning serving on {}", args.address);

    let shutdown: Shutdown = Shutdown::default();
    let out_dir = args.out_dir.clone();
    shutdown.spawn_task_fn(move |guard| accept_loop(guard, listener, out_dir));

    match shutdown.shutdown_with_limit(Duration::from_secs(10)).await {
        Ok(elapsed) => info!(
            "shutdown: gracefully {}s after shutdown signal received",
            elapsed.as_secs_f64()
        ),
        Err(e) => warn!("shutdown: forcefully due to timeout: {}", e),
    }

    info!("Bye!");
    Ok(())
}

async fn accept_loop(guard: ShutdownGuard, listener: TcpListener, out_dir: PathBuf) {
    loop {
        tokio::select! {
            _ = guard.cancelled() => {
                info!("No longer accepting connections");
                return;
            }
            accepted = listener.accept() => match accepted {
                Ok((conn, peer)) => {
                    let out_dir = out_dir.clone();
                    guard.spawn_task(async move {
                        if let Err(e) = handle_connection(conn, peer, &out_dir).await {
                            error!("Connection from {} failed: {}", peer, e);
                        }
                    });
                }
                Err(e) => {
                    error!("Accept failed: {}", e);
                    return;
                }
            }
        }
    }
}

async fn handle_connection(conn: TcpStream, peer: SocketAddr, out_dir: &Path) -> Result<()> {
    info!("Connection started from {}", peer);
    let session = open_session(out_dir, Utc::now()).await?;
    info!(
        "Persisting {} to {} and {}",
        peer,
        session.raw_path.display(),
        session.human_path.display()
    );

    let mut receiver = Receiver::new(session.raw, session.human, true);
    let stats = receiver.receive(conn).await?;
    let (raw, _) = receiver.into_inner();
    raw.into_inner().sync_all().await?;

    match stats.decode_error {
        Some(e) => warn!(
            "Connection from {} closed after {} bytes; rendering stopped after {} records: {}",
            peer, stats.bytes, stats.records, e
        ),
        None => info!(
            "Connection from {} closed after {} bytes, {} records",
            peer, stats.bytes, stats.records
        ),
    }
    Ok(())
}
