//! Clock-in bot: connects to a OneBot gateway and records `上班` / `下班`.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use clap::Parser;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use wsbot::CONFIG_PATH_VAR;
use wsbot::bot::Bot;
use wsbot::config::AppConfig;
use wsbot::store::FileStore;
use wsbot::ws::{ConnectionManager, ConnectionState};

const WATCHDOG_PERIOD: Duration = Duration::from_secs(30);
const HEARTBEAT_STALE_AFTER: Duration = Duration::from_secs(120);

#[derive(Debug, Parser)]
#[command(name = "wsbot", version, about = "Records clock-in/clock-out messages from a OneBot gateway")]
struct Cli {
    /// Path to the YAML configuration file
    #[arg(short, long, env = CONFIG_PATH_VAR, default_value = "./config.yaml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = AppConfig::load(&cli.config)
        .with_context(|| format!("loading configuration from {}", cli.config.display()))?;

    init_logging(&config.app.log_level);

    let store = FileStore::open(&config.store.path)
        .with_context(|| format!("opening event store {}", config.store.path.display()))?;
    let bot = Arc::new(Bot::new(store));

    let handler = {
        let bot = Arc::clone(&bot);
        move |payload: &[u8]| bot.handle(payload)
    };
    let manager = ConnectionManager::new(config.ws.url.clone(), config.to_ws_config(), handler);

    let shutdown = CancellationToken::new();
    tokio::spawn(watch_signals(shutdown.clone()));

    info!(url = %config.ws.url, store = %config.store.path.display(), "Starting wsbot");
    manager.start(&shutdown)?;

    let mut states = manager.state_receiver();
    let mut watchdog = time::interval(WATCHDOG_PERIOD);
    watchdog.set_missed_tick_behavior(MissedTickBehavior::Delay);
    watchdog.tick().await;

    loop {
        tokio::select! {
            () = shutdown.cancelled() => break,
            changed = states.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = *states.borrow_and_update();
                info!(?state, "Connection state changed");
                if state == ConnectionState::Terminated {
                    warn!("Connection manager stopped; exiting");
                    break;
                }
            }
            _ = watchdog.tick() => {
                let age = bot.heartbeat_age();
                if age > HEARTBEAT_STALE_AFTER {
                    warn!(age_secs = age.as_secs(), "No heartbeat from gateway recently");
                }
            }
        }
    }

    manager.close().await?;
    manager.terminated().await;
    info!("wsbot stopped");

    exit_status(&shutdown)
}

/// Only a shutdown signal is a clean exit. A manager that stopped on its own
/// (retries exhausted, reconnect disabled) exits non-zero so a supervisor
/// restarts the bot.
fn exit_status(shutdown: &CancellationToken) -> anyhow::Result<()> {
    if !shutdown.is_cancelled() {
        anyhow::bail!("connection manager stopped without a shutdown signal");
    }
    Ok(())
}

/// Install the global subscriber. `RUST_LOG` takes precedence over the
/// configured level.
fn init_logging(level: &str) {
    let level = match level.to_ascii_lowercase().as_str() {
        "trace" => "trace",
        "debug" => "debug",
        "warn" | "warning" => "warn",
        "error" => "error",
        _ => "info",
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}

/// Cancel `token` on Ctrl-C or, on unix, SIGTERM.
async fn watch_signals(token: CancellationToken) {
    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Cannot listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }

    info!("Shutdown signal received");
    token.cancel();
}
