//! # Thermo Server
//!
//! Runs the bridge between the thermal kiosks and the personnel registry.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Startup Sequence                                │
//! │                                                                         │
//! │  1. Load config (argv[1] / THERMO_CONFIG / platform default)           │
//! │  2. Init tracing (RUST_LOG > [log] level > built-in default)           │
//! │  3. Open database, run migrations                                      │
//! │  4. Spawn RegistryLink, one KioskLink per endpoint, Aggregator         │
//! │  5. Start live feed, then Orchestrator                                 │
//! │  6. Wait for Ctrl+C / SIGTERM, cancel, drain, close pool               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Any startup failure aborts the process.

use anyhow::Context;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use thermo_bridge::{
    Aggregator, BridgeConfig, EventSource, KioskLink, LiveFeed, LiveFeedServer, Orchestrator,
    RegistryLink,
};
use thermo_db::Database;

const DEFAULT_LOG_FILTER: &str = "info,thermo=debug,sqlx=warn";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = BridgeConfig::load(config_path).context("Failed to load configuration")?;
    let orchestrator_config = config
        .orchestrator_config()
        .context("Invalid orchestrator settings")?;

    init_tracing(config.log.level.as_deref());
    info!(
        endpoints = config.endpoints.len(),
        registry = %config.registry.url,
        "Starting thermo bridge"
    );

    let db_config = config.db_config();
    info!(path = ?db_config.database_path, images = ?db_config.images_dir, "Opening database");
    let db = Database::new(db_config)
        .await
        .context("Failed to open database")?;

    let cancel = CancellationToken::new();
    let mut tasks: Vec<JoinHandle<()>> = Vec::new();

    let (registry, registry_task) =
        RegistryLink::spawn(config.registry_link_config(), cancel.clone());
    tasks.push(registry_task);

    let mut sources: Vec<Arc<dyn EventSource>> = Vec::with_capacity(config.endpoints.len());
    for endpoint in &config.endpoints {
        let (link, task) = KioskLink::connect(
            Arc::new(endpoint.clone()),
            config.kiosk_link_config(),
            cancel.clone(),
        )
        .with_context(|| format!("Failed to set up kiosk {}", endpoint.id))?;
        sources.push(Arc::new(link));
        tasks.push(task);
    }

    let (aggregator, events_rx) =
        Aggregator::new(sources, config.aggregator_config(), cancel.clone());
    tasks.push(tokio::spawn(aggregator.run()));

    let feed = LiveFeed::new(config.live.channel_capacity);
    let live_server = LiveFeedServer::new(
        config.live.bind_addr.clone(),
        config.live.port,
        feed.clone(),
        db.images().clone(),
    );
    let (live_addr, live_task) = live_server
        .start(cancel.clone())
        .await
        .context("Failed to start live feed")?;
    tasks.push(live_task);

    let orchestrator = Orchestrator::new(
        Arc::new(db.clone()),
        Arc::new(registry),
        Arc::new(feed),
        orchestrator_config,
        cancel.clone(),
    );
    tasks.push(tokio::spawn(orchestrator.run(events_rx)));

    info!(live = %live_addr, "Thermo bridge running");

    shutdown_signal().await;
    cancel.cancel();

    for task in tasks {
        if let Err(e) = task.await {
            warn!(error = %e, "Task ended abnormally");
        }
    }

    db.close().await;
    info!("Shutdown complete");
    Ok(())
}

/// Installs the global subscriber.
fn init_tracing(configured: Option<&str>) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(configured.unwrap_or(DEFAULT_LOG_FILTER)))
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}

/// Graceful shutdown signal handler.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, starting graceful shutdown...");
}
