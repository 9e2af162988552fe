//! Trade Ledger Daemon
//!
//! Opens the ledger database and content store, runs the periodic integrity
//! checks and serves Prometheus metrics until interrupted.
//!
//! ## Usage
//!
//! ```bash
//! # Start with defaults
//! trade-ledgerd
//!
//! # Start with a config file
//! trade-ledgerd --config config/production.toml
//!
//! # Check a config file and exit
//! trade-ledgerd --config config/production.toml --validate-only
//!
//! # Run one full sweep, print its summary and exit
//! trade-ledgerd --sweep-once
//! ```
//!
//! Any setting can be overridden with `TRADE_LEDGER_<SECTION>__<KEY>`,
//! e.g. `TRADE_LEDGER_SCHEDULER__MAX_WORKERS=4`.

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};
use trade_ledger::{bootstrap, TradeLedger};
use trade_ledger_config::{validate_config, ConfigLoader};
use trade_ledger_metrics::{init_tracing, MetricsCollector, MetricsServer};

#[derive(Parser, Debug)]
#[command(name = "trade-ledgerd")]
#[command(about = "Trade-document ledger and integrity verification daemon")]
struct Args {
    /// Path to config file (TOML, YAML or JSON)
    #[arg(short, long, env = "TRADE_LEDGER_CONFIG")]
    config: Option<PathBuf>,

    /// Validate the configuration and exit
    #[arg(long)]
    validate_only: bool,

    /// Run a single full sweep and exit
    #[arg(long)]
    sweep_once: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = ConfigLoader::load(args.config.as_deref()).context("failed to load configuration")?;
    validate_config(&config).context("invalid configuration")?;
    if args.validate_only {
        println!("configuration is valid");
        return Ok(());
    }

    let metrics = Arc::new(MetricsCollector::new().context("failed to create metrics registry")?);
    init_tracing(
        &config.service.log_level,
        bootstrap::log_format(&config.service),
        Some(metrics.clone()),
    )
    .context("failed to initialize tracing")?;

    info!(
        environment = ?config.service.environment,
        database = %config.database.path,
        "Starting trade ledger"
    );

    let store = Arc::new(
        bootstrap::open_store(&config.database)
            .await
            .context("failed to open ledger database")?,
    );
    let content = bootstrap::open_content(&config.storage)
        .await
        .context("failed to open content store")?;

    let ledger = TradeLedger::builder(store.clone(), content)
        .scheduler_config(bootstrap::scheduler_config(&config.scheduler))
        .fetch_timeout(bootstrap::fetch_timeout(&config.storage))
        .notifier(bootstrap::notifier(&config.alerts))
        .metrics(metrics.clone())
        .build();

    if args.sweep_once {
        let summary = ledger.run_full_sweep().await?;
        println!("{}", serde_json::to_string_pretty(&summary)?);
        store.close().await;
        return Ok(());
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut tasks = Vec::new();

    if config.scheduler.enabled {
        tasks.extend(ledger.scheduler().spawn_periodic(shutdown_rx.clone()));
    } else {
        info!("Periodic integrity checks disabled");
    }

    if config.service.metrics_enabled {
        let server = MetricsServer::new(metrics.clone(), config.service.metrics_addr.clone());
        let mut rx = shutdown_rx.clone();
        tasks.push(tokio::spawn(async move {
            let shutdown = async move {
                let _ = rx.wait_for(|stop| *stop).await;
            };
            if let Err(e) = server.serve_with_shutdown(shutdown).await {
                error!(error = %e, "Metrics server failed");
            }
        }));
    }

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("Shutdown signal received");

    ledger.shutdown();
    let _ = shutdown_tx.send(true);
    for task in tasks {
        if let Err(e) = task.await {
            warn!(error = %e, "Background task ended abnormally");
        }
    }

    store.close().await;
    info!("Trade ledger stopped");
    Ok(())
}
