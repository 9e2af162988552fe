//! Wiring from [`AppConfig`](trade_ledger_config::AppConfig) sections to runtime components

use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use trade_ledger_config::{
    AlertsConfig, DatabaseConfig, RetrySettings, SchedulerSettings, ServiceConfig, StorageBackend,
    StorageConfig,
};
use trade_ledger_engine::{
    ContentError, ContentStore, InMemoryContentStore, LocalContentStore, SqliteStore, StoreError,
};
use trade_ledger_integrity::{AlertNotifier, SchedulerConfig, TracingNotifier};
use trade_ledger_metrics::LogFormat;
use trade_ledger_retry::RetryPolicy;

pub fn retry_policy(settings: &RetrySettings) -> RetryPolicy {
    RetryPolicy::new(
        settings.max_attempts,
        Duration::from_millis(settings.initial_delay_ms),
        Duration::from_millis(settings.max_delay_ms),
    )
}

pub fn scheduler_config(settings: &SchedulerSettings) -> SchedulerConfig {
    SchedulerConfig {
        incremental_interval_secs: settings.incremental_interval_secs,
        full_sweep_interval_secs: settings.full_sweep_interval_secs,
        incremental_window_secs: settings.incremental_window_secs,
        max_workers: settings.max_workers,
        incremental_retry: retry_policy(&settings.incremental_retry),
        full_sweep_retry: retry_policy(&settings.full_sweep_retry),
        on_demand_retry: retry_policy(&settings.on_demand_retry),
    }
}

pub async fn open_store(config: &DatabaseConfig) -> Result<SqliteStore, StoreError> {
    if config.is_in_memory() {
        info!("Opening in-memory ledger database");
        return SqliteStore::in_memory().await;
    }
    info!(path = %config.path, max_connections = config.max_connections, "Opening ledger database");
    SqliteStore::with_max_connections(&config.path, config.max_connections).await
}

pub async fn open_content(config: &StorageConfig) -> Result<Arc<dyn ContentStore>, ContentError> {
    match config.backend {
        StorageBackend::Memory => {
            info!("Using in-memory content store");
            Ok(Arc::new(InMemoryContentStore::new()))
        }
        StorageBackend::Local => {
            info!(root = %config.root_dir, "Using local content store");
            Ok(Arc::new(LocalContentStore::new(&config.root_dir).await?))
        }
    }
}

pub fn fetch_timeout(config: &StorageConfig) -> Duration {
    Duration::from_secs(config.fetch_timeout_secs)
}

/// Recipients are dropped when notifications are disabled; alerts are still logged
pub fn notifier(config: &AlertsConfig) -> Arc<dyn AlertNotifier> {
    let recipients = if config.notifications_enabled {
        config.recipients.clone()
    } else {
        Vec::new()
    };
    Arc::new(TracingNotifier::new(recipients))
}

pub fn log_format(config: &ServiceConfig) -> LogFormat {
    match config.log_format.as_str() {
        "pretty" => LogFormat::Pretty,
        _ => LogFormat::Json,
    }
}
