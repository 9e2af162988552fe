//! Configuration structures for the trade ledger service

use serde::{Deserialize, Serialize};

/// Main application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub service: ServiceConfig,
    pub database: DatabaseConfig,
    pub storage: StorageConfig,
    pub scheduler: SchedulerSettings,
    pub alerts: AlertsConfig,
}

/// Process-level settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub environment: Environment,

    /// Log filter directive, e.g. `info` or `info,trade_ledger=debug`
    pub log_level: String,

    /// `json` or `pretty`
    pub log_format: String,

    pub metrics_enabled: bool,

    /// Listen address of the metrics endpoint
    pub metrics_addr: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Staging,
    Production,
}

/// SQLite database settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Database file, or `:memory:` for a throwaway database
    pub path: String,
    pub max_connections: u32,
}

impl DatabaseConfig {
    pub fn is_in_memory(&self) -> bool {
        self.path == ":memory:"
    }
}

/// Where document bytes live
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,

    /// Root directory of the local backend
    pub root_dir: String,

    /// Upper bound on a single content fetch during a check
    pub fetch_timeout_secs: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Local,
    Memory,
}

/// Integrity scheduler settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerSettings {
    /// Run the periodic loops; on-demand checks work either way
    pub enabled: bool,
    pub incremental_interval_secs: u64,
    pub full_sweep_interval_secs: u64,
    pub incremental_window_secs: u64,
    pub max_workers: u32,
    pub incremental_retry: RetrySettings,
    pub full_sweep_retry: RetrySettings,
    pub on_demand_retry: RetrySettings,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl RetrySettings {
    pub fn with_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Self::default()
        }
    }
}

/// Alert notification settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertsConfig {
    pub notifications_enabled: bool,
    pub recipients: Vec<String>,
}

// Default value functions

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            environment: Environment::Development,
            log_level: "info".to_string(),
            log_format: "json".to_string(),
            metrics_enabled: true,
            metrics_addr: "0.0.0.0:9090".to_string(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "trade_ledger.db".to_string(),
            max_connections: 5,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Local,
            root_dir: "./data/content".to_string(),
            fetch_timeout_secs: 30,
        }
    }
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            incremental_interval_secs: 3600,
            full_sweep_interval_secs: 86400,
            incremental_window_secs: 86400,
            max_workers: 8,
            incremental_retry: RetrySettings::with_attempts(3),
            full_sweep_retry: RetrySettings::with_attempts(2),
            on_demand_retry: RetrySettings::with_attempts(3),
        }
    }
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 500,
            max_delay_ms: 10_000,
        }
    }
}

impl Default for AlertsConfig {
    fn default() -> Self {
        Self {
            notifications_enabled: true,
            recipients: Vec::new(),
        }
    }
}
