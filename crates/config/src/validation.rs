//! Configuration validation

use crate::{AppConfig, ConfigError, Result, RetrySettings, StorageBackend};
use std::net::SocketAddr;

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];
const LOG_FORMATS: [&str; 2] = ["json", "pretty"];
const MAX_WORKERS: u32 = 256;
const MAX_RETRY_ATTEMPTS: u32 = 10;

/// Validation error details
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate the entire application configuration, reporting every problem found
pub fn validate_config(config: &AppConfig) -> Result<()> {
    let errors = collect_errors(config);
    if !errors.is_empty() {
        let error_msg = errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("; ");
        return Err(ConfigError::ValidationError(error_msg));
    }
    Ok(())
}

/// Every validation failure in `config`
pub fn collect_errors(config: &AppConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    // Service
    if let Err(e) = validate_log_level(&config.service.log_level) {
        errors.push(ValidationError::new("service.log_level", e));
    }

    if !LOG_FORMATS.contains(&config.service.log_format.as_str()) {
        errors.push(ValidationError::new(
            "service.log_format",
            format!("must be one of: {}", LOG_FORMATS.join(", ")),
        ));
    }

    if config.service.metrics_enabled && config.service.metrics_addr.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "service.metrics_addr",
            "must be a socket address such as 0.0.0.0:9090",
        ));
    }

    // Database
    if config.database.path.trim().is_empty() {
        errors.push(ValidationError::new("database.path", "database path is required"));
    }

    if config.database.max_connections == 0 {
        errors.push(ValidationError::new(
            "database.max_connections",
            "must be greater than 0",
        ));
    }

    // Storage
    if config.storage.backend == StorageBackend::Local && config.storage.root_dir.trim().is_empty() {
        errors.push(ValidationError::new(
            "storage.root_dir",
            "root directory is required for the local backend",
        ));
    }

    if config.storage.fetch_timeout_secs == 0 {
        errors.push(ValidationError::new(
            "storage.fetch_timeout_secs",
            "must be greater than 0",
        ));
    }

    // Scheduler
    let scheduler = &config.scheduler;
    for (field, value) in [
        ("scheduler.incremental_interval_secs", scheduler.incremental_interval_secs),
        ("scheduler.full_sweep_interval_secs", scheduler.full_sweep_interval_secs),
        ("scheduler.incremental_window_secs", scheduler.incremental_window_secs),
    ] {
        if value == 0 {
            errors.push(ValidationError::new(field, "must be greater than 0"));
        }
    }

    if scheduler.max_workers == 0 || scheduler.max_workers > MAX_WORKERS {
        errors.push(ValidationError::new(
            "scheduler.max_workers",
            format!("must be between 1 and {MAX_WORKERS}"),
        ));
    }

    for (name, retry) in [
        ("incremental_retry", &scheduler.incremental_retry),
        ("full_sweep_retry", &scheduler.full_sweep_retry),
        ("on_demand_retry", &scheduler.on_demand_retry),
    ] {
        if let Err(e) = validate_retry(retry) {
            errors.push(ValidationError::new(format!("scheduler.{name}"), e));
        }
    }

    // Alerts
    if config.alerts.notifications_enabled {
        for (idx, recipient) in config.alerts.recipients.iter().enumerate() {
            if !is_plausible_email(recipient) {
                errors.push(ValidationError::new(
                    format!("alerts.recipients[{idx}]"),
                    format!("'{recipient}' is not an e-mail address"),
                ));
            }
        }
    }

    errors
}

/// Validate log level
pub fn validate_log_level(level: &str) -> std::result::Result<(), String> {
    // Filter directives such as "info,trade_ledger=debug" are checked by their default level
    let default_level = level.split(',').next().unwrap_or_default().trim();
    if default_level.contains('=') || LOG_LEVELS.contains(&default_level.to_lowercase().as_str()) {
        Ok(())
    } else {
        Err(format!(
            "invalid log level '{level}', must be one of: {}",
            LOG_LEVELS.join(", ")
        ))
    }
}

pub fn validate_retry(retry: &RetrySettings) -> std::result::Result<(), String> {
    if retry.max_attempts == 0 || retry.max_attempts > MAX_RETRY_ATTEMPTS {
        return Err(format!(
            "max_attempts must be between 1 and {MAX_RETRY_ATTEMPTS}"
        ));
    }
    if retry.initial_delay_ms > retry.max_delay_ms {
        return Err("initial_delay_ms must not exceed max_delay_ms".to_string());
    }
    Ok(())
}

fn is_plausible_email(value: &str) -> bool {
    match value.split_once('@') {
        Some((local, domain)) => !local.is_empty() && domain.contains('.') && !value.contains(' '),
        None => false,
    }
}
