//! Integration tests for the config crate

use std::io::Write;
use std::path::{Path, PathBuf};
use trade_ledger_config::{
    validate_config, AppConfig, ConfigLoader, Environment, StorageBackend,
};

fn shipped(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../../config").join(name)
}

#[test]
fn test_load_local_config() {
    let config = ConfigLoader::from_file(&shipped("local.toml")).expect("Failed to load local config");

    assert_eq!(config.service.environment, Environment::Development);
    assert_eq!(config.service.log_format, "pretty");
    assert!(config.database.is_in_memory());
    assert_eq!(config.storage.backend, StorageBackend::Memory);
    validate_config(&config).unwrap();
}

#[test]
fn test_load_production_config() {
    let config =
        ConfigLoader::from_file(&shipped("production.toml")).expect("Failed to load production config");

    assert_eq!(config.service.environment, Environment::Production);
    assert_eq!(config.storage.backend, StorageBackend::Local);
    assert_eq!(config.scheduler.full_sweep_retry.max_attempts, 2);
    assert_eq!(config.scheduler.incremental_retry.max_attempts, 3);
    assert_eq!(config.alerts.recipients.len(), 2);
    validate_config(&config).unwrap();
}

#[test]
fn test_yaml_and_json_files() {
    let mut yaml = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
    writeln!(yaml, "database:\n  path: ledger.db\n  max_connections: 3").unwrap();
    assert_eq!(
        ConfigLoader::from_file(yaml.path()).unwrap().database.max_connections,
        3
    );

    let mut json = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
    writeln!(json, r#"{{"storage": {{"backend": "memory"}}}}"#).unwrap();
    assert_eq!(
        ConfigLoader::from_file(json.path()).unwrap().storage.backend,
        StorageBackend::Memory
    );
}

#[test]
fn test_env_overrides() {
    // Unique prefix so parallel tests never see these variables
    std::env::set_var("TLCFGTEST_SCHEDULER__MAX_WORKERS", "12");
    std::env::set_var("TLCFGTEST_SERVICE__LOG_FORMAT", "pretty");
    std::env::set_var("TLCFGTEST_SCHEDULER__ENABLED", "false");

    let config = ConfigLoader::from_env_with_prefix("TLCFGTEST").unwrap();
    assert_eq!(config.scheduler.max_workers, 12);
    assert_eq!(config.service.log_format, "pretty");
    assert!(!config.scheduler.enabled);
    assert_eq!(config.database, AppConfig::default().database);
}

#[test]
fn test_invalid_file_fails_validation() {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    writeln!(
        file,
        "[service]\nlog_level = \"chatty\"\n\n[storage]\nfetch_timeout_secs = 0"
    )
    .unwrap();

    let config = ConfigLoader::from_file(file.path()).unwrap();
    let err = validate_config(&config).unwrap_err().to_string();
    assert!(err.contains("service.log_level"));
    assert!(err.contains("storage.fetch_timeout_secs"));
}

#[test]
fn test_load_without_file_uses_defaults() {
    let config = ConfigLoader::load(None).unwrap();
    assert_eq!(config.scheduler.incremental_interval_secs, 3600);
    assert_eq!(config.scheduler.full_sweep_interval_secs, 86400);
}
