use crate::config::models::{
    DatabaseConfig, NodeCacheConfig, NodeClientConfig, ObservabilityConfig, SyncConfig,
};

#[test]
fn test_database_validation() {
    let mut config = DatabaseConfig {
        url: "sqlite://fleet-sync.db".to_string(),
        max_connections: 10,
        min_connections: 1,
        connection_timeout_seconds: 30,
        idle_timeout_seconds: 600,
    };

    assert!(config.validate().is_ok());
    assert!(!config.is_in_memory());

    config.url = "".to_string();
    assert!(config.validate().is_err());

    config.url = "postgresql://localhost/test".to_string();
    assert!(config.validate().is_err());

    config.url = "sqlite::memory:".to_string();
    assert!(config.validate().is_ok());
    assert!(config.is_in_memory());

    config.max_connections = 0;
    assert!(config.validate().is_err());

    config.max_connections = 10;
    config.min_connections = 15;
    assert!(config.validate().is_err());
}

#[test]
fn test_sync_validation() {
    let mut config = SyncConfig::default();
    assert!(config.validate().is_ok());

    config.default_batch_size = 0;
    assert!(config.validate().is_err());

    config.default_batch_size = 5;
    config.default_batch_interval_seconds = -1;
    assert!(config.validate().is_err());

    // 批次间隔为 0 表示不暂停
    config.default_batch_interval_seconds = 0;
    assert!(config.validate().is_ok());

    config.tick_interval_seconds = 0;
    assert!(config.validate().is_err());

    config.tick_interval_seconds = 30;
    config.max_concurrent_syncs = 0;
    assert!(config.validate().is_err());
}

#[test]
fn test_node_client_validation() {
    let mut config = NodeClientConfig::default();
    assert!(config.validate().is_ok());
    assert_eq!(config.probe_timeout().as_secs(), 8);

    config.probe_timeout_seconds = 60;
    assert!(config.validate().is_err());

    config.probe_timeout_seconds = 8;
    config.request_timeout_seconds = 0;
    assert!(config.validate().is_err());
}

#[test]
fn test_node_cache_validation() {
    let mut config = NodeCacheConfig::default();
    assert!(config.validate().is_ok());

    config.max_concurrent_probes = 0;
    assert!(config.validate().is_err());
}

#[test]
fn test_observability_validation() {
    let mut config = ObservabilityConfig::default();
    assert!(config.validate().is_ok());

    config.log_level = "invalid".to_string();
    assert!(config.validate().is_err());

    config.log_level = "warn".to_string();
    config.log_format = "xml".to_string();
    assert!(config.validate().is_err());

    config.log_format = "json".to_string();
    config.metrics_enabled = true;
    config.metrics_bind_address = "not-an-address".to_string();
    assert!(config.validate().is_err());

    config.metrics_bind_address = "127.0.0.1:9100".to_string();
    assert!(config.validate().is_ok());
}
