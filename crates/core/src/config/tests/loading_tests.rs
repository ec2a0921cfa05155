use crate::config::models::AppConfig;
use std::io::Write;
use tempfile::NamedTempFile;

#[test]
fn test_load_from_file() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
[database]
url = "sqlite://./data/test.db"

[sync]
default_batch_size = 7
node_pause_seconds = 0
"#
    )
    .unwrap();

    let path = file.path().to_str().unwrap().to_string();
    // NamedTempFile 没有 .toml 后缀，File::new 显式指定了格式
    let config = AppConfig::load(Some(&path)).unwrap();

    assert_eq!(config.database.url, "sqlite://./data/test.db");
    assert_eq!(config.sync.default_batch_size, 7);
    assert_eq!(config.sync.node_pause_seconds, 0);
    assert_eq!(config.sync.default_batch_interval_seconds, 5);
}

#[test]
fn test_load_missing_file_fails() {
    let result = AppConfig::load(Some("/nonexistent/fleet-sync.toml"));
    assert!(result.is_err());
    assert!(result.unwrap_err().to_string().contains("配置文件不存在"));
}

#[test]
fn test_load_invalid_file_fails_validation() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
[observability]
log_level = "verbose"
"#
    )
    .unwrap();

    let path = file.path().to_str().unwrap().to_string();
    assert!(AppConfig::load(Some(&path)).is_err());
}
