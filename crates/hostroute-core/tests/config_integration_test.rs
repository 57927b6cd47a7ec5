use hostroute_core::{ConfigError, ConfigManager, DispatchMode, HostRouteConfig};
use std::fs;
use tempfile::TempDir;

#[test]
fn test_default_config_file_round_trips() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("nested").join("config.toml");

    ConfigManager::create_default_config(&config_path).unwrap();
    assert!(config_path.exists());

    let written = fs::read_to_string(&config_path).unwrap();
    assert!(written.contains("[registry]"));
    assert!(!written.contains("api_key"));

    let manager = ConfigManager::load_from(&config_path).unwrap();
    assert_eq!(manager.config_path(), Some(config_path.as_path()));
    assert_eq!(manager.config().pool.probe_path, "/card");
    assert_eq!(manager.config().dispatch.messages_path, "/messages");
}

#[test]
fn test_partial_file_fills_defaults() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("hostroute.toml");
    fs::write(
        &config_path,
        r#"
[pool]
probe_path = "/healthz"

[dispatch]
default_mode = "first_success"
"#,
    )
    .unwrap();

    let manager = ConfigManager::load_from(&config_path).unwrap();
    let config = manager.config();
    assert_eq!(config.pool.probe_path, "/healthz");
    assert_eq!(config.pool.probe_timeout_secs, 3);
    assert_eq!(config.aggregation.delimiter, "\n\n");
    if std::env::var("HOSTROUTE_MODE").is_err() {
        assert_eq!(config.dispatch.default_mode, DispatchMode::FirstSuccess);
    }
}

#[test]
fn test_api_key_is_read_from_file_but_never_written() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("hostroute.toml");
    fs::write(
        &config_path,
        r#"
[registry]
base_url = "http://registry.local:8000"
api_key = "secret-token"
"#,
    )
    .unwrap();

    let manager = ConfigManager::load_from(&config_path).unwrap();
    assert!(manager.config().registry.api_key.is_some());

    let serialized = toml::to_string(manager.config()).unwrap();
    assert!(!serialized.contains("secret-token"));
}

#[test]
fn test_missing_and_invalid_files() {
    let temp_dir = TempDir::new().unwrap();

    let missing = temp_dir.path().join("absent.toml");
    assert!(matches!(
        ConfigManager::load_from(&missing),
        Err(ConfigError::NotFound(_))
    ));

    let broken = temp_dir.path().join("broken.toml");
    fs::write(&broken, "[registry\nbase_url = ").unwrap();
    assert!(matches!(
        ConfigManager::load_from(&broken),
        Err(ConfigError::ParseError(_))
    ));
}

#[test]
fn test_from_config_rejects_invalid_values() {
    let mut config = HostRouteConfig::default();
    config.logging.format = "xml".to_string();
    assert!(matches!(
        ConfigManager::from_config(config),
        Err(ConfigError::ValidationError(_))
    ));
}
