use logrelay::config::RelayConfig;
use logrelay::error::RelayError;
use logrelay::logs::Rotation;
use std::fs;
use tempfile::TempDir;

#[test]
fn test_load_toml_config() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("relay.toml");
    fs::write(
        &config_path,
        r#"
capacity = 250
destination = "/tmp/logrelay/app.log"
timestamps = true
tail_queue = 64

[rotation]
kind = "daily"
"#,
    )
    .unwrap();

    let config = RelayConfig::from_file(&config_path).unwrap();
    assert_eq!(config.capacity, 250);
    assert_eq!(config.destination, "/tmp/logrelay/app.log");
    assert!(config.timestamps);
    assert_eq!(config.tail_queue, 64);
    assert_eq!(config.rotation, Rotation::Daily);
}

#[test]
fn test_load_json_config() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("relay.json");
    fs::write(
        &config_path,
        r#"{
  "capacity": 10,
  "destination": "/tmp/logrelay/app.log",
  "rotation": { "kind": "size", "max_bytes": 2048 }
}"#,
    )
    .unwrap();

    let config = RelayConfig::from_file(&config_path).unwrap();
    assert_eq!(config.capacity, 10);
    assert_eq!(config.rotation, Rotation::Size { max_bytes: 2048 });
    assert!(!config.timestamps);
}

#[test]
fn test_empty_toml_uses_defaults() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("relay.toml");
    fs::write(&config_path, "").unwrap();

    let config = RelayConfig::from_file(&config_path).unwrap();
    assert_eq!(config, RelayConfig::default());
}

#[test]
fn test_env_expansion_in_destination() {
    std::env::set_var("LOGRELAY_IT_LOG_DIR", "/srv/logs");

    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("relay.toml");
    fs::write(&config_path, r#"destination = "${LOGRELAY_IT_LOG_DIR}/web.log""#).unwrap();

    let config = RelayConfig::from_file(&config_path).unwrap();
    assert_eq!(config.destination, "/srv/logs/web.log");
}

#[test]
fn test_invalid_capacity_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("relay.toml");
    fs::write(&config_path, "capacity = 0").unwrap();

    assert!(matches!(
        RelayConfig::from_file(&config_path),
        Err(RelayError::ConfigValidationError(_))
    ));
}

#[test]
fn test_unknown_rotation_kind_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("relay.toml");
    fs::write(&config_path, "[rotation]\nkind = \"hourly\"").unwrap();

    assert!(matches!(
        RelayConfig::from_file(&config_path),
        Err(RelayError::InvalidConfig(_))
    ));
}

#[test]
fn test_missing_file() {
    let temp_dir = TempDir::new().unwrap();

    assert!(matches!(
        RelayConfig::from_file(&temp_dir.path().join("nope.toml")),
        Err(RelayError::ConfigError(_))
    ));
}
