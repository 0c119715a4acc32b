//! Integration tests for configuration loading

use park_sync::infra::Config;
use std::io::Write;
use std::time::Duration;
use tempfile::NamedTempFile;

#[test]
fn test_load_config_from_file() {
    let mut temp_file = NamedTempFile::new().unwrap();

    let config_content = r#"
[destination]
id = "waltdisneyworldresort"
name = "Walt Disney World"
timezone = "America/New_York"

[cache]
namespace = "wdw"
version = 3
entities_ttl_secs = 120

[livedata]
fixture = "fixtures/wdw.json"
poll_interval_secs = 30
timeout_secs = 10

[metrics]
interval_secs = 15
"#;

    temp_file.write_all(config_content.as_bytes()).unwrap();
    temp_file.flush().unwrap();

    let config = Config::from_file(temp_file.path()).unwrap();

    assert_eq!(config.destination_id(), "waltdisneyworldresort");
    assert_eq!(config.destination_name(), "Walt Disney World");
    assert_eq!(config.timezone(), "America/New_York");
    assert_eq!(config.cache_namespace(), "wdw");
    assert_eq!(config.cache_version(), 3);
    assert_eq!(config.entities_ttl(), Duration::from_secs(120));
    assert_eq!(config.fixture_file(), "fixtures/wdw.json");
    assert_eq!(config.poll_interval_secs(), 30);
    assert_eq!(config.poll_timeout(), Duration::from_secs(10));
    assert_eq!(config.metrics_interval_secs(), 15);
    assert!(config.validate().is_ok());
}

#[test]
fn test_optional_sections_use_defaults() {
    let mut temp_file = NamedTempFile::new().unwrap();
    temp_file
        .write_all(b"[destination]\nid = \"resort\"\ntimezone = \"Europe/Paris\"\n")
        .unwrap();
    temp_file.flush().unwrap();

    let config = Config::from_file(temp_file.path()).unwrap();

    assert_eq!(config.cache_namespace(), "resort");
    assert_eq!(config.cache_version(), 1);
    assert_eq!(config.entities_ttl(), Duration::from_secs(300));
    assert_eq!(config.livedata_ttl(), Duration::from_secs(180 * 24 * 60 * 60));
}

#[test]
fn test_missing_timezone_fails_to_parse() {
    let mut temp_file = NamedTempFile::new().unwrap();
    temp_file.write_all(b"[destination]\nid = \"resort\"\n").unwrap();
    temp_file.flush().unwrap();

    assert!(Config::from_file(temp_file.path()).is_err());
}

#[test]
fn test_load_from_path_fallback() {
    let config = Config::load_from_path("/nonexistent/config.toml");
    assert_eq!(config.destination_id(), "destination");
    assert_eq!(config.timezone(), "UTC");
    assert_eq!(config.config_file(), "default");
}

#[test]
fn test_oversized_livedata_ttl_rejected() {
    let mut temp_file = NamedTempFile::new().unwrap();
    temp_file
        .write_all(
            b"[destination]\nid = \"resort\"\ntimezone = \"UTC\"\n\n[cache]\nlivedata_ttl_days = 300000000000000\n",
        )
        .unwrap();
    temp_file.flush().unwrap();

    let config = Config::from_file(temp_file.path()).unwrap();

    assert!(config.validate().is_err());
}
