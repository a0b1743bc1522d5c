//! Integration test for programmatic configuration
//!
//! Tests that drivers can be configured entirely in code without TOML files.

use std::path::PathBuf;
use threaded_source_core::{AckTracking, FetchSettings, ReopenSettings, SourceConfig};

#[test]
fn test_programmatic_source_config() {
    let config = SourceConfig {
        id: "journal".to_string(),
        group: "system".to_string(),
        reopen: ReopenSettings {
            time_reopen_secs: 5,
        },
        fetch: FetchSettings {
            fetch_limit: 50,
            init_window_size: 500,
            follow_freq_ms: Some(250),
            ack_tracking: AckTracking::Consecutive,
        },
        persist_file: Some(PathBuf::from("/var/lib/sources/positions.json")),
        log_level: "debug".to_string(),
    };

    assert!(config.validate().is_ok());
    assert_eq!(config.reopen.time_reopen().as_secs(), 5);
    assert_eq!(config.default_persist_name(), "system:journal:LogThreadedSource");
}

#[test]
fn test_config_builder_pattern() {
    let mut config = SourceConfig::new("files");
    config.fetch.fetch_limit = 1;
    config.fetch.init_window_size = 1;
    config.reopen.time_reopen_secs = 1;

    assert!(config.validate().is_ok());
    assert_eq!(config.group, "default");
    assert_eq!(config.fetch.ack_tracking, AckTracking::Instant);
    assert!(config.persist_file.is_none());
}

#[test]
fn test_invalid_settings_rejected() {
    let mut config = SourceConfig::new("files");
    config.reopen.time_reopen_secs = 0;
    assert!(config.validate().unwrap_err().is_configuration());

    let mut config = SourceConfig::new("files");
    config.fetch.init_window_size = 0;
    assert!(config.validate().is_err());

    let mut config = SourceConfig::new("files");
    config.fetch.follow_freq_ms = Some(0);
    assert!(config.validate().is_err());

    let config = SourceConfig::new("");
    assert!(config.validate().is_err());
}

#[test]
fn test_config_from_toml_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("source.toml");
    std::fs::write(
        &path,
        r#"
id = "tail"
group = "web"
persist_file = "/tmp/positions.json"

[reopen]
time_reopen_secs = 10

[fetch]
fetch_limit = 20
follow_freq_ms = 1000
ack_tracking = "consecutive"
"#,
    )
    .unwrap();

    let config = SourceConfig::from_file(path.to_str().unwrap()).unwrap();
    assert_eq!(config.id, "tail");
    assert_eq!(config.group, "web");
    assert_eq!(config.reopen.time_reopen_secs, 10);
    assert_eq!(config.fetch.fetch_limit, 20);
    assert_eq!(config.fetch.init_window_size, 100);
    assert_eq!(config.fetch.follow_freq_ms, Some(1000));
    assert_eq!(config.fetch.ack_tracking, AckTracking::Consecutive);
    assert_eq!(config.log_level, "info");
}

#[test]
fn test_missing_config_file() {
    let err = SourceConfig::from_file("/nonexistent/source.toml").unwrap_err();
    assert!(err.is_configuration());
}
