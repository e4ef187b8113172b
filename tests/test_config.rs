//! Configuration resolution integration tests
//!
//! The resolver is a pure function over a key lookup, so startup failure
//! modes are asserted without touching process-global environment state.

use beacond::config::{keys, resolve, Config, ConfigError, FileConfig, LogLevel, QosLevel};
use std::collections::HashMap;
use std::io::Write;
use std::time::Duration;

fn env_of(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[test]
fn test_missing_broker_url_aborts_before_any_connection() {
    // No URL anywhere: resolution fails, so the process never reaches
    // transport construction (main exits 1 on the resolver error).
    let result = resolve(&FileConfig::default(), &HashMap::new());

    match result {
        Err(ConfigError::MissingKey(key)) => assert_eq!(key, keys::MQTT_URL),
        other => panic!("expected MissingKey, got {other:?}"),
    }
}

#[test]
fn test_malformed_value_names_key_and_raw_value() {
    let env = env_of(&[
        (keys::MQTT_URL, "mqtt://localhost:1883"),
        (keys::HEARTBEAT_INTERVAL_SECS, "every-so-often"),
    ]);

    let err = resolve(&FileConfig::default(), &env).unwrap_err();
    let message = err.to_string();
    assert!(message.contains(keys::HEARTBEAT_INTERVAL_SECS));
    assert!(message.contains("every-so-often"));
}

#[test]
fn test_full_resolution_from_file_with_env_overrides() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"
[mqtt]
url = "mqtt://file-broker:1883"
username = "agent"
password = "secret"
qos = 0
keepalive_secs = 20

[node]
id = "file-node"
topic_prefix = "fleet"
heartbeat_interval_secs = 10.0
retain_status = false
client_id_prefix = "probe"
log_level = "debug"
"#
    )
    .unwrap();

    let parsed = FileConfig::load(file.path()).unwrap();
    let env = env_of(&[
        (keys::NODE_ID, "env-node"),
        (keys::QOS, "2"),
        (keys::LOG_LEVEL, "error"),
    ]);
    let config = resolve(&parsed, &env).unwrap();

    // Environment wins
    assert_eq!(config.node_id, "env-node");
    assert_eq!(config.qos, QosLevel::ExactlyOnce);
    assert_eq!(config.log_level, LogLevel::Error);
    // File fills the rest
    assert_eq!(config.broker_url, "mqtt://file-broker:1883");
    assert_eq!(config.username.as_deref(), Some("agent"));
    assert_eq!(config.topic_prefix, "fleet");
    assert_eq!(config.heartbeat_interval, Duration::from_secs(10));
    assert!(!config.retain_status);
    assert_eq!(config.client_id_prefix, "probe");
    assert_eq!(config.keepalive, Duration::from_secs(20));
}

#[test]
fn test_unreadable_config_file_is_fatal() {
    let result = FileConfig::load(std::path::Path::new("/nonexistent/beacond.toml"));
    assert!(matches!(result, Err(ConfigError::FileRead(_))));
}

#[test]
fn test_invalid_toml_is_fatal() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, "[mqtt\nurl = ").unwrap();

    let result = FileConfig::load(file.path());
    assert!(matches!(result, Err(ConfigError::TomlParse(_))));
}

#[test]
fn test_invalid_file_qos_is_fatal() {
    let file: FileConfig = toml::from_str(
        r#"
[mqtt]
url = "mqtt://localhost:1883"
qos = 7
"#,
    )
    .unwrap();

    let result = resolve(&file, &HashMap::new());
    assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
}

#[test]
fn test_defaults_match_documented_values() {
    let env = env_of(&[(keys::MQTT_URL, "mqtt://localhost:1883")]);
    let config = resolve(&FileConfig::default(), &env).unwrap();

    assert_eq!(config.topic_prefix, "nodes");
    assert_eq!(config.heartbeat_interval, Duration::from_secs(30));
    assert_eq!(config.qos, QosLevel::AtLeastOnce);
    assert!(config.retain_status);
    assert_eq!(config.client_id_prefix, "beacon");
    assert_eq!(config.keepalive, Duration::from_secs(60));
    assert_eq!(config.log_level, LogLevel::Info);
}

#[test]
fn test_resolved_config_round_trips_through_show_view() {
    let env = env_of(&[
        (keys::MQTT_URL, "mqtt://localhost:1883"),
        (keys::NODE_ID, "rack-7"),
    ]);
    let config: Config = resolve(&FileConfig::default(), &env).unwrap();

    let rendered = toml::to_string_pretty(&config.to_file_config()).unwrap();
    assert!(rendered.contains("rack-7"));
    assert!(rendered.contains("mqtt://localhost:1883"));
}
