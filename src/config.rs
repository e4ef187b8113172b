//! Configuration resolver for the presence agent
//!
//! Configuration is resolved per key with the precedence
//! environment variable > TOML config file > built-in default.
//! Resolution is a pure function over a key lookup so it can be tested
//! without mutating process-global environment state.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Environment variable names recognized by the resolver
pub mod keys {
    pub const MQTT_URL: &str = "BEACON_MQTT_URL";
    pub const MQTT_USERNAME: &str = "BEACON_MQTT_USERNAME";
    pub const MQTT_PASSWORD: &str = "BEACON_MQTT_PASSWORD";
    pub const NODE_ID: &str = "BEACON_NODE_ID";
    pub const TOPIC_PREFIX: &str = "BEACON_TOPIC_PREFIX";
    pub const HEARTBEAT_INTERVAL_SECS: &str = "BEACON_HEARTBEAT_INTERVAL_SECS";
    pub const QOS: &str = "BEACON_QOS";
    pub const RETAIN_STATUS: &str = "BEACON_RETAIN_STATUS";
    pub const CLIENT_ID_PREFIX: &str = "BEACON_CLIENT_ID_PREFIX";
    pub const KEEPALIVE_SECS: &str = "BEACON_KEEPALIVE_SECS";
    pub const LOG_LEVEL: &str = "BEACON_LOG_LEVEL";
}

const DEFAULT_TOPIC_PREFIX: &str = "nodes";
const DEFAULT_HEARTBEAT_INTERVAL_SECS: f64 = 30.0;
const DEFAULT_CLIENT_ID_PREFIX: &str = "beacon";
const DEFAULT_KEEPALIVE_SECS: u64 = 60;

/// MQTT delivery guarantee requested for published messages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QosLevel {
    /// Fire-and-forget (QoS 0)
    AtMostOnce,
    /// Acknowledged at least once (QoS 1)
    AtLeastOnce,
    /// Exactly-once handshake (QoS 2)
    ExactlyOnce,
}

impl QosLevel {
    pub fn as_u8(self) -> u8 {
        match self {
            QosLevel::AtMostOnce => 0,
            QosLevel::AtLeastOnce => 1,
            QosLevel::ExactlyOnce => 2,
        }
    }
}

/// Log verbosity recognized by the resolver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// Fully resolved runtime configuration, immutable after startup
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// MQTT broker URL (mqtt:// or mqtts://)
    pub broker_url: String,
    /// Optional broker credentials
    pub username: Option<String>,
    pub password: Option<String>,
    /// Node identifier; defaults to the host name
    pub node_id: String,
    /// Topic namespace shared by all nodes
    pub topic_prefix: String,
    /// Heartbeat cadence
    pub heartbeat_interval: Duration,
    /// Delivery guarantee for status messages and the last-will
    pub qos: QosLevel,
    /// Whether status messages (and the last-will) are retained
    pub retain_status: bool,
    /// Prefix for the generated MQTT client id
    pub client_id_prefix: String,
    /// MQTT keep-alive interval
    pub keepalive: Duration,
    /// Log verbosity
    pub log_level: LogLevel,
}

/// Configuration resolution errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required configuration: {0}")]
    MissingKey(&'static str),
    #[error("invalid value for {key}: {value:?} (expected {expected})")]
    InvalidValue {
        key: &'static str,
        value: String,
        expected: &'static str,
    },
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
}

/// Optional TOML config file contents; every key may be overridden by the
/// environment
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub mqtt: FileMqttSection,
    #[serde(default)]
    pub node: FileNodeSection,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct FileMqttSection {
    pub url: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub qos: Option<u8>,
    pub keepalive_secs: Option<u64>,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct FileNodeSection {
    pub id: Option<String>,
    pub topic_prefix: Option<String>,
    pub heartbeat_interval_secs: Option<f64>,
    pub retain_status: Option<bool>,
    pub client_id_prefix: Option<String>,
    pub log_level: Option<String>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }
}

impl Config {
    /// Resolve configuration from the process environment and an optional
    /// TOML file. Fails fast on any malformed value.
    pub fn load(file_path: Option<&Path>) -> Result<Self, ConfigError> {
        let file = match file_path {
            Some(path) => FileConfig::load(path)?,
            None => default_file_locations()
                .iter()
                .map(Path::new)
                .find(|p| p.exists())
                .map(FileConfig::load)
                .transpose()?
                .unwrap_or_default(),
        };

        let env: HashMap<String, String> = std::env::vars().collect();
        resolve(&file, &env)
    }

    /// Redacted view of the configuration for `config --show`
    pub fn to_file_config(&self) -> FileConfig {
        FileConfig {
            mqtt: FileMqttSection {
                url: Some(self.broker_url.clone()),
                username: self.username.clone(),
                password: self.password.as_ref().map(|_| "***".to_string()),
                qos: Some(self.qos.as_u8()),
                keepalive_secs: Some(self.keepalive.as_secs()),
            },
            node: FileNodeSection {
                id: Some(self.node_id.clone()),
                topic_prefix: Some(self.topic_prefix.clone()),
                heartbeat_interval_secs: Some(self.heartbeat_interval.as_secs_f64()),
                retain_status: Some(self.retain_status),
                client_id_prefix: Some(self.client_id_prefix.clone()),
                log_level: Some(self.log_level.as_str().to_string()),
            },
        }
    }
}

fn default_file_locations() -> [&'static str; 2] {
    ["beacond.toml", "config/beacond.toml"]
}

/// Pure per-key resolution: env > file > default
pub fn resolve(file: &FileConfig, env: &HashMap<String, String>) -> Result<Config, ConfigError> {
    let broker_url = env
        .get(keys::MQTT_URL)
        .cloned()
        .or_else(|| file.mqtt.url.clone())
        .filter(|u| !u.trim().is_empty())
        .ok_or(ConfigError::MissingKey(keys::MQTT_URL))?;

    let username = env
        .get(keys::MQTT_USERNAME)
        .cloned()
        .or_else(|| file.mqtt.username.clone());
    let password = env
        .get(keys::MQTT_PASSWORD)
        .cloned()
        .or_else(|| file.mqtt.password.clone());

    let node_id = match env.get(keys::NODE_ID).cloned().or_else(|| file.node.id.clone()) {
        Some(id) => id,
        None => host_name(),
    };

    let topic_prefix = env
        .get(keys::TOPIC_PREFIX)
        .cloned()
        .or_else(|| file.node.topic_prefix.clone())
        .unwrap_or_else(|| DEFAULT_TOPIC_PREFIX.to_string());
    validate_topic_prefix(&topic_prefix)?;

    let heartbeat_secs = match env.get(keys::HEARTBEAT_INTERVAL_SECS) {
        Some(raw) => parse_interval_secs(keys::HEARTBEAT_INTERVAL_SECS, raw)?,
        None => file
            .node
            .heartbeat_interval_secs
            .unwrap_or(DEFAULT_HEARTBEAT_INTERVAL_SECS),
    };
    if !heartbeat_secs.is_finite() || heartbeat_secs <= 0.0 {
        return Err(ConfigError::InvalidValue {
            key: keys::HEARTBEAT_INTERVAL_SECS,
            value: heartbeat_secs.to_string(),
            expected: "a finite number of seconds > 0",
        });
    }

    let qos = match env.get(keys::QOS) {
        Some(raw) => parse_qos(keys::QOS, raw)?,
        None => match file.mqtt.qos {
            Some(n) => qos_from_u8(keys::QOS, n)?,
            None => QosLevel::AtLeastOnce,
        },
    };

    let retain_status = match env.get(keys::RETAIN_STATUS) {
        Some(raw) => parse_bool_flag(keys::RETAIN_STATUS, raw)?,
        None => file.node.retain_status.unwrap_or(true),
    };

    let client_id_prefix = env
        .get(keys::CLIENT_ID_PREFIX)
        .cloned()
        .or_else(|| file.node.client_id_prefix.clone())
        .unwrap_or_else(|| DEFAULT_CLIENT_ID_PREFIX.to_string());
    if client_id_prefix.trim().is_empty() {
        return Err(ConfigError::InvalidValue {
            key: keys::CLIENT_ID_PREFIX,
            value: client_id_prefix,
            expected: "a non-empty prefix",
        });
    }

    let keepalive_secs = match env.get(keys::KEEPALIVE_SECS) {
        Some(raw) => parse_keepalive(keys::KEEPALIVE_SECS, raw)?,
        None => file.mqtt.keepalive_secs.unwrap_or(DEFAULT_KEEPALIVE_SECS),
    };
    if keepalive_secs == 0 {
        return Err(ConfigError::InvalidValue {
            key: keys::KEEPALIVE_SECS,
            value: keepalive_secs.to_string(),
            expected: "an integer number of seconds > 0",
        });
    }

    let log_level = match env
        .get(keys::LOG_LEVEL)
        .cloned()
        .or_else(|| file.node.log_level.clone())
    {
        Some(raw) => parse_log_level(keys::LOG_LEVEL, &raw)?,
        None => LogLevel::Info,
    };

    Ok(Config {
        broker_url,
        username,
        password,
        node_id,
        topic_prefix,
        heartbeat_interval: Duration::from_secs_f64(heartbeat_secs),
        qos,
        retain_status,
        client_id_prefix,
        keepalive: Duration::from_secs(keepalive_secs),
        log_level,
    })
}

fn host_name() -> String {
    gethostname::gethostname().to_string_lossy().into_owned()
}

/// Topic prefixes become MQTT topic segments and must not carry separators
/// at the edge or wildcard characters
fn validate_topic_prefix(prefix: &str) -> Result<(), ConfigError> {
    let invalid = prefix.is_empty()
        || prefix.starts_with('/')
        || prefix.ends_with('/')
        || prefix.contains('+')
        || prefix.contains('#');
    if invalid {
        return Err(ConfigError::InvalidValue {
            key: keys::TOPIC_PREFIX,
            value: prefix.to_string(),
            expected: "a non-empty prefix without wildcards or edge separators",
        });
    }
    Ok(())
}

fn parse_interval_secs(key: &'static str, raw: &str) -> Result<f64, ConfigError> {
    raw.trim()
        .parse::<f64>()
        .map_err(|_| ConfigError::InvalidValue {
            key,
            value: raw.to_string(),
            expected: "a finite number of seconds > 0",
        })
}

fn parse_keepalive(key: &'static str, raw: &str) -> Result<u64, ConfigError> {
    raw.trim()
        .parse::<u64>()
        .map_err(|_| ConfigError::InvalidValue {
            key,
            value: raw.to_string(),
            expected: "an integer number of seconds > 0",
        })
}

fn parse_qos(key: &'static str, raw: &str) -> Result<QosLevel, ConfigError> {
    let n = raw
        .trim()
        .parse::<u8>()
        .map_err(|_| ConfigError::InvalidValue {
            key,
            value: raw.to_string(),
            expected: "0, 1 or 2",
        })?;
    qos_from_u8(key, n)
}

fn qos_from_u8(key: &'static str, n: u8) -> Result<QosLevel, ConfigError> {
    match n {
        0 => Ok(QosLevel::AtMostOnce),
        1 => Ok(QosLevel::AtLeastOnce),
        2 => Ok(QosLevel::ExactlyOnce),
        _ => Err(ConfigError::InvalidValue {
            key,
            value: n.to_string(),
            expected: "0, 1 or 2",
        }),
    }
}

/// Accepts the common truthy/falsy spellings, case-insensitively
fn parse_bool_flag(key: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key,
            value: raw.to_string(),
            expected: "true/false, 1/0, yes/no or on/off",
        }),
    }
}

fn parse_log_level(key: &'static str, raw: &str) -> Result<LogLevel, ConfigError> {
    match raw.trim().to_lowercase().as_str() {
        "debug" => Ok(LogLevel::Debug),
        "info" => Ok(LogLevel::Info),
        "warn" => Ok(LogLevel::Warn),
        "error" => Ok(LogLevel::Error),
        _ => Err(ConfigError::InvalidValue {
            key,
            value: raw.to_string(),
            expected: "debug, info, warn or error",
        }),
    }
}
