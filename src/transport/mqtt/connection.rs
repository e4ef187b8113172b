//! Pure connection setup for the MQTT client
//!
//! Option building, last-will construction, QoS mapping, link state, and
//! reconnect backoff policy. Nothing in this module performs I/O.

use crate::config::{Config, QosLevel};
use crate::protocol::{NodeIdentity, NodeState, StatusPayload, TopicSet};
use rumqttc::v5::mqttbytes::v5::LastWill;
use rumqttc::v5::mqttbytes::QoS;
use rumqttc::v5::MqttOptions;
use rumqttc::Transport as RumqttcTransport;
use thiserror::Error;
use url::Url;

/// Internal link state tracked by the event-loop supervisor
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkState {
    /// Initial state, dialing the broker
    Connecting,
    /// ConnAck received, link usable
    Up,
    /// Link lost with reason
    Down(String),
    /// Backoff sleep before the next attempt
    Reconnecting(u32),
}

impl LinkState {
    pub fn can_publish(&self) -> bool {
        matches!(self, LinkState::Up)
    }
}

/// Reconnect backoff: a short fixed pattern, then a sustained delay forever.
/// The broker outage, not this agent, decides how long we keep retrying.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Backoff pattern in milliseconds for the first attempts
    pub backoff_pattern: Vec<u64>,
    /// Delay used once the pattern is exhausted
    pub sustained_delay: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            backoff_pattern: vec![25, 50, 100, 250],
            sustained_delay: 250,
        }
    }
}

impl ReconnectConfig {
    /// Backoff delay for the given 1-based attempt number
    pub fn calculate_backoff_delay(&self, attempt: u32) -> u64 {
        if self.backoff_pattern.is_empty() {
            self.sustained_delay
        } else {
            let index = (attempt.saturating_sub(1)) as usize;
            if index < self.backoff_pattern.len() {
                self.backoff_pattern[index]
            } else {
                self.sustained_delay
            }
        }
    }
}

/// MQTT transport errors
#[derive(Debug, Error)]
pub enum MqttError {
    #[error("invalid broker URL: {0}")]
    InvalidBrokerUrl(String),
    #[error("connection failed")]
    ConnectionFailed(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("publishing failed")]
    PublishFailed(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("serialization error")]
    SerializationError(#[source] serde_json::Error),
    #[error("not connected - current link state: {state:?}")]
    NotConnected { state: LinkState },
    #[error("connection already started")]
    AlreadyStarted,
}

/// Map the configured delivery guarantee onto the rumqttc QoS type
pub fn to_mqtt_qos(level: QosLevel) -> QoS {
    match level {
        QosLevel::AtMostOnce => QoS::AtMostOnce,
        QosLevel::AtLeastOnce => QoS::AtLeastOnce,
        QosLevel::ExactlyOnce => QoS::ExactlyOnce,
    }
}

/// Build MQTT options from resolved configuration: client id, credentials,
/// keep-alive, TLS for mqtts:// URLs, and the last-will carrying a retained
/// offline status the broker publishes on our behalf if we vanish without a
/// clean disconnect.
pub fn configure_mqtt_options(
    config: &Config,
    identity: &NodeIdentity,
    topics: &TopicSet,
) -> Result<MqttOptions, MqttError> {
    let url = Url::parse(&config.broker_url)
        .map_err(|_| MqttError::InvalidBrokerUrl(config.broker_url.clone()))?;

    let host = url
        .host_str()
        .ok_or_else(|| MqttError::InvalidBrokerUrl(config.broker_url.clone()))?;
    let port = url
        .port()
        .unwrap_or(if url.scheme() == "mqtts" { 8883 } else { 1883 });

    let mut mqtt_options = MqttOptions::new(identity.client_id.clone(), host, port);

    if url.scheme() == "mqtts" {
        let transport = RumqttcTransport::tls_with_default_config();
        mqtt_options.set_transport(transport);
    }

    if let Some(username) = &config.username {
        let password = config.password.clone().unwrap_or_default();
        mqtt_options.set_credentials(username, password);
    }

    mqtt_options.set_keep_alive(config.keepalive);

    let lwt_payload = build_last_will_payload()?;
    let lwt = LastWill::new(
        &topics.status,
        lwt_payload,
        to_mqtt_qos(config.qos),
        config.retain_status,
        None,
    );
    mqtt_options.set_last_will(lwt);

    Ok(mqtt_options)
}

/// Serialized offline status handed to the broker as the last-will
fn build_last_will_payload() -> Result<Vec<u8>, MqttError> {
    let offline = StatusPayload::new(NodeState::Offline);
    serde_json::to_vec(&offline).map_err(MqttError::SerializationError)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{keys, resolve, FileConfig};
    use std::collections::HashMap;

    fn test_config(url: &str) -> Config {
        let env: HashMap<String, String> = [
            (keys::MQTT_URL.to_string(), url.to_string()),
            (keys::NODE_ID.to_string(), "test-node".to_string()),
        ]
        .into_iter()
        .collect();
        resolve(&FileConfig::default(), &env).unwrap()
    }

    fn test_setup(url: &str) -> (Config, NodeIdentity, TopicSet) {
        let config = test_config(url);
        let identity = NodeIdentity::test_identity(&config.node_id);
        let topics = TopicSet::new(&config.topic_prefix, &config.node_id);
        (config, identity, topics)
    }

    #[test]
    fn test_configure_mqtt_options() {
        let (config, identity, topics) = test_setup("mqtt://localhost:1883");
        let options = configure_mqtt_options(&config, &identity, &topics);
        assert!(options.is_ok());
    }

    #[test]
    fn test_invalid_broker_url() {
        let (mut config, identity, topics) = test_setup("mqtt://localhost:1883");
        config.broker_url = "not a url".to_string();

        let result = configure_mqtt_options(&config, &identity, &topics);
        assert!(matches!(result, Err(MqttError::InvalidBrokerUrl(_))));
    }

    #[test]
    fn test_url_without_host_is_rejected() {
        let (mut config, identity, topics) = test_setup("mqtt://localhost:1883");
        config.broker_url = "mqtt:///nohost".to_string();

        let result = configure_mqtt_options(&config, &identity, &topics);
        assert!(matches!(result, Err(MqttError::InvalidBrokerUrl(_))));
    }

    #[test]
    fn test_mqtts_url_accepted_with_default_port() {
        let (config, identity, topics) = test_setup("mqtts://broker.example");
        let options = configure_mqtt_options(&config, &identity, &topics);
        assert!(options.is_ok());
    }

    #[test]
    fn test_last_will_payload_is_offline_status() {
        let payload = build_last_will_payload().unwrap();
        let parsed: StatusPayload = serde_json::from_slice(&payload).unwrap();
        assert_eq!(parsed.state, NodeState::Offline);
    }

    #[test]
    fn test_qos_mapping() {
        assert_eq!(to_mqtt_qos(QosLevel::AtMostOnce), QoS::AtMostOnce);
        assert_eq!(to_mqtt_qos(QosLevel::AtLeastOnce), QoS::AtLeastOnce);
        assert_eq!(to_mqtt_qos(QosLevel::ExactlyOnce), QoS::ExactlyOnce);
    }

    #[test]
    fn test_backoff_pattern_then_sustained() {
        let config = ReconnectConfig::default();

        assert_eq!(config.calculate_backoff_delay(1), 25);
        assert_eq!(config.calculate_backoff_delay(2), 50);
        assert_eq!(config.calculate_backoff_delay(3), 100);
        assert_eq!(config.calculate_backoff_delay(4), 250);
        // Pattern exhausted, sustained forever
        assert_eq!(config.calculate_backoff_delay(5), 250);
        assert_eq!(config.calculate_backoff_delay(100), 250);
    }

    #[test]
    fn test_backoff_empty_pattern_uses_sustained() {
        let config = ReconnectConfig {
            backoff_pattern: vec![],
            sustained_delay: 500,
        };
        assert_eq!(config.calculate_backoff_delay(1), 500);
    }

    #[test]
    fn test_link_state_publish_guard() {
        assert!(LinkState::Up.can_publish());
        assert!(!LinkState::Connecting.can_publish());
        assert!(!LinkState::Down("gone".to_string()).can_publish());
        assert!(!LinkState::Reconnecting(3).can_publish());
    }
}
