//! Transport layer for broker communication
//!
//! The lifecycle controller only consumes this contract; the MQTT
//! implementation lives in [`mqtt`]. The trait exists so the controller can
//! be driven by a test double without a broker.

use crate::config::QosLevel;
use tokio::sync::mpsc;

pub mod mqtt;

/// Link-level events surfaced to the lifecycle controller.
///
/// `Closed` and `Offline` both mean the link is gone and trigger the same
/// transition; they are distinct so logs can tell a broker-initiated
/// DISCONNECT from network loss.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// Broker acknowledged the connection (initial connect or reconnect)
    Connected,
    /// A reconnection attempt is starting
    Reconnecting { attempt: u32 },
    /// Broker closed the connection deliberately
    Closed { reason: String },
    /// Network error dropped the connection
    Offline { reason: String },
    /// Transport-level error that does not by itself change the link state
    Error(String),
}

/// Broker client contract consumed by the lifecycle controller
#[async_trait::async_trait]
pub trait Transport: Send + Sync + 'static {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Start the connection machinery and return the link event stream.
    ///
    /// Errors only on setup problems (e.g. an unparseable broker URL);
    /// broker unavailability is retried indefinitely behind the scenes and
    /// reported through the event stream.
    async fn connect(&mut self) -> Result<mpsc::Receiver<LinkEvent>, Self::Error>;

    /// Publish a payload; fails if the link is down or the transport rejects
    async fn publish(
        &self,
        topic: &str,
        payload: Vec<u8>,
        qos: QosLevel,
        retain: bool,
    ) -> Result<(), Self::Error>;

    /// Clean disconnect; the broker suppresses the last-will on this path
    async fn disconnect(&self) -> Result<(), Self::Error>;

    /// Synchronous link status read
    fn is_connected(&self) -> bool;
}

/// Type alias for the production transport
pub type MqttTransport = mqtt::MqttClient;
