//! MQTT implementation of the transport contract, built on rumqttc

pub mod client;
pub mod connection;

pub use client::MqttClient;
pub use connection::{LinkState, MqttError, ReconnectConfig};
