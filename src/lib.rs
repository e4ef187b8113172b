//! beacond - MQTT presence and heartbeat agent
//!
//! Maintains a persistent connection to an MQTT broker, announces this
//! node's online/offline state on a retained status topic backed by a
//! broker-side last-will, and publishes a periodic telemetry heartbeat.
//!
//! # Overview
//!
//! - Retained status on `{prefix}/{node_id}/status`: observers always see
//!   the latest state, and the broker publishes "offline" on our behalf if
//!   the process dies without a clean disconnect.
//! - Non-retained heartbeats on `{prefix}/{node_id}/heartbeat` carrying
//!   uptime, load, and memory telemetry.
//! - A lifecycle controller owning the connection state machine: connect,
//!   disconnect, reconnect, and signal-driven graceful shutdown.
//!
//! # Quick Start
//!
//! ```rust
//! use beacond::protocol::{NodeState, StatusPayload, TopicSet};
//!
//! let topics = TopicSet::new("nodes", "rack-7");
//! assert_eq!(topics.status, "nodes/rack-7/status");
//!
//! let status = StatusPayload::new(NodeState::Online);
//! let wire = serde_json::to_string(&status).unwrap();
//! assert!(wire.contains(r#""state":"online""#));
//! ```

pub mod agent;
pub mod config;
pub mod metrics;
pub mod observability;
pub mod protocol;
pub mod testing;
pub mod transport;

pub use agent::{AgentState, ControllerSettings, PresenceController, ShutdownOutcome};
pub use config::{Config, ConfigError, LogLevel, QosLevel};
pub use protocol::{HeartbeatPayload, NodeIdentity, NodeState, StatusPayload, TopicSet};
pub use transport::{LinkEvent, MqttTransport, Transport};
