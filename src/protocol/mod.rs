//! Wire-level types for the presence protocol
//!
//! Topic construction, node identity, and the two payloads this agent
//! publishes: the retained status message and the periodic heartbeat.

pub mod identity;
pub mod messages;
pub mod topics;

pub use identity::NodeIdentity;
pub use messages::{HeartbeatPayload, MemoryInfo, NodeState, StatusPayload};
pub use topics::{validate_node_id, TopicSet};
