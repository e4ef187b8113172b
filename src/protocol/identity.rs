//! Node identity, fixed for the lifetime of the process

use crate::config::Config;

/// Immutable identity of this node on the bus
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeIdentity {
    /// Logical node name shared across restarts
    pub node_id: String,
    /// MQTT client id, unique per process instance
    pub client_id: String,
    /// Agent version reported in heartbeats
    pub version: String,
}

impl NodeIdentity {
    /// Derive the identity from resolved configuration. The client id gets a
    /// random suffix so restarts never collide with a broker session still
    /// held open for the previous incarnation.
    pub fn from_config(config: &Config) -> Self {
        let suffix = short_suffix();
        Self {
            node_id: config.node_id.clone(),
            client_id: format!("{}-{}-{}", config.client_id_prefix, config.node_id, suffix),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    #[cfg(test)]
    pub fn test_identity(node_id: &str) -> Self {
        Self {
            node_id: node_id.to_string(),
            client_id: format!("beacon-{node_id}-deadbeef"),
            version: "0.0.0-test".to_string(),
        }
    }
}

/// Eight hex characters of a v4 UUID: collision-resistant enough for client
/// ids, computed once at construction time
fn short_suffix() -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    id[..8].to_string()
}
