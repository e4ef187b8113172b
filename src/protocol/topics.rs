//! Topic construction for the presence protocol
//!
//! Topics follow the pattern `{prefix}/{node_id}/status` and
//! `{prefix}/{node_id}/heartbeat`. Two live nodes must never share a node id
//! under the same prefix or their retained status messages collide.

use crate::config::ConfigError;

/// Status and heartbeat topics for one node, derived once at startup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicSet {
    pub status: String,
    pub heartbeat: String,
}

impl TopicSet {
    pub fn new(prefix: &str, node_id: &str) -> Self {
        Self {
            status: format!("{prefix}/{node_id}/status"),
            heartbeat: format!("{prefix}/{node_id}/heartbeat"),
        }
    }
}

/// Node ids become topic segments and must match `[a-zA-Z0-9._-]+` so they
/// cannot introduce separators or wildcards into the topic tree
pub fn validate_node_id(node_id: &str) -> Result<(), ConfigError> {
    let valid_chars = node_id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-');

    if node_id.is_empty() || !valid_chars {
        return Err(ConfigError::InvalidValue {
            key: crate::config::keys::NODE_ID,
            value: node_id.to_string(),
            expected: "a node id matching [a-zA-Z0-9._-]+",
        });
    }

    Ok(())
}
