//! Status and heartbeat payloads
//!
//! Both builders are pure: the status payload stamps the wall clock, the
//! heartbeat payload combines identity with a metrics sample taken by the
//! caller. Serialization is plain JSON via serde.

use crate::metrics::SystemSample;
use crate::protocol::NodeIdentity;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Online/offline state carried by the retained status message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeState {
    Online,
    Offline,
}

/// Retained status message: `{"state":"online","ts":"..."}`
///
/// The broker serves the most recent status to every new subscriber, so this
/// is the durable record of whether the node is up.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusPayload {
    pub state: NodeState,
    pub ts: DateTime<Utc>,
}

impl StatusPayload {
    pub fn new(state: NodeState) -> Self {
        Self {
            state,
            ts: Utc::now(),
        }
    }
}

/// Memory snapshot inside a heartbeat, in bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryInfo {
    pub total: u64,
    pub free: u64,
}

/// Periodic liveness/telemetry message, never retained: a late subscriber
/// only sees the retained status until the next live heartbeat arrives
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatPayload {
    pub ts: DateTime<Utc>,
    pub node_id: String,
    pub uptime_sec: u64,
    pub load_avg: [f64; 3],
    pub mem: MemoryInfo,
    pub pid: u32,
    pub version: String,
}

impl HeartbeatPayload {
    pub fn new(identity: &NodeIdentity, sample: &SystemSample) -> Self {
        Self {
            ts: Utc::now(),
            node_id: identity.node_id.clone(),
            uptime_sec: sample.uptime_secs,
            load_avg: sample.load_avg,
            mem: MemoryInfo {
                total: sample.mem_total,
                free: sample.mem_free,
            },
            pid: sample.pid,
            version: identity.version.clone(),
        }
    }
}
