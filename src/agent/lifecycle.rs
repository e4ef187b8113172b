//! Connection-lifecycle state machine for the presence agent
//!
//! The controller owns the node's logical state, reacts to transport link
//! events, and drives status publication and heartbeat scheduling. It is
//! reentered only through one `run()` loop consuming link events, timer
//! effects, and the shutdown channel, so handlers never run concurrently
//! for a node.
//!
//! Transition table:
//!
//! | Current      | Event                  | Action                                  | Next         |
//! |--------------|------------------------|-----------------------------------------|--------------|
//! | Disconnected | `Connected`            | publish retained online; start heartbeat| Connected    |
//! | Connected    | `Closed` / `Offline`   | stop heartbeat timer                    | Disconnected |
//! | Connected    | `Connected` again      | log only                                | Connected    |
//! | any          | `Reconnecting`/`Error` | log only                                | unchanged    |
//! | any          | shutdown signal        | shutdown sequence                       | ShuttingDown |
//! | ShuttingDown | anything               | ignored                                 | ShuttingDown |

use crate::config::{Config, QosLevel};
use crate::metrics::SystemSample;
use crate::protocol::{HeartbeatPayload, NodeIdentity, NodeState, StatusPayload, TopicSet};
use crate::transport::{LinkEvent, Transport};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Default hard deadline for the shutdown sequence
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(3);

/// Logical state of the node, owned exclusively by the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentState {
    Disconnected,
    Connected,
    ShuttingDown,
}

/// How the shutdown sequence ended. The process exits 0 either way; the
/// expired-deadline case is surfaced so it can be logged and tested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownOutcome {
    Clean,
    GraceDeadlineExpired,
}

/// Controller knobs derived from configuration
#[derive(Debug, Clone)]
pub struct ControllerSettings {
    pub heartbeat_interval: Duration,
    /// Delivery guarantee for status messages; heartbeats are always
    /// fire-and-forget (a lost tick is replaced by the next one)
    pub status_qos: QosLevel,
    pub retain_status: bool,
    pub shutdown_grace: Duration,
}

impl ControllerSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            heartbeat_interval: config.heartbeat_interval,
            status_qos: config.qos,
            retain_status: config.retain_status,
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
        }
    }
}

/// Lifecycle controller: THE owner of the connection handle, the agent
/// state, and the heartbeat timer
pub struct PresenceController<T: Transport> {
    identity: NodeIdentity,
    topics: TopicSet,
    settings: ControllerSettings,
    transport: Arc<T>,
    state: AgentState,
    heartbeat: Option<JoinHandle<()>>,
}

impl<T: Transport> PresenceController<T> {
    pub fn new(
        identity: NodeIdentity,
        topics: TopicSet,
        settings: ControllerSettings,
        transport: Arc<T>,
    ) -> Self {
        Self {
            identity,
            topics,
            settings,
            transport,
            state: AgentState::Disconnected,
            heartbeat: None,
        }
    }

    pub fn state(&self) -> AgentState {
        self.state
    }

    pub fn heartbeat_running(&self) -> bool {
        self.heartbeat.is_some()
    }

    /// Drive the state machine until a shutdown signal arrives. Link events
    /// and shutdown requests are serialized through this loop; repeated
    /// shutdown signals after the first are never read because the loop
    /// returns on the first one.
    pub async fn run(
        mut self,
        mut events: mpsc::Receiver<LinkEvent>,
        mut shutdown: mpsc::Receiver<()>,
    ) -> ShutdownOutcome {
        info!(
            node_id = %self.identity.node_id,
            client_id = %self.identity.client_id,
            "presence controller running"
        );

        loop {
            tokio::select! {
                Some(event) = events.recv() => {
                    self.handle_event(event).await;
                }
                Some(()) = shutdown.recv() => {
                    return self.shutdown().await;
                }
                else => {
                    warn!("event and shutdown channels closed, shutting down");
                    return self.shutdown().await;
                }
            }
        }
    }

    /// Apply one link event to the state machine
    pub async fn handle_event(&mut self, event: LinkEvent) {
        match event {
            LinkEvent::Connected => match self.state {
                AgentState::Disconnected => {
                    info!(node_id = %self.identity.node_id, "broker connected, announcing online");
                    // Online status is issued before the heartbeat timer
                    // starts; a publish failure is transient and must not
                    // block the heartbeat loop.
                    if let Err(e) = self.publish_status(NodeState::Online).await {
                        warn!(error = %e, "failed to publish online status");
                    }
                    self.start_heartbeat();
                    self.state = AgentState::Connected;
                }
                AgentState::Connected => {
                    debug!("connect event while already connected");
                }
                AgentState::ShuttingDown => {
                    debug!("ignoring connect event during shutdown");
                }
            },
            LinkEvent::Closed { reason } | LinkEvent::Offline { reason } => match self.state {
                AgentState::Connected => {
                    warn!(reason = %reason, "broker connection lost");
                    self.stop_heartbeat();
                    self.state = AgentState::Disconnected;
                }
                AgentState::Disconnected => {
                    debug!(reason = %reason, "link went down while already disconnected");
                }
                AgentState::ShuttingDown => {}
            },
            LinkEvent::Reconnecting { attempt } => {
                info!(attempt, "reconnecting to broker");
            }
            LinkEvent::Error(e) => {
                warn!(error = %e, "transport error");
            }
        }
    }

    /// Shutdown sequence: mark ShuttingDown, stop the heartbeat timer,
    /// publish a retained offline status while still connected, then request
    /// a clean disconnect. The whole teardown races a grace deadline so a
    /// stuck disconnect can never block process exit.
    pub async fn shutdown(&mut self) -> ShutdownOutcome {
        if self.state == AgentState::ShuttingDown {
            debug!("shutdown already in progress, ignoring");
            return ShutdownOutcome::Clean;
        }
        info!(node_id = %self.identity.node_id, "shutdown initiated");
        self.state = AgentState::ShuttingDown;
        self.stop_heartbeat();

        let transport = self.transport.clone();
        let topics = self.topics.clone();
        let settings = self.settings.clone();
        let teardown = async move {
            if transport.is_connected() {
                match Self::publish_status_on(&transport, &topics, &settings, NodeState::Offline)
                    .await
                {
                    Ok(()) => info!("offline status published"),
                    Err(e) => warn!(error = %e, "failed to publish offline status"),
                }
            }
            if let Err(e) = transport.disconnect().await {
                warn!(error = %e, "clean disconnect failed");
            }
        };

        match tokio::time::timeout(self.settings.shutdown_grace, teardown).await {
            Ok(()) => {
                info!("shutdown complete");
                ShutdownOutcome::Clean
            }
            Err(_) => {
                warn!(
                    grace_secs = self.settings.shutdown_grace.as_secs_f64(),
                    "shutdown grace deadline expired before disconnect completed"
                );
                ShutdownOutcome::GraceDeadlineExpired
            }
        }
    }

    async fn publish_status(&self, state: NodeState) -> Result<(), T::Error> {
        Self::publish_status_on(&self.transport, &self.topics, &self.settings, state).await
    }

    async fn publish_status_on(
        transport: &Arc<T>,
        topics: &TopicSet,
        settings: &ControllerSettings,
        state: NodeState,
    ) -> Result<(), T::Error> {
        let payload = StatusPayload::new(state);
        let bytes = match serde_json::to_vec(&payload) {
            Ok(bytes) => bytes,
            Err(e) => {
                error!(error = %e, "failed to serialize status payload");
                return Ok(());
            }
        };
        transport
            .publish(
                &topics.status,
                bytes,
                settings.status_qos,
                settings.retain_status,
            )
            .await
    }

    fn start_heartbeat(&mut self) {
        // At most one timer exists at any time
        self.stop_heartbeat();
        let handle = Self::spawn_heartbeat_task(
            self.transport.clone(),
            self.identity.clone(),
            self.topics.heartbeat.clone(),
            self.settings.heartbeat_interval,
        );
        self.heartbeat = Some(handle);
        debug!(
            interval_secs = self.settings.heartbeat_interval.as_secs_f64(),
            "heartbeat timer started"
        );
    }

    fn stop_heartbeat(&mut self) {
        if let Some(handle) = self.heartbeat.take() {
            handle.abort();
            debug!("heartbeat timer stopped");
        }
    }

    /// Publish a heartbeat at the configured interval while the link is up.
    /// A failed publish is logged and swallowed; the next tick tries again.
    fn spawn_heartbeat_task(
        transport: Arc<T>,
        identity: NodeIdentity,
        topic: String,
        interval: Duration,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await; // first tick completes immediately, skip it

            loop {
                ticker.tick().await;

                // The timer is cancelled on disconnect, but a tick can land
                // in the gap before cancellation; never publish into a dead
                // link.
                if !transport.is_connected() {
                    debug!("skipping heartbeat, link is down");
                    continue;
                }

                let sample = SystemSample::take();
                let payload = HeartbeatPayload::new(&identity, &sample);
                let bytes = match serde_json::to_vec(&payload) {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        error!(error = %e, "failed to serialize heartbeat");
                        continue;
                    }
                };

                match transport
                    .publish(&topic, bytes, QosLevel::AtMostOnce, false)
                    .await
                {
                    Ok(()) => {
                        debug!(node_id = %identity.node_id, "heartbeat published");
                    }
                    Err(e) => {
                        warn!(error = %e, "heartbeat publish failed");
                    }
                }
            }
        })
    }
}

impl<T: Transport> Drop for PresenceController<T> {
    fn drop(&mut self) {
        self.stop_heartbeat();
    }
}
