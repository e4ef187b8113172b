//! MQTT client I/O: rumqttc wiring and the event-loop supervisor task
//!
//! The supervisor owns the rumqttc event loop, translates packet-level
//! events into [`LinkEvent`]s for the lifecycle controller, and sleeps the
//! configured backoff between reconnection attempts. rumqttc re-dials on the
//! next poll after an error, so reconnection is simply "keep polling".

use super::connection::{configure_mqtt_options, to_mqtt_qos, LinkState, MqttError, ReconnectConfig};
use crate::config::{Config, QosLevel};
use crate::protocol::{NodeIdentity, TopicSet};
use crate::transport::{LinkEvent, Transport};
use async_trait::async_trait;
use rumqttc::v5::mqttbytes::v5::Packet;
use rumqttc::v5::{AsyncClient, Event, EventLoop};
use rumqttc::Outgoing;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// How long a clean disconnect waits for the supervisor task to wind down
const SUPERVISOR_JOIN_TIMEOUT: Duration = Duration::from_secs(2);

/// MQTT transport for the presence agent
pub struct MqttClient {
    client: AsyncClient,
    event_loop: Mutex<Option<EventLoop>>,
    client_id: String,
    link_tx: watch::Sender<LinkState>,
    link_rx: watch::Receiver<LinkState>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
    supervisor: Mutex<Option<JoinHandle<()>>>,
    reconnect: ReconnectConfig,
}

impl MqttClient {
    /// Build the client from resolved configuration. The last-will (retained
    /// offline status on the status topic) is registered here, before any
    /// connection attempt.
    pub fn new(
        config: &Config,
        identity: &NodeIdentity,
        topics: &TopicSet,
    ) -> Result<Self, MqttError> {
        let mqtt_options = configure_mqtt_options(config, identity, topics)?;
        let (client, event_loop) = AsyncClient::new(mqtt_options, 10);

        let (link_tx, link_rx) = watch::channel(LinkState::Connecting);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        Ok(Self {
            client,
            event_loop: Mutex::new(Some(event_loop)),
            client_id: identity.client_id.clone(),
            link_tx,
            link_rx,
            shutdown_tx,
            shutdown_rx,
            supervisor: Mutex::new(None),
            reconnect: ReconnectConfig::default(),
        })
    }

    /// Current link state
    pub fn link_state(&self) -> LinkState {
        self.link_rx.borrow().clone()
    }

    /// Sleep between reconnection attempts, cut short by shutdown.
    /// Returns false if shutdown was requested during the sleep.
    async fn interruptible_sleep(mut shutdown_rx: watch::Receiver<bool>, delay_ms: u64) -> bool {
        tokio::select! {
            _ = shutdown_rx.changed() => !*shutdown_rx.borrow(),
            _ = tokio::time::sleep(Duration::from_millis(delay_ms)) => true,
        }
    }

    /// Event-loop supervisor: polls rumqttc, forwards link events, and
    /// paces reconnection. Exits on shutdown once the link is released, or
    /// when the controller drops the event receiver.
    async fn run_supervisor(
        mut event_loop: EventLoop,
        client_id: String,
        link_tx: watch::Sender<LinkState>,
        mut shutdown_rx: watch::Receiver<bool>,
        events: mpsc::Sender<LinkEvent>,
        reconnect: ReconnectConfig,
    ) {
        info!(client_id = %client_id, "starting MQTT event loop");
        let mut attempts = 0u32;

        loop {
            tokio::select! {
                // A shutdown request does not break the loop by itself: we
                // keep polling so the outgoing DISCONNECT packet gets
                // flushed, and exit on the resulting link teardown below.
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        debug!(client_id = %client_id, "shutdown requested, draining event loop");
                    }
                }

                polled = event_loop.poll() => match polled {
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        attempts = 0;
                        let _ = link_tx.send(LinkState::Up);
                        info!(client_id = %client_id, "broker connection acknowledged");
                        if events.send(LinkEvent::Connected).await.is_err() {
                            break;
                        }
                    }
                    Ok(Event::Incoming(Packet::Disconnect(_))) => {
                        let reason = "broker sent DISCONNECT".to_string();
                        let _ = link_tx.send(LinkState::Down(reason.clone()));
                        if *shutdown_rx.borrow() {
                            break;
                        }
                        if events.send(LinkEvent::Closed { reason }).await.is_err() {
                            break;
                        }
                    }
                    Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                        if *shutdown_rx.borrow() {
                            let _ = link_tx.send(LinkState::Down("client disconnected".to_string()));
                            break;
                        }
                    }
                    Ok(_) => {}
                    Err(e) => {
                        let reason = e.to_string();
                        let _ = link_tx.send(LinkState::Down(reason.clone()));
                        if *shutdown_rx.borrow() {
                            break;
                        }
                        warn!(client_id = %client_id, error = %reason, "MQTT event loop error");
                        if events.send(LinkEvent::Offline { reason }).await.is_err() {
                            break;
                        }

                        attempts += 1;
                        let delay_ms = reconnect.calculate_backoff_delay(attempts);
                        let _ = link_tx.send(LinkState::Reconnecting(attempts));
                        if events
                            .send(LinkEvent::Reconnecting { attempt: attempts })
                            .await
                            .is_err()
                        {
                            break;
                        }
                        if !Self::interruptible_sleep(shutdown_rx.clone(), delay_ms).await {
                            break;
                        }
                    }
                }
            }
        }

        info!(client_id = %client_id, "MQTT event loop stopped");
    }
}

#[async_trait]
impl Transport for MqttClient {
    type Error = MqttError;

    async fn connect(&mut self) -> Result<mpsc::Receiver<LinkEvent>, Self::Error> {
        let event_loop = self
            .event_loop
            .get_mut()
            .take()
            .ok_or(MqttError::AlreadyStarted)?;

        let (event_tx, event_rx) = mpsc::channel(32);
        let handle = tokio::spawn(Self::run_supervisor(
            event_loop,
            self.client_id.clone(),
            self.link_tx.clone(),
            self.shutdown_rx.clone(),
            event_tx,
            self.reconnect.clone(),
        ));
        *self.supervisor.lock().await = Some(handle);

        Ok(event_rx)
    }

    async fn publish(
        &self,
        topic: &str,
        payload: Vec<u8>,
        qos: QosLevel,
        retain: bool,
    ) -> Result<(), Self::Error> {
        let state = self.link_state();
        if !state.can_publish() {
            return Err(MqttError::NotConnected { state });
        }

        self.client
            .publish(topic, to_mqtt_qos(qos), retain, payload)
            .await
            .map_err(|e| MqttError::PublishFailed(Box::new(e)))
    }

    async fn disconnect(&self) -> Result<(), Self::Error> {
        // Flag first so the supervisor stops reconnecting, but keeps polling
        // long enough to flush the DISCONNECT packet (which tells the broker
        // to suppress the last-will).
        let _ = self.shutdown_tx.send(true);

        let disconnect_result = self
            .client
            .disconnect()
            .await
            .map_err(|e| MqttError::ConnectionFailed(Box::new(e)));

        if let Some(mut handle) = self.supervisor.lock().await.take() {
            match tokio::time::timeout(SUPERVISOR_JOIN_TIMEOUT, &mut handle).await {
                Ok(Ok(())) => debug!("event loop task shut down gracefully"),
                Ok(Err(e)) if !e.is_cancelled() => {
                    warn!(error = %e, "event loop task ended with error");
                }
                Err(_) => {
                    warn!("event loop task did not shut down in time, aborting");
                    handle.abort();
                }
                _ => {}
            }
        }

        info!("MQTT client disconnected");
        disconnect_result
    }

    fn is_connected(&self) -> bool {
        self.link_rx.borrow().can_publish()
    }
}
