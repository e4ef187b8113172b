//! Mock transport for testing the lifecycle controller without a broker
//!
//! Records every operation in call order so tests can assert shutdown and
//! publication ordering, and exposes switches for link status, publish
//! failure, and a disconnect that never completes.

use crate::config::QosLevel;
use crate::transport::{LinkEvent, Transport};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};

/// One recorded transport operation, in call order
#[derive(Debug, Clone, PartialEq)]
pub enum RecordedOp {
    Publish {
        topic: String,
        payload: Vec<u8>,
        qos: QosLevel,
        retain: bool,
    },
    Disconnect,
}

#[derive(Debug, Error)]
#[error("mock transport failure: {0}")]
pub struct MockTransportError(pub String);

/// Mock transport recording operations in order
#[derive(Debug, Default)]
pub struct MockTransport {
    ops: Mutex<Vec<RecordedOp>>,
    connected: AtomicBool,
    fail_publish: AtomicBool,
    hang_disconnect: bool,
    publish_attempts: AtomicUsize,
    event_tx: Mutex<Option<mpsc::Sender<LinkEvent>>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// A transport whose clean disconnect never completes
    pub fn with_hanging_disconnect() -> Self {
        Self {
            hang_disconnect: true,
            ..Default::default()
        }
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    pub fn set_fail_publish(&self, fail: bool) {
        self.fail_publish.store(fail, Ordering::SeqCst);
    }

    /// Snapshot of successful operations in call order
    pub async fn ops(&self) -> Vec<RecordedOp> {
        self.ops.lock().await.clone()
    }

    /// Successful publishes to one topic, in call order
    pub async fn publishes_to(&self, topic: &str) -> Vec<Vec<u8>> {
        self.ops
            .lock()
            .await
            .iter()
            .filter_map(|op| match op {
                RecordedOp::Publish {
                    topic: t, payload, ..
                } if t == topic => Some(payload.clone()),
                _ => None,
            })
            .collect()
    }

    /// Publish attempts including failed ones
    pub fn publish_attempts(&self) -> usize {
        self.publish_attempts.load(Ordering::SeqCst)
    }

    /// Inject a link event into the stream handed out by `connect`
    pub async fn emit(&self, event: LinkEvent) {
        let guard = self.event_tx.lock().await;
        if let Some(tx) = guard.as_ref() {
            tx.send(event).await.expect("event receiver dropped");
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    type Error = MockTransportError;

    async fn connect(&mut self) -> Result<mpsc::Receiver<LinkEvent>, Self::Error> {
        let (tx, rx) = mpsc::channel(32);
        *self.event_tx.lock().await = Some(tx);
        Ok(rx)
    }

    async fn publish(
        &self,
        topic: &str,
        payload: Vec<u8>,
        qos: QosLevel,
        retain: bool,
    ) -> Result<(), Self::Error> {
        self.publish_attempts.fetch_add(1, Ordering::SeqCst);

        if self.fail_publish.load(Ordering::SeqCst) {
            return Err(MockTransportError("publish rejected".to_string()));
        }

        self.ops.lock().await.push(RecordedOp::Publish {
            topic: topic.to_string(),
            payload,
            qos,
            retain,
        });
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), Self::Error> {
        self.ops.lock().await.push(RecordedOp::Disconnect);

        if self.hang_disconnect {
            std::future::pending::<()>().await;
        }

        self.set_connected(false);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}
