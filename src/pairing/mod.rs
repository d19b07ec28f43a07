//! Pairing Status
//!
//! Process-wide record of where device pairing stands, broadcast to any number
//! of viewers (the pairing web page, its WebSocket clients). Viewers that fall
//! behind or go away are dropped instead of slowing the publisher down.

pub mod qr;
pub mod server;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::{Mutex, mpsc};
use uuid::Uuid;

/// Messages buffered per viewer before it is considered too slow.
const VIEWER_BUFFER: usize = 8;

pub type ViewerId = Uuid;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "code", rename_all = "snake_case")]
pub enum PairingStatus {
    /// No code issued yet
    #[default]
    Waiting,
    /// QR payload to scan from the phone
    Code(String),
    Connected,
    /// A different account scanned the code
    Mismatch,
    LoggedOut,
}

#[derive(Default)]
struct Broadcast {
    status: PairingStatus,
    viewers: HashMap<ViewerId, mpsc::Sender<PairingStatus>>,
}

#[derive(Default)]
pub struct PairingPublisher {
    inner: Mutex<Broadcast>,
}

impl PairingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a viewer. The current status is already queued on the receiver.
    pub async fn subscribe(&self) -> (ViewerId, mpsc::Receiver<PairingStatus>) {
        let (tx, rx) = mpsc::channel(VIEWER_BUFFER);
        let id = Uuid::new_v4();
        let mut inner = self.inner.lock().await;
        // fresh channel, cannot be full
        let _ = tx.try_send(inner.status.clone());
        inner.viewers.insert(id, tx);
        tracing::debug!("Pairing: viewer {} attached ({} total)", id, inner.viewers.len());
        (id, rx)
    }

    pub async fn unsubscribe(&self, id: ViewerId) {
        let mut inner = self.inner.lock().await;
        if inner.viewers.remove(&id).is_some() {
            tracing::debug!("Pairing: viewer {} detached", id);
        }
    }

    pub async fn publish(&self, status: PairingStatus) {
        let mut inner = self.inner.lock().await;
        inner.status = status.clone();
        inner.viewers.retain(|id, tx| match tx.try_send(status.clone()) {
            Ok(()) => true,
            Err(e) => {
                tracing::debug!("Pairing: dropping viewer {}: {}", id, e);
                false
            }
        });
    }

    pub async fn current(&self) -> PairingStatus {
        self.inner.lock().await.status.clone()
    }

    pub async fn viewer_count(&self) -> usize {
        self.inner.lock().await.viewers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscribe_receives_current_status() {
        let publisher = PairingPublisher::new();
        publisher.publish(PairingStatus::Code("2@abc".into())).await;

        let (_, mut rx) = publisher.subscribe().await;
        assert_eq!(rx.recv().await, Some(PairingStatus::Code("2@abc".into())));
    }

    #[tokio::test]
    async fn test_publish_reaches_all_viewers() {
        let publisher = PairingPublisher::new();
        let (_, mut a) = publisher.subscribe().await;
        let (_, mut b) = publisher.subscribe().await;
        publisher.publish(PairingStatus::Connected).await;

        for rx in [&mut a, &mut b] {
            assert_eq!(rx.recv().await, Some(PairingStatus::Waiting));
            assert_eq!(rx.recv().await, Some(PairingStatus::Connected));
        }
        assert_eq!(publisher.current().await, PairingStatus::Connected);
    }

    #[tokio::test]
    async fn test_slow_viewer_is_dropped() {
        let publisher = PairingPublisher::new();
        let (_, _slow) = publisher.subscribe().await;
        let (_, mut fast) = publisher.subscribe().await;

        for i in 0..VIEWER_BUFFER + 2 {
            publisher.publish(PairingStatus::Code(format!("code-{i}"))).await;
            while fast.try_recv().is_ok() {}
        }

        assert_eq!(publisher.viewer_count().await, 1);
    }

    #[tokio::test]
    async fn test_closed_viewer_is_dropped() {
        let publisher = PairingPublisher::new();
        let (_, rx) = publisher.subscribe().await;
        drop(rx);
        publisher.publish(PairingStatus::LoggedOut).await;
        assert_eq!(publisher.viewer_count().await, 0);
    }

    #[tokio::test]
    async fn test_unsubscribe() {
        let publisher = PairingPublisher::new();
        let (id, _rx) = publisher.subscribe().await;
        publisher.unsubscribe(id).await;
        assert_eq!(publisher.viewer_count().await, 0);
    }

    #[test]
    fn test_status_json() {
        assert_eq!(
            serde_json::to_string(&PairingStatus::Code("x".into())).unwrap(),
            r#"{"status":"code","code":"x"}"#
        );
        assert_eq!(
            serde_json::to_string(&PairingStatus::Mismatch).unwrap(),
            r#"{"status":"mismatch"}"#
        );
    }
}
