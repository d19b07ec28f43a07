//! Session Lifecycle Monitor
//!
//! Watches connection events, makes sure the paired account is the one this
//! process was started for, and ends the session when it is not or when the
//! phone unlinks the device.

use super::{ClientEvent, InboundMessage, Messenger, PairingIdentity};
use crate::error::{BotError, Result, TerminationReason};
use crate::pairing::{PairingPublisher, PairingStatus};
use std::sync::Arc;

pub struct LifecycleMonitor {
    expected: PairingIdentity,
    publisher: Arc<PairingPublisher>,
    messenger: Arc<dyn Messenger>,
}

impl LifecycleMonitor {
    pub fn new(
        expected: PairingIdentity,
        publisher: Arc<PairingPublisher>,
        messenger: Arc<dyn Messenger>,
    ) -> Self {
        Self {
            expected,
            publisher,
            messenger,
        }
    }

    /// Handle one event.
    ///
    /// Returns the message when it is a command for the router, `Ok(None)` when
    /// there is nothing further to do, and `SessionTerminated` when the process
    /// must stop and the device be paired again.
    pub async fn handle(&self, event: ClientEvent) -> Result<Option<InboundMessage>> {
        match event {
            ClientEvent::Connected => self.verify_identity().await.map(|_| None),
            ClientEvent::Disconnected => self.terminate(TerminationReason::Disconnected).await,
            ClientEvent::LoggedOut => self.terminate(TerminationReason::LoggedOut).await,
            ClientEvent::MessageReceived(message) => {
                if !message.body.is_empty() && message.is_command() {
                    Ok(Some(message))
                } else {
                    Ok(None)
                }
            }
        }
    }

    async fn verify_identity(&self) -> Result<()> {
        let reported = self.messenger.current_identity().await;
        if reported.as_ref() == Some(&self.expected) {
            tracing::info!("WhatsApp: connected as {}", self.expected);
            self.publisher.publish(PairingStatus::Connected).await;
            return Ok(());
        }

        let reported = reported.map_or_else(|| "unknown".to_string(), |id| id.to_string());
        tracing::error!(
            "WhatsApp: paired with {} but expected {}, logging out",
            reported,
            self.expected
        );
        self.publisher.publish(PairingStatus::Mismatch).await;
        if let Err(e) = self.messenger.logout().await {
            tracing::error!("WhatsApp: logout after identity mismatch failed: {}", e);
        }
        Err(BotError::SessionTerminated(TerminationReason::IdentityMismatch {
            expected: self.expected.to_string(),
            reported,
        }))
    }

    async fn terminate(&self, reason: TerminationReason) -> Result<Option<InboundMessage>> {
        tracing::warn!("WhatsApp: session ended ({}), clearing credentials", reason);
        if let Err(e) = self.messenger.clear_session().await {
            tracing::error!("WhatsApp: failed to clear session: {}", e);
        }
        self.publisher.publish(PairingStatus::LoggedOut).await;
        Err(BotError::SessionTerminated(reason))
    }
}
