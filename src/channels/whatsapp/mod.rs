//! WhatsApp Integration
//!
//! [`Messenger`] implementation on top of `whatsapp-rust`, the agent that runs
//! the client and turns its events into [`ClientEvent`]s, and the SQLite
//! session store.

mod agent;
mod handler;
mod store;

pub use agent::WhatsAppAgent;
pub use store::SessionStore;

use super::{Messenger, OutboundDocument, PairingIdentity, SendReceipt, USER_SERVER};
use crate::error::{BotError, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use wacore::download::MediaType;
use wacore_binary::jid::Jid;
use waproto::whatsapp::Message;
use waproto::whatsapp::message::DocumentMessage;
use whatsapp_rust::client::Client;

/// Pause between announcing presence and sending.
const PRESENCE_DELAY: Duration = Duration::from_secs(1);

/// Build the user JID for a bare phone number.
fn user_jid(phone: &str) -> Result<Jid> {
    let phone = phone.trim().trim_start_matches('+');
    format!("{phone}@{USER_SERVER}")
        .parse::<Jid>()
        .map_err(|e| BotError::SendFailure {
            destination: phone.to_string(),
            reason: format!("invalid phone number: {e}"),
        })
}

/// Show the account as available, then pause before a send. A failed
/// announcement is logged and does not stop the send.
async fn announce_presence(announce: impl Future<Output = anyhow::Result<()>>) {
    if let Err(e) = announce.await {
        tracing::warn!("WhatsApp: could not announce presence: {}", e);
    }
    tokio::time::sleep(PRESENCE_DELAY).await;
}

/// Sends through the connected `whatsapp-rust` client.
///
/// The client handle is installed by [`WhatsAppAgent`] on the first event it
/// receives; sends before that fail with `SendFailure`.
pub struct WhatsAppMessenger {
    client: RwLock<Option<Arc<Client>>>,
    store: Arc<SessionStore>,
}

impl WhatsAppMessenger {
    pub fn new(store: Arc<SessionStore>) -> Self {
        Self {
            client: RwLock::new(None),
            store,
        }
    }

    pub(crate) async fn attach(&self, client: Arc<Client>) {
        let mut slot = self.client.write().await;
        if slot.is_none() {
            tracing::debug!("WhatsApp: client attached");
        }
        *slot = Some(client);
    }

    async fn client_for(&self, destination: &str) -> Result<Arc<Client>> {
        self.client
            .read()
            .await
            .clone()
            .ok_or_else(|| BotError::SendFailure {
                destination: destination.to_string(),
                reason: "not connected".to_string(),
            })
    }

    async fn deliver(&self, destination: &str, message: Message) -> Result<SendReceipt> {
        let client = self.client_for(destination).await?;
        let jid = user_jid(destination)?;

        announce_presence(client.presence().set_available()).await;

        let id = client
            .send_message(jid, message)
            .await
            .map_err(|e| BotError::SendFailure {
                destination: destination.to_string(),
                reason: e.to_string(),
            })?;
        Ok(SendReceipt {
            message_id: Some(id.to_string()),
        })
    }
}

#[async_trait]
impl Messenger for WhatsAppMessenger {
    async fn send_text(&self, destination: &str, body: &str) -> Result<SendReceipt> {
        let message = Message {
            conversation: Some(body.to_string()),
            ..Default::default()
        };
        self.deliver(destination, message).await
    }

    async fn send_document(
        &self,
        destination: &str,
        document: &OutboundDocument,
    ) -> Result<SendReceipt> {
        let client = self.client_for(destination).await?;
        let upload = client
            .upload(document.bytes.clone(), MediaType::Document)
            .await
            .map_err(|e| BotError::SendFailure {
                destination: destination.to_string(),
                reason: format!("upload failed: {e}"),
            })?;

        let thumbnail = document.thumbnail.as_ref();
        let message = Message {
            document_message: Some(Box::new(DocumentMessage {
                url: Some(upload.url),
                direct_path: Some(upload.direct_path),
                media_key: Some(upload.media_key),
                file_enc_sha256: Some(upload.file_enc_sha256),
                file_sha256: Some(upload.file_sha256),
                file_length: Some(upload.file_length),
                mimetype: Some(document.mime.clone()),
                file_name: Some(document.file_name.clone()),
                title: Some(document.file_name.clone()),
                caption: Some(document.caption.clone()),
                jpeg_thumbnail: thumbnail.map(|t| t.jpeg.clone()),
                thumbnail_width: thumbnail.map(|t| t.width),
                thumbnail_height: thumbnail.map(|t| t.height),
                ..Default::default()
            })),
            ..Default::default()
        };
        self.deliver(destination, message).await
    }

    async fn current_identity(&self) -> Option<PairingIdentity> {
        match self.store.paired_identity().await {
            Ok(identity) => identity,
            Err(e) => {
                tracing::error!("WhatsApp: cannot read paired identity: {}", e);
                None
            }
        }
    }

    async fn logout(&self) -> Result<()> {
        self.disconnect().await;
        self.store.clear().await
    }

    async fn clear_session(&self) -> Result<()> {
        self.store.clear().await
    }

    async fn disconnect(&self) {
        if let Some(client) = self.client.write().await.take() {
            client.disconnect().await;
            tracing::info!("WhatsApp: disconnected");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_jid() {
        let jid = user_jid("+521234").unwrap();
        assert_eq!(jid.to_string(), "521234@s.whatsapp.net");
    }

    #[tokio::test]
    async fn test_presence_failure_still_waits() {
        let started = std::time::Instant::now();
        announce_presence(async { Err(anyhow::anyhow!("no push name")) }).await;
        assert!(started.elapsed() >= PRESENCE_DELAY);
    }

    #[tokio::test]
    async fn test_send_before_connect_fails() {
        let store = Arc::new(SessionStore::in_memory().await.unwrap());
        let messenger = WhatsAppMessenger::new(store);
        let err = messenger.send_text("521234", "hola").await.unwrap_err();
        assert!(matches!(err, BotError::SendFailure { ref reason, .. } if reason == "not connected"));
        assert!(messenger.current_identity().await.is_none());
    }
}
