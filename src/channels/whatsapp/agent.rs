//! WhatsApp Agent
//!
//! Builds and runs the `whatsapp-rust` bot. Pairing codes go to the pairing
//! publisher and the terminal; everything the bot reacts to is queued as a
//! [`ClientEvent`] for the single event worker.

use super::{SessionStore, WhatsAppMessenger, handler};
use crate::channels::ClientEvent;
use crate::pairing::{PairingPublisher, PairingStatus, qr};
use crate::utils::preview;
use anyhow::anyhow;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use wacore::types::events::Event;
use whatsapp_rust::bot::Bot;
use whatsapp_rust_tokio_transport::TokioWebSocketTransportFactory;
use whatsapp_rust_ureq_http_client::UreqHttpClient;

pub struct WhatsAppAgent {
    store: Arc<SessionStore>,
    messenger: Arc<WhatsAppMessenger>,
    publisher: Arc<PairingPublisher>,
    events: mpsc::Sender<ClientEvent>,
}

impl WhatsAppAgent {
    pub fn new(
        store: Arc<SessionStore>,
        messenger: Arc<WhatsAppMessenger>,
        publisher: Arc<PairingPublisher>,
        events: mpsc::Sender<ClientEvent>,
    ) -> Self {
        Self {
            store,
            messenger,
            publisher,
            events,
        }
    }

    /// Connect (pairing first if the store holds no device) and keep the client
    /// running in a background task.
    pub async fn start(self) -> anyhow::Result<JoinHandle<()>> {
        let messenger = self.messenger.clone();
        let publisher = self.publisher.clone();
        let events = self.events.clone();

        let mut bot = Bot::builder()
            .with_backend(self.store.clone())
            .with_transport_factory(TokioWebSocketTransportFactory::new())
            .with_http_client(UreqHttpClient::new())
            .on_event(move |event, client| {
                let messenger = messenger.clone();
                let publisher = publisher.clone();
                let events = events.clone();
                async move {
                    messenger.attach(client).await;
                    let Some(event) = translate(event, &publisher).await else {
                        return;
                    };
                    if events.send(event).await.is_err() {
                        tracing::debug!("WhatsApp: event worker gone, dropping event");
                    }
                }
            })
            .build()
            .await
            .map_err(|e| anyhow!("failed to build WhatsApp client: {e}"))?;

        let handle = bot
            .run()
            .await
            .map_err(|e| anyhow!("failed to start WhatsApp client: {e}"))?;

        Ok(tokio::spawn(async move {
            if let Err(e) = handle.await {
                tracing::error!("WhatsApp: client task ended: {:?}", e);
            }
        }))
    }
}

async fn translate(event: Event, publisher: &PairingPublisher) -> Option<ClientEvent> {
    match event {
        Event::PairingQrCode { code, .. } => {
            tracing::info!("WhatsApp: new pairing code, scan it with the phone");
            match qr::terminal(&code) {
                Some(text) => println!("\n{text}"),
                None => println!("\nPairing code: {code}"),
            }
            publisher.publish(PairingStatus::Code(code)).await;
            None
        }
        Event::PairSuccess(_) => {
            tracing::info!("WhatsApp: pairing successful");
            None
        }
        Event::Connected(_) => Some(ClientEvent::Connected),
        Event::Disconnected(_) => Some(ClientEvent::Disconnected),
        Event::LoggedOut(_) => Some(ClientEvent::LoggedOut),
        Event::Message(msg, info) => {
            let Some(body) = handler::command_text(&msg) else {
                tracing::trace!(
                    "WhatsApp: ignored non-command message from {}",
                    info.source.sender
                );
                return None;
            };
            let inbound = handler::to_inbound(body, &info);
            tracing::debug!(
                "WhatsApp: command from {}: {:?}",
                inbound.sender,
                preview(&inbound.body, 48)
            );
            Some(ClientEvent::MessageReceived(inbound))
        }
        other => {
            tracing::trace!("WhatsApp: ignored event {:?}", other);
            None
        }
    }
}
