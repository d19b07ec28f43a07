//! Messaging Channel
//!
//! The `Messenger` port the campaign engine sends through, the closed set of
//! client events the bot reacts to, and the WhatsApp implementation of both.

mod lifecycle;
mod router;
#[cfg(feature = "whatsapp")]
pub mod whatsapp;

pub use lifecycle::LifecycleMonitor;
pub use router::{Command, CommandRouter, parse_command};

use crate::error::Result;
use async_trait::async_trait;
use std::fmt;

/// WhatsApp server for user (phone number) JIDs.
pub const USER_SERVER: &str = "s.whatsapp.net";

/// Command prefix for inbound chat messages.
pub const COMMAND_PREFIX: char = '!';

/// Account identity as the phone-number user part of a JID, e.g. `"5215512345678"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PairingIdentity(String);

impl PairingIdentity {
    /// Accepts `+52155...`, `52155...@s.whatsapp.net` or `52155...:12@s.whatsapp.net`.
    pub fn new(raw: &str) -> Self {
        let user = raw.split('@').next().unwrap_or(raw);
        let user = user.split(':').next().unwrap_or(user);
        Self(user.trim().trim_start_matches('+').to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PairingIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Text message delivered to this account.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct InboundMessage {
    /// Sender JID
    pub sender: String,
    /// Alternate sender JID (phone JID when `sender` is a LID)
    pub sender_alt: Option<String>,
    /// Chat JID
    pub chat: String,
    pub body: String,
}

impl InboundMessage {
    /// Phone number to reply to: the first of sender, alternate sender and chat
    /// that is a plain user JID without a device suffix.
    pub fn reply_phone(&self) -> Option<String> {
        std::iter::once(self.sender.as_str())
            .chain(self.sender_alt.as_deref())
            .chain(std::iter::once(self.chat.as_str()))
            .find_map(|jid| {
                let (user, server) = jid.split_once('@')?;
                (server == USER_SERVER && !user.is_empty() && !user.contains(':'))
                    .then(|| user.to_string())
            })
    }

    pub fn is_command(&self) -> bool {
        self.body.starts_with(COMMAND_PREFIX)
    }
}

/// Closed set of client events the bot reacts to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    Connected,
    Disconnected,
    LoggedOut,
    MessageReceived(InboundMessage),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Thumbnail {
    pub jpeg: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// A file sent as a WhatsApp document with a caption.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundDocument {
    pub bytes: Vec<u8>,
    pub mime: String,
    pub file_name: String,
    pub caption: String,
    pub thumbnail: Option<Thumbnail>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SendReceipt {
    pub message_id: Option<String>,
}

/// Outbound side of the messaging client.
///
/// Destinations are bare phone numbers; implementations build the JID.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Messenger: Send + Sync {
    async fn send_text(&self, destination: &str, body: &str) -> Result<SendReceipt>;

    async fn send_document(
        &self,
        destination: &str,
        document: &OutboundDocument,
    ) -> Result<SendReceipt>;

    /// Identity of the account this client is paired with, once known.
    async fn current_identity(&self) -> Option<PairingIdentity>;

    /// Unlink this device from the account.
    async fn logout(&self) -> Result<()>;

    /// Delete locally persisted session credentials.
    async fn clear_session(&self) -> Result<()>;

    async fn disconnect(&self);
}

/// Messenger for commands that only read local files. Every send fails.
pub struct OfflineMessenger;

#[async_trait]
impl Messenger for OfflineMessenger {
    async fn send_text(&self, destination: &str, _body: &str) -> Result<SendReceipt> {
        Err(offline(destination))
    }

    async fn send_document(
        &self,
        destination: &str,
        _document: &OutboundDocument,
    ) -> Result<SendReceipt> {
        Err(offline(destination))
    }

    async fn current_identity(&self) -> Option<PairingIdentity> {
        None
    }

    async fn logout(&self) -> Result<()> {
        Ok(())
    }

    async fn clear_session(&self) -> Result<()> {
        Ok(())
    }

    async fn disconnect(&self) {}
}

fn offline(destination: &str) -> crate::error::BotError {
    crate::error::BotError::SendFailure {
        destination: destination.to_string(),
        reason: "offline".to_string(),
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_normalization() {
        assert_eq!(PairingIdentity::new("+5215512345678").as_str(), "5215512345678");
        assert_eq!(
            PairingIdentity::new("5215512345678:23@s.whatsapp.net"),
            PairingIdentity::new("5215512345678")
        );
        assert_ne!(PairingIdentity::new("555"), PairingIdentity::new("777"));
    }

    #[test]
    fn test_reply_phone_prefers_plain_sender() {
        let msg = InboundMessage {
            sender: "521234@s.whatsapp.net".into(),
            sender_alt: None,
            chat: "521234@s.whatsapp.net".into(),
            body: "!ping".into(),
        };
        assert_eq!(msg.reply_phone().as_deref(), Some("521234"));
    }

    #[test]
    fn test_reply_phone_falls_back_past_lid_and_device() {
        let msg = InboundMessage {
            sender: "123456789@lid".into(),
            sender_alt: Some("521234:4@s.whatsapp.net".into()),
            chat: "521234@s.whatsapp.net".into(),
            body: "!ping".into(),
        };
        assert_eq!(msg.reply_phone().as_deref(), Some("521234"));
    }

    #[test]
    fn test_reply_phone_none_for_groups() {
        let msg = InboundMessage {
            sender: "123456789@lid".into(),
            sender_alt: None,
            chat: "120363@g.us".into(),
            body: "!ping".into(),
        };
        assert!(msg.reply_phone().is_none());
    }
}
