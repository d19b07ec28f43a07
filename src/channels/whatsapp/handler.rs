//! Inbound message translation.

use crate::channels::{COMMAND_PREFIX, InboundMessage};
use wacore::types::message::MessageInfo;
use waproto::whatsapp::Message;

/// Innermost message, past device-sent, ephemeral and view-once wrappers.
fn innermost(mut msg: &Message) -> &Message {
    loop {
        let inner = msg
            .device_sent_message
            .as_ref()
            .and_then(|w| w.message.as_deref())
            .or_else(|| msg.ephemeral_message.as_ref().and_then(|w| w.message.as_deref()))
            .or_else(|| msg.view_once_message.as_ref().and_then(|w| w.message.as_deref()));
        match inner {
            Some(next) => msg = next,
            None => return msg,
        }
    }
}

/// Text body of a plain or extended text message.
pub(super) fn text_of(msg: &Message) -> Option<String> {
    let msg = innermost(msg);
    msg.conversation
        .clone()
        .filter(|t| !t.is_empty())
        .or_else(|| msg.extended_text_message.as_ref().and_then(|e| e.text.clone()))
}

/// Body of a `!` command; `None` for chatter, media and empty messages.
pub(super) fn command_text(msg: &Message) -> Option<String> {
    text_of(msg).filter(|t| t.starts_with(COMMAND_PREFIX))
}

pub(super) fn to_inbound(body: String, info: &MessageInfo) -> InboundMessage {
    InboundMessage {
        sender: info.source.sender.to_string(),
        sender_alt: info.source.sender_alt.as_ref().map(ToString::to_string),
        chat: info.source.chat.to_string(),
        body,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use waproto::whatsapp::message::{DeviceSentMessage, ExtendedTextMessage, FutureProofMessage};

    #[test]
    fn test_conversation_text() {
        let msg = Message {
            conversation: Some("!ping".to_string()),
            ..Default::default()
        };
        assert_eq!(text_of(&msg).as_deref(), Some("!ping"));
    }

    #[test]
    fn test_extended_text() {
        let msg = Message {
            extended_text_message: Some(Box::new(ExtendedTextMessage {
                text: Some("!test 3".to_string()),
                ..Default::default()
            })),
            ..Default::default()
        };
        assert_eq!(text_of(&msg).as_deref(), Some("!test 3"));
    }

    #[test]
    fn test_wrapped_text() {
        let inner = Message {
            conversation: Some("!status".to_string()),
            ..Default::default()
        };
        let msg = Message {
            ephemeral_message: Some(Box::new(FutureProofMessage {
                message: Some(Box::new(inner.clone())),
                ..Default::default()
            })),
            ..Default::default()
        };
        assert_eq!(text_of(&msg).as_deref(), Some("!status"));

        let msg = Message {
            device_sent_message: Some(Box::new(DeviceSentMessage {
                message: Some(Box::new(inner)),
                ..Default::default()
            })),
            ..Default::default()
        };
        assert_eq!(text_of(&msg).as_deref(), Some("!status"));
    }

    #[test]
    fn test_media_without_text() {
        let msg = Message {
            image_message: Some(Box::new(Default::default())),
            ..Default::default()
        };
        assert_eq!(text_of(&msg), None);
        assert_eq!(command_text(&msg), None);
    }

    #[test]
    fn test_only_commands_pass() {
        let text = |body: &str| Message {
            conversation: Some(body.to_string()),
            ..Default::default()
        };
        assert_eq!(command_text(&text("!test 2")).as_deref(), Some("!test 2"));
        assert_eq!(command_text(&text("gracias!")), None);
        assert_eq!(command_text(&text("")), None);
        assert_eq!(command_text(&Message::default()), None);
    }
}
