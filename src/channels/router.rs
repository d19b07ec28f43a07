//! Chat Command Router
//!
//! Maps `!`-prefixed chat messages to actions. Unrecognized text is ignored, and
//! command failures are answered in the chat instead of being propagated.

use super::{InboundMessage, Messenger};
use crate::campaign::{CampaignEngine, DeliveryMode, Disposition};
use crate::error::{BotError, Result};
use std::sync::Arc;

/// Reply sent when `!test` carries something other than a single row number.
pub const TEST_USAGE_REPLY: &str = "Error: !test requires a valid row number";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Ping,
    /// Send row `row` (1-based) to the requester without touching the ledger
    Test { row: usize },
    Status,
}

/// Parse a chat message body.
///
/// `Ok(None)` means "not a command". A recognized command with bad arguments
/// is `InvalidArgument`.
pub fn parse_command(body: &str) -> Result<Option<Command>> {
    match body {
        "!ping" => return Ok(Some(Command::Ping)),
        "!status" => return Ok(Some(Command::Status)),
        _ => {}
    }

    let mut tokens = body.split_whitespace();
    if tokens.next() != Some("!test") {
        return Ok(None);
    }

    let row = match (tokens.next(), tokens.next()) {
        (None, _) => 1,
        (Some(arg), None) => arg.parse::<usize>().map_err(|_| {
            BotError::InvalidArgument(format!("!test row must be a number, got '{arg}'"))
        })?,
        (Some(_), Some(_)) => {
            return Err(BotError::InvalidArgument(
                "!test takes at most one row number".to_string(),
            ));
        }
    };
    Ok(Some(Command::Test { row }))
}

pub struct CommandRouter {
    engine: Arc<CampaignEngine>,
    messenger: Arc<dyn Messenger>,
}

impl CommandRouter {
    pub fn new(engine: Arc<CampaignEngine>, messenger: Arc<dyn Messenger>) -> Self {
        Self { engine, messenger }
    }

    /// Handle one inbound message to completion. Never fails; problems are
    /// logged and, where possible, answered in the chat.
    pub async fn dispatch(&self, message: &InboundMessage) {
        let Some(phone) = message.reply_phone() else {
            tracing::debug!(
                "Router: no reply address for message from {}, ignoring",
                message.sender
            );
            return;
        };

        let command = match parse_command(message.body.trim_end()) {
            Ok(Some(command)) => command,
            Ok(None) => return,
            Err(e) => {
                tracing::warn!("Router: {} from {}", e, phone);
                self.reply(&phone, TEST_USAGE_REPLY).await;
                return;
            }
        };

        tracing::info!("Router: {:?} from {}", command, phone);

        match command {
            Command::Ping => self.reply(&phone, "!pong").await,
            Command::Status => {
                let text = match self.engine.summary() {
                    Ok(summary) => summary.to_string(),
                    Err(e) => format!("Error: {e}"),
                };
                self.reply(&phone, &text).await;
            }
            Command::Test { row } => {
                let mode = DeliveryMode::test(phone.clone());
                match self.engine.run_step(row, &mode).await {
                    Ok(outcome) => {
                        if let Disposition::Sent { message_id } = outcome.disposition {
                            tracing::info!(
                                "Router: test row {} sent to {} (id={})",
                                row,
                                phone,
                                message_id.as_deref().unwrap_or("-")
                            );
                        }
                    }
                    Err(e) => {
                        tracing::warn!("Router: test row {} failed: {}", row, e);
                        self.reply(&phone, &format!("Error: {e}")).await;
                    }
                }
            }
        }
    }

    async fn reply(&self, phone: &str, text: &str) {
        if let Err(e) = self.messenger.send_text(phone, text).await {
            tracing::error!("Router: failed to reply to {}: {}", phone, e);
        }
    }
}
