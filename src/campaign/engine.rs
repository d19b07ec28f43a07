//! Campaign Engine
//!
//! Selects ledger rows, renders the caption, attaches the recipient's PDF, sends
//! it through the [`Messenger`] and records confirmed deliveries in the ledger
//! file before moving on. Because each success is persisted before the next row
//! is considered, re-running a step or a sweep never sends a row twice.

use super::gate::{self, DeliveryMode, Eligibility, SkipReason};
use super::ledger::{CampaignLedger, LedgerSummary};
use super::template::MessageTemplate;
use crate::channels::{Messenger, OutboundDocument, Thumbnail};
use crate::config::CampaignConfig;
use crate::error::{BotError, Result};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    Sent { message_id: Option<String> },
    Skipped(SkipReason),
}

/// Result of one campaign step for one row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendOutcome {
    pub row: usize,
    pub recipient: String,
    pub disposition: Disposition,
}

impl SendOutcome {
    pub fn was_sent(&self) -> bool {
        matches!(self.disposition, Disposition::Sent { .. })
    }
}

/// Totals of one full pass over the ledger.
#[derive(Debug, Default)]
pub struct SweepReport {
    pub sent: usize,
    pub skipped: usize,
    pub failures: Vec<(usize, BotError)>,
}

/// What a step would send, without sending it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Preview {
    pub row: usize,
    pub recipient: String,
    pub caption: String,
    pub attachment: PathBuf,
    pub attachment_exists: bool,
    pub unknown_placeholders: Vec<String>,
}

/// Per-operation inputs loaded once and shared by every row of that operation.
struct SendContext {
    template: MessageTemplate,
    thumbnail: Option<Thumbnail>,
}

pub struct CampaignEngine {
    messenger: Arc<dyn Messenger>,
    config: CampaignConfig,
}

impl CampaignEngine {
    pub fn new(messenger: Arc<dyn Messenger>, config: CampaignConfig) -> Self {
        Self { messenger, config }
    }

    pub fn config(&self) -> &CampaignConfig {
        &self.config
    }

    pub fn load_ledger(&self) -> Result<CampaignLedger> {
        CampaignLedger::load(&self.config.ledger, &self.config.schema)
    }

    /// `<attachment_dir>/<prefix><id><suffix>`
    pub fn attachment_path(&self, id: &str) -> PathBuf {
        self.config.attachment_dir.join(format!(
            "{}{}{}",
            self.config.attachment_prefix,
            id.trim(),
            self.config.attachment_suffix
        ))
    }

    pub fn summary(&self) -> Result<LedgerSummary> {
        Ok(self.load_ledger()?.summary())
    }

    pub fn preview(&self, row_number: usize) -> Result<Preview> {
        let ledger = self.load_ledger()?;
        let template = MessageTemplate::load(&self.config.template)?;
        let row = ledger.row(row_number)?;
        let attachment = self.attachment_path(ledger.id_of(row));
        Ok(Preview {
            row: row_number,
            recipient: ledger.phone_of(row).to_string(),
            caption: template.render(ledger.header(), &row.fields),
            attachment_exists: attachment.is_file(),
            attachment,
            unknown_placeholders: template.unknown_placeholders(ledger.header()),
        })
    }

    /// Deliver one row. Already-sent rows come back as `Skipped`, not as errors.
    pub async fn run_step(&self, row_number: usize, mode: &DeliveryMode) -> Result<SendOutcome> {
        let mut ledger = self.load_ledger()?;
        self.ensure_trackable(&ledger, mode)?;
        let ctx = self.load_context().await?;
        ledger.row(row_number)?;

        if let Some(reason) = self.check_gate(&ledger, row_number, mode)? {
            let recipient = ledger.phone_of(ledger.row(row_number)?).to_string();
            tracing::info!("Campaign: row {} skipped ({})", row_number, reason);
            return Ok(SendOutcome {
                row: row_number,
                recipient,
                disposition: Disposition::Skipped(reason),
            });
        }

        self.send_row(&mut ledger, &ctx, row_number, mode).await
    }

    /// One pass over every row in ledger order. Per-recipient failures are
    /// recorded and the pass continues; ledger and template errors abort it.
    pub async fn sweep(&self, mode: &DeliveryMode) -> Result<SweepReport> {
        let mut ledger = self.load_ledger()?;
        self.ensure_trackable(&ledger, mode)?;
        let ctx = self.load_context().await?;
        let pause = Duration::from_millis(self.config.pause_between_sends_ms);

        tracing::info!(
            "Campaign: sweep started over {} rows ({})",
            ledger.len(),
            ledger.summary()
        );

        let mut report = SweepReport::default();
        let mut attempted = false;
        for number in 1..=ledger.len() {
            if let Some(reason) = self.check_gate(&ledger, number, mode)? {
                tracing::debug!("Campaign: row {} skipped ({})", number, reason);
                report.skipped += 1;
                continue;
            }

            if attempted && !pause.is_zero() {
                tokio::time::sleep(pause).await;
            }
            attempted = true;

            match self.send_row(&mut ledger, &ctx, number, mode).await {
                Ok(_) => report.sent += 1,
                Err(e) if e.is_per_recipient() => {
                    tracing::warn!("Campaign: row {} failed: {}", number, e);
                    report.failures.push((number, e));
                }
                Err(e) => return Err(e),
            }
        }

        tracing::info!(
            "Campaign: sweep finished: {} sent, {} skipped, {} failed",
            report.sent,
            report.skipped,
            report.failures.len()
        );
        Ok(report)
    }

    fn ensure_trackable(&self, ledger: &CampaignLedger, mode: &DeliveryMode) -> Result<()> {
        if !mode.is_test() && !ledger.tracks_status() {
            return Err(BotError::InvalidArgument(
                "ledger has no status column; production sends require delivery tracking"
                    .to_string(),
            ));
        }
        Ok(())
    }

    fn check_gate(
        &self,
        ledger: &CampaignLedger,
        number: usize,
        mode: &DeliveryMode,
    ) -> Result<Option<SkipReason>> {
        let row = ledger.row(number)?;
        match gate::eligible(row, mode, ledger.schema().unrecognized_status) {
            Eligibility::Eligible => Ok(None),
            Eligibility::Skip(reason) => Ok(Some(reason)),
            Eligibility::Reject(reason) => Err(BotError::ledger_read(&self.config.ledger, reason)),
        }
    }

    async fn load_context(&self) -> Result<SendContext> {
        let template = MessageTemplate::load(&self.config.template)?;
        let thumbnail = match &self.config.thumbnail {
            Some(path) => match tokio::fs::read(path).await {
                Ok(jpeg) => Some(Thumbnail {
                    jpeg,
                    width: self.config.thumbnail_width,
                    height: self.config.thumbnail_height,
                }),
                Err(e) => {
                    tracing::warn!(
                        "Campaign: thumbnail {} unavailable, sending without preview: {}",
                        path.display(),
                        e
                    );
                    None
                }
            },
            None => None,
        };
        Ok(SendContext {
            template,
            thumbnail,
        })
    }

    async fn send_row(
        &self,
        ledger: &mut CampaignLedger,
        ctx: &SendContext,
        number: usize,
        mode: &DeliveryMode,
    ) -> Result<SendOutcome> {
        let row = ledger.row(number)?;
        let recipient = ledger.phone_of(row).to_string();
        let destination = gate::destination(&recipient, mode).to_string();
        let caption = ctx.template.render(ledger.header(), &row.fields);
        let attachment = self.attachment_path(ledger.id_of(row));

        let bytes = match tokio::fs::read(&attachment).await {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(
                    "Campaign: cannot read attachment {}: {}",
                    attachment.display(),
                    e
                );
                return Err(BotError::AttachmentNotFound(attachment));
            }
        };

        let document = OutboundDocument {
            bytes,
            mime: self.config.attachment_mime.clone(),
            file_name: self.config.attachment_file_name.clone(),
            caption,
            thumbnail: ctx.thumbnail.clone(),
        };

        tracing::info!(
            "Campaign: sending row {} to {}{}",
            number,
            destination,
            if mode.is_test() { " (test)" } else { "" }
        );

        let receipt = self
            .messenger
            .send_document(&destination, &document)
            .await
            .map_err(|e| match e {
                BotError::SendFailure { .. } => e,
                other => BotError::SendFailure {
                    destination: destination.clone(),
                    reason: other.to_string(),
                },
            })?;

        if !mode.is_test() {
            ledger.mark_sent(number)?;
            ledger.save(&self.config.ledger)?;
        }

        tracing::info!(
            "Campaign: row {} delivered to {} (id={})",
            number,
            destination,
            receipt.message_id.as_deref().unwrap_or("-")
        );

        Ok(SendOutcome {
            row: number,
            recipient,
            disposition: Disposition::Sent {
                message_id: receipt.message_id,
            },
        })
    }
}
