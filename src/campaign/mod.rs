//! Invitation campaign: ledger, template, delivery gate and the engine that
//! ties them to a [`Messenger`](crate::channels::Messenger).

mod engine;
mod gate;
mod ledger;
mod template;

pub use engine::{CampaignEngine, Disposition, Preview, SendOutcome, SweepReport};
pub use gate::{DeliveryMode, Eligibility, SkipReason, destination, eligible};
pub use ledger::{
    CampaignLedger, ColumnRef, DeliveryStatus, LedgerSchema, LedgerSummary, RecipientRow,
    UnrecognizedStatusPolicy,
};
pub use template::{MessageTemplate, render};

#[cfg(test)]
pub(crate) use engine::tests as fixtures;
