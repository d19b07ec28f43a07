//! invitabot - WhatsApp invitation campaign agent
//!
//! Pairs a single WhatsApp account by QR code, answers `!ping`, `!test [row]`
//! and `!status` in chat, and sends a personalized PDF invitation to every
//! pending row of a CSV ledger. Each delivery is written back to the ledger
//! before the next one starts, so a campaign can be stopped and resumed
//! without sending anyone the same invitation twice.
//!
//! ## Quick Start
//!
//! ```bash
//! # Check the ledger
//! invitabot status
//!
//! # See what row 3 would receive
//! invitabot preview --row 3
//!
//! # Pair the account and send every pending invitation
//! invitabot sweep 5215512345678
//! ```

pub mod campaign;
pub mod channels;
pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod pairing;
pub mod utils;

// Re-export commonly used types
pub use error::{BotError, ErrorCode};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
