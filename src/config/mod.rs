//! Configuration Module
//!
//! Layered TOML configuration: defaults, system file, local file, then
//! `INVITABOT_*` environment variables. CLI flags are applied last by the caller.

mod types;

pub use types::*;
