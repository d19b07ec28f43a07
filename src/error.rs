//! Error taxonomy
//!
//! Domain errors shared by the campaign engine, the command router and the
//! session lifecycle monitor. Application edges (CLI, config loading) wrap these
//! in `anyhow::Error` with context.

use std::fmt;
use std::path::PathBuf;

/// Exit status signalling "session invalid, re-pairing required" to a supervisor.
pub const SESSION_INVALID_EXIT_CODE: i32 = 9;

/// Why the WhatsApp session can no longer be used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminationReason {
    /// The transport dropped the connection.
    Disconnected,
    /// The phone removed this linked device.
    LoggedOut,
    /// The paired account is not the one the process was launched for.
    IdentityMismatch { expected: String, reported: String },
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::LoggedOut => write!(f, "logged out"),
            Self::IdentityMismatch { expected, reported } => {
                write!(f, "paired as {reported}, expected {expected}")
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BotError {
    #[error("failed to read ledger {path}: {reason}")]
    LedgerRead { path: PathBuf, reason: String },

    #[error("failed to write ledger {path}: {reason}")]
    LedgerWrite { path: PathBuf, reason: String },

    #[error("failed to read message template {path}: {reason}")]
    TemplateRead { path: PathBuf, reason: String },

    #[error("row {row} is out of range (ledger has {len} data rows)")]
    RowIndexOutOfRange { row: usize, len: usize },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("attachment not found: {}", .0.display())]
    AttachmentNotFound(PathBuf),

    #[error("send to {destination} failed: {reason}")]
    SendFailure { destination: String, reason: String },

    #[error("session terminated: {0}")]
    SessionTerminated(TerminationReason),

    #[error("session store error: {0}")]
    SessionStore(String),
}

/// Stable, log-friendly identifier for each error kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    LedgerRead,
    LedgerWrite,
    TemplateRead,
    RowIndexOutOfRange,
    InvalidArgument,
    AttachmentNotFound,
    SendFailure,
    SessionTerminated,
    SessionStore,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LedgerRead => "ledger_read",
            Self::LedgerWrite => "ledger_write",
            Self::TemplateRead => "template_read",
            Self::RowIndexOutOfRange => "row_index_out_of_range",
            Self::InvalidArgument => "invalid_argument",
            Self::AttachmentNotFound => "attachment_not_found",
            Self::SendFailure => "send_failure",
            Self::SessionTerminated => "session_terminated",
            Self::SessionStore => "session_store",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl BotError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::LedgerRead { .. } => ErrorCode::LedgerRead,
            Self::LedgerWrite { .. } => ErrorCode::LedgerWrite,
            Self::TemplateRead { .. } => ErrorCode::TemplateRead,
            Self::RowIndexOutOfRange { .. } => ErrorCode::RowIndexOutOfRange,
            Self::InvalidArgument(_) => ErrorCode::InvalidArgument,
            Self::AttachmentNotFound(_) => ErrorCode::AttachmentNotFound,
            Self::SendFailure { .. } => ErrorCode::SendFailure,
            Self::SessionTerminated(_) => ErrorCode::SessionTerminated,
            Self::SessionStore(_) => ErrorCode::SessionStore,
        }
    }

    /// Failures scoped to a single recipient. A sweep records them and moves on;
    /// the row stays pending for a later retry.
    pub fn is_per_recipient(&self) -> bool {
        matches!(self, Self::AttachmentNotFound(_) | Self::SendFailure { .. })
    }

    /// Process exit status for this error when it reaches `main`.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::SessionTerminated(_) => SESSION_INVALID_EXIT_CODE,
            _ => 1,
        }
    }

    pub(crate) fn ledger_read(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::LedgerRead {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn ledger_write(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::LedgerWrite {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, BotError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_per_recipient_errors() {
        assert!(BotError::AttachmentNotFound(PathBuf::from("x.pdf")).is_per_recipient());
        assert!(BotError::SendFailure {
            destination: "521234".into(),
            reason: "timeout".into(),
        }
        .is_per_recipient());
        assert!(!BotError::ledger_read("invitados.csv", "empty").is_per_recipient());
        assert!(!BotError::RowIndexOutOfRange { row: 3, len: 2 }.is_per_recipient());
    }

    #[test]
    fn test_session_terminated_exit_code() {
        let err = BotError::SessionTerminated(TerminationReason::LoggedOut);
        assert_eq!(err.exit_code(), SESSION_INVALID_EXIT_CODE);
        assert_eq!(err.code(), ErrorCode::SessionTerminated);
        assert_eq!(BotError::InvalidArgument("x".into()).exit_code(), 1);
    }

    #[test]
    fn test_identity_mismatch_exit_code() {
        let err = BotError::SessionTerminated(TerminationReason::IdentityMismatch {
            expected: "555".into(),
            reported: "777".into(),
        });
        assert_eq!(err.exit_code(), SESSION_INVALID_EXIT_CODE);
        assert_eq!(err.to_string(), "session terminated: paired as 777, expected 555");
        assert_eq!(BotError::SessionStore("locked".into()).exit_code(), 1);
    }

    #[test]
    fn test_display_mentions_row_bounds() {
        let err = BotError::RowIndexOutOfRange { row: 0, len: 2 };
        assert_eq!(
            err.to_string(),
            "row 0 is out of range (ledger has 2 data rows)"
        );
    }
}
