//! Delivery Gate
//!
//! Decides whether a row may be sent now and where the message goes. Production
//! sends only reach pending rows at their own phone; test sends reach any row
//! but always go to the operator's phone.

use super::ledger::{DeliveryStatus, RecipientRow, UnrecognizedStatusPolicy};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryMode {
    Production,
    /// Send to `phone` instead of the recipient and leave the ledger untouched.
    Test { phone: String },
}

impl DeliveryMode {
    pub fn test(phone: impl Into<String>) -> Self {
        Self::Test {
            phone: phone.into(),
        }
    }

    pub fn is_test(&self) -> bool {
        matches!(self, Self::Test { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    AlreadySent,
    UnrecognizedStatus(String),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadySent => write!(f, "already sent"),
            Self::UnrecognizedStatus(raw) => write!(f, "unrecognized status '{raw}'"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Eligibility {
    Eligible,
    Skip(SkipReason),
    /// The row's status makes the whole ledger unusable for this operation
    Reject(String),
}

pub fn eligible(
    row: &RecipientRow,
    mode: &DeliveryMode,
    policy: UnrecognizedStatusPolicy,
) -> Eligibility {
    if mode.is_test() {
        return Eligibility::Eligible;
    }
    match &row.status {
        DeliveryStatus::Pending => Eligibility::Eligible,
        DeliveryStatus::Sent => Eligibility::Skip(SkipReason::AlreadySent),
        DeliveryStatus::Unrecognized(raw) => match policy {
            UnrecognizedStatusPolicy::Skip => {
                Eligibility::Skip(SkipReason::UnrecognizedStatus(raw.clone()))
            }
            UnrecognizedStatusPolicy::Send => Eligibility::Eligible,
            UnrecognizedStatusPolicy::Reject => Eligibility::Reject(format!(
                "row {} has unrecognized status '{}'",
                row.number, raw
            )),
        },
    }
}

/// Destination for a row: its own phone in production, the override in test mode.
pub fn destination<'a>(row_phone: &'a str, mode: &'a DeliveryMode) -> &'a str {
    match mode {
        DeliveryMode::Production => row_phone,
        DeliveryMode::Test { phone } => phone,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(status: DeliveryStatus) -> RecipientRow {
        RecipientRow {
            number: 1,
            fields: vec!["1".into(), "Ana".into()],
            status,
        }
    }

    #[test]
    fn test_production_only_pending() {
        let policy = UnrecognizedStatusPolicy::Skip;
        assert_eq!(
            eligible(&row(DeliveryStatus::Pending), &DeliveryMode::Production, policy),
            Eligibility::Eligible
        );
        assert_eq!(
            eligible(&row(DeliveryStatus::Sent), &DeliveryMode::Production, policy),
            Eligibility::Skip(SkipReason::AlreadySent)
        );
    }

    #[test]
    fn test_test_mode_always_eligible() {
        let mode = DeliveryMode::test("5550001");
        for status in [
            DeliveryStatus::Pending,
            DeliveryStatus::Sent,
            DeliveryStatus::Unrecognized("x".into()),
        ] {
            assert_eq!(
                eligible(&row(status), &mode, UnrecognizedStatusPolicy::Reject),
                Eligibility::Eligible
            );
        }
    }

    #[test]
    fn test_unrecognized_policies() {
        let r = row(DeliveryStatus::Unrecognized("rebotado".into()));
        let mode = DeliveryMode::Production;
        assert!(matches!(
            eligible(&r, &mode, UnrecognizedStatusPolicy::Skip),
            Eligibility::Skip(SkipReason::UnrecognizedStatus(_))
        ));
        assert_eq!(
            eligible(&r, &mode, UnrecognizedStatusPolicy::Send),
            Eligibility::Eligible
        );
        assert!(matches!(
            eligible(&r, &mode, UnrecognizedStatusPolicy::Reject),
            Eligibility::Reject(_)
        ));
    }

    #[test]
    fn test_destination_override() {
        assert_eq!(destination("521234", &DeliveryMode::Production), "521234");
        assert_eq!(destination("521234", &DeliveryMode::test("5550001")), "5550001");
    }
}
