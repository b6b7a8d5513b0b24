// src/models/outcome.rs
//! Structured results handed back by the registration and verification
//! workflows. Report writers consume these directly and never need to
//! re-derive a fingerprint.

use crate::error::LedgerError;
use crate::models::fingerprint::Fingerprint;
use crate::models::membership::{AppendReceipt, MembershipRecord};
use crate::models::record::CertificateRecord;
use serde::{Deserialize, Serialize};

/// Per-record outcome of a registration run.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// The fingerprint was carried by an accepted ledger transaction.
    Success,
    /// A repeat of a fingerprint seen earlier in the same batch; not submitted.
    ///
    /// Stays `Skipped` whatever happens to the first occurrence: whether the
    /// fingerprint reached the ledger is the outcome of the entry named in
    /// `reason`.
    Skipped,
    /// Schema validation or the ledger append failed.
    Failed,
}

/// Why an entry ended up `Failed`.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    SchemaViolation,
    LedgerUnavailable,
    LedgerRejected,
}

impl From<&LedgerError> for FailureKind {
    fn from(err: &LedgerError) -> Self {
        match err {
            LedgerError::Unavailable(_) => FailureKind::LedgerUnavailable,
            LedgerError::Rejected(_) | LedgerError::Misconfigured(_) => FailureKind::LedgerRejected,
        }
    }
}

/// One line of a [`BatchResult`].
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct BatchEntry {
    /// Zero-based position of the record in the input sequence.
    pub index: usize,
    pub record: CertificateRecord,
    /// `None` only when the record failed schema validation.
    pub fingerprint: Option<Fingerprint>,
    pub outcome: Outcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Report of a single registration run, in input order.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchResult {
    pub entries: Vec<BatchEntry>,
    /// One receipt per accepted `append_batch` call.
    pub receipts: Vec<AppendReceipt>,
}

impl BatchResult {
    fn count(&self, outcome: Outcome) -> usize {
        self.entries.iter().filter(|e| e.outcome == outcome).count()
    }

    pub fn succeeded(&self) -> usize {
        self.count(Outcome::Success)
    }

    pub fn skipped(&self) -> usize {
        self.count(Outcome::Skipped)
    }

    pub fn failed(&self) -> usize {
        self.count(Outcome::Failed)
    }

    /// Whether every record was either registered or deduplicated.
    pub fn is_clean(&self) -> bool {
        self.failed() == 0
    }
}

/// Classification of a single candidate record.
///
/// `Invalid` means the ledger was reachable and does not hold the fingerprint.
/// `Error` means the check could not be completed; it is never evidence of
/// forgery.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum VerificationOutcome {
    Valid {
        fingerprint: Fingerprint,
        registered_at: Option<u64>,
        issuer: Option<String>,
    },
    Invalid {
        fingerprint: Fingerprint,
    },
    Error {
        /// `None` when the candidate could not be fingerprinted at all.
        fingerprint: Option<Fingerprint>,
        /// `SchemaViolation` for malformed input, otherwise the ledger failure.
        kind: FailureKind,
        reason: String,
    },
}

/// Directory-level grouping used when persisting results.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeCategory {
    Verified,
    Unverified,
    Error,
}

impl VerificationOutcome {
    /// Combines a computed fingerprint with the ledger's membership answer.
    pub fn from_membership(fingerprint: Fingerprint, membership: MembershipRecord) -> Self {
        if membership.present {
            VerificationOutcome::Valid {
                fingerprint,
                registered_at: membership.registered_at,
                issuer: membership.issuer,
            }
        } else {
            VerificationOutcome::Invalid { fingerprint }
        }
    }

    pub fn fingerprint(&self) -> Option<&Fingerprint> {
        match self {
            VerificationOutcome::Valid { fingerprint, .. }
            | VerificationOutcome::Invalid { fingerprint } => Some(fingerprint),
            VerificationOutcome::Error { fingerprint, .. } => fingerprint.as_ref(),
        }
    }

    /// Why the check could not be completed, for `Error` outcomes.
    pub fn failure(&self) -> Option<FailureKind> {
        match self {
            VerificationOutcome::Error { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, VerificationOutcome::Valid { .. })
    }

    pub fn category(&self) -> OutcomeCategory {
        match self {
            VerificationOutcome::Valid { .. } => OutcomeCategory::Verified,
            VerificationOutcome::Invalid { .. } => OutcomeCategory::Unverified,
            VerificationOutcome::Error { .. } => OutcomeCategory::Error,
        }
    }

    /// Upper-case label used in summaries and CSV output.
    pub fn label(&self) -> &'static str {
        match self {
            VerificationOutcome::Valid { .. } => "VALID",
            VerificationOutcome::Invalid { .. } => "INVALID",
            VerificationOutcome::Error { .. } => "ERROR",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fp() -> Fingerprint {
        Fingerprint::from_digest([7; 32])
    }

    #[test]
    fn test_absent_membership_is_invalid() {
        let outcome = VerificationOutcome::from_membership(fp(), MembershipRecord::absent());
        assert_eq!(outcome, VerificationOutcome::Invalid { fingerprint: fp() });
        assert_eq!(outcome.category(), OutcomeCategory::Unverified);
    }

    #[test]
    fn test_present_membership_carries_metadata() {
        let outcome =
            VerificationOutcome::from_membership(fp(), MembershipRecord::present(1_700_000_000, "0xabc"));
        match outcome {
            VerificationOutcome::Valid { registered_at, issuer, .. } => {
                assert_eq!(registered_at, Some(1_700_000_000));
                assert_eq!(issuer.as_deref(), Some("0xabc"));
            }
            other => panic!("expected Valid, got {other:?}"),
        }
    }

    #[test]
    fn test_outcome_json_is_tagged() {
        let outcome = VerificationOutcome::Invalid { fingerprint: fp() };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["status"], "invalid");
        assert_eq!(json["fingerprint"], fp().as_str());
    }

    #[test]
    fn test_error_outcome_keeps_failure_kind() {
        let malformed = VerificationOutcome::Error {
            fingerprint: None,
            kind: FailureKind::SchemaViolation,
            reason: "missing required field(s): Grade".into(),
        };
        let down = VerificationOutcome::Error {
            fingerprint: Some(fp()),
            kind: FailureKind::from(&LedgerError::Unavailable("refused".into())),
            reason: "ledger unavailable: refused".into(),
        };
        assert_eq!(malformed.failure(), Some(FailureKind::SchemaViolation));
        assert_eq!(down.failure(), Some(FailureKind::LedgerUnavailable));
        assert_eq!(malformed.category(), down.category());

        let json = serde_json::to_value(&malformed).unwrap();
        assert_eq!(json["status"], "error");
        assert_eq!(json["kind"], "schema_violation");
        assert_eq!(serde_json::from_value::<VerificationOutcome>(json).unwrap(), malformed);
        assert_eq!(VerificationOutcome::Invalid { fingerprint: fp() }.failure(), None);
    }
}
