// src/services/verifier.rs
//! Certificate verification service.
//!
//! Recomputes a candidate's fingerprint with the shared encoder and asks the
//! ledger whether it was registered. "Not found" and "could not check" are
//! kept apart at every step.

use crate::blockchain::LedgerClient;
use crate::models::outcome::{FailureKind, VerificationOutcome};
use crate::models::record::CertificateRecord;
use crate::utils::canonical::CanonicalEncoder;
use crate::utils::retry::{with_backoff, RetryPolicy};
use futures::stream::{self, StreamExt};
use log::{debug, info, warn};
use std::sync::Arc;

/// Certificate verifier backed by a ledger adapter.
///
/// Holds no mutable state; any number of verifications may run at once.
#[derive(Clone)]
pub struct Verifier {
    /// Ledger queried for membership
    ledger: Arc<dyn LedgerClient>,
    /// Encoder shared with the registrar
    encoder: Arc<CanonicalEncoder>,
    /// Applied to lookups; defaults to a single attempt
    retry: RetryPolicy,
}

impl Verifier {
    /// Constructs a new Verifier instance.
    ///
    /// # Arguments
    /// * `ledger` - Ledger adapter to query
    /// * `encoder` - Canonical encoder; must be the one used at registration
    pub fn new(ledger: Arc<dyn LedgerClient>, encoder: Arc<CanonicalEncoder>) -> Self {
        Self {
            ledger,
            encoder,
            retry: RetryPolicy::none(),
        }
    }

    /// Retries lookups that fail with `LedgerUnavailable` according to `policy`.
    pub fn with_retry(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    /// Verifies one candidate record.
    ///
    /// # Returns
    /// - `Valid` with registration metadata when the ledger holds the fingerprint
    /// - `Invalid` when the ledger answered and does not hold it
    /// - `Error` when the record cannot be fingerprinted or the ledger cannot be reached
    pub async fn verify(&self, record: &CertificateRecord) -> VerificationOutcome {
        let fingerprint = match self.encoder.fingerprint(record) {
            Ok(fp) => fp,
            Err(violation) => {
                warn!("candidate rejected before lookup: {}", violation);
                return VerificationOutcome::Error {
                    fingerprint: None,
                    kind: FailureKind::SchemaViolation,
                    reason: violation.to_string(),
                };
            }
        };
        debug!("verifying {}", fingerprint);

        let ledger = &self.ledger;
        let lookup = with_backoff(&self.retry, || ledger.lookup(&fingerprint)).await;

        match lookup {
            Ok(membership) => {
                let outcome = VerificationOutcome::from_membership(fingerprint, membership);
                info!("{} -> {}", outcome_fp(&outcome), outcome.label());
                outcome
            }
            Err(err) => {
                warn!("lookup of {} failed: {}", fingerprint, err);
                VerificationOutcome::Error {
                    fingerprint: Some(fingerprint),
                    kind: FailureKind::from(&err),
                    reason: err.to_string(),
                }
            }
        }
    }

    /// Verifies many independent records with at most `concurrency` lookups in
    /// flight. Outcomes are returned in input order.
    pub async fn verify_many(
        &self,
        records: &[CertificateRecord],
        concurrency: usize,
    ) -> Vec<VerificationOutcome> {
        stream::iter(records)
            .map(|record| self.verify(record))
            .buffered(concurrency.max(1))
            .collect()
            .await
    }
}

fn outcome_fp(outcome: &VerificationOutcome) -> String {
    outcome
        .fingerprint()
        .map(|fp| fp.short())
        .unwrap_or_else(|| "-".to_string())
}
