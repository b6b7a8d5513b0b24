// src/services/registrar.rs
//! Batch registration service.
//!
//! Turns a sequence of certificate records into fingerprints and appends them
//! to the ledger, reporting a per-record outcome. Bad records are failed
//! individually and never abort the run.

use crate::blockchain::LedgerClient;
use crate::models::fingerprint::Fingerprint;
use crate::models::outcome::{BatchEntry, BatchResult, FailureKind, Outcome};
use crate::models::record::CertificateRecord;
use crate::utils::canonical::CanonicalEncoder;
use log::{debug, info, warn};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Service that registers batches of certificate records on the ledger.
///
/// Clones share the ledger, the encoder and the registration gate, so runs
/// started from any clone are serialized against each other.
#[derive(Clone)]
pub struct Registrar {
    /// Ledger the fingerprints are appended to
    ledger: Arc<dyn LedgerClient>,
    /// Encoder shared with the verifier
    encoder: Arc<CanonicalEncoder>,
    /// Upper bound on fingerprints per ledger transaction; `None` sends one transaction
    max_batch_size: Option<usize>,
    /// Held for the whole run so batches never overlap
    gate: Arc<Mutex<()>>,
}

impl Registrar {
    /// Creates a new Registrar instance.
    ///
    /// # Arguments
    /// * `ledger` - Ledger adapter to append to
    /// * `encoder` - Canonical encoder; must be the one used for verification
    pub fn new(ledger: Arc<dyn LedgerClient>, encoder: Arc<CanonicalEncoder>) -> Self {
        Self {
            ledger,
            encoder,
            max_batch_size: None,
            gate: Arc::new(Mutex::new(())),
        }
    }

    /// Splits submissions into ledger transactions of at most `size` fingerprints.
    pub fn with_max_batch_size(mut self, size: Option<usize>) -> Self {
        self.max_batch_size = size.filter(|s| *s > 0);
        self
    }

    /// Registers a batch of records.
    ///
    /// # Process Flow
    /// 1. Fingerprints every record; schema violations fail that record only
    /// 2. Deduplicates by fingerprint, first occurrence wins, repeats are `Skipped`
    /// 3. Appends the remaining fingerprints in input order, one transaction per chunk
    /// 4. Marks each chunk `Success` or `Failed` as a whole
    ///
    /// No ledger call is made when nothing is left to submit. Ledger membership
    /// is not pre-checked: re-registering already stored fingerprints is allowed.
    pub async fn register_batch(&self, records: Vec<CertificateRecord>) -> BatchResult {
        let _gate = self.gate.lock().await;
        let total = records.len();

        let mut entries = Vec::with_capacity(total);
        let mut first_index: HashMap<Fingerprint, usize> = HashMap::new();
        let mut pending: Vec<usize> = Vec::new();

        for (index, record) in records.into_iter().enumerate() {
            match self.encoder.fingerprint(&record) {
                Err(violation) => {
                    warn!("record #{} rejected: {}", index, violation);
                    entries.push(BatchEntry {
                        index,
                        record,
                        fingerprint: None,
                        outcome: Outcome::Failed,
                        failure: Some(FailureKind::SchemaViolation),
                        reason: Some(violation.to_string()),
                    });
                }
                Ok(fingerprint) => {
                    if let Some(first) = first_index.get(&fingerprint) {
                        debug!("record #{} duplicates record #{}", index, first);
                        entries.push(BatchEntry {
                            index,
                            record,
                            fingerprint: Some(fingerprint),
                            outcome: Outcome::Skipped,
                            failure: None,
                            reason: Some(format!(
                                "duplicate of record #{first}; shares its outcome"
                            )),
                        });
                    } else {
                        first_index.insert(fingerprint.clone(), index);
                        pending.push(index);
                        entries.push(BatchEntry {
                            index,
                            record,
                            fingerprint: Some(fingerprint),
                            // Settled below once the ledger answers.
                            outcome: Outcome::Failed,
                            failure: None,
                            reason: None,
                        });
                    }
                }
            }
        }

        let mut result = BatchResult {
            entries,
            receipts: Vec::new(),
        };
        if pending.is_empty() {
            info!("nothing to submit ({} record(s) in batch)", total);
            return result;
        }

        let chunk_size = self.max_batch_size.unwrap_or(pending.len());
        for chunk in pending.chunks(chunk_size) {
            let fingerprints: Vec<Fingerprint> = chunk
                .iter()
                .filter_map(|&i| result.entries[i].fingerprint.clone())
                .collect();

            match self.ledger.append_batch(&fingerprints).await {
                Ok(receipt) => {
                    info!(
                        "registered {} fingerprint(s) in {}",
                        receipt.count, receipt.transaction_id
                    );
                    for &i in chunk {
                        let entry = &mut result.entries[i];
                        entry.outcome = Outcome::Success;
                        entry.reason = None;
                    }
                    result.receipts.push(receipt);
                }
                Err(err) => {
                    warn!("append of {} fingerprint(s) failed: {}", fingerprints.len(), err);
                    let kind = FailureKind::from(&err);
                    for &i in chunk {
                        let entry = &mut result.entries[i];
                        entry.outcome = Outcome::Failed;
                        entry.failure = Some(kind);
                        entry.reason = Some(err.to_string());
                    }
                }
            }
        }

        info!(
            "batch finished: {} succeeded, {} skipped, {} failed",
            result.succeeded(),
            result.skipped(),
            result.failed()
        );
        result
    }

    /// Settles entries whose append outcome is unknown.
    ///
    /// Entries that failed with `LedgerUnavailable` are looked up; those the
    /// ledger already holds are promoted to `Success`. Lookup errors leave the
    /// entry untouched. Run this before resubmitting a batch.
    pub async fn reconcile(&self, mut result: BatchResult) -> BatchResult {
        for entry in result.entries.iter_mut() {
            if entry.failure != Some(FailureKind::LedgerUnavailable) {
                continue;
            }
            let Some(fingerprint) = entry.fingerprint.as_ref() else {
                continue;
            };
            match self.ledger.lookup(fingerprint).await {
                Ok(membership) if membership.present => {
                    info!("record #{} confirmed on ledger", entry.index);
                    entry.outcome = Outcome::Success;
                    entry.failure = None;
                    entry.reason = Some("confirmed by lookup".into());
                }
                Ok(_) => debug!("record #{} not on ledger", entry.index),
                Err(err) => warn!("could not reconcile record #{}: {}", entry.index, err),
            }
        }
        result
    }
}
