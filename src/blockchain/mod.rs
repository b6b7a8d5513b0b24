// src/blockchain/mod.rs
//! Ledger boundary.
//!
//! The core sees the ledger as an opaque append-only key-existence store with
//! exactly two operations. Adapters own all transport and session details.

pub mod eth_client;
pub mod memory;

use crate::error::LedgerError;
use crate::models::fingerprint::Fingerprint;
use crate::models::membership::{AppendReceipt, MembershipRecord};
use async_trait::async_trait;

/// Append-only fingerprint store.
///
/// Implementations perform no canonicalization or hashing; they move opaque
/// fixed-length fingerprints. Writes must be serialized per instance so that
/// two registration runs in one process never interleave transactions.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Appends a batch of fingerprints in one all-or-nothing transaction.
    ///
    /// # Errors
    /// - `Unavailable` if the ledger cannot be reached or the outcome is unknown
    /// - `Rejected` if the ledger refuses the write
    async fn append_batch(&self, fingerprints: &[Fingerprint]) -> Result<AppendReceipt, LedgerError>;

    /// Looks a fingerprint up. Absence is `Ok` with `present == false`.
    async fn lookup(&self, fingerprint: &Fingerprint) -> Result<MembershipRecord, LedgerError>;

    /// Human-readable identity of the ledger (contract address, `memory`).
    fn describe(&self) -> String;
}
