// src/models/membership.rs
//! Values returned by the ledger boundary.

use serde::{Deserialize, Serialize};

/// Result of looking a fingerprint up on the ledger.
///
/// Absence is a normal outcome, not a fault: `present == false` with both
/// metadata fields set to `None`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct MembershipRecord {
    pub present: bool,
    /// Block timestamp (seconds since the Unix epoch) of the first registration.
    pub registered_at: Option<u64>,
    /// Address or name of the account that registered the fingerprint.
    pub issuer: Option<String>,
}

impl MembershipRecord {
    /// A record for a fingerprint the ledger does not hold.
    pub fn absent() -> Self {
        Self {
            present: false,
            registered_at: None,
            issuer: None,
        }
    }

    pub fn present(registered_at: u64, issuer: impl Into<String>) -> Self {
        Self {
            present: true,
            registered_at: Some(registered_at),
            issuer: Some(issuer.into()),
        }
    }
}

/// Acknowledgement of a successful `append_batch` call.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct AppendReceipt {
    /// Ledger transaction identifier (a `0x`-prefixed hash on Ethereum ledgers).
    pub transaction_id: String,
    /// Number of fingerprints carried by the transaction.
    pub count: usize,
}
