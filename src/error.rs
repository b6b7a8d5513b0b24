// src/error.rs
//! Error taxonomy shared by the encoder, the ledger adapters and the workflows.
//!
//! Per-record problems (`SchemaViolation`) are captured inside batch results and
//! never abort a run. Ledger problems (`LedgerError`) surface to the immediate
//! caller as typed failures; the core never retries on its own.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A candidate record does not carry the field set the schema requires.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum SchemaViolation {
    /// The record has no fields at all.
    #[error("record has no fields")]
    EmptyRecord,

    /// One or more required fields are absent.
    #[error("missing required field(s): {}", .0.join(", "))]
    MissingFields(Vec<String>),

    /// Required fields are present but blank after trimming.
    #[error("required field(s) are blank: {}", .0.join(", "))]
    BlankFields(Vec<String>),

    /// The normalized fields could not be written as JSON.
    #[error("record cannot be encoded: {0}")]
    Unencodable(String),
}

/// Failure talking to the external append-only ledger.
///
/// `Unavailable` is a transport problem and may be retried with backoff.
/// `Rejected` means the ledger refused the write; resubmitting the same batch
/// unchanged will fail again.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    /// The ledger could not be reached, or the outcome of a write is unknown.
    #[error("ledger unavailable: {0}")]
    Unavailable(String),

    /// The ledger refused the write (revert, resource limits, malformed batch).
    #[error("ledger rejected the write: {0}")]
    Rejected(String),

    /// The adapter could not be set up (bad address, key or contract ABI).
    #[error("ledger misconfigured: {0}")]
    Misconfigured(String),
}

impl LedgerError {
    /// Whether a retry with backoff is a sensible reaction to this error.
    pub fn is_transient(&self) -> bool {
        matches!(self, LedgerError::Unavailable(_))
    }
}
