// src/models/mod.rs
//! Data structures exchanged between the encoder, the ledger and the workflows.

pub mod fingerprint;
pub mod membership;
pub mod outcome;
pub mod record;
pub mod schema;
