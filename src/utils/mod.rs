// src/utils/mod.rs
//! Pure helpers: canonical encoding, hashing and retry scheduling.

pub mod canonical;
pub mod crypto;
pub mod retry;
