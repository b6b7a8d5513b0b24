// src/contracts/mod.rs
//! Smart contract wrappers.

pub mod certificate_chain;
