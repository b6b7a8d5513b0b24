// src/utils/crypto.rs
//! Fingerprint function.
//!
//! Uses SHA-256 for every fingerprint. The algorithm is fixed: switching it
//! would orphan every certificate already registered on the ledger.

use crate::models::fingerprint::Fingerprint;
use sha2::{Digest, Sha256};

/// Computes the SHA-256 digest of the input data.
///
/// # Arguments
/// * `data` - Binary data to hash (as bytes slice)
///
/// # Returns
/// Fixed-size 32-byte array (`[u8; 32]`) containing the hash.
pub fn hash_data(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Hashes canonical bytes into a lowercase hex [`Fingerprint`].
pub fn fingerprint(canonical: &[u8]) -> Fingerprint {
    Fingerprint::from_digest(hash_data(canonical))
}
