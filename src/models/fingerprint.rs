// src/models/fingerprint.rs
//! Fingerprint value type: the 64-character lowercase hex SHA-256 digest of a
//! record's canonical encoding.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Length of a fingerprint in hex characters.
pub const FINGERPRINT_LEN: usize = 64;

/// A validated certificate fingerprint.
///
/// Instances can only be created from a 32-byte digest or by parsing a string
/// that is exactly 64 lowercase hex characters, so every `Fingerprint` held by
/// the program is well formed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Fingerprint(String);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid fingerprint `{0}`: expected 64 lowercase hex characters")]
pub struct InvalidFingerprint(pub String);

impl Fingerprint {
    /// Builds a fingerprint from a raw 32-byte digest.
    pub fn from_digest(digest: [u8; 32]) -> Self {
        Fingerprint(ethers_core::utils::hex::encode(digest))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Abbreviated form used in human-readable listings (`d41d8cd98f00...`).
    pub fn short(&self) -> String {
        format!("{}...", &self.0[..12])
    }
}

impl FromStr for Fingerprint {
    type Err = InvalidFingerprint;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let well_formed = s.len() == FINGERPRINT_LEN
            && s.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        if well_formed {
            Ok(Fingerprint(s.to_string()))
        } else {
            Err(InvalidFingerprint(s.to_string()))
        }
    }
}

impl TryFrom<String> for Fingerprint {
    type Error = InvalidFingerprint;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Fingerprint> for String {
    fn from(fp: Fingerprint) -> Self {
        fp.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
