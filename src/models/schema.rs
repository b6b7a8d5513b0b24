// src/models/schema.rs
//! Field-name schema shared by every producer and verifier.
//!
//! The schema fixes the *set* of fields that feed a fingerprint. Changing it
//! after certificates have been registered makes all of them unverifiable.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;

/// Column headers used by the certificate spreadsheets.
pub const DEFAULT_REQUIRED_FIELDS: [&str; 6] = [
    "Name",
    "University",
    "Roll Number",
    "Certificate ID",
    "Degree Name",
    "Grade",
];

/// Required and optional field names.
///
/// - Required fields must be present and non-blank.
/// - Optional fields may be absent; they are still encoded, as `""`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct RecordSchema {
    pub required: Vec<String>,
    #[serde(default)]
    pub optional: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    #[error("schema names no fields")]
    Empty,
    #[error("field `{0}` is listed more than once")]
    Duplicate(String),
    #[error("field names must not be blank")]
    BlankName,
}

impl RecordSchema {
    pub fn new<R, O>(required: R, optional: O) -> Self
    where
        R: IntoIterator,
        R::Item: Into<String>,
        O: IntoIterator,
        O::Item: Into<String>,
    {
        Self {
            required: required.into_iter().map(Into::into).collect(),
            optional: optional.into_iter().map(Into::into).collect(),
        }
    }

    /// Checks that the schema names at least one field, with no repeats.
    pub fn validate(&self) -> Result<(), SchemaError> {
        if self.required.is_empty() && self.optional.is_empty() {
            return Err(SchemaError::Empty);
        }
        let mut seen = BTreeSet::new();
        for name in self.fields() {
            if name.trim().is_empty() {
                return Err(SchemaError::BlankName);
            }
            if !seen.insert(name) {
                return Err(SchemaError::Duplicate(name.to_string()));
            }
        }
        Ok(())
    }

    /// All field names, required first, in declaration order.
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.required.iter().chain(self.optional.iter()).map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields().any(|f| f == name)
    }
}

impl Default for RecordSchema {
    fn default() -> Self {
        RecordSchema::new(DEFAULT_REQUIRED_FIELDS, Vec::<String>::new())
    }
}
