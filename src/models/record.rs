// src/models/record.rs
//! Certificate record data model.
//!
//! A certificate record is a flat mapping from field name to field value, as
//! produced by a spreadsheet row, a submitted form or an interactive prompt.
//! Values are carried as strings; numeric fields such as roll numbers are
//! stored in their decimal string form.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A certificate record awaiting fingerprinting.
///
/// Field order is not significant: two records holding the same
/// (name, value) pairs compare equal no matter how they were assembled.
///
/// # Serialization
/// Serializes as a plain JSON object, e.g.
/// `{"Grade":"A","Name":"Asha Rao"}`.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(transparent)]
pub struct CertificateRecord {
    fields: BTreeMap<String, String>,
}

impl CertificateRecord {
    /// Creates an empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a field, replacing any previous value under the same name.
    ///
    /// # Arguments
    /// * `name` - Field name, spelled exactly as the schema spells it
    /// * `value` - Raw field value (normalization happens at encode time)
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.fields.insert(name.into(), value.into());
    }

    /// Builder-style variant of [`insert`](Self::insert).
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(name, value);
        self
    }

    /// Returns the raw value stored under `name`, if any.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    /// Iterates over all fields in ascending name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl<K, V> FromIterator<(K, V)> for CertificateRecord
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut record = CertificateRecord::new();
        for (name, value) in iter {
            record.insert(name, value);
        }
        record
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insertion_order_is_irrelevant() {
        let a: CertificateRecord = [("Name", "Asha Rao"), ("Grade", "A")].into_iter().collect();
        let b: CertificateRecord = [("Grade", "A"), ("Name", "Asha Rao")].into_iter().collect();
        assert_eq!(a, b);
    }

    #[test]
    fn test_insert_overwrites() {
        let record = CertificateRecord::new().with("Grade", "A").with("Grade", "B");
        assert_eq!(record.get("Grade"), Some("B"));
        assert_eq!(record.len(), 1);
    }

    #[test]
    fn test_serializes_as_plain_object() {
        let record = CertificateRecord::new().with("Name", "Asha Rao").with("Grade", "A");
        let json = serde_json::to_string(&record).unwrap();
        assert_eq!(json, r#"{"Grade":"A","Name":"Asha Rao"}"#);
    }
}
