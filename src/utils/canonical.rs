// src/utils/canonical.rs
//! Canonical encoding of certificate records.
//!
//! This is the only place that turns a record into the bytes that get hashed.
//! Registration and verification both go through [`CanonicalEncoder`], so the
//! two paths cannot drift apart.
//!
//! # Encoding rules
//! 1. Only fields named by the schema are encoded; unknown fields are dropped.
//! 2. Every schema field is always present. Absent or blank optional fields
//!    encode as `""`.
//! 3. Values are trimmed; case is preserved unless `case_folding = "lower"`.
//! 4. Output is a compact JSON object with keys in ascending byte order and
//!    string values, escaped the same way `JSON.stringify` escapes them.

use crate::error::SchemaViolation;
use crate::models::fingerprint::Fingerprint;
use crate::models::record::CertificateRecord;
use crate::models::schema::RecordSchema;
use crate::utils::crypto;
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Case handling applied to field values before encoding.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum CaseFolding {
    #[default]
    Preserve,
    Lower,
}

/// Process-wide encoding configuration.
///
/// Decided once per deployment. Changing either field invalidates every
/// fingerprint already on the ledger.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct CanonicalConfig {
    pub schema: RecordSchema,
    #[serde(default)]
    pub case_folding: CaseFolding,
}

/// Deterministic record encoder. Pure and safe to share across tasks.
#[derive(Debug, Clone)]
pub struct CanonicalEncoder {
    config: CanonicalConfig,
}

impl CanonicalEncoder {
    pub fn new(config: CanonicalConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CanonicalConfig {
        &self.config
    }

    pub fn schema(&self) -> &RecordSchema {
        &self.config.schema
    }

    /// Projects a record onto the schema and normalizes its values.
    ///
    /// # Errors
    /// - [`SchemaViolation::EmptyRecord`] for a record with no fields
    /// - [`SchemaViolation::MissingFields`] when required fields are absent
    /// - [`SchemaViolation::BlankFields`] when required fields are blank
    pub fn normalize(
        &self,
        record: &CertificateRecord,
    ) -> Result<BTreeMap<String, String>, SchemaViolation> {
        if record.is_empty() {
            return Err(SchemaViolation::EmptyRecord);
        }

        let schema = &self.config.schema;
        let mut fields = BTreeMap::new();
        let mut missing = Vec::new();
        let mut blank = Vec::new();

        for name in &schema.required {
            match record.get(name) {
                None => missing.push(name.clone()),
                Some(raw) => {
                    let value = self.normalize_value(raw);
                    if value.is_empty() {
                        blank.push(name.clone());
                    } else {
                        fields.insert(name.clone(), value);
                    }
                }
            }
        }

        if !missing.is_empty() {
            return Err(SchemaViolation::MissingFields(missing));
        }
        if !blank.is_empty() {
            return Err(SchemaViolation::BlankFields(blank));
        }

        for name in &schema.optional {
            let value = record
                .get(name)
                .map(|raw| self.normalize_value(raw))
                .unwrap_or_default();
            fields.insert(name.clone(), value);
        }

        let ignored: Vec<&str> = record
            .iter()
            .map(|(name, _)| name)
            .filter(|name| !schema.contains(name))
            .collect();
        if !ignored.is_empty() {
            debug!("ignoring fields outside the schema: {}", ignored.join(", "));
        }

        Ok(fields)
    }

    /// Encodes a record into its canonical byte string.
    pub fn encode(&self, record: &CertificateRecord) -> Result<Vec<u8>, SchemaViolation> {
        let fields = self.normalize(record)?;
        encode_fields(&fields).map_err(|e| SchemaViolation::Unencodable(e.to_string()))
    }

    /// Encodes and hashes a record in one step.
    pub fn fingerprint(&self, record: &CertificateRecord) -> Result<Fingerprint, SchemaViolation> {
        let bytes = self.encode(record)?;
        Ok(crypto::fingerprint(&bytes))
    }

    fn normalize_value(&self, raw: &str) -> String {
        let trimmed = raw.trim();
        match self.config.case_folding {
            CaseFolding::Preserve => trimmed.to_string(),
            CaseFolding::Lower => trimmed.to_lowercase(),
        }
    }
}

/// Writes already-normalized fields as compact JSON with sorted keys.
///
/// `BTreeMap` iterates in ascending key order and `serde_json` escapes
/// strings the way `JSON.stringify` does.
pub fn encode_fields(fields: &BTreeMap<String, String>) -> serde_json::Result<Vec<u8>> {
    serde_json::to_vec(fields)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn scenario_encoder() -> CanonicalEncoder {
        CanonicalEncoder::new(CanonicalConfig {
            schema: RecordSchema::new(
                ["Name", "University", "RollNumber", "CertificateID", "Degree", "Grade"],
                Vec::<String>::new(),
            ),
            case_folding: CaseFolding::Preserve,
        })
    }

    fn scenario_record() -> CertificateRecord {
        CertificateRecord::new()
            .with("Name", "Asha Rao")
            .with("University", "XYZ")
            .with("RollNumber", "101")
            .with("CertificateID", "C-1")
            .with("Degree", "B.Tech")
            .with("Grade", "A")
    }

    #[test]
    fn test_scenario_encoding_is_sorted_compact_json() {
        let bytes = scenario_encoder().encode(&scenario_record()).unwrap();
        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            r#"{"CertificateID":"C-1","Degree":"B.Tech","Grade":"A","Name":"Asha Rao","RollNumber":"101","University":"XYZ"}"#
        );
    }

    #[test]
    fn test_scenario_fingerprint_is_stable() {
        let fp = scenario_encoder().fingerprint(&scenario_record()).unwrap();
        assert_eq!(
            fp.as_str(),
            "b7e1057f11c69f29986e10c1dccdb1e9e300207e2d87061c52d7a720f47258b4"
        );

        let changed = scenario_record().with("Grade", "B");
        let fp_b = scenario_encoder().fingerprint(&changed).unwrap();
        assert_eq!(
            fp_b.as_str(),
            "6391bb8958b32f3ea857d93ef71db008a542f3914c65af3a3bf5dc0c1e9ab0ad"
        );
    }

    #[test]
    fn test_every_field_affects_fingerprint() {
        let encoder = scenario_encoder();
        let base = encoder.fingerprint(&scenario_record()).unwrap();
        for name in encoder.schema().fields() {
            let original = scenario_record().get(name).unwrap().to_string();
            let tweaked = scenario_record().with(name, format!("{original}x"));
            assert_ne!(encoder.fingerprint(&tweaked).unwrap(), base, "field {name} had no effect");
        }
    }

    #[test]
    fn test_surrounding_whitespace_is_trimmed() {
        let encoder = scenario_encoder();
        let padded = scenario_record().with("Name", "  Asha Rao\t").with("RollNumber", " 101 ");
        assert_eq!(
            encoder.fingerprint(&padded).unwrap(),
            encoder.fingerprint(&scenario_record()).unwrap()
        );
    }

    #[test]
    fn test_case_is_preserved_by_default() {
        let encoder = scenario_encoder();
        let upper = scenario_record().with("Name", "ASHA RAO");
        assert_ne!(
            encoder.fingerprint(&upper).unwrap(),
            encoder.fingerprint(&scenario_record()).unwrap()
        );
    }

    #[test]
    fn test_lower_case_folding_option() {
        let mut config = scenario_encoder().config().clone();
        config.case_folding = CaseFolding::Lower;
        let encoder = CanonicalEncoder::new(config);
        let upper = scenario_record().with("Name", "ASHA RAO");
        assert_eq!(
            encoder.fingerprint(&upper).unwrap(),
            encoder.fingerprint(&scenario_record()).unwrap()
        );
        let text = String::from_utf8(encoder.encode(&upper).unwrap()).unwrap();
        assert!(text.contains(r#""Name":"asha rao""#));
        assert!(text.contains(r#""CertificateID""#), "keys are never folded");
    }

    #[test]
    fn test_fields_outside_schema_do_not_affect_fingerprint() {
        let encoder = scenario_encoder();
        let extra = scenario_record().with("Uploaded By", "clerk-7");
        assert_eq!(
            encoder.fingerprint(&extra).unwrap(),
            encoder.fingerprint(&scenario_record()).unwrap()
        );
    }

    #[test]
    fn test_missing_optional_field_encodes_as_empty_string() {
        let encoder = CanonicalEncoder::new(CanonicalConfig {
            schema: RecordSchema::new(["Name"], ["Remarks"]),
            case_folding: CaseFolding::Preserve,
        });
        let without = CertificateRecord::new().with("Name", "Asha Rao");
        let blank = without.clone().with("Remarks", "   ");
        let expected = r#"{"Name":"Asha Rao","Remarks":""}"#;
        assert_eq!(encoder.encode(&without).unwrap(), expected.as_bytes());
        assert_eq!(encoder.encode(&blank).unwrap(), expected.as_bytes());
    }

    #[test]
    fn test_missing_required_fields_are_reported_together() {
        let encoder = scenario_encoder();
        let record = CertificateRecord::new().with("Name", "Asha Rao").with("Grade", "A");
        match encoder.encode(&record) {
            Err(SchemaViolation::MissingFields(fields)) => {
                assert_eq!(fields, vec!["University", "RollNumber", "CertificateID", "Degree"]);
            }
            other => panic!("expected MissingFields, got {other:?}"),
        }
    }

    #[test]
    fn test_blank_required_field_is_a_violation() {
        let record = scenario_record().with("Grade", "  ");
        assert_eq!(
            scenario_encoder().encode(&record),
            Err(SchemaViolation::BlankFields(vec!["Grade".into()]))
        );
    }

    #[test]
    fn test_empty_record_is_a_violation() {
        assert_eq!(
            scenario_encoder().encode(&CertificateRecord::new()),
            Err(SchemaViolation::EmptyRecord)
        );
    }

    #[test]
    fn test_escaping_matches_json_stringify() {
        let mut fields = BTreeMap::new();
        fields.insert("quote\"key".to_string(), "back\\slash".to_string());
        fields.insert("ctrl".to_string(), "a\u{01}b\nc\td\u{1f}".to_string());
        fields.insert("unicode".to_string(), "Ré\u{2028}sumé ✓".to_string());
        let bytes = encode_fields(&fields).unwrap();
        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            "{\"ctrl\":\"a\\u0001b\\nc\\td\\u001f\",\"quote\\\"key\":\"back\\\\slash\",\"unicode\":\"Ré\u{2028}sumé ✓\"}"
        );
    }

    proptest! {
        #[test]
        fn prop_encoding_ignores_insertion_order(
            pairs in proptest::collection::btree_map("[A-Za-z ]{1,12}", "[ -~]{0,16}", 1..8)
        ) {
            let names: Vec<String> = pairs.keys().cloned().collect();
            let encoder = CanonicalEncoder::new(CanonicalConfig {
                schema: RecordSchema::new(Vec::<String>::new(), names),
                case_folding: CaseFolding::Preserve,
            });
            let forward: CertificateRecord = pairs.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
            let backward: CertificateRecord = pairs.iter().rev().map(|(k, v)| (k.clone(), v.clone())).collect();
            prop_assert_eq!(encoder.encode(&forward).unwrap(), encoder.encode(&backward).unwrap());
        }
    }
}
