// src/services/report.rs
//! Verification reports.
//!
//! Aggregates the outcomes of a batch verification into a JSON-serializable
//! report with summary metadata, and renders the CSV summary that auditors
//! open in a spreadsheet.

use crate::models::outcome::{FailureKind, VerificationOutcome};
use crate::models::record::CertificateRecord;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Summary block at the top of a report.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ReportMetadata {
    /// Where the candidates came from (usually a file path)
    pub source: String,
    pub total_processed: usize,
    pub valid_count: usize,
    pub invalid_count: usize,
    pub error_count: usize,
    /// Errors caused by malformed candidates rather than the ledger
    #[serde(default)]
    pub schema_error_count: usize,
    /// Share of valid certificates, in percent, two decimals
    pub success_rate: f64,
    /// RFC 3339 time the report was built
    pub verified_at: String,
    /// Ledger identity (contract address or `memory`)
    pub ledger: String,
    pub processing_seconds: f64,
    pub average_seconds: f64,
}

/// One verified certificate.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ReportEntry {
    /// One-based position in the source
    pub index: usize,
    pub record: CertificateRecord,
    pub outcome: VerificationOutcome,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct VerificationReport {
    pub metadata: ReportMetadata,
    pub certificates: Vec<ReportEntry>,
}

impl VerificationReport {
    /// Builds a report from candidates and their outcomes (same order, same length).
    pub fn build(
        source: impl Into<String>,
        ledger: impl Into<String>,
        results: Vec<(CertificateRecord, VerificationOutcome)>,
        elapsed: Duration,
    ) -> Self {
        let total = results.len();
        let count = |pred: fn(&VerificationOutcome) -> bool| {
            results.iter().filter(|(_, o)| pred(o)).count()
        };
        let valid_count = count(|o| matches!(o, VerificationOutcome::Valid { .. }));
        let invalid_count = count(|o| matches!(o, VerificationOutcome::Invalid { .. }));
        let error_count = count(|o| matches!(o, VerificationOutcome::Error { .. }));
        let schema_error_count = count(|o| o.failure() == Some(FailureKind::SchemaViolation));

        let processing_seconds = round2(elapsed.as_secs_f64());
        let (success_rate, average_seconds) = if total == 0 {
            (0.0, 0.0)
        } else {
            (
                round2(valid_count as f64 / total as f64 * 100.0),
                round3(elapsed.as_secs_f64() / total as f64),
            )
        };

        let certificates = results
            .into_iter()
            .enumerate()
            .map(|(i, (record, outcome))| ReportEntry {
                index: i + 1,
                record,
                outcome,
            })
            .collect();

        Self {
            metadata: ReportMetadata {
                source: source.into(),
                total_processed: total,
                valid_count,
                invalid_count,
                error_count,
                schema_error_count,
                success_rate,
                verified_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
                ledger: ledger.into(),
                processing_seconds,
                average_seconds,
            },
            certificates,
        }
    }

    /// Renders one CSV row per certificate.
    ///
    /// Columns are the given record fields followed by
    /// `Status,Hash,Timestamp,Issuer`. Every field is quoted.
    pub fn csv_summary(&self, columns: &[String]) -> Result<Vec<u8>, csv::Error> {
        let mut writer = csv::WriterBuilder::new()
            .quote_style(csv::QuoteStyle::Always)
            .from_writer(Vec::new());

        let mut header: Vec<&str> = columns.iter().map(String::as_str).collect();
        header.extend(["Status", "Hash", "Timestamp", "Issuer"]);
        writer.write_record(&header)?;

        for entry in &self.certificates {
            let mut row: Vec<String> = columns
                .iter()
                .map(|c| entry.record.get(c).unwrap_or_default().to_string())
                .collect();
            let (timestamp, issuer) = match &entry.outcome {
                VerificationOutcome::Valid {
                    registered_at,
                    issuer,
                    ..
                } => (
                    registered_at.map(|t| t.to_string()),
                    issuer.clone(),
                ),
                _ => (None, None),
            };
            row.push(entry.outcome.label().to_string());
            row.push(
                entry
                    .outcome
                    .fingerprint()
                    .map(|fp| fp.to_string())
                    .unwrap_or_default(),
            );
            row.push(timestamp.unwrap_or_else(|| "N/A".into()));
            row.push(issuer.unwrap_or_else(|| "N/A".into()));
            writer.write_record(&row)?;
        }
        writer
            .into_inner()
            .map_err(|e| csv::Error::from(e.into_error()))
    }
}

/// Formats a registration timestamp for people, falling back to the raw value.
pub fn display_timestamp(epoch_seconds: u64) -> String {
    i64::try_from(epoch_seconds)
        .ok()
        .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
        .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Secs, true))
        .unwrap_or_else(|| epoch_seconds.to_string())
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

fn round3(v: f64) -> f64 {
    (v * 1000.0).round() / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fingerprint::Fingerprint;

    fn sample() -> VerificationReport {
        let rec = |name: &str| CertificateRecord::new().with("Name", name).with("Grade", "A");
        VerificationReport::build(
            "data/certificates2.csv",
            "memory",
            vec![
                (
                    rec("Asha \"AR\" Rao"),
                    VerificationOutcome::Valid {
                        fingerprint: Fingerprint::from_digest([1; 32]),
                        registered_at: Some(1_700_000_000),
                        issuer: Some("0xabc".into()),
                    },
                ),
                (
                    rec("Ravi"),
                    VerificationOutcome::Invalid {
                        fingerprint: Fingerprint::from_digest([2; 32]),
                    },
                ),
                (
                    rec("Meena"),
                    VerificationOutcome::Error {
                        fingerprint: None,
                        kind: FailureKind::LedgerUnavailable,
                        reason: "ledger unavailable: down".into(),
                    },
                ),
                (
                    rec("Kiran"),
                    VerificationOutcome::Invalid {
                        fingerprint: Fingerprint::from_digest([3; 32]),
                    },
                ),
            ],
            Duration::from_millis(2000),
        )
    }

    #[test]
    fn test_metadata_counts() {
        let report = sample();
        let m = &report.metadata;
        assert_eq!(m.total_processed, 4);
        assert_eq!((m.valid_count, m.invalid_count, m.error_count), (1, 2, 1));
        assert_eq!(m.schema_error_count, 0);
        assert_eq!(m.success_rate, 25.0);
        assert_eq!(m.processing_seconds, 2.0);
        assert_eq!(m.average_seconds, 0.5);
        assert_eq!(report.certificates[0].index, 1);
    }

    #[test]
    fn test_malformed_candidates_are_counted_apart() {
        let report = VerificationReport::build(
            "in.json",
            "memory",
            vec![(
                CertificateRecord::new(),
                VerificationOutcome::Error {
                    fingerprint: None,
                    kind: FailureKind::SchemaViolation,
                    reason: "record has no fields".into(),
                },
            )],
            Duration::ZERO,
        );
        assert_eq!(report.metadata.error_count, 1);
        assert_eq!(report.metadata.schema_error_count, 1);
    }

    #[test]
    fn test_empty_report_has_zero_rate() {
        let report = VerificationReport::build("empty.json", "memory", Vec::new(), Duration::ZERO);
        assert_eq!(report.metadata.success_rate, 0.0);
        assert!(report.certificates.is_empty());
    }

    #[test]
    fn test_csv_summary_quotes_and_fills_na() {
        let bytes = sample()
            .csv_summary(&["Name".to_string(), "Grade".to_string()])
            .unwrap();
        let csv = String::from_utf8(bytes).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], r#""Name","Grade","Status","Hash","Timestamp","Issuer""#);
        assert!(lines[1].starts_with(r#""Asha ""AR"" Rao","A","VALID","#));
        assert!(lines[1].ends_with(r#","1700000000","0xabc""#));
        assert!(lines[2].ends_with(r#""N/A","N/A""#));
        assert!(lines[3].contains(r#""ERROR","""#));
        assert_eq!(lines.len(), 5);
    }

    #[test]
    fn test_display_timestamp() {
        assert_eq!(display_timestamp(1_700_000_000), "2023-11-14T22:13:20Z");
    }
}
