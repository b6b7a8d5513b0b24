// src/storage/report_store.rs
//! Filesystem sink for verification artifacts.
//!
//! Provides async storage for:
//! - Batch verification reports (JSON) and their CSV summaries
//! - Single verification results, filed by outcome category, with an optional
//!   copy of the file that was checked (e.g. the uploaded certificate image)
//!
//! The sink only consumes structured outcomes; it never recomputes a fingerprint.

use crate::models::outcome::{OutcomeCategory, VerificationOutcome};
use crate::models::record::CertificateRecord;
use crate::services::report::VerificationReport;
use chrono::{SecondsFormat, Utc};
use log::info;
use serde::Serialize;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("cannot write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot serialize report: {0}")]
    Json(#[from] serde_json::Error),
}

/// Persisted form of a single verification.
#[derive(Serialize, Debug)]
struct StoredResult<'a> {
    record: &'a CertificateRecord,
    outcome: &'a VerificationOutcome,
    checked_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    attachment: Option<String>,
}

/// Directory layout for stored artifacts.
#[derive(Debug, Clone)]
pub struct ReportStore {
    verified_dir: PathBuf,
    unverified_dir: PathBuf,
    error_dir: PathBuf,
    output_dir: PathBuf,
}

impl ReportStore {
    /// Creates a store. Directories are created lazily on first write.
    ///
    /// # Arguments
    /// * `verified_dir` - Destination for `Valid` results
    /// * `unverified_dir` - Destination for `Invalid` results
    /// * `error_dir` - Destination for results that could not be checked
    /// * `output_dir` - Destination for batch reports and CSV summaries
    pub fn new(
        verified_dir: impl Into<PathBuf>,
        unverified_dir: impl Into<PathBuf>,
        error_dir: impl Into<PathBuf>,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            verified_dir: verified_dir.into(),
            unverified_dir: unverified_dir.into(),
            error_dir: error_dir.into(),
            output_dir: output_dir.into(),
        }
    }

    pub fn dir_for(&self, category: OutcomeCategory) -> &Path {
        match category {
            OutcomeCategory::Verified => &self.verified_dir,
            OutcomeCategory::Unverified => &self.unverified_dir,
            OutcomeCategory::Error => &self.error_dir,
        }
    }

    /// Writes raw bytes, creating parent directories as needed.
    pub async fn store_data(&self, path: &Path, data: &[u8]) -> Result<(), ReportError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await.map_err(|source| ReportError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        fs::write(path, data).await.map_err(|source| ReportError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Writes a value as pretty-printed JSON.
    pub async fn store_json<T: Serialize>(&self, path: &Path, obj: &T) -> Result<(), ReportError> {
        let json = serde_json::to_vec_pretty(obj)?;
        self.store_data(path, &json).await
    }

    /// Writes a batch report as `verification_report_<stamp>.json`.
    pub async fn write_report(
        &self,
        report: &VerificationReport,
        stamp: &str,
    ) -> Result<PathBuf, ReportError> {
        let path = self.output_dir.join(format!("verification_report_{stamp}.json"));
        self.store_json(&path, report).await?;
        info!("report saved to {}", path.display());
        Ok(path)
    }

    /// Writes a CSV summary as `verification_summary_<stamp>.csv`.
    pub async fn write_csv_summary(&self, csv: &[u8], stamp: &str) -> Result<PathBuf, ReportError> {
        let path = self.output_dir.join(format!("verification_summary_{stamp}.csv"));
        self.store_data(&path, csv).await?;
        info!("CSV summary saved to {}", path.display());
        Ok(path)
    }

    /// Files a single verification result under its outcome category.
    ///
    /// The result lands in `<category dir>/<fingerprint>.json`; candidates
    /// without a fingerprint use a timestamped name. When `attachment` is
    /// given it is copied alongside with the same stem.
    ///
    /// # Returns
    /// Path of the written JSON file
    pub async fn persist_outcome(
        &self,
        record: &CertificateRecord,
        outcome: &VerificationOutcome,
        attachment: Option<&Path>,
    ) -> Result<PathBuf, ReportError> {
        let dir = self.dir_for(outcome.category());
        let stem = match outcome.fingerprint() {
            Some(fp) => fp.to_string(),
            None => format!("unfingerprinted_{}", file_stamp()),
        };

        let mut copied = None;
        if let Some(source) = attachment {
            let mut target = dir.join(&stem);
            if let Some(ext) = source.extension() {
                target.set_extension(ext);
            }
            fs::create_dir_all(dir).await.map_err(|e| ReportError::Io {
                path: dir.to_path_buf(),
                source: e,
            })?;
            fs::copy(source, &target).await.map_err(|e| ReportError::Io {
                path: source.to_path_buf(),
                source: e,
            })?;
            copied = target.file_name().map(|n| n.to_string_lossy().into_owned());
        }

        let path = dir.join(format!("{stem}.json"));
        let stored = StoredResult {
            record,
            outcome,
            checked_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            attachment: copied,
        };
        self.store_json(&path, &stored).await?;
        info!("{} result filed at {}", outcome.label(), path.display());
        Ok(path)
    }
}

/// Filesystem-safe UTC timestamp, e.g. `2025-01-31T09-05-00`.
pub fn file_stamp() -> String {
    Utc::now().format("%Y-%m-%dT%H-%M-%S").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fingerprint::Fingerprint;
    use crate::models::outcome::FailureKind;
    use std::time::Duration;
    use tempfile::TempDir;

    fn store(root: &Path) -> ReportStore {
        ReportStore::new(
            root.join("verified"),
            root.join("unverified"),
            root.join("error"),
            root.join("reports"),
        )
    }

    fn record() -> CertificateRecord {
        CertificateRecord::new().with("Name", "Asha Rao")
    }

    #[tokio::test]
    async fn test_persist_files_by_category_with_attachment() {
        let tmp = TempDir::new().unwrap();
        let upload = tmp.path().join("upload.png");
        std::fs::write(&upload, b"\x89PNG fake").unwrap();

        let fp = Fingerprint::from_digest([9; 32]);
        let outcome = VerificationOutcome::Valid {
            fingerprint: fp.clone(),
            registered_at: Some(1),
            issuer: Some("0xabc".into()),
        };
        let path = store(tmp.path())
            .persist_outcome(&record(), &outcome, Some(&upload))
            .await
            .unwrap();

        assert_eq!(path, tmp.path().join("verified").join(format!("{fp}.json")));
        let image = tmp.path().join("verified").join(format!("{fp}.png"));
        assert_eq!(std::fs::read(image).unwrap(), b"\x89PNG fake");

        let json: serde_json::Value = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(json["outcome"]["status"], "valid");
        assert_eq!(json["record"]["Name"], "Asha Rao");
        assert_eq!(json["attachment"], format!("{fp}.png"));
    }

    #[tokio::test]
    async fn test_invalid_and_error_go_to_their_own_dirs() {
        let tmp = TempDir::new().unwrap();
        let store = store(tmp.path());

        let invalid = VerificationOutcome::Invalid {
            fingerprint: Fingerprint::from_digest([1; 32]),
        };
        let p = store.persist_outcome(&record(), &invalid, None).await.unwrap();
        assert!(p.starts_with(tmp.path().join("unverified")));

        let error = VerificationOutcome::Error {
            fingerprint: None,
            kind: FailureKind::SchemaViolation,
            reason: "missing required field(s): Grade".into(),
        };
        let p = store.persist_outcome(&record(), &error, None).await.unwrap();
        assert!(p.starts_with(tmp.path().join("error")));
        assert!(p.file_name().unwrap().to_string_lossy().starts_with("unfingerprinted_"));
    }

    #[tokio::test]
    async fn test_write_report_and_csv() {
        let tmp = TempDir::new().unwrap();
        let store = store(tmp.path());
        let report = VerificationReport::build("in.json", "memory", Vec::new(), Duration::ZERO);

        let json_path = store.write_report(&report, "2025-01-01T00-00-00").await.unwrap();
        assert!(json_path.ends_with("reports/verification_report_2025-01-01T00-00-00.json"));
        let back: VerificationReport =
            serde_json::from_slice(&std::fs::read(&json_path).unwrap()).unwrap();
        assert_eq!(back, report);

        let csv_path = store
            .write_csv_summary(b"\"Name\"", "2025-01-01T00-00-00")
            .await
            .unwrap();
        assert_eq!(std::fs::read_to_string(csv_path).unwrap(), "\"Name\"");
    }
}
