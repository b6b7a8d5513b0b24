// src/blockchain/memory.rs
//! In-memory ledger.
//!
//! Behaves like the deployed contract: append-only, duplicates permitted, and
//! lookups answer with the metadata of the first registration. Used for tests
//! and for dry runs of the command-line tool.
//!
//! When opened on a snapshot file the log survives the process, so a dry-run
//! `register` followed by a separate `verify` sees the same ledger.

use crate::blockchain::LedgerClient;
use crate::error::LedgerError;
use crate::models::fingerprint::Fingerprint;
use crate::models::membership::{AppendReceipt, MembershipRecord};
use async_trait::async_trait;
use chrono::Utc;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::fs;

/// Registration metadata kept for each fingerprint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredEntry {
    pub registered_at: u64,
    pub issuer: String,
}

/// One appended fingerprint as written to the snapshot file.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
struct LogEntry {
    fingerprint: Fingerprint,
    registered_at: u64,
    issuer: String,
}

#[derive(Serialize, Deserialize, Debug, Default)]
struct Snapshot {
    next_tx: u64,
    entries: Vec<LogEntry>,
}

#[derive(Default)]
struct LedgerState {
    /// Every appended fingerprint in order, duplicates included.
    log: Vec<LogEntry>,
    first_seen: HashMap<Fingerprint, StoredEntry>,
    append_calls: Vec<Vec<Fingerprint>>,
    next_tx: u64,
    lookup_calls: usize,
    lookup_fault: Option<LedgerError>,
    /// Fault returned by the next `remaining` lookups only.
    transient_lookup_fault: Option<(usize, LedgerError)>,
    append_fault: Option<LedgerError>,
}

impl LedgerState {
    fn from_snapshot(snapshot: Snapshot) -> Self {
        let mut state = LedgerState {
            next_tx: snapshot.next_tx,
            ..LedgerState::default()
        };
        for entry in snapshot.entries {
            state.push(entry);
        }
        state
    }

    fn push(&mut self, entry: LogEntry) {
        self.first_seen
            .entry(entry.fingerprint.clone())
            .or_insert_with(|| StoredEntry {
                registered_at: entry.registered_at,
                issuer: entry.issuer.clone(),
            });
        self.log.push(entry);
    }
}

/// Tracks how many appends are between lock acquisition and completion.
#[derive(Default)]
struct InFlight {
    current: AtomicUsize,
    peak: AtomicUsize,
}

struct InFlightGuard<'a>(&'a InFlight);

impl InFlight {
    fn enter(&self) -> InFlightGuard<'_> {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        InFlightGuard(self)
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.current.fetch_sub(1, Ordering::SeqCst);
    }
}

/// In-memory [`LedgerClient`] with fault injection.
///
/// # Note
/// Without a snapshot file, state lives only as long as the instance. Share
/// it with `Arc` when a test needs to register and verify through different
/// workflow objects.
pub struct InMemoryLedger {
    issuer: String,
    fixed_timestamp: Option<u64>,
    snapshot: Option<PathBuf>,
    append_delay: Option<Duration>,
    state: Mutex<LedgerState>,
    /// Serializes appends, including the snapshot write.
    write_lock: tokio::sync::Mutex<()>,
    in_flight: InFlight,
}

impl InMemoryLedger {
    /// Creates an empty ledger whose appends are attributed to `issuer`.
    pub fn new(issuer: impl Into<String>) -> Self {
        Self {
            issuer: issuer.into(),
            fixed_timestamp: None,
            snapshot: None,
            append_delay: None,
            state: Mutex::new(LedgerState::default()),
            write_lock: tokio::sync::Mutex::new(()),
            in_flight: InFlight::default(),
        }
    }

    /// Opens a ledger backed by the JSON snapshot at `path`.
    ///
    /// A missing file is an empty ledger; it is created on the first append.
    ///
    /// # Errors
    /// `Misconfigured` if the file exists but cannot be read or parsed.
    pub async fn open(path: impl Into<PathBuf>, issuer: impl Into<String>) -> Result<Self, LedgerError> {
        let path = path.into();
        let snapshot = match fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice::<Snapshot>(&bytes).map_err(|e| {
                LedgerError::Misconfigured(format!("corrupt ledger file {}: {e}", path.display()))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Snapshot::default(),
            Err(e) => {
                return Err(LedgerError::Misconfigured(format!(
                    "cannot read ledger file {}: {e}",
                    path.display()
                )))
            }
        };
        info!(
            "opened memory ledger {} ({} fingerprint(s))",
            path.display(),
            snapshot.entries.len()
        );

        let mut ledger = Self::new(issuer);
        ledger.state = Mutex::new(LedgerState::from_snapshot(snapshot));
        ledger.snapshot = Some(path);
        Ok(ledger)
    }

    /// Stamps every registration with `timestamp` instead of the wall clock.
    pub fn with_fixed_timestamp(mut self, timestamp: u64) -> Self {
        self.fixed_timestamp = Some(timestamp);
        self
    }

    /// Holds every append for `delay` while the write lock is taken.
    pub fn with_append_delay(mut self, delay: Duration) -> Self {
        self.append_delay = Some(delay);
        self
    }

    /// Snapshot file backing this ledger, if any.
    pub fn path(&self) -> Option<&Path> {
        self.snapshot.as_deref()
    }

    /// Makes every subsequent lookup fail with `fault` (or succeed again with `None`).
    pub fn set_lookup_fault(&self, fault: Option<LedgerError>) {
        self.lock().lookup_fault = fault;
    }

    /// Makes only the next `count` lookups fail with `fault`.
    pub fn fail_next_lookups(&self, count: usize, fault: LedgerError) {
        self.lock().transient_lookup_fault = (count > 0).then_some((count, fault));
    }

    /// Makes every subsequent append fail with `fault` (or succeed again with `None`).
    pub fn set_append_fault(&self, fault: Option<LedgerError>) {
        self.lock().append_fault = fault;
    }

    /// Fingerprints passed to each `append_batch` call, failed calls included.
    pub fn append_calls(&self) -> Vec<Vec<Fingerprint>> {
        self.lock().append_calls.clone()
    }

    /// Number of `lookup` calls made, failed calls included.
    pub fn lookup_calls(&self) -> usize {
        self.lock().lookup_calls
    }

    /// Highest number of appends that were ever in progress at once.
    pub fn max_concurrent_appends(&self) -> usize {
        self.in_flight.peak.load(Ordering::SeqCst)
    }

    /// All stored fingerprints in append order, duplicates included.
    pub fn fingerprints(&self) -> Vec<Fingerprint> {
        self.lock().log.iter().map(|e| e.fingerprint.clone()).collect()
    }

    /// Metadata recorded for the first registration of `fingerprint`.
    pub fn entry(&self, fingerprint: &Fingerprint) -> Option<StoredEntry> {
        self.lock().first_seen.get(fingerprint).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().log.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LedgerState> {
        // A poisoned lock only means a test thread panicked mid-call.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn now(&self) -> u64 {
        self.fixed_timestamp
            .unwrap_or_else(|| u64::try_from(Utc::now().timestamp()).unwrap_or_default())
    }

    /// Writes the log plus `added` to the snapshot file, if there is one.
    async fn save(&self, added: &[LogEntry], next_tx: u64) -> Result<(), LedgerError> {
        let Some(path) = &self.snapshot else {
            return Ok(());
        };
        let snapshot = {
            let state = self.lock();
            let mut entries = state.log.clone();
            entries.extend_from_slice(added);
            Snapshot { next_tx, entries }
        };
        let bytes = serde_json::to_vec_pretty(&snapshot)
            .map_err(|e| LedgerError::Unavailable(format!("cannot encode ledger: {e}")))?;

        // Write aside and rename so a crash never leaves half a file.
        let tmp = path.with_extension("tmp");
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| LedgerError::Unavailable(format!("cannot create {}: {e}", parent.display())))?;
        }
        fs::write(&tmp, &bytes)
            .await
            .map_err(|e| LedgerError::Unavailable(format!("cannot write {}: {e}", tmp.display())))?;
        fs::rename(&tmp, path)
            .await
            .map_err(|e| LedgerError::Unavailable(format!("cannot write {}: {e}", path.display())))?;
        debug!("saved {} fingerprint(s) to {}", snapshot.entries.len(), path.display());
        Ok(())
    }
}

#[async_trait]
impl LedgerClient for InMemoryLedger {
    async fn append_batch(&self, fingerprints: &[Fingerprint]) -> Result<AppendReceipt, LedgerError> {
        let _write = self.write_lock.lock().await;
        let _in_flight = self.in_flight.enter();
        if let Some(delay) = self.append_delay {
            tokio::time::sleep(delay).await;
        }

        let timestamp = self.now();
        let next_tx = {
            let mut state = self.lock();
            state.append_calls.push(fingerprints.to_vec());

            if let Some(fault) = state.append_fault.clone() {
                return Err(fault);
            }
            if fingerprints.is_empty() {
                return Err(LedgerError::Rejected("empty batch".into()));
            }
            state.next_tx + 1
        };

        let added: Vec<LogEntry> = fingerprints
            .iter()
            .map(|fp| LogEntry {
                fingerprint: fp.clone(),
                registered_at: timestamp,
                issuer: self.issuer.clone(),
            })
            .collect();

        // Nothing is committed unless the snapshot write succeeded.
        self.save(&added, next_tx).await?;

        let mut state = self.lock();
        for entry in added {
            state.push(entry);
        }
        state.next_tx = next_tx;
        Ok(AppendReceipt {
            transaction_id: format!("mem-tx-{next_tx}"),
            count: fingerprints.len(),
        })
    }

    async fn lookup(&self, fingerprint: &Fingerprint) -> Result<MembershipRecord, LedgerError> {
        let mut state = self.lock();
        state.lookup_calls += 1;

        if let Some((remaining, fault)) = state.transient_lookup_fault.take() {
            if remaining > 1 {
                state.transient_lookup_fault = Some((remaining - 1, fault.clone()));
            }
            return Err(fault);
        }
        if let Some(fault) = state.lookup_fault.clone() {
            return Err(fault);
        }
        Ok(match state.first_seen.get(fingerprint) {
            Some(entry) => MembershipRecord::present(entry.registered_at, entry.issuer.clone()),
            None => MembershipRecord::absent(),
        })
    }

    fn describe(&self) -> String {
        match &self.snapshot {
            Some(path) => format!("memory:{}", path.display()),
            None => "memory".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::crypto::fingerprint;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn fp(tag: &str) -> Fingerprint {
        fingerprint(tag.as_bytes())
    }

    #[tokio::test]
    async fn test_lookup_absent_is_not_an_error() {
        let ledger = InMemoryLedger::new("issuer-1");
        let record = ledger.lookup(&fp("nope")).await.unwrap();
        assert_eq!(record, MembershipRecord::absent());
    }

    #[tokio::test]
    async fn test_append_then_lookup() {
        let ledger = InMemoryLedger::new("issuer-1").with_fixed_timestamp(1_700_000_000);
        let receipt = ledger.append_batch(&[fp("a"), fp("b")]).await.unwrap();
        assert_eq!(receipt.count, 2);
        assert_eq!(receipt.transaction_id, "mem-tx-1");

        let record = ledger.lookup(&fp("b")).await.unwrap();
        assert_eq!(record, MembershipRecord::present(1_700_000_000, "issuer-1"));
    }

    #[tokio::test]
    async fn test_duplicates_are_kept_first_metadata_wins() {
        let ledger = InMemoryLedger::new("issuer-1").with_fixed_timestamp(100);
        ledger.append_batch(&[fp("a")]).await.unwrap();
        let ledger = ledger.with_fixed_timestamp(200);
        ledger.append_batch(&[fp("a")]).await.unwrap();

        assert_eq!(ledger.len(), 2);
        assert_eq!(ledger.entry(&fp("a")).unwrap().registered_at, 100);
    }

    #[tokio::test]
    async fn test_fault_injection() {
        let ledger = InMemoryLedger::new("issuer-1");
        ledger.set_append_fault(Some(LedgerError::Rejected("gas".into())));
        let err = ledger.append_batch(&[fp("a")]).await.unwrap_err();
        assert_eq!(err, LedgerError::Rejected("gas".into()));
        assert!(ledger.is_empty());
        assert_eq!(ledger.append_calls().len(), 1);

        ledger.set_lookup_fault(Some(LedgerError::Unavailable("down".into())));
        assert!(ledger.lookup(&fp("a")).await.is_err());
        ledger.set_lookup_fault(None);
        assert!(ledger.lookup(&fp("a")).await.is_ok());
        assert_eq!(ledger.lookup_calls(), 2);
    }

    #[tokio::test]
    async fn test_fail_next_lookups_recovers() {
        let ledger = InMemoryLedger::new("issuer-1");
        ledger.fail_next_lookups(2, LedgerError::Unavailable("blip".into()));
        assert!(ledger.lookup(&fp("a")).await.is_err());
        assert!(ledger.lookup(&fp("a")).await.is_err());
        assert_eq!(ledger.lookup(&fp("a")).await.unwrap(), MembershipRecord::absent());
        assert_eq!(ledger.lookup_calls(), 3);
    }

    #[test]
    fn test_empty_batch_rejected_but_logged() {
        let ledger = InMemoryLedger::new("issuer-1");
        let err = tokio_test::block_on(ledger.append_batch(&[])).unwrap_err();
        assert!(matches!(err, LedgerError::Rejected(_)));
        assert_eq!(ledger.append_calls(), vec![Vec::<Fingerprint>::new()]);
        tokio_test::assert_ok!(tokio_test::block_on(ledger.lookup(&fp("a"))));
    }

    #[tokio::test]
    async fn test_snapshot_survives_reopen() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("state").join("ledger.json");

        let first = InMemoryLedger::open(&path, "issuer-1").await.unwrap().with_fixed_timestamp(42);
        assert!(first.is_empty());
        first.append_batch(&[fp("a"), fp("b")]).await.unwrap();
        first.append_batch(&[fp("a")]).await.unwrap();
        drop(first);

        let second = InMemoryLedger::open(&path, "issuer-2").await.unwrap();
        assert_eq!(second.fingerprints(), vec![fp("a"), fp("b"), fp("a")]);
        assert_eq!(
            second.lookup(&fp("b")).await.unwrap(),
            MembershipRecord::present(42, "issuer-1")
        );
        let receipt = second.append_batch(&[fp("c")]).await.unwrap();
        assert_eq!(receipt.transaction_id, "mem-tx-3");
        assert!(second.describe().starts_with("memory:"));
    }

    #[tokio::test]
    async fn test_failed_append_is_not_saved() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("ledger.json");

        let ledger = InMemoryLedger::open(&path, "issuer-1").await.unwrap();
        ledger.set_append_fault(Some(LedgerError::Rejected("gas".into())));
        assert!(ledger.append_batch(&[fp("a")]).await.is_err());
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_corrupt_snapshot_is_misconfigured() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("ledger.json");
        std::fs::write(&path, b"not json").unwrap();

        let result = InMemoryLedger::open(&path, "issuer-1").await;
        assert!(matches!(result, Err(LedgerError::Misconfigured(_))));
    }

    #[tokio::test]
    async fn test_concurrent_appends_do_not_overlap() {
        let ledger = Arc::new(InMemoryLedger::new("issuer-1").with_append_delay(Duration::from_millis(20)));
        let batch_a = [fp("a1"), fp("a2")];
        let batch_b = [fp("b1"), fp("b2")];
        let (a, b) = tokio::join!(
            ledger.append_batch(&batch_a),
            ledger.append_batch(&batch_b),
        );
        assert!(a.is_ok() && b.is_ok());
        assert_eq!(ledger.max_concurrent_appends(), 1);

        let log = ledger.fingerprints();
        assert!(
            log == vec![fp("a1"), fp("a2"), fp("b1"), fp("b2")]
                || log == vec![fp("b1"), fp("b2"), fp("a1"), fp("a2")],
            "batches interleaved: {log:?}"
        );
    }
}
