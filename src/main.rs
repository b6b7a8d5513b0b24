// src/main.rs

//! # Certificate Chain - Main Entry Point
//!
//! Command-line front end for registering academic certificates on a ledger
//! and verifying candidate certificates against it.
//!
//! ## Architecture Overview
//! 1. **Canonical Layer**: `CanonicalEncoder` turns a record into deterministic
//!    bytes and a SHA-256 fingerprint
//! 2. **Ledger Layer**: `LedgerClient` adapters (`CertificateChain` contract over
//!    JSON-RPC, or a file-backed memory ledger for dry runs)
//! 3. **Services Layer**: batch registration, verification and reports
//! 4. **Storage Layer**: record sources and the verification artifact store
//!
//! ## Environment Variables
//! - `PRIVATE_KEY`: signing key, required by the `ethereum` backend
//! - `CERTCHAIN_*`: overrides for any setting (see `settings`)
//! - `RUST_LOG`: log filter (default `info`)

use crate::blockchain::eth_client::EthClient;
use crate::blockchain::memory::InMemoryLedger;
use crate::blockchain::LedgerClient;
use crate::contracts::certificate_chain::CertificateChain;
use crate::error::LedgerError;
use crate::models::outcome::{BatchResult, FailureKind, Outcome, VerificationOutcome};
use crate::models::record::CertificateRecord;
use crate::services::registrar::Registrar;
use crate::services::report::{display_timestamp, VerificationReport};
use crate::services::verifier::Verifier;
use crate::settings::{LedgerBackend, Settings};
use crate::storage::record_source::{load_records, prompt_record};
use crate::storage::report_store::{file_stamp, ReportStore};
use crate::utils::canonical::CanonicalEncoder;
use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use dotenv::dotenv;
use log::{info, warn};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;

// Module declarations (organized by functional domain)
mod blockchain; // Ledger boundary and adapters
mod contracts; // CertificateChain contract wrapper
mod error; // Shared error types
mod models; // Data structures
mod services; // Registration, verification, reports
mod settings; // Layered configuration
mod storage; // Record sources and artifact store
mod utils; // Encoding, hashing, retry

#[derive(Parser, Debug)]
#[command(name = "certchain", version, about = "Register and verify certificate fingerprints")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Settings file (defaults to an optional ./certchain.toml).
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging.
    #[arg(long, global = true)]
    debug: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the canonical encoding and fingerprint of every record in a file.
    Fingerprint {
        /// JSON array, JSON Lines or CSV file of records.
        input: PathBuf,
    },

    /// Register every record in a file as one batch.
    Register {
        /// JSON array, JSON Lines or CSV file of records.
        input: PathBuf,

        /// Print the full batch result as JSON.
        #[arg(long)]
        json: bool,

        /// Look up fingerprints whose append outcome is unknown and mark those
        /// already on the ledger as registered.
        #[arg(long)]
        reconcile: bool,
    },

    /// Verify a single certificate.
    Verify {
        /// Field value as KEY=VALUE. Can be repeated.
        #[arg(long = "field", value_parser = parse_field)]
        fields: Vec<(String, String)>,

        /// Prompt for each schema field instead.
        #[arg(long, conflicts_with = "fields")]
        interactive: bool,

        /// File the result under the verified/unverified/error directories.
        #[arg(long)]
        persist: bool,

        /// File to store next to the persisted result (e.g. the certificate image).
        #[arg(long, requires = "persist")]
        attach: Option<PathBuf>,
    },

    /// Verify every record in a file and write a report.
    VerifyBatch {
        /// JSON array, JSON Lines or CSV file of records.
        input: PathBuf,

        #[arg(long, value_enum, default_value_t = ReportMode::Summary)]
        report: ReportMode,

        /// Lookups in flight at once (overrides settings).
        #[arg(long)]
        concurrency: Option<usize>,
    },

    /// List every fingerprint held by the ledger.
    Export,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ReportMode {
    /// Counts on the terminal plus the JSON report.
    Summary,
    /// Per-certificate lines, the JSON report and a CSV summary.
    Detailed,
    /// Only the JSON report.
    JsonOnly,
}

fn parse_field(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected KEY=VALUE, got `{s}`")),
    }
}

/// Ledger backend selected by settings.
enum Ledger {
    Memory(Arc<InMemoryLedger>),
    Chain(Arc<CertificateChain>),
}

impl Ledger {
    async fn connect(settings: &Settings) -> Result<Self> {
        let ledger = &settings.ledger;
        match ledger.backend {
            LedgerBackend::Memory => {
                let memory = match &ledger.memory_path {
                    Some(path) => {
                        info!("using the memory ledger at {}", path.display());
                        InMemoryLedger::open(path, ledger.memory_issuer.clone()).await?
                    }
                    None => {
                        warn!("using a process-local memory ledger; nothing is persisted");
                        InMemoryLedger::new(ledger.memory_issuer.clone())
                    }
                };
                Ok(Ledger::Memory(Arc::new(memory)))
            }
            LedgerBackend::Ethereum => {
                let private_key = std::env::var("PRIVATE_KEY")
                    .context("PRIVATE_KEY must be set for the ethereum backend")?;
                let address = ledger
                    .contract_address
                    .as_deref()
                    .context("ledger.contract_address is not set")?;

                let client = EthClient::new(
                    &ledger.rpc_url,
                    &private_key,
                    ledger.chain_id,
                    ledger.poll_interval(),
                )
                .await
                .with_context(|| format!("failed to connect to {}", ledger.rpc_url))?;
                info!("signing as {:#x}", client.address());

                let chain = CertificateChain::new(
                    client,
                    address,
                    ledger.gas_limit,
                    ledger.confirmation_timeout(),
                )?;
                Ok(Ledger::Chain(Arc::new(chain)))
            }
        }
    }

    fn client(&self) -> Arc<dyn LedgerClient> {
        match self {
            Ledger::Memory(ledger) => ledger.clone() as Arc<dyn LedgerClient>,
            Ledger::Chain(chain) => chain.clone() as Arc<dyn LedgerClient>,
        }
    }

    async fn export(&self) -> Result<Vec<String>, LedgerError> {
        match self {
            Ledger::Memory(ledger) => Ok(ledger.fingerprints().iter().map(|fp| fp.to_string()).collect()),
            Ledger::Chain(chain) => chain.all_fingerprints().await,
        }
    }
}

/// Main application entry point
///
/// # Initialization Sequence
/// 1. Load `.env` and parse the command line
/// 2. Initialize logging
/// 3. Load settings and build the shared encoder
/// 4. Dispatch the subcommand
#[tokio::main]
async fn main() -> Result<ExitCode> {
    dotenv().ok();
    let cli = Cli::parse();

    let level = if cli.debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let settings = Settings::load(cli.config.as_deref()).context("failed to load settings")?;
    let encoder = Arc::new(CanonicalEncoder::new(settings.canonical.to_config()));

    let ok = match cli.command {
        Commands::Fingerprint { input } => cmd_fingerprint(&encoder, input).await?,
        Commands::Register {
            input,
            json,
            reconcile,
        } => cmd_register(&settings, encoder, input, json, reconcile).await?,
        Commands::Verify {
            fields,
            interactive,
            persist,
            attach,
        } => cmd_verify(&settings, encoder, fields, interactive, persist, attach).await?,
        Commands::VerifyBatch {
            input,
            report,
            concurrency,
        } => cmd_verify_batch(&settings, encoder, input, report, concurrency).await?,
        Commands::Export => cmd_export(&settings).await?,
    };

    Ok(if ok { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}

async fn cmd_fingerprint(encoder: &CanonicalEncoder, input: PathBuf) -> Result<bool> {
    let records = load_records(&input).await?;
    let mut ok = true;
    for (index, record) in records.iter().enumerate() {
        match encoder.encode(record) {
            Ok(bytes) => {
                let fp = utils::crypto::fingerprint(&bytes);
                println!("#{index} {fp}");
                println!("   {}", String::from_utf8_lossy(&bytes));
            }
            Err(violation) => {
                ok = false;
                println!("#{index} error: {violation}");
            }
        }
    }
    Ok(ok)
}

async fn cmd_register(
    settings: &Settings,
    encoder: Arc<CanonicalEncoder>,
    input: PathBuf,
    json: bool,
    reconcile: bool,
) -> Result<bool> {
    let records = load_records(&input).await?;
    let ledger = Ledger::connect(settings).await?;
    let registrar = Registrar::new(ledger.client(), encoder)
        .with_max_batch_size(settings.registration.max_batch_size);

    info!("registering {} record(s) from {}", records.len(), input.display());
    let mut result = registrar.register_batch(records).await;
    if reconcile && !result.is_clean() {
        result = registrar.reconcile(result).await;
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_batch(&result);
    }
    Ok(result.is_clean())
}

fn print_batch(result: &BatchResult) {
    for entry in &result.entries {
        let fp = entry
            .fingerprint
            .as_ref()
            .map(|fp| fp.short())
            .unwrap_or_else(|| "-".to_string());
        let status = match entry.outcome {
            Outcome::Success => "registered",
            Outcome::Skipped => "skipped",
            Outcome::Failed => "failed",
        };
        match &entry.reason {
            Some(reason) => println!("#{} {:<10} {} ({})", entry.index, status, fp, reason),
            None => println!("#{} {:<10} {}", entry.index, status, fp),
        }
    }
    for receipt in &result.receipts {
        println!("tx {} ({} fingerprint(s))", receipt.transaction_id, receipt.count);
    }
    println!(
        "{} registered, {} skipped, {} failed",
        result.succeeded(),
        result.skipped(),
        result.failed()
    );
}

async fn cmd_verify(
    settings: &Settings,
    encoder: Arc<CanonicalEncoder>,
    fields: Vec<(String, String)>,
    interactive: bool,
    persist: bool,
    attach: Option<PathBuf>,
) -> Result<bool> {
    let record = if interactive {
        let stdin = std::io::stdin();
        prompt_record(encoder.schema(), stdin.lock(), std::io::stdout())?
    } else if fields.is_empty() {
        bail!("pass --field KEY=VALUE at least once, or --interactive");
    } else {
        fields.into_iter().collect::<CertificateRecord>()
    };

    let ledger = Ledger::connect(settings).await?;
    let verifier = Verifier::new(ledger.client(), encoder)
        .with_retry(settings.verification.retry_policy());
    let outcome = verifier.verify(&record).await;
    print_outcome(&outcome);

    if persist {
        let path = report_store(settings)
            .persist_outcome(&record, &outcome, attach.as_deref())
            .await?;
        println!("saved {}", path.display());
    }
    Ok(!matches!(outcome, VerificationOutcome::Error { .. }))
}

fn print_outcome(outcome: &VerificationOutcome) {
    match outcome {
        VerificationOutcome::Valid {
            fingerprint,
            registered_at,
            issuer,
        } => {
            println!("VALID {fingerprint}");
            if let Some(ts) = registered_at {
                println!("  registered at {}", display_timestamp(*ts));
            }
            if let Some(issuer) = issuer {
                println!("  issued by {issuer}");
            }
        }
        VerificationOutcome::Invalid { fingerprint } => {
            println!("INVALID {fingerprint}");
            println!("  no certificate with this content is registered");
        }
        VerificationOutcome::Error {
            fingerprint,
            kind,
            reason,
        } => {
            match fingerprint {
                Some(fp) => println!("ERROR {fp}"),
                None => println!("ERROR"),
            }
            match kind {
                FailureKind::SchemaViolation => println!("  malformed certificate: {reason}"),
                _ => println!("  could not check: {reason}"),
            }
        }
    }
}

async fn cmd_verify_batch(
    settings: &Settings,
    encoder: Arc<CanonicalEncoder>,
    input: PathBuf,
    mode: ReportMode,
    concurrency: Option<usize>,
) -> Result<bool> {
    let records = load_records(&input).await?;
    let ledger = Ledger::connect(settings).await?;
    let client = ledger.client();
    let columns: Vec<String> = encoder.schema().fields().map(String::from).collect();
    let verifier =
        Verifier::new(client.clone(), encoder).with_retry(settings.verification.retry_policy());

    let concurrency = concurrency.unwrap_or(settings.verification.concurrency);
    info!(
        "verifying {} record(s) from {} ({} at a time)",
        records.len(),
        input.display(),
        concurrency
    );
    let started = Instant::now();
    let outcomes = verifier.verify_many(&records, concurrency).await;
    let report = VerificationReport::build(
        input.display().to_string(),
        client.describe(),
        records.into_iter().zip(outcomes).collect(),
        started.elapsed(),
    );

    let store = report_store(settings);
    let stamp = file_stamp();
    let report_path = store.write_report(&report, &stamp).await?;

    if mode == ReportMode::Detailed {
        for entry in &report.certificates {
            let fp = entry
                .outcome
                .fingerprint()
                .map(|fp| fp.short())
                .unwrap_or_else(|| "-".to_string());
            println!("{:>4} {:<7} {}", entry.index, entry.outcome.label(), fp);
        }
        let csv = report.csv_summary(&columns)?;
        let csv_path = store.write_csv_summary(&csv, &stamp).await?;
        println!("CSV summary: {}", csv_path.display());
    }
    if mode != ReportMode::JsonOnly {
        let m = &report.metadata;
        println!(
            "{} processed: {} valid, {} invalid, {} error ({:.2}% valid) in {:.2}s",
            m.total_processed,
            m.valid_count,
            m.invalid_count,
            m.error_count,
            m.success_rate,
            m.processing_seconds
        );
    }
    println!("report: {}", report_path.display());
    Ok(report.metadata.error_count == 0)
}

async fn cmd_export(settings: &Settings) -> Result<bool> {
    let ledger = Ledger::connect(settings).await?;
    let fingerprints = ledger.export().await?;
    for fp in &fingerprints {
        println!("{fp}");
    }
    info!("{} fingerprint(s) on {}", fingerprints.len(), ledger.client().describe());
    Ok(true)
}

fn report_store(settings: &Settings) -> ReportStore {
    let reports = &settings.reports;
    ReportStore::new(
        reports.verified_dir.clone(),
        reports.unverified_dir.clone(),
        reports.error_dir.clone(),
        reports.output_dir.clone(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_field() {
        assert_eq!(
            parse_field("Roll Number=101").unwrap(),
            ("Roll Number".to_string(), "101".to_string())
        );
        assert_eq!(parse_field("Remarks=").unwrap().1, "");
        assert_eq!(parse_field("Note=a=b").unwrap().1, "a=b");
        assert!(parse_field("no-separator").is_err());
        assert!(parse_field("=value").is_err());
    }

    #[test]
    fn test_verify_flags() {
        let cli = Cli::try_parse_from([
            "certchain", "verify", "--field", "Name=Asha Rao", "--field", "Grade=A", "--persist",
            "--attach", "scan.png",
        ])
        .unwrap();
        match cli.command {
            Commands::Verify { fields, persist, attach, .. } => {
                assert_eq!(fields.len(), 2);
                assert!(persist);
                assert_eq!(attach, Some(PathBuf::from("scan.png")));
            }
            other => panic!("unexpected {other:?}"),
        }

        assert!(Cli::try_parse_from(["certchain", "verify", "--attach", "scan.png"]).is_err());
        assert!(Cli::try_parse_from([
            "certchain", "verify", "--interactive", "--field", "Name=x"
        ])
        .is_err());
    }

    #[test]
    fn test_verify_batch_report_mode() {
        let cli = Cli::try_parse_from([
            "certchain", "verify-batch", "in.json", "--report", "json-only",
        ])
        .unwrap();
        assert!(matches!(
            cli.command,
            Commands::VerifyBatch { report: ReportMode::JsonOnly, concurrency: None, .. }
        ));
    }

    fn scenario_record() -> CertificateRecord {
        [
            ("Name", "Asha Rao"),
            ("University", "XYZ"),
            ("Roll Number", "101"),
            ("Certificate ID", "C-1"),
            ("Degree Name", "B.Tech"),
            ("Grade", "A"),
        ]
        .into_iter()
        .collect()
    }

    #[tokio::test]
    async fn test_register_then_verify_across_connections() {
        let tmp = tempfile::TempDir::new().unwrap();
        let mut settings = Settings::default();
        settings.ledger.memory_path = Some(tmp.path().join("ledger.json"));
        let encoder = Arc::new(CanonicalEncoder::new(settings.canonical.to_config()));

        let registering = Ledger::connect(&settings).await.unwrap();
        let result = Registrar::new(registering.client(), encoder.clone())
            .register_batch(vec![scenario_record()])
            .await;
        assert!(result.is_clean());
        drop(registering);

        let verifying = Ledger::connect(&settings).await.unwrap();
        let verifier = Verifier::new(verifying.client(), encoder);
        let outcome = verifier.verify(&scenario_record()).await;
        assert!(matches!(outcome, VerificationOutcome::Valid { .. }), "got {outcome:?}");

        let forged = verifier.verify(&scenario_record().with("Grade", "B")).await;
        assert!(matches!(forged, VerificationOutcome::Invalid { .. }));
    }

    #[tokio::test]
    async fn test_memory_ledger_export_lists_registered() {
        let ledger = Ledger::Memory(Arc::new(InMemoryLedger::new("local")));
        let encoder = Arc::new(CanonicalEncoder::new(Settings::default().canonical.to_config()));
        let record = scenario_record();

        let expected = encoder.fingerprint(&record).unwrap();
        let result = Registrar::new(ledger.client(), encoder).register_batch(vec![record]).await;
        assert!(result.is_clean());
        assert_eq!(ledger.export().await.unwrap(), vec![expected.to_string()]);
    }
}
