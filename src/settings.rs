// src/settings.rs
//! Layered runtime settings.
//!
//! Sources, lowest precedence first:
//! 1. Built-in defaults
//! 2. `certchain.toml` in the working directory (optional), or an explicit file
//! 3. Environment variables prefixed `CERTCHAIN_`, sections separated by `__`
//!    (e.g. `CERTCHAIN_LEDGER__CONTRACT_ADDRESS`,
//!    `CERTCHAIN_CANONICAL__REQUIRED=Name,Grade`)
//!
//! The signing key is never part of these settings; it is read from
//! `PRIVATE_KEY` when the Ethereum backend is selected.

use crate::models::schema::{RecordSchema, SchemaError, DEFAULT_REQUIRED_FIELDS};
use crate::utils::canonical::{CanonicalConfig, CaseFolding};
use crate::utils::retry::RetryPolicy;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_CONFIG_FILE: &str = "certchain";
pub const ENV_PREFIX: &str = "CERTCHAIN";
pub const DEFAULT_MEMORY_LEDGER: &str = "certchain-ledger.json";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("cannot load settings: {0}")]
    Load(#[from] config::ConfigError),
    #[error("invalid schema: {0}")]
    Schema(#[from] SchemaError),
    #[error("invalid setting `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LedgerBackend {
    /// Process-local ledger, for dry runs
    #[default]
    Memory,
    /// Deployed `CertificateChain` contract over JSON-RPC
    Ethereum,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct LedgerSettings {
    pub backend: LedgerBackend,
    pub rpc_url: String,
    pub contract_address: Option<String>,
    /// Fetched from the node when unset
    pub chain_id: Option<u64>,
    pub gas_limit: u64,
    pub confirmation_timeout_secs: u64,
    pub poll_interval_ms: u64,
    /// Issuer reported by the memory backend
    pub memory_issuer: String,
    /// Snapshot file of the memory backend; unset keeps the log in the process only
    pub memory_path: Option<PathBuf>,
}

impl Default for LedgerSettings {
    fn default() -> Self {
        Self {
            backend: LedgerBackend::Memory,
            rpc_url: "http://127.0.0.1:7545".to_string(),
            contract_address: None,
            chain_id: None,
            gas_limit: 3_000_000,
            confirmation_timeout_secs: 120,
            poll_interval_ms: 1_000,
            memory_issuer: "local".to_string(),
            memory_path: Some(PathBuf::from(DEFAULT_MEMORY_LEDGER)),
        }
    }
}

impl LedgerSettings {
    pub fn confirmation_timeout(&self) -> Duration {
        Duration::from_secs(self.confirmation_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct CanonicalSettings {
    pub required: Vec<String>,
    pub optional: Vec<String>,
    pub case_folding: CaseFolding,
}

impl Default for CanonicalSettings {
    fn default() -> Self {
        Self {
            required: DEFAULT_REQUIRED_FIELDS.iter().map(|f| f.to_string()).collect(),
            optional: Vec::new(),
            case_folding: CaseFolding::Preserve,
        }
    }
}

impl CanonicalSettings {
    pub fn to_config(&self) -> CanonicalConfig {
        CanonicalConfig {
            schema: RecordSchema::new(self.required.clone(), self.optional.clone()),
            case_folding: self.case_folding,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
#[serde(default)]
pub struct RegistrationSettings {
    /// Split deduplicated fingerprints into appends of at most this many
    pub max_batch_size: Option<usize>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct VerificationSettings {
    pub concurrency: usize,
    pub retry_attempts: u32,
    pub retry_base_delay_ms: u64,
}

impl Default for VerificationSettings {
    fn default() -> Self {
        Self {
            concurrency: 8,
            retry_attempts: 3,
            retry_base_delay_ms: 250,
        }
    }
}

impl VerificationSettings {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.retry_attempts, Duration::from_millis(self.retry_base_delay_ms))
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct ReportSettings {
    pub verified_dir: PathBuf,
    pub unverified_dir: PathBuf,
    pub error_dir: PathBuf,
    pub output_dir: PathBuf,
}

impl Default for ReportSettings {
    fn default() -> Self {
        Self {
            verified_dir: PathBuf::from("verified"),
            unverified_dir: PathBuf::from("unverified"),
            error_dir: PathBuf::from("error"),
            output_dir: PathBuf::from("reports"),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
#[serde(default)]
pub struct Settings {
    pub ledger: LedgerSettings,
    pub canonical: CanonicalSettings,
    pub registration: RegistrationSettings,
    pub verification: VerificationSettings,
    pub reports: ReportSettings,
}

impl Settings {
    /// Loads and validates settings.
    ///
    /// # Arguments
    /// * `path` - Explicit settings file (must exist); `None` looks for an
    ///   optional `certchain.toml`
    pub fn load(path: Option<&Path>) -> Result<Self, SettingsError> {
        Self::load_with(path, environment(ENV_PREFIX))
    }

    fn load_with(path: Option<&Path>, env: Environment) -> Result<Self, SettingsError> {
        let file = match path {
            Some(p) => File::from(p).required(true),
            None => File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };
        let settings: Settings = Config::builder()
            .add_source(file)
            .add_source(env)
            .build()?
            .try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        self.canonical.to_config().schema.validate()?;

        if self.ledger.backend == LedgerBackend::Ethereum
            && self
                .ledger
                .contract_address
                .as_deref()
                .map_or(true, |a| a.trim().is_empty())
        {
            return Err(SettingsError::Invalid {
                key: "ledger.contract_address",
                reason: "required by the ethereum backend".into(),
            });
        }
        if self.registration.max_batch_size == Some(0) {
            return Err(SettingsError::Invalid {
                key: "registration.max_batch_size",
                reason: "must be at least 1 when set".into(),
            });
        }
        if self.verification.concurrency == 0 {
            return Err(SettingsError::Invalid {
                key: "verification.concurrency",
                reason: "must be at least 1".into(),
            });
        }
        if self.verification.retry_attempts == 0 {
            return Err(SettingsError::Invalid {
                key: "verification.retry_attempts",
                reason: "must be at least 1".into(),
            });
        }
        Ok(())
    }
}

fn environment(prefix: &str) -> Environment {
    Environment::with_prefix(prefix)
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
        .list_separator(",")
        .with_list_parse_key("canonical.required")
        .with_list_parse_key("canonical.optional")
}
