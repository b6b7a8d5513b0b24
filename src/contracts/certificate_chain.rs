// src/contracts/certificate_chain.rs
//! CertificateChain smart contract interface.
//!
//! Adapts the deployed `CertificateChain` contract to the [`LedgerClient`]
//! boundary. The contract stores fingerprints as strings:
//! - `addBatch(string[])` appends a batch, stamping block time and sender
//! - `verifyCertificate(string) -> (bool, uint256, address)` answers membership
//! - `allHashes() -> string[]` lists everything stored

use crate::blockchain::eth_client::{format_address, EthClient};
use crate::blockchain::LedgerClient;
use crate::error::LedgerError;
use crate::models::fingerprint::Fingerprint;
use crate::models::membership::{AppendReceipt, MembershipRecord};
use async_trait::async_trait;
use ethers::core::abi::Abi;
use ethers::types::{Address, U256};
use log::{debug, info};
use std::str::FromStr;
use std::time::Duration;
use tokio::sync::Mutex;

/// CertificateChain smart contract wrapper.
///
/// Appends are serialized through an async mutex so that concurrent
/// registration runs sharing this instance never race on the signer's nonce.
pub struct CertificateChain {
    client: EthClient,
    address: Address,
    abi: Abi,
    gas_limit: U256,
    confirmation_timeout: Duration,
    write_lock: Mutex<()>,
}

impl CertificateChain {
    /// Creates a new CertificateChain instance.
    ///
    /// # Arguments
    /// * `client` - Connected Ethereum client
    /// * `contract_address` - Hex string of the deployed contract address
    /// * `gas_limit` - Gas limit used for every `addBatch` transaction
    /// * `confirmation_timeout` - How long to wait for a receipt
    ///
    /// # Errors
    /// `Misconfigured` if the address or the bundled ABI cannot be parsed
    pub fn new(
        client: EthClient,
        contract_address: &str,
        gas_limit: u64,
        confirmation_timeout: Duration,
    ) -> Result<Self, LedgerError> {
        let address = Address::from_str(contract_address).map_err(|e| {
            LedgerError::Misconfigured(format!("invalid contract address `{contract_address}`: {e}"))
        })?;
        let abi = Abi::load(&include_bytes!("abi/CertificateChain.json")[..])
            .map_err(|e| LedgerError::Misconfigured(format!("CertificateChain ABI: {e}")))?;

        Ok(Self {
            client,
            address,
            abi,
            gas_limit: U256::from(gas_limit),
            confirmation_timeout,
            write_lock: Mutex::new(()),
        })
    }

    pub fn address(&self) -> Address {
        self.address
    }

    /// Lists every fingerprint string stored by the contract, in append order.
    pub async fn all_fingerprints(&self) -> Result<Vec<String>, LedgerError> {
        self.client
            .query_contract(self.address, &self.abi, "allHashes", ())
            .await
    }
}

#[async_trait]
impl LedgerClient for CertificateChain {
    async fn append_batch(&self, fingerprints: &[Fingerprint]) -> Result<AppendReceipt, LedgerError> {
        if fingerprints.is_empty() {
            return Err(LedgerError::Rejected("empty batch".into()));
        }
        let hashes: Vec<String> = fingerprints.iter().map(|fp| fp.to_string()).collect();
        let count = hashes.len();

        let _guard = self.write_lock.lock().await;
        debug!("sending addBatch with {} fingerprint(s)", count);
        let tx_hash = self
            .client
            .send_transaction(
                self.address,
                &self.abi,
                "addBatch",
                (hashes,),
                self.gas_limit,
                self.confirmation_timeout,
            )
            .await?;

        info!("addBatch mined in {:#x} ({} fingerprint(s))", tx_hash, count);
        Ok(AppendReceipt {
            transaction_id: format!("{:#x}", tx_hash),
            count,
        })
    }

    async fn lookup(&self, fingerprint: &Fingerprint) -> Result<MembershipRecord, LedgerError> {
        let (present, timestamp, issuer): (bool, U256, Address) = self
            .client
            .query_contract(
                self.address,
                &self.abi,
                "verifyCertificate",
                (fingerprint.to_string(),),
            )
            .await?;

        if !present {
            return Ok(MembershipRecord::absent());
        }
        Ok(MembershipRecord::present(
            decode_timestamp(timestamp)?,
            format_address(issuer),
        ))
    }

    fn describe(&self) -> String {
        format_address(self.address)
    }
}

/// Block timestamps fit in 64 bits; anything wider is a malformed answer.
fn decode_timestamp(timestamp: U256) -> Result<u64, LedgerError> {
    u64::try_from(timestamp).map_err(|_| {
        LedgerError::Unavailable(format!("registration timestamp {timestamp} out of range"))
    })
}
