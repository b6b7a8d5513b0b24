// src/blockchain/eth_client.rs
//! Ethereum JSON-RPC client implementation.
//!
//! Provides a high-level interface for interacting with an EVM chain (a local
//! simulator during development), including transaction sending, contract
//! queries, and mapping of transport failures onto [`LedgerError`].

use crate::error::LedgerError;
use ethers::{
    contract::{Contract, ContractError},
    core::abi::{Abi, Detokenize, Tokenize},
    middleware::SignerMiddleware,
    providers::{Http, Middleware, Provider},
    signers::{LocalWallet, Signer},
    types::{Address, H256, U256, U64},
};
use log::{debug, warn};
use std::sync::Arc;
use std::time::Duration;

/// Provider wrapped with a local signing wallet.
pub type SignerClient = SignerMiddleware<Provider<Http>, LocalWallet>;

/// Ethereum client for managing wallet and contract interactions.
///
/// This client provides:
/// - Local wallet signing for state-changing calls
/// - Contract query functionality
/// - Confirmation waiting with a timeout
#[derive(Clone)]
pub struct EthClient {
    /// Provider with signing middleware
    client: Arc<SignerClient>,
    /// How often a pending transaction is polled for its receipt
    poll_interval: Duration,
}

impl EthClient {
    /// Creates a new Ethereum client instance.
    ///
    /// # Arguments
    /// * `rpc_url` - JSON-RPC endpoint URL
    /// * `private_key` - Hex-encoded private key (with or without 0x prefix)
    /// * `chain_id` - Chain id to sign for; fetched from the node when `None`
    ///
    /// # Errors
    /// - `Misconfigured` if the URL or private key is invalid
    /// - `Unavailable` if the chain id has to be fetched and the node is unreachable
    pub async fn new(
        rpc_url: &str,
        private_key: &str,
        chain_id: Option<u64>,
        poll_interval: Duration,
    ) -> Result<Self, LedgerError> {
        let provider = Provider::<Http>::try_from(rpc_url)
            .map_err(|e| LedgerError::Misconfigured(format!("invalid rpc url `{rpc_url}`: {e}")))?
            .interval(poll_interval);

        let wallet: LocalWallet = private_key
            .trim_start_matches("0x")
            .parse()
            .map_err(|e| LedgerError::Misconfigured(format!("invalid private key: {e}")))?;

        let chain_id = match chain_id {
            Some(id) => id,
            None => provider
                .get_chainid()
                .await
                .map_err(|e| LedgerError::Unavailable(format!("could not fetch chain id: {e}")))?
                .as_u64(),
        };
        debug!("signing for chain id {}", chain_id);

        let client = SignerMiddleware::new(provider, wallet.with_chain_id(chain_id));
        Ok(Self {
            client: Arc::new(client),
            poll_interval,
        })
    }

    /// Gets the address that signs transactions.
    pub fn address(&self) -> Address {
        self.client.address()
    }

    fn contract(&self, contract_address: Address, abi: &Abi) -> Contract<SignerClient> {
        Contract::new(contract_address, abi.clone(), self.client.clone())
    }

    /// Sends a state-changing call and waits for it to be mined.
    ///
    /// # Arguments
    /// * `contract_address` - Address of the target contract
    /// * `abi` - Contract ABI
    /// * `method` - Method name to call
    /// * `params` - Method parameters
    /// * `gas` - Gas limit for the transaction
    /// * `timeout` - Upper bound on waiting for the receipt
    ///
    /// # Returns
    /// Hash of the mined transaction
    ///
    /// # Errors
    /// - `Rejected` on revert, ABI encoding failure, or a failed receipt status
    /// - `Unavailable` on transport failure, a dropped transaction, or timeout.
    ///   In the last two cases the write may still land; confirm by lookup.
    pub async fn send_transaction(
        &self,
        contract_address: Address,
        abi: &Abi,
        method: &str,
        params: impl Tokenize,
        gas: U256,
        timeout: Duration,
    ) -> Result<H256, LedgerError> {
        let contract = self.contract(contract_address, abi);
        let call = contract
            .method::<_, ()>(method, params)
            .map_err(|e| LedgerError::Rejected(format!("cannot encode `{method}`: {e}")))?
            .gas(gas);

        let pending = call.send().await.map_err(classify_write_error)?;
        let tx_hash = pending.tx_hash();
        debug!("submitted {} as {:#x}", method, tx_hash);

        let receipt = tokio::time::timeout(timeout, pending.interval(self.poll_interval))
            .await
            .map_err(|_| {
                warn!("no receipt for {:#x} after {:?}", tx_hash, timeout);
                LedgerError::Unavailable(format!(
                    "timed out waiting for {tx_hash:#x}; outcome unknown, verify by lookup before retrying"
                ))
            })?
            .map_err(|e| LedgerError::Unavailable(format!("lost track of {tx_hash:#x}: {e}")))?
            .ok_or_else(|| {
                LedgerError::Unavailable(format!(
                    "transaction {tx_hash:#x} was dropped; outcome unknown, verify by lookup before retrying"
                ))
            })?;

        if receipt.status == Some(U64::zero()) {
            return Err(LedgerError::Rejected(format!(
                "transaction {tx_hash:#x} reverted"
            )));
        }
        Ok(receipt.transaction_hash)
    }

    /// Queries a smart contract (read-only operation).
    ///
    /// # Errors
    /// Every failure maps to `Unavailable`: a read cannot be refused, only go
    /// unanswered.
    pub async fn query_contract<R: Detokenize>(
        &self,
        contract_address: Address,
        abi: &Abi,
        method: &str,
        params: impl Tokenize,
    ) -> Result<R, LedgerError> {
        let contract = self.contract(contract_address, abi);
        contract
            .method::<_, R>(method, params)
            .map_err(|e| LedgerError::Unavailable(format!("cannot encode `{method}`: {e}")))?
            .call()
            .await
            .map_err(|e| LedgerError::Unavailable(format!("`{method}` call failed: {e}")))
    }
}

/// Splits contract-call failures into refusals and transport problems.
fn classify_write_error(err: ContractError<SignerClient>) -> LedgerError {
    if err.is_revert() {
        return LedgerError::Rejected(format!("reverted: {err}"));
    }
    match err {
        ContractError::AbiError(_) | ContractError::DecodingError(_) => {
            LedgerError::Rejected(err.to_string())
        }
        other => LedgerError::Unavailable(other.to_string()),
    }
}

/// Formats an address as a lowercase hex string with 0x prefix.
pub fn format_address(addr: Address) -> String {
    format!("0x{:x}", addr)
}
