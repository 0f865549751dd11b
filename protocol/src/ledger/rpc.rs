//! # Ethereum JSON-RPC Ledger
//!
//! [`LedgerClient`] over a plain HTTP JSON-RPC endpoint. Transactions are
//! signed locally with the [`OperatorKey`] and pushed with
//! `eth_sendRawTransaction`; nothing relies on the node holding keys.
//!
//! The operator nonce is read with `eth_getTransactionCount(.., "pending")`
//! on every submission and never cached. Serializing submissions is the
//! caller's job (see [`super::LedgerGateway`]).

use std::time::Duration;

use alloy_primitives::{Address, Bytes, B256, U256, U64};
use async_trait::async_trait;
use jsonrpsee::core::client::ClientT;
use jsonrpsee::http_client::{HttpClient, HttpClientBuilder};
use jsonrpsee::rpc_params;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use super::abi;
use super::signer::{LegacyTx, OperatorKey};
use super::{LedgerClient, LedgerError, LedgerResult, LogEntry, Receipt, ReceiptStatus, TxHash};
use crate::config;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Connection and transaction parameters for [`EthRpcLedger`].
#[derive(Debug, Clone)]
pub struct RpcLedgerConfig {
    pub endpoint: String,
    pub chain_id: u64,
    pub token_contract: Address,
    pub mint_gas_limit: u64,
    pub transfer_gas_limit: u64,
    /// Delay between receipt polls while waiting for a mint.
    pub poll_interval: Duration,
    /// Per-request HTTP timeout. Unrelated to how long a receipt wait lasts.
    pub request_timeout: Duration,
}

impl Default for RpcLedgerConfig {
    fn default() -> Self {
        Self {
            endpoint: config::DEFAULT_RPC_ENDPOINT.to_string(),
            chain_id: config::DEFAULT_CHAIN_ID,
            token_contract: config::TOKEN_CONTRACT,
            mint_gas_limit: config::MINT_GAS_LIMIT,
            transfer_gas_limit: config::TRANSFER_GAS_LIMIT,
            poll_interval: config::RECEIPT_POLL_INTERVAL,
            request_timeout: Duration::from_secs(10),
        }
    }
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct CallRequest {
    to: Address,
    data: Bytes,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcLog {
    address: Address,
    topics: Vec<B256>,
    data: Bytes,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcReceipt {
    transaction_hash: B256,
    /// Post-Byzantium status: `0x1` success, `0x0` failure.
    status: Option<U64>,
    #[serde(default)]
    logs: Vec<RpcLog>,
}

impl From<RpcReceipt> for Receipt {
    fn from(r: RpcReceipt) -> Self {
        let status = if r.status == Some(U64::from(1u64)) {
            ReceiptStatus::Success
        } else {
            ReceiptStatus::Failure
        };
        Receipt {
            tx_hash: r.transaction_hash,
            status,
            logs: r
                .logs
                .into_iter()
                .map(|l| LogEntry {
                    address: l.address,
                    topics: l.topics,
                    data: l.data,
                })
                .collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// EthRpcLedger
// ---------------------------------------------------------------------------

/// A ledger reached over Ethereum JSON-RPC.
pub struct EthRpcLedger {
    client: HttpClient,
    key: OperatorKey,
    config: RpcLedgerConfig,
}

impl EthRpcLedger {
    /// Builds the HTTP client. No request is made until the first call.
    pub fn connect(config: RpcLedgerConfig, key: OperatorKey) -> LedgerResult<Self> {
        let client = HttpClientBuilder::default()
            .request_timeout(config.request_timeout)
            .build(&config.endpoint)
            .map_err(|e| LedgerError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            key,
            config,
        })
    }

    pub fn config(&self) -> &RpcLedgerConfig {
        &self.config
    }

    async fn pending_nonce(&self) -> LedgerResult<u64> {
        let nonce: U64 = self
            .client
            .request(
                "eth_getTransactionCount",
                rpc_params![self.key.address(), "pending"],
            )
            .await?;
        Ok(nonce.to::<u64>())
    }

    async fn gas_price(&self) -> LedgerResult<u128> {
        let price: U256 = self.client.request("eth_gasPrice", rpc_params![]).await?;
        u128::try_from(price)
            .map_err(|_| LedgerError::Decode(format!("gas price {price} exceeds u128")))
    }

    /// Signs and broadcasts a transaction from the operator account.
    async fn submit(
        &self,
        to: Address,
        value: U256,
        input: Bytes,
        gas_limit: u64,
    ) -> LedgerResult<TxHash> {
        let nonce = self.pending_nonce().await?;
        let gas_price = self.gas_price().await?;
        let tx = LegacyTx {
            nonce,
            gas_price,
            gas_limit,
            to,
            value,
            input,
            chain_id: self.config.chain_id,
        };
        let signed = self.key.sign_legacy(&tx)?;
        debug!(nonce, %to, tx_hash = %signed.hash, "broadcasting transaction");

        let hash: B256 = self
            .client
            .request("eth_sendRawTransaction", rpc_params![signed.raw])
            .await
            .map_err(|e| LedgerError::Rejected(e.to_string()))?;
        if hash != signed.hash {
            return Err(LedgerError::Decode(format!(
                "node reported hash {hash}, expected {}",
                signed.hash
            )));
        }
        Ok(hash)
    }
}

#[async_trait]
impl LedgerClient for EthRpcLedger {
    fn operator(&self) -> Address {
        self.key.address()
    }

    async fn submit_mint(&self, to: Address, amount: U256) -> LedgerResult<TxHash> {
        self.submit(
            self.config.token_contract,
            U256::ZERO,
            abi::encode_mint(&to, amount),
            self.config.mint_gas_limit,
        )
        .await
    }

    async fn wait_for_receipt(&self, tx: TxHash) -> LedgerResult<Receipt> {
        loop {
            if let Some(receipt) = self.fetch_receipt(tx).await? {
                return Ok(receipt);
            }
            trace!(%tx, "receipt not available yet");
            tokio::time::sleep(self.config.poll_interval).await;
        }
    }

    async fn token_balance(&self, holder: Address) -> LedgerResult<U256> {
        let call = CallRequest {
            to: self.config.token_contract,
            data: abi::encode_balance_of(&holder),
        };
        let out: Bytes = self
            .client
            .request("eth_call", rpc_params![call, "latest"])
            .await?;
        abi::decode_uint(&out)
    }

    async fn send_value(&self, to: Address, amount: U256) -> LedgerResult<TxHash> {
        self.submit(to, amount, Bytes::new(), self.config.transfer_gas_limit)
            .await
    }

    async fn fetch_receipt(&self, tx: TxHash) -> LedgerResult<Option<Receipt>> {
        let receipt: Option<RpcReceipt> = self
            .client
            .request("eth_getTransactionReceipt", rpc_params![tx])
            .await?;
        Ok(receipt.map(Receipt::from))
    }
}
