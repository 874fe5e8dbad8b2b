use std::collections::HashMap;
use std::future::Future;
use std::sync::RwLock;

use alloy::{
    network::TransactionBuilder,
    primitives::{Address, Bytes, TxHash},
    providers::{Provider, RootProvider},
    rpc::client::RpcClient,
    rpc::types::TransactionRequest as AlloyTransactionRequest,
    transports::http::reqwest::Url,
};
use serde::{Deserialize, Serialize};

use crate::{
    error::{AlloyRpcErrorToEngineError, EngineError},
    rpc_clients::{CallsStatus, SendCallsPayload, SendCallsResult, WalletRpcClient},
    transaction::{TransactionReceipt, TransactionRequestData},
};

/// EIP-1559 fee components as returned by fee estimation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Eip1559Fees {
    pub max_fee_per_gas: u128,
    pub max_priority_fee_per_gas: u128,
}

/// A mined receipt along with its execution outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservedReceipt {
    pub success: bool,
    pub receipt: TransactionReceipt,
}

/// The node-facing surface the orchestrator depends on.
///
/// Everything the engine learns about a chain flows through this trait, so
/// tests can script node behavior without a live endpoint.
pub trait ExecutionClient: Send + Sync {
    fn send_raw_transaction(
        &self,
        raw: &Bytes,
    ) -> impl Future<Output = Result<TxHash, EngineError>> + Send;

    fn transaction_receipt(
        &self,
        hash: TxHash,
    ) -> impl Future<Output = Result<Option<ObservedReceipt>, EngineError>> + Send;

    /// Account nonce; `pending` includes transactions still in the mempool.
    fn transaction_count(
        &self,
        address: Address,
        pending: bool,
    ) -> impl Future<Output = Result<u64, EngineError>> + Send;

    fn estimate_eip1559_fees(
        &self,
    ) -> impl Future<Output = Result<Eip1559Fees, EngineError>> + Send;

    fn gas_price(&self) -> impl Future<Output = Result<u128, EngineError>> + Send;

    fn estimate_gas(
        &self,
        from: Address,
        request: &TransactionRequestData,
    ) -> impl Future<Output = Result<u64, EngineError>> + Send;

    fn code_at(&self, address: Address)
    -> impl Future<Output = Result<Bytes, EngineError>> + Send;

    fn send_calls(
        &self,
        payload: &SendCallsPayload,
    ) -> impl Future<Output = Result<SendCallsResult, EngineError>> + Send;

    fn calls_status(
        &self,
        batch_id: &str,
    ) -> impl Future<Output = Result<CallsStatus, EngineError>> + Send;

    fn capabilities(
        &self,
        address: Address,
    ) -> impl Future<Output = Result<serde_json::Value, EngineError>> + Send;
}

pub trait Chain: Clone + Send + Sync + 'static {
    type Client: ExecutionClient;

    fn chain_id(&self) -> u64;
    fn rpc_url(&self) -> &str;
    fn client(&self) -> &Self::Client;
}

/// Resolves chain handles by id, caching clients across calls.
pub trait ChainService: Send + Sync {
    type Chain: Chain;

    fn chain(&self, chain_id: u64) -> Result<Self::Chain, EngineError>;

    /// Chain handle for MEV-protected submission, falling back to the
    /// public endpoint when the chain has no private relay configured.
    fn private_chain(&self, chain_id: u64, account: Address) -> Result<Self::Chain, EngineError>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvmChainConfig {
    pub chain_id: u64,
    pub rpc_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_rpc_url: Option<String>,
}

/// An HTTP JSON-RPC backed chain handle.
#[derive(Debug, Clone)]
pub struct EvmChain {
    chain_id: u64,
    rpc_url: Url,
    client: EvmExecutionClient,
}

impl EvmChain {
    pub fn new(chain_id: u64, rpc_url: Url) -> Self {
        let rpc_client = RpcClient::new_http(rpc_url.clone());
        let client = EvmExecutionClient {
            chain_id,
            rpc_url: rpc_url.clone(),
            provider: RootProvider::new(rpc_client.clone()),
            wallet: WalletRpcClient::from_client(rpc_client),
        };
        Self {
            chain_id,
            rpc_url,
            client,
        }
    }
}

impl Chain for EvmChain {
    type Client = EvmExecutionClient;

    fn chain_id(&self) -> u64 {
        self.chain_id
    }

    fn rpc_url(&self) -> &str {
        self.rpc_url.as_str()
    }

    fn client(&self) -> &Self::Client {
        &self.client
    }
}

#[derive(Debug, Clone)]
pub struct EvmExecutionClient {
    chain_id: u64,
    rpc_url: Url,
    provider: RootProvider,
    wallet: WalletRpcClient,
}

impl EvmExecutionClient {
    fn engine_error(
        &self,
        error: alloy::transports::RpcError<alloy::transports::TransportErrorKind>,
    ) -> EngineError {
        error.to_engine_error(self.chain_id, self.rpc_url.as_str())
    }
}

fn to_alloy_request(from: Address, request: &TransactionRequestData) -> AlloyTransactionRequest {
    let mut tx = AlloyTransactionRequest::default()
        .with_from(from)
        .with_value(request.value)
        .with_input(request.data.clone());
    if let Some(to) = request.to {
        tx = tx.with_to(to);
    }
    tx
}

fn map_receipt(receipt: alloy::rpc::types::TransactionReceipt) -> ObservedReceipt {
    ObservedReceipt {
        success: receipt.status(),
        receipt: TransactionReceipt {
            transaction_index: receipt.transaction_index.unwrap_or_default(),
            block_hash: receipt.block_hash.unwrap_or_default(),
            block_number: receipt.block_number.unwrap_or_default(),
            gas_used: receipt.gas_used,
            effective_gas_price: receipt.effective_gas_price,
        },
    }
}

impl ExecutionClient for EvmExecutionClient {
    async fn send_raw_transaction(&self, raw: &Bytes) -> Result<TxHash, EngineError> {
        let pending = self
            .provider
            .send_raw_transaction(raw)
            .await
            .map_err(|e| self.engine_error(e))?;
        Ok(*pending.tx_hash())
    }

    async fn transaction_receipt(&self, hash: TxHash) -> Result<Option<ObservedReceipt>, EngineError> {
        let receipt = self
            .provider
            .get_transaction_receipt(hash)
            .await
            .map_err(|e| self.engine_error(e))?;
        Ok(receipt.map(map_receipt))
    }

    async fn transaction_count(&self, address: Address, pending: bool) -> Result<u64, EngineError> {
        let call = self.provider.get_transaction_count(address);
        let result = if pending { call.pending().await } else { call.await };
        result.map_err(|e| self.engine_error(e))
    }

    async fn estimate_eip1559_fees(&self) -> Result<Eip1559Fees, EngineError> {
        let fees = self
            .provider
            .estimate_eip1559_fees()
            .await
            .map_err(|e| self.engine_error(e))?;
        Ok(Eip1559Fees {
            max_fee_per_gas: fees.max_fee_per_gas,
            max_priority_fee_per_gas: fees.max_priority_fee_per_gas,
        })
    }

    async fn gas_price(&self) -> Result<u128, EngineError> {
        self.provider
            .get_gas_price()
            .await
            .map_err(|e| self.engine_error(e))
    }

    async fn estimate_gas(
        &self,
        from: Address,
        request: &TransactionRequestData,
    ) -> Result<u64, EngineError> {
        self.provider
            .estimate_gas(to_alloy_request(from, request))
            .await
            .map_err(|e| self.engine_error(e))
    }

    async fn code_at(&self, address: Address) -> Result<Bytes, EngineError> {
        self.provider
            .get_code_at(address)
            .await
            .map_err(|e| self.engine_error(e))
    }

    async fn send_calls(&self, payload: &SendCallsPayload) -> Result<SendCallsResult, EngineError> {
        self.wallet
            .send_calls(payload)
            .await
            .map_err(|e| self.engine_error(e))
    }

    async fn calls_status(&self, batch_id: &str) -> Result<CallsStatus, EngineError> {
        self.wallet
            .calls_status(batch_id)
            .await
            .map_err(|e| self.engine_error(e))
    }

    async fn capabilities(&self, address: Address) -> Result<serde_json::Value, EngineError> {
        self.wallet
            .capabilities(address)
            .await
            .map_err(|e| self.engine_error(e))
    }
}

/// Chain resolver backed by static per-chain configuration.
///
/// Handles are constructed lazily and cached so repeated lookups share
/// transports.
pub struct CachedChainService {
    configs: HashMap<u64, EvmChainConfig>,
    public: RwLock<HashMap<u64, EvmChain>>,
    private: RwLock<HashMap<u64, EvmChain>>,
}

impl CachedChainService {
    pub fn new(configs: impl IntoIterator<Item = EvmChainConfig>) -> Self {
        Self {
            configs: configs
                .into_iter()
                .map(|config| (config.chain_id, config))
                .collect(),
            public: RwLock::new(HashMap::new()),
            private: RwLock::new(HashMap::new()),
        }
    }

    fn config(&self, chain_id: u64) -> Result<&EvmChainConfig, EngineError> {
        self.configs
            .get(&chain_id)
            .ok_or(EngineError::ProviderUnavailable {
                chain_id,
                message: "no RPC endpoint configured for chain".to_string(),
            })
    }

    fn build_chain(chain_id: u64, rpc_url: &str) -> Result<EvmChain, EngineError> {
        let url = Url::parse(rpc_url).map_err(|error| EngineError::ProviderUnavailable {
            chain_id,
            message: format!("invalid RPC URL {rpc_url}: {error}"),
        })?;
        Ok(EvmChain::new(chain_id, url))
    }

    fn cached(
        cache: &RwLock<HashMap<u64, EvmChain>>,
        chain_id: u64,
        build: impl FnOnce() -> Result<EvmChain, EngineError>,
    ) -> Result<EvmChain, EngineError> {
        if let Some(chain) = cache
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(&chain_id)
        {
            return Ok(chain.clone());
        }
        let chain = build()?;
        cache
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(chain_id, chain.clone());
        Ok(chain)
    }
}

impl ChainService for CachedChainService {
    type Chain = EvmChain;

    fn chain(&self, chain_id: u64) -> Result<EvmChain, EngineError> {
        let config = self.config(chain_id)?;
        Self::cached(&self.public, chain_id, || {
            Self::build_chain(chain_id, &config.rpc_url)
        })
    }

    fn private_chain(&self, chain_id: u64, account: Address) -> Result<EvmChain, EngineError> {
        let config = self.config(chain_id)?;
        match &config.private_rpc_url {
            Some(private_url) => {
                tracing::debug!(chain_id, %account, "using private RPC endpoint");
                Self::cached(&self.private, chain_id, || {
                    Self::build_chain(chain_id, private_url)
                })
            }
            None => {
                tracing::debug!(
                    chain_id,
                    %account,
                    "no private RPC configured, falling back to public endpoint"
                );
                self.chain(chain_id)
            }
        }
    }
}
