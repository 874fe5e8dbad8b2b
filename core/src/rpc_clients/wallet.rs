use alloy::primitives::{Address, B256, Bytes, TxHash, U64, U256};
use alloy::rpc::client::RpcClient;
use alloy::transports::{IntoBoxTransport, TransportResult};
use serde::{Deserialize, Serialize};

use crate::constants::SEND_CALLS_VERSION;

/// A JSON-RPC client for the EIP-5792 wallet capability methods.
#[derive(Debug, Clone)]
pub struct WalletRpcClient {
    inner: RpcClient,
}

/// One call inside a `wallet_sendCalls` batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchCall {
    pub to: Address,
    #[serde(default)]
    pub data: Bytes,
    #[serde(default)]
    pub value: U256,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendCallsPayload {
    pub version: String,
    pub chain_id: U64,
    pub from: Address,
    pub calls: Vec<BatchCall>,
    pub atomic_required: bool,
}

impl SendCallsPayload {
    pub fn new(chain_id: u64, from: Address, calls: Vec<BatchCall>) -> Self {
        Self {
            version: SEND_CALLS_VERSION.to_string(),
            chain_id: U64::from(chain_id),
            from,
            calls,
            atomic_required: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendCallsResult {
    pub id: String,
}

/// Per-call receipt inside a `wallet_getCallsStatus` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallReceipt {
    pub status: U64,
    pub block_hash: B256,
    pub block_number: U64,
    pub gas_used: U64,
    pub transaction_hash: TxHash,
}

impl CallReceipt {
    pub fn is_success(&self) -> bool {
        self.status == U64::from(1u64)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallsStatus {
    pub status: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receipts: Option<Vec<CallReceipt>>,
}

/// Coarse batch state derived from the numeric status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchStatusCode {
    Pending,
    Confirmed,
    Failed,
}

impl CallsStatus {
    /// 1xx codes are pending, 200 is confirmed, everything else failed.
    pub fn code(&self) -> BatchStatusCode {
        match self.status {
            100..=199 => BatchStatusCode::Pending,
            200 => BatchStatusCode::Confirmed,
            _ => BatchStatusCode::Failed,
        }
    }
}

impl WalletRpcClient {
    pub fn new(transport: impl IntoBoxTransport) -> Self {
        let client = RpcClient::builder().transport(transport, false);

        Self { inner: client }
    }

    /// Wrap an already-built RPC client, sharing its transport.
    pub fn from_client(inner: RpcClient) -> Self {
        Self { inner }
    }

    /// Submit an atomic batch of calls, returning the wallet-assigned batch id.
    pub async fn send_calls(&self, payload: &SendCallsPayload) -> TransportResult<SendCallsResult> {
        self.inner.request("wallet_sendCalls", (payload,)).await
    }

    /// Fetch the status of a previously submitted batch.
    pub async fn calls_status(&self, batch_id: &str) -> TransportResult<CallsStatus> {
        self.inner
            .request("wallet_getCallsStatus", (batch_id,))
            .await
    }

    /// Query the wallet's capability flags for an account.
    pub async fn capabilities(&self, address: Address) -> TransportResult<serde_json::Value> {
        self.inner
            .request("wallet_getCapabilities", (address,))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn send_calls_payload_shape() {
        let payload = SendCallsPayload::new(
            8453,
            Address::ZERO,
            vec![BatchCall {
                to: Address::ZERO,
                data: Bytes::new(),
                value: U256::ZERO,
            }],
        );
        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(value["version"], SEND_CALLS_VERSION);
        assert_eq!(value["chainId"], "0x2105");
        assert_eq!(value["atomicRequired"], true);
        assert_eq!(value["calls"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn calls_status_code_buckets() {
        let pending = CallsStatus {
            status: 100,
            receipts: None,
        };
        let confirmed = CallsStatus {
            status: 200,
            receipts: None,
        };
        let failed = CallsStatus {
            status: 500,
            receipts: None,
        };
        assert_eq!(pending.code(), BatchStatusCode::Pending);
        assert_eq!(confirmed.code(), BatchStatusCode::Confirmed);
        assert_eq!(failed.code(), BatchStatusCode::Failed);
    }
}
