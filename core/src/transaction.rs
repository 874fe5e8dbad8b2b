use std::fmt;

use alloy::primitives::{Address, B256, Bytes, TxHash, U256};
use serde::{Deserialize, Serialize};

use crate::gas::GasFeeParams;

/// Identity of a transaction record: unique per owning address, chain, and id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionKey {
    pub owner: Address,
    pub chain_id: u64,
    pub id: String,
}

impl fmt::Display for TransactionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.owner, self.chain_id, self.id)
    }
}

/// Lifecycle state of a tracked transaction.
///
/// `Pending`, `Cancelling` and `Replacing` are in-flight; the rest are
/// terminal and never transition again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TransactionStatus {
    Pending,
    Cancelling,
    Replacing,
    Success,
    Failed,
    Cancelled,
}

impl TransactionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransactionStatus::Success | TransactionStatus::Failed | TransactionStatus::Cancelled
        )
    }

    pub fn is_in_flight(&self) -> bool {
        !self.is_terminal()
    }

    /// Allowed lifecycle transitions. Terminal states allow none.
    ///
    /// `Pending -> Cancelled` covers external invalidation: another wallet
    /// instance consumed the nonce, so the transaction can never mine.
    pub fn allows_transition_to(&self, next: TransactionStatus) -> bool {
        use TransactionStatus::*;
        match self {
            Pending => matches!(next, Success | Failed | Cancelling | Replacing | Cancelled),
            Cancelling => matches!(next, Cancelled | Success | Failed),
            Replacing => matches!(next, Success | Failed),
            Success | Failed | Cancelled => false,
        }
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Cancelling => "cancelling",
            TransactionStatus::Replacing => "replacing",
            TransactionStatus::Success => "success",
            TransactionStatus::Failed => "failed",
            TransactionStatus::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// Terminal outcome assigned when a watched transaction settles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinalizedStatus {
    Success,
    Failed,
    Cancelled,
}

impl FinalizedStatus {
    pub fn as_status(&self) -> TransactionStatus {
        match self {
            FinalizedStatus::Success => TransactionStatus::Success,
            FinalizedStatus::Failed => TransactionStatus::Failed,
            FinalizedStatus::Cancelled => TransactionStatus::Cancelled,
        }
    }

    /// Only mined outcomes may carry an on-chain receipt.
    pub fn allows_receipt(&self) -> bool {
        matches!(self, FinalizedStatus::Success | FinalizedStatus::Failed)
    }
}

/// Receipt fields persisted once a transaction is mined.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionReceipt {
    pub transaction_index: u64,
    pub block_hash: B256,
    pub block_number: u64,
    pub gas_used: u64,
    pub effective_gas_price: u128,
}

/// The caller-supplied shape of a transaction before submission.
///
/// Optional fields are resolved during orchestration: nonce from the
/// provider, fees from the estimator, gas limit from estimation plus buffer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRequestData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to: Option<Address>,
    #[serde(default)]
    pub data: Bytes,
    #[serde(default)]
    pub value: U256,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gas_limit: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nonce: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fee: Option<GasFeeParams>,
}

/// Submission knobs that travel with the record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TransactionOptions {
    pub submit_via_private_rpc: bool,
    pub includes_delegation: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replaced_transaction_hash: Option<TxHash>,
}

/// Identity of an EIP-5792 batch a record belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connector_id: Option<String>,
    pub batch_id: String,
}

/// Off-chain fiat purchase details, reconciled incrementally from the
/// payment provider. Every field is optional because partial updates
/// arrive out of order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FiatPurchaseInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_transaction_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_provider: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_currency: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_amount: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination_currency_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination_amount: Option<String>,
}

impl FiatPurchaseInfo {
    /// Merge a partial update, keeping existing fields the update omits.
    pub fn merge_from(&mut self, incoming: FiatPurchaseInfo) {
        if incoming.provider_transaction_id.is_some() {
            self.provider_transaction_id = incoming.provider_transaction_id;
        }
        if incoming.service_provider.is_some() {
            self.service_provider = incoming.service_provider;
        }
        if incoming.source_currency.is_some() {
            self.source_currency = incoming.source_currency;
        }
        if incoming.source_amount.is_some() {
            self.source_amount = incoming.source_amount;
        }
        if incoming.destination_currency_id.is_some() {
            self.destination_currency_id = incoming.destination_currency_id;
        }
        if incoming.destination_amount.is_some() {
            self.destination_amount = incoming.destination_amount;
        }
    }
}

/// What the transaction is for, carried for display and analytics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum TransactionTypeInfo {
    Swap {
        input_currency_id: String,
        output_currency_id: String,
        input_amount_raw: U256,
        min_output_amount_raw: U256,
    },
    Send {
        recipient: Address,
        token_address: Address,
        amount_raw: U256,
    },
    Approve {
        token_address: Address,
        spender: Address,
        #[serde(skip_serializing_if = "Option::is_none")]
        approval_amount: Option<U256>,
    },
    Wrap {
        unwrapped: bool,
        amount_raw: U256,
    },
    Bridge {
        input_currency_id: String,
        output_currency_id: String,
        input_amount_raw: U256,
        output_amount_raw: U256,
    },
    LiquidityIncrease {
        currency_id_0: String,
        currency_id_1: String,
        amount_raw_0: U256,
        amount_raw_1: U256,
    },
    LiquidityDecrease {
        currency_id_0: String,
        currency_id_1: String,
        amount_raw_0: U256,
        amount_raw_1: U256,
    },
    FiatPurchase(FiatPurchaseInfo),
    SendCalls {
        call_count: usize,
    },
    Unknown,
}

impl TransactionTypeInfo {
    pub fn label(&self) -> &'static str {
        match self {
            TransactionTypeInfo::Swap { .. } => "swap",
            TransactionTypeInfo::Send { .. } => "send",
            TransactionTypeInfo::Approve { .. } => "approve",
            TransactionTypeInfo::Wrap { .. } => "wrap",
            TransactionTypeInfo::Bridge { .. } => "bridge",
            TransactionTypeInfo::LiquidityIncrease { .. } => "liquidity-increase",
            TransactionTypeInfo::LiquidityDecrease { .. } => "liquidity-decrease",
            TransactionTypeInfo::FiatPurchase(_) => "fiat-purchase",
            TransactionTypeInfo::SendCalls { .. } => "send-calls",
            TransactionTypeInfo::Unknown => "unknown",
        }
    }
}

/// One tracked transaction, from submission to terminal state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRecord {
    pub id: String,
    pub chain_id: u64,
    pub owner: Address,
    pub status: TransactionStatus,
    pub type_info: TransactionTypeInfo,
    pub request: TransactionRequestData,
    #[serde(default)]
    pub options: TransactionOptions,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hash: Option<TxHash>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancel_request: Option<TransactionRequestData>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancel_hash: Option<TxHash>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch_info: Option<BatchInfo>,
    pub added_time: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confirmed_time: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub receipt: Option<TransactionReceipt>,
}

impl TransactionRecord {
    pub fn key(&self) -> TransactionKey {
        TransactionKey {
            owner: self.owner,
            chain_id: self.chain_id,
            id: self.id.clone(),
        }
    }

    pub fn nonce(&self) -> Option<u64> {
        self.request.nonce
    }
}
