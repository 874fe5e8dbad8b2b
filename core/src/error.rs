use alloy::{
    primitives::Address,
    rpc::json_rpc::ErrorPayload,
    transports::{RpcError as AlloyRpcError, TransportErrorKind},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::constants::{UNAUTHORIZED_REQUEST_CODE, USER_REJECTED_REQUEST_CODE};

/// JSON-RPC error payload as observed on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcErrorResponse {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
}

#[derive(Error, Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE", tag = "type")]
pub enum RpcErrorKind {
    #[error("RPC error response: {} (code: {})", .0.message, .0.code)]
    ErrorResp(RpcErrorResponse),

    #[error("RPC returned a null response where one was expected")]
    NullResp,

    #[error("Unsupported RPC feature: {feature}")]
    UnsupportedFeature { feature: String },

    #[error("Local usage error: {message}")]
    LocalUsageError { message: String },

    #[error("HTTP transport error: {message}")]
    TransportHttpError { message: String },

    #[error("Failed to deserialize RPC response: {message}; response text: {text}")]
    DeserError { message: String, text: String },

    #[error("Transport error: {message}")]
    OtherTransportError { message: String },
}

/// Error taxonomy for the transaction orchestration engine.
///
/// Serialized with a discriminant tag so callers can branch on the
/// failure class without string matching.
#[derive(Error, Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE", tag = "type")]
pub enum EngineError {
    #[error("RPC error on chain {chain_id} at {rpc_url}: {message}")]
    #[serde(rename_all = "camelCase")]
    RpcError {
        chain_id: u64,
        rpc_url: String,
        message: String,
        kind: RpcErrorKind,
    },

    #[error("Transaction rejected by the user: {message}")]
    #[serde(rename_all = "camelCase")]
    UserRejected { message: String },

    #[error("Transaction flow interrupted by the user before submission")]
    UserInterrupted,

    #[error("Failed to submit transaction on chain {chain_id}: {message}")]
    #[serde(rename_all = "camelCase")]
    SubmissionFailed { chain_id: u64, message: String },

    #[error("No unlocked account found for address {address}")]
    #[serde(rename_all = "camelCase")]
    AccountNotFound { address: Address },

    #[error("No usable provider for chain {chain_id}: {message}")]
    #[serde(rename_all = "camelCase")]
    ProviderUnavailable { chain_id: u64, message: String },

    #[error("Receipt polling failed on chain {chain_id}: {message}")]
    #[serde(rename_all = "camelCase")]
    ReceiptPollingError { chain_id: u64, message: String },

    #[error("Transaction repository invariant violated: {message}")]
    #[serde(rename_all = "camelCase")]
    RepositoryInvariantViolation { message: String },

    #[error("Validation error: {message}")]
    #[serde(rename_all = "camelCase")]
    ValidationError { message: String },

    #[error("Internal error: {message}")]
    #[serde(rename_all = "camelCase")]
    InternalError { message: String },
}

impl EngineError {
    /// JSON-RPC error code carried by this error, if any.
    pub fn rpc_code(&self) -> Option<i64> {
        match self {
            EngineError::RpcError {
                kind: RpcErrorKind::ErrorResp(resp),
                ..
            } => Some(resp.code),
            _ => None,
        }
    }

    /// Whether the underlying failure is the user declining a wallet prompt.
    pub fn is_user_rejection(&self) -> bool {
        match self {
            EngineError::UserRejected { .. } => true,
            EngineError::RpcError {
                kind: RpcErrorKind::ErrorResp(resp),
                ..
            } => {
                resp.code == USER_REJECTED_REQUEST_CODE
                    || resp.code == UNAUTHORIZED_REQUEST_CODE
                    || resp.message.to_lowercase().contains("user rejected")
                    || resp.message.to_lowercase().contains("user denied")
            }
            _ => false,
        }
    }

    /// Whether the node reported the requested RPC method as unavailable.
    pub fn is_unsupported_feature(&self) -> bool {
        match self {
            EngineError::RpcError { kind, .. } => match kind {
                RpcErrorKind::UnsupportedFeature { .. } => true,
                RpcErrorKind::ErrorResp(resp) => {
                    resp.code == -32601
                        || resp.message.to_lowercase().contains("method not found")
                        || resp.message.to_lowercase().contains("not supported")
                }
                _ => false,
            },
            _ => false,
        }
    }
}

fn error_payload_to_response(payload: &ErrorPayload) -> RpcErrorResponse {
    RpcErrorResponse {
        code: payload.code,
        message: payload.message.to_string(),
        data: payload.data.as_ref().map(|data| data.get().to_string()),
    }
}

pub fn to_engine_rpc_error_kind(error: &AlloyRpcError<TransportErrorKind>) -> RpcErrorKind {
    match error {
        AlloyRpcError::ErrorResp(payload) => {
            RpcErrorKind::ErrorResp(error_payload_to_response(payload))
        }
        AlloyRpcError::NullResp => RpcErrorKind::NullResp,
        AlloyRpcError::UnsupportedFeature(feature) => RpcErrorKind::UnsupportedFeature {
            feature: feature.to_string(),
        },
        AlloyRpcError::LocalUsageError(error) => RpcErrorKind::LocalUsageError {
            message: error.to_string(),
        },
        AlloyRpcError::DeserError { err, text } => RpcErrorKind::DeserError {
            message: err.to_string(),
            text: text.clone(),
        },
        AlloyRpcError::Transport(TransportErrorKind::HttpError(http_error)) => {
            RpcErrorKind::TransportHttpError {
                message: http_error.to_string(),
            }
        }
        other => RpcErrorKind::OtherTransportError {
            message: other.to_string(),
        },
    }
}

/// Convert alloy transport errors into [`EngineError`] with chain context attached.
pub trait AlloyRpcErrorToEngineError {
    fn to_engine_error(&self, chain_id: u64, rpc_url: &str) -> EngineError;
}

impl AlloyRpcErrorToEngineError for AlloyRpcError<TransportErrorKind> {
    fn to_engine_error(&self, chain_id: u64, rpc_url: &str) -> EngineError {
        EngineError::RpcError {
            chain_id,
            rpc_url: rpc_url.to_string(),
            message: self.to_string(),
            kind: to_engine_rpc_error_kind(self),
        }
    }
}
