use std::sync::Arc;

use alloy::primitives::Address;
use txflow_core::{
    chain::{Chain, ChainService, ExecutionClient},
    constants::ATOMIC_BATCH_REJECTED_CODE,
    error::EngineError,
    now_ms,
    rpc_clients::{BatchCall, SendCallsPayload},
    signer::AccountResolver,
    transaction::{
        BatchInfo, TransactionRecord, TransactionRequestData, TransactionStatus,
        TransactionTypeInfo,
    },
};
use uuid::Uuid;

use crate::{
    analytics::{AnalyticsSink, events},
    store::TransactionStore,
    watcher::ConfirmationWatcher,
};

/// Host reactions to wallet capability changes observed during batch
/// submission.
pub trait BatchCapabilityHooks: Send + Sync {
    /// The wallet declined atomic execution; the host should stop offering
    /// one-click flows until capabilities say otherwise.
    fn on_batch_rejected(&self);
}

pub struct NoopCapabilityHooks;

impl BatchCapabilityHooks for NoopCapabilityHooks {
    fn on_batch_rejected(&self) {}
}

pub struct BatchSubmitParams {
    pub account: Address,
    pub chain_id: u64,
    pub calls: Vec<BatchCall>,
    pub connector_id: Option<String>,
    pub transaction_id: Option<String>,
}

/// Submits atomic call batches through EIP-5792 and tracks them under a
/// single record keyed by the wallet-assigned batch id.
pub struct BatchTransactionService<CS: ChainService + 'static> {
    pub chain_service: Arc<CS>,
    pub accounts: Arc<dyn AccountResolver>,
    pub store: Arc<TransactionStore>,
    pub watcher: Arc<ConfirmationWatcher<CS>>,
    pub analytics: Arc<dyn AnalyticsSink>,
    pub hooks: Arc<dyn BatchCapabilityHooks>,
}

impl<CS: ChainService + 'static> BatchTransactionService<CS> {
    /// Submit a batch of calls for atomic execution.
    ///
    /// On wallet rejection of atomicity (code 5750) the capability hooks
    /// fire exactly once, the wallet's capabilities are re-queried, and no
    /// record is created.
    #[tracing::instrument(level = "info", skip_all, fields(chain_id = params.chain_id, owner = %params.account))]
    pub async fn submit_batch(
        &self,
        params: BatchSubmitParams,
    ) -> Result<TransactionRecord, EngineError> {
        if params.calls.is_empty() {
            return Err(EngineError::ValidationError {
                message: "batch must contain at least one call".to_string(),
            });
        }

        let account =
            self.accounts
                .resolve_account(params.account)
                .ok_or(EngineError::AccountNotFound {
                    address: params.account,
                })?;
        let chain = self.chain_service.chain(params.chain_id)?;

        let payload = SendCallsPayload::new(params.chain_id, account.address, params.calls.clone());
        let result = match chain.client().send_calls(&payload).await {
            Ok(result) => result,
            Err(error) if error.rpc_code() == Some(ATOMIC_BATCH_REJECTED_CODE) => {
                tracing::warn!("wallet declined atomic batch execution");
                self.hooks.on_batch_rejected();
                // the wallet's advertised capabilities just proved stale
                if let Err(refresh_error) = chain.client().capabilities(account.address).await {
                    tracing::warn!(%refresh_error, "capability refresh failed after batch rejection");
                }
                return Err(EngineError::UserRejected {
                    message: "wallet declined atomic batch execution".to_string(),
                });
            }
            Err(error) if error.is_user_rejection() => {
                return Err(EngineError::UserRejected {
                    message: error.to_string(),
                });
            }
            Err(error) => {
                return Err(EngineError::SubmissionFailed {
                    chain_id: params.chain_id,
                    message: error.to_string(),
                });
            }
        };

        // the record mirrors the first call so history rendering has a
        // target and value to show; the batch id drives confirmation
        let first = &params.calls[0];
        let record = TransactionRecord {
            id: params
                .transaction_id
                .unwrap_or_else(|| Uuid::new_v4().to_string()),
            chain_id: params.chain_id,
            owner: account.address,
            status: TransactionStatus::Pending,
            type_info: TransactionTypeInfo::SendCalls {
                call_count: params.calls.len(),
            },
            request: TransactionRequestData {
                to: Some(first.to),
                data: first.data.clone(),
                value: first.value,
                ..Default::default()
            },
            options: Default::default(),
            hash: None,
            cancel_request: None,
            cancel_hash: None,
            batch_info: Some(BatchInfo {
                connector_id: params.connector_id,
                batch_id: result.id.clone(),
            }),
            added_time: now_ms(),
            confirmed_time: None,
            receipt: None,
        };
        self.store.create(record.clone())?;
        Arc::clone(&self.watcher).watch(record.key());

        tracing::info!(id = %record.id, batch_id = %result.id, "batch submitted");
        self.analytics.emit(
            events::BATCH_SUBMITTED,
            serde_json::json!({
                "chainId": record.chain_id,
                "id": record.id,
                "batchId": result.id,
                "callCount": params.calls.len(),
            }),
        );

        Ok(record)
    }
}
