use std::sync::Arc;

use alloy::primitives::{Address, Bytes, U256};
use txflow_core::{
    chain::{Chain, ChainService, ExecutionClient},
    constants::CANCELLATION_GAS_LIMIT,
    error::EngineError,
    gas::{GasBumpConfig, bump_fee, current_fee_params, estimate_gas_fees},
    now_ms,
    signer::{AccountResolver, SignerCapability},
    transaction::{
        TransactionKey, TransactionOptions, TransactionRecord, TransactionRequestData,
        TransactionStatus, TransactionTypeInfo,
    },
};
use txflow_delegation::checker::check_delegation;
use uuid::Uuid;

use crate::{
    analytics::{AnalyticsSink, events},
    interrupt::InterruptSignal,
    signer::{ExecutionPath, SigningContext, TransactionSignerService},
    store::{StoreError, TransactionStore},
    watcher::ConfirmationWatcher,
};

/// Caller input for a single transaction submission.
pub struct SubmitTransactionParams {
    pub account: Address,
    pub chain_id: u64,
    pub request: TransactionRequestData,
    pub type_info: TransactionTypeInfo,
    pub options: TransactionOptions,
    /// Stable id for the record; generated when absent.
    pub transaction_id: Option<String>,
    /// Lets the UI abandon the flow between async steps.
    pub interrupt: Option<InterruptSignal>,
}

/// Orchestrates the transaction lifecycle: resolve the account and chain,
/// decide the execution path, price and sign the transaction, submit it,
/// then track it until the watcher settles it.
pub struct TransactionService<CS, S>
where
    CS: ChainService + 'static,
    S: SignerCapability,
{
    pub chain_service: Arc<CS>,
    pub accounts: Arc<dyn AccountResolver>,
    pub signer: TransactionSignerService<S>,
    pub store: Arc<TransactionStore>,
    pub watcher: Arc<ConfirmationWatcher<CS>>,
    pub analytics: Arc<dyn AnalyticsSink>,
    pub gas_bump: GasBumpConfig,
}

impl<CS, S> TransactionService<CS, S>
where
    CS: ChainService + 'static,
    S: SignerCapability,
{
    /// Submit a transaction and start watching it.
    ///
    /// No record is created unless submission succeeds: rejected,
    /// interrupted, or failed submissions leave the store untouched.
    #[tracing::instrument(level = "info", skip_all, fields(chain_id = params.chain_id, owner = %params.account))]
    pub async fn submit_transaction(
        &self,
        params: SubmitTransactionParams,
    ) -> Result<TransactionRecord, EngineError> {
        let interrupt = params.interrupt.clone();
        check_interrupt(&interrupt)?;

        let account =
            self.accounts
                .resolve_account(params.account)
                .ok_or(EngineError::AccountNotFound {
                    address: params.account,
                })?;

        let chain = if params.options.submit_via_private_rpc {
            self.chain_service
                .private_chain(params.chain_id, account.address)?
        } else {
            self.chain_service.chain(params.chain_id)?
        };

        let delegation = check_delegation(&account, &chain, params.request.to).await?;
        let path = if delegation.use_bundled_execution {
            ExecutionPath::Bundled
        } else {
            ExecutionPath::Direct
        };

        let nonce = match params.request.nonce {
            Some(nonce) => nonce,
            None => {
                chain
                    .client()
                    .transaction_count(account.address, true)
                    .await?
            }
        };
        let estimate = estimate_gas_fees(&chain, account.address, &params.request).await?;
        check_interrupt(&interrupt)?;

        let signed = self
            .signer
            .sign(
                path,
                SigningContext {
                    chain_id: params.chain_id,
                    from: account.address,
                    nonce,
                    gas_limit: estimate.gas_limit,
                    fee: estimate.params.clone(),
                    request: &params.request,
                },
            )
            .await
            .map_err(normalize_rejection)?;
        check_interrupt(&interrupt)?;

        let hash = chain
            .client()
            .send_raw_transaction(&signed)
            .await
            .map_err(|error| classify_submission_error(params.chain_id, error))?;

        let request = TransactionRequestData {
            nonce: Some(nonce),
            gas_limit: Some(estimate.gas_limit),
            fee: Some(estimate.params),
            ..params.request
        };
        let record = TransactionRecord {
            id: params
                .transaction_id
                .unwrap_or_else(|| Uuid::new_v4().to_string()),
            chain_id: params.chain_id,
            owner: account.address,
            status: TransactionStatus::Pending,
            type_info: params.type_info,
            request,
            options: TransactionOptions {
                includes_delegation: path == ExecutionPath::Bundled,
                ..params.options
            },
            hash: Some(hash),
            cancel_request: None,
            cancel_hash: None,
            batch_info: None,
            added_time: now_ms(),
            confirmed_time: None,
            receipt: None,
        };
        self.store.create(record.clone())?;
        Arc::clone(&self.watcher).watch(record.key());

        tracing::info!(id = %record.id, hash = %hash, "transaction submitted");
        self.analytics.emit(
            events::TRANSACTION_SUBMITTED,
            serde_json::json!({
                "chainId": record.chain_id,
                "id": record.id,
                "type": record.type_info.label(),
                "hash": hash.to_string(),
                "includesDelegation": record.options.includes_delegation,
            }),
        );

        Ok(record)
    }

    /// Attempt to cancel a pending transaction by outbidding it with a
    /// zero-value self-send at the same nonce. The record moves to
    /// `Cancelling`; whichever transaction mines first decides the outcome.
    #[tracing::instrument(level = "info", skip(self), fields(key = %key))]
    pub async fn cancel_transaction(
        &self,
        key: &TransactionKey,
    ) -> Result<TransactionRecord, EngineError> {
        let record = self.get_in_flight(key, TransactionStatus::Cancelling)?;
        let account =
            self.accounts
                .resolve_account(record.owner)
                .ok_or(EngineError::AccountNotFound {
                    address: record.owner,
                })?;
        let chain = self.chain_for_record(&record)?;

        let (nonce, previous_fee) = nonce_and_fee(&record)?;
        let fee = bump_fee(
            &previous_fee,
            &self.gas_bump,
            self.network_fee_floor(&chain).await.as_ref(),
        );

        let cancel_request = TransactionRequestData {
            to: Some(record.owner),
            data: Bytes::new(),
            value: U256::ZERO,
            gas_limit: Some(CANCELLATION_GAS_LIMIT),
            nonce: Some(nonce),
            fee: Some(fee.clone()),
        };
        let signed = self
            .signer
            .sign(
                ExecutionPath::Direct,
                SigningContext {
                    chain_id: record.chain_id,
                    from: account.address,
                    nonce,
                    gas_limit: CANCELLATION_GAS_LIMIT,
                    fee,
                    request: &cancel_request,
                },
            )
            .await
            .map_err(normalize_rejection)?;
        let cancel_hash = chain
            .client()
            .send_raw_transaction(&signed)
            .await
            .map_err(|error| classify_submission_error(record.chain_id, error))?;

        let updated = self.store.mark_cancelling(key, cancel_request, cancel_hash)?;
        tracing::info!(cancel_hash = %cancel_hash, "cancellation submitted");
        self.analytics.emit(
            events::TRANSACTION_CANCEL_SUBMITTED,
            serde_json::json!({
                "chainId": updated.chain_id,
                "id": updated.id,
                "cancelHash": cancel_hash.to_string(),
            }),
        );
        Ok(updated)
    }

    /// Replace a pending transaction with a repriced one at the same nonce.
    /// Fees default to a bump of the tracked fees when the caller supplies
    /// none of their own.
    #[tracing::instrument(level = "info", skip(self, new_request), fields(key = %key))]
    pub async fn replace_transaction(
        &self,
        key: &TransactionKey,
        new_request: TransactionRequestData,
    ) -> Result<TransactionRecord, EngineError> {
        let record = self.get_in_flight(key, TransactionStatus::Replacing)?;
        let account =
            self.accounts
                .resolve_account(record.owner)
                .ok_or(EngineError::AccountNotFound {
                    address: record.owner,
                })?;
        let chain = self.chain_for_record(&record)?;

        let fee = match &new_request.fee {
            Some(fee) => fee.clone(),
            None => {
                let (_, previous_fee) = nonce_and_fee(&record)?;
                bump_fee(
                    &previous_fee,
                    &self.gas_bump,
                    self.network_fee_floor(&chain).await.as_ref(),
                )
            }
        };
        let (nonce, _) = nonce_and_fee(&record)?;

        let draft = TransactionRequestData {
            nonce: Some(nonce),
            fee: Some(fee.clone()),
            ..new_request
        };
        let estimate = estimate_gas_fees(&chain, account.address, &draft).await?;

        let path = if record.options.includes_delegation {
            ExecutionPath::Bundled
        } else {
            ExecutionPath::Direct
        };
        let signed = self
            .signer
            .sign(
                path,
                SigningContext {
                    chain_id: record.chain_id,
                    from: account.address,
                    nonce,
                    gas_limit: estimate.gas_limit,
                    fee,
                    request: &draft,
                },
            )
            .await
            .map_err(normalize_rejection)?;
        let new_hash = chain
            .client()
            .send_raw_transaction(&signed)
            .await
            .map_err(|error| classify_submission_error(record.chain_id, error))?;

        let resolved = TransactionRequestData {
            gas_limit: Some(estimate.gas_limit),
            ..draft
        };
        let updated = self.store.mark_replacing(key, resolved, new_hash)?;
        tracing::info!(new_hash = %new_hash, "replacement submitted");
        self.analytics.emit(
            events::TRANSACTION_REPLACE_SUBMITTED,
            serde_json::json!({
                "chainId": updated.chain_id,
                "id": updated.id,
                "newHash": new_hash.to_string(),
            }),
        );
        Ok(updated)
    }

    /// A competing transaction goes out through the same routing as the
    /// one it competes with.
    fn chain_for_record(&self, record: &TransactionRecord) -> Result<CS::Chain, EngineError> {
        if record.options.submit_via_private_rpc {
            self.chain_service
                .private_chain(record.chain_id, record.owner)
        } else {
            self.chain_service.chain(record.chain_id)
        }
    }

    fn get_in_flight(
        &self,
        key: &TransactionKey,
        intent: TransactionStatus,
    ) -> Result<TransactionRecord, EngineError> {
        let record = self
            .store
            .get(key)
            .ok_or_else(|| StoreError::MissingRecord { key: key.clone() })?;
        if record.status != TransactionStatus::Pending {
            return Err(StoreError::InvalidTransition {
                key: key.clone(),
                from: record.status,
                to: intent,
            }
            .into());
        }
        Ok(record)
    }

    /// Best-effort network fee floor for bumps; a failed estimate only
    /// costs us the clamp, not the operation.
    async fn network_fee_floor(
        &self,
        chain: &CS::Chain,
    ) -> Option<txflow_core::gas::GasFeeParams> {
        match current_fee_params(chain).await {
            Ok(params) => Some(params),
            Err(error) => {
                tracing::warn!(%error, "fee estimation failed, bumping from previous fees only");
                None
            }
        }
    }
}

fn check_interrupt(interrupt: &Option<InterruptSignal>) -> Result<(), EngineError> {
    if interrupt.as_ref().is_some_and(|signal| signal.is_raised()) {
        Err(EngineError::UserInterrupted)
    } else {
        Ok(())
    }
}

fn nonce_and_fee(
    record: &TransactionRecord,
) -> Result<(u64, txflow_core::gas::GasFeeParams), EngineError> {
    let nonce = record.nonce().ok_or(EngineError::ValidationError {
        message: "tracked transaction has no nonce".to_string(),
    })?;
    let fee = record
        .request
        .fee
        .clone()
        .ok_or(EngineError::ValidationError {
            message: "tracked transaction has no fee params".to_string(),
        })?;
    Ok((nonce, fee))
}

fn normalize_rejection(error: EngineError) -> EngineError {
    if matches!(error, EngineError::UserRejected { .. }) {
        return error;
    }
    if error.is_user_rejection() {
        EngineError::UserRejected {
            message: error.to_string(),
        }
    } else {
        error
    }
}

fn classify_submission_error(chain_id: u64, error: EngineError) -> EngineError {
    if error.is_user_rejection() {
        EngineError::UserRejected {
            message: error.to_string(),
        }
    } else {
        EngineError::SubmissionFailed {
            chain_id,
            message: error.to_string(),
        }
    }
}
