use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use txflow_core::{
    chain::{Chain, ChainService, ExecutionClient, ObservedReceipt},
    constants::{BATCH_POLL_INTERVAL_MS, RECEIPT_POLL_INTERVAL_MS},
    error::EngineError,
    now_ms,
    rpc_clients::{BatchStatusCode, CallsStatus},
    transaction::{
        BatchInfo, FinalizedStatus, TransactionKey, TransactionRecord, TransactionStatus,
    },
};

use crate::{
    analytics::{AnalyticsSink, events},
    store::TransactionStore,
};

#[derive(Debug, Clone)]
pub struct WatcherConfig {
    pub poll_interval: Duration,
    pub batch_poll_interval: Duration,
    /// Stop watching a transaction that has been in flight this long.
    /// `None` polls until the chain settles it, however long that takes.
    pub stale_after: Option<Duration>,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(RECEIPT_POLL_INTERVAL_MS),
            batch_poll_interval: Duration::from_millis(BATCH_POLL_INTERVAL_MS),
            stale_after: None,
        }
    }
}

/// Result of one confirmation poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// The record reached a terminal state (or stopped being watchable);
    /// polling for it ends.
    Settled,
    /// Nothing conclusive yet, poll again next interval.
    StillPending,
}

struct WatchHandle {
    join_handle: JoinHandle<()>,
    shutdown_tx: oneshot::Sender<()>,
}

/// Polls the chain until every watched transaction settles.
///
/// One task per watched key. Each task snapshots the record, performs its
/// network calls without holding any store lock, then applies the outcome
/// through the store's checked transitions.
pub struct ConfirmationWatcher<CS: ChainService + 'static> {
    chain_service: Arc<CS>,
    store: Arc<TransactionStore>,
    analytics: Arc<dyn AnalyticsSink>,
    config: WatcherConfig,
    tasks: Mutex<HashMap<TransactionKey, WatchHandle>>,
}

impl<CS: ChainService + 'static> ConfirmationWatcher<CS> {
    pub fn new(
        chain_service: Arc<CS>,
        store: Arc<TransactionStore>,
        analytics: Arc<dyn AnalyticsSink>,
        config: WatcherConfig,
    ) -> Self {
        Self {
            chain_service,
            store,
            analytics,
            config,
            tasks: Mutex::new(HashMap::new()),
        }
    }

    /// Start watching a key. Idempotent: a key already being watched keeps
    /// its existing task.
    pub fn watch(self: Arc<Self>, key: TransactionKey) {
        let mut tasks = self.tasks.lock().unwrap_or_else(|p| p.into_inner());
        if tasks.contains_key(&key) {
            return;
        }

        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();
        let watcher = Arc::clone(&self);
        let task_key = key.clone();
        let join_handle = tokio::spawn(async move {
            loop {
                let interval = watcher.poll_interval_for(&task_key);
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    _ = tokio::time::sleep(interval) => {
                        match watcher.tick(&task_key).await {
                            Ok(TickOutcome::Settled) => break,
                            Ok(TickOutcome::StillPending) => {}
                            Err(error) => {
                                tracing::debug!(key = %task_key, %error, "confirmation poll failed, retrying next interval");
                            }
                        }
                    }
                }
            }
            watcher.forget(&task_key);
        });

        tasks.insert(
            key,
            WatchHandle {
                join_handle,
                shutdown_tx,
            },
        );
    }

    /// Re-attach watchers for every in-flight record, used after hydrating
    /// the store from persistence.
    pub fn watch_incomplete(self: &Arc<Self>) {
        for record in self.store.in_flight_records() {
            Arc::clone(self).watch(record.key());
        }
    }

    /// Stop watching one key without touching its record.
    pub async fn stop(&self, key: &TransactionKey) {
        let handle = {
            let mut tasks = self.tasks.lock().unwrap_or_else(|p| p.into_inner());
            tasks.remove(key)
        };
        if let Some(handle) = handle {
            let _ = handle.shutdown_tx.send(());
            let _ = handle.join_handle.await;
        }
    }

    /// Stop every watcher task, e.g. on app shutdown.
    pub async fn stop_all(&self) {
        let handles: Vec<WatchHandle> = {
            let mut tasks = self.tasks.lock().unwrap_or_else(|p| p.into_inner());
            tasks.drain().map(|(_, handle)| handle).collect()
        };
        for handle in handles {
            let _ = handle.shutdown_tx.send(());
            let _ = handle.join_handle.await;
        }
    }

    pub fn watched_count(&self) -> usize {
        self.tasks.lock().unwrap_or_else(|p| p.into_inner()).len()
    }

    fn forget(&self, key: &TransactionKey) {
        self.tasks
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .remove(key);
    }

    fn poll_interval_for(&self, key: &TransactionKey) -> Duration {
        match self.store.get(key) {
            Some(record) if record.batch_info.is_some() => self.config.batch_poll_interval,
            _ => self.config.poll_interval,
        }
    }

    /// One confirmation poll for a key. Public so hosts driving their own
    /// scheduling (and tests) can advance a watch deterministically.
    pub async fn tick(&self, key: &TransactionKey) -> Result<TickOutcome, EngineError> {
        let Some(record) = self.store.get(key) else {
            tracing::warn!(key = %key, "watched transaction disappeared from the store");
            return Ok(TickOutcome::Settled);
        };
        if record.status.is_terminal() {
            return Ok(TickOutcome::Settled);
        }

        if let Some(stale_after) = self.config.stale_after {
            // inclusive so a zero threshold stales immediately
            let age = now_ms().saturating_sub(record.added_time);
            if age >= stale_after.as_millis() as u64 {
                tracing::warn!(key = %key, age_ms = age, "transaction stale, giving up watching");
                self.analytics.emit(
                    events::TRANSACTION_STALE,
                    serde_json::json!({
                        "chainId": record.chain_id,
                        "id": record.id,
                        "ageMs": age,
                    }),
                );
                return Ok(TickOutcome::Settled);
            }
        }

        let chain = self.chain_service.chain(record.chain_id)?;
        match &record.batch_info {
            Some(batch_info) => self.tick_batch(&record, &chain, batch_info).await,
            None => self.tick_direct(&record, &chain).await,
        }
    }

    async fn tick_direct(
        &self,
        record: &TransactionRecord,
        chain: &CS::Chain,
    ) -> Result<TickOutcome, EngineError> {
        let key = record.key();
        let client = chain.client();

        if self.settle_from_receipts(&key, record, client).await? {
            return Ok(TickOutcome::Settled);
        }

        // same-nonce invalidation: if the account's mined nonce has moved
        // past ours and none of our hashes landed, something external
        // (another device, a node-side replacement) consumed the slot
        if let Some(nonce) = record.nonce() {
            let mined_count = client
                .transaction_count(record.owner, false)
                .await
                .map_err(|error| self.polling_error(record, error))?;
            if mined_count > nonce {
                // one of our own hashes may have mined between the receipt
                // polls above and the nonce query; a second look decides
                if self.settle_from_receipts(&key, record, client).await? {
                    return Ok(TickOutcome::Settled);
                }
                let status = match record.status {
                    TransactionStatus::Replacing => FinalizedStatus::Failed,
                    _ => FinalizedStatus::Cancelled,
                };
                tracing::info!(
                    key = %key,
                    nonce,
                    mined_count,
                    outcome = ?status,
                    "nonce consumed by an unknown transaction, settling record"
                );
                self.finalize(&key, record, status, None, None)?;
                return Ok(TickOutcome::Settled);
            }
        }

        Ok(TickOutcome::StillPending)
    }

    /// Poll every hash the record could settle from, finalizing on the
    /// first receipt found. Returns whether the record settled.
    async fn settle_from_receipts(
        &self,
        key: &TransactionKey,
        record: &TransactionRecord,
        client: &<CS::Chain as Chain>::Client,
    ) -> Result<bool, EngineError> {
        // the watched hash wins any race it is part of
        if let Some(hash) = record.hash {
            if let Some(observed) = self.poll_receipt(record, client, hash).await? {
                self.finalize_mined(key, record, observed, hash)?;
                return Ok(true);
            }
        }

        if record.status == TransactionStatus::Cancelling {
            if let Some(cancel_hash) = record.cancel_hash {
                if self
                    .poll_receipt(record, client, cancel_hash)
                    .await?
                    .is_some()
                {
                    // the cancellation consumed the nonce; no receipt is
                    // kept because the original transaction never mined
                    self.finalize(key, record, FinalizedStatus::Cancelled, None, None)?;
                    return Ok(true);
                }
            }
        }

        if record.status == TransactionStatus::Replacing {
            if let Some(old_hash) = record.options.replaced_transaction_hash {
                if let Some(observed) = self.poll_receipt(record, client, old_hash).await? {
                    // the displaced transaction mined first; it carried the
                    // same intent, so its receipt settles the record
                    self.finalize_mined(key, record, observed, old_hash)?;
                    return Ok(true);
                }
            }
        }

        Ok(false)
    }

    async fn tick_batch(
        &self,
        record: &TransactionRecord,
        chain: &CS::Chain,
        batch_info: &BatchInfo,
    ) -> Result<TickOutcome, EngineError> {
        let key = record.key();
        let client = chain.client();
        let status: CallsStatus = client
            .calls_status(&batch_info.batch_id)
            .await
            .map_err(|error| self.polling_error(record, error))?;

        match status.code() {
            BatchStatusCode::Pending => Ok(TickOutcome::StillPending),
            BatchStatusCode::Confirmed | BatchStatusCode::Failed => {
                if let Some(first) = status.receipts.as_ref().and_then(|r| r.first()) {
                    let hash = first.transaction_hash;
                    match self.poll_receipt(record, client, hash).await? {
                        Some(observed) => {
                            self.finalize_mined(&key, record, observed, hash)?;
                            Ok(TickOutcome::Settled)
                        }
                        // the wallet saw inclusion before our node did
                        None => Ok(TickOutcome::StillPending),
                    }
                } else if status.code() == BatchStatusCode::Failed {
                    self.finalize(&key, record, FinalizedStatus::Failed, None, None)?;
                    Ok(TickOutcome::Settled)
                } else {
                    Ok(TickOutcome::StillPending)
                }
            }
        }
    }

    async fn poll_receipt(
        &self,
        record: &TransactionRecord,
        client: &<CS::Chain as Chain>::Client,
        hash: alloy::primitives::TxHash,
    ) -> Result<Option<ObservedReceipt>, EngineError> {
        client
            .transaction_receipt(hash)
            .await
            .map_err(|error| self.polling_error(record, error))
    }

    fn polling_error(&self, record: &TransactionRecord, error: EngineError) -> EngineError {
        EngineError::ReceiptPollingError {
            chain_id: record.chain_id,
            message: error.to_string(),
        }
    }

    fn finalize_mined(
        &self,
        key: &TransactionKey,
        record: &TransactionRecord,
        observed: ObservedReceipt,
        mined_hash: alloy::primitives::TxHash,
    ) -> Result<(), EngineError> {
        let status = if observed.success {
            FinalizedStatus::Success
        } else {
            FinalizedStatus::Failed
        };
        self.finalize(key, record, status, Some(observed.receipt), Some(mined_hash))
    }

    fn finalize(
        &self,
        key: &TransactionKey,
        record: &TransactionRecord,
        status: FinalizedStatus,
        receipt: Option<txflow_core::transaction::TransactionReceipt>,
        mined_hash: Option<alloy::primitives::TxHash>,
    ) -> Result<(), EngineError> {
        let finalized = self.store.finalize(key, status, receipt, mined_hash)?;
        tracing::info!(
            key = %key,
            status = %finalized.status,
            block_number = finalized.receipt.as_ref().map(|r| r.block_number),
            "transaction settled"
        );
        self.analytics.emit(
            events::TRANSACTION_FINALIZED,
            serde_json::json!({
                "chainId": record.chain_id,
                "id": record.id,
                "type": record.type_info.label(),
                "status": finalized.status.to_string(),
            }),
        );
        Ok(())
    }
}
