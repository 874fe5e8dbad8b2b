use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use alloy::primitives::{Address, TxHash};
use thiserror::Error;
use txflow_core::{
    error::EngineError,
    now_ms,
    transaction::{
        FiatPurchaseInfo, FinalizedStatus, TransactionKey, TransactionReceipt, TransactionRecord,
        TransactionRequestData, TransactionStatus, TransactionTypeInfo,
    },
};

mod snapshot;

pub use snapshot::StoreSnapshot;

/// Invariant violations raised by the store. These indicate a programming
/// error in a caller, never a recoverable runtime condition, so they are
/// logged at error level and surfaced instead of being papered over.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("attempted to track an already tracked transaction: {key}")]
    DuplicateCreate { key: TransactionKey },

    #[error("attempted to mutate a missing transaction: {key}")]
    MissingRecord { key: TransactionKey },

    #[error("new transactions must start in-flight, got {status} for {key}")]
    CreateNotInFlight {
        key: TransactionKey,
        status: TransactionStatus,
    },

    #[error("invalid status transition {from} -> {to} for {key}")]
    InvalidTransition {
        key: TransactionKey,
        from: TransactionStatus,
        to: TransactionStatus,
    },

    #[error("receipt attached to non-mined status {status} for {key}")]
    ReceiptNotAllowed {
        key: TransactionKey,
        status: TransactionStatus,
    },

    #[error("fiat purchase update for a non fiat-purchase transaction: {key}")]
    FiatMergeMismatch { key: TransactionKey },

    #[error("snapshot entry does not match its key path: {key}")]
    SnapshotKeyMismatch { key: TransactionKey },
}

impl From<StoreError> for EngineError {
    fn from(error: StoreError) -> Self {
        EngineError::RepositoryInvariantViolation {
            message: error.to_string(),
        }
    }
}

fn violation(error: StoreError) -> StoreError {
    tracing::error!(error = %error, "transaction store invariant violated");
    error
}

#[derive(Debug, Default)]
struct StoreInner {
    records: HashMap<TransactionKey, TransactionRecord>,
    by_owner: HashMap<Address, HashSet<TransactionKey>>,
    in_flight: HashSet<TransactionKey>,
}

impl StoreInner {
    fn index(&mut self, record: &TransactionRecord) {
        let key = record.key();
        self.by_owner
            .entry(record.owner)
            .or_default()
            .insert(key.clone());
        if record.status.is_in_flight() {
            self.in_flight.insert(key);
        }
    }

    fn insert(&mut self, record: TransactionRecord) {
        self.index(&record);
        self.records.insert(record.key(), record);
    }
}

/// In-memory transaction repository, keyed by owner, chain, and id.
///
/// All mutation is synchronous under one lock; the lock is never held
/// across an await point because no method here is async.
#[derive(Debug, Default)]
pub struct TransactionStore {
    inner: Mutex<StoreInner>,
}

impl TransactionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, StoreInner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Track a newly submitted transaction. The key must be unused and the
    /// record must be in-flight; an existing record is left untouched on
    /// failure.
    pub fn create(&self, record: TransactionRecord) -> Result<(), StoreError> {
        let key = record.key();
        if !record.status.is_in_flight() {
            return Err(violation(StoreError::CreateNotInFlight {
                key,
                status: record.status,
            }));
        }
        if record.receipt.is_some() {
            return Err(violation(StoreError::ReceiptNotAllowed {
                key,
                status: record.status,
            }));
        }

        let mut inner = self.lock();
        if inner.records.contains_key(&key) {
            return Err(violation(StoreError::DuplicateCreate { key }));
        }
        inner.insert(record);
        Ok(())
    }

    pub fn get(&self, key: &TransactionKey) -> Option<TransactionRecord> {
        self.lock().records.get(key).cloned()
    }

    /// Transition a pending transaction to `Cancelling`, recording the
    /// cancellation transaction that now competes for the nonce.
    pub fn mark_cancelling(
        &self,
        key: &TransactionKey,
        cancel_request: TransactionRequestData,
        cancel_hash: TxHash,
    ) -> Result<TransactionRecord, StoreError> {
        self.transition(key, TransactionStatus::Cancelling, |record| {
            record.cancel_request = Some(cancel_request);
            record.cancel_hash = Some(cancel_hash);
        })
    }

    /// Transition a pending transaction to `Replacing`, swapping in the
    /// repriced request and hash while remembering the displaced hash.
    pub fn mark_replacing(
        &self,
        key: &TransactionKey,
        new_request: TransactionRequestData,
        new_hash: TxHash,
    ) -> Result<TransactionRecord, StoreError> {
        self.transition(key, TransactionStatus::Replacing, |record| {
            record.options.replaced_transaction_hash = record.hash;
            record.request = new_request;
            record.hash = Some(new_hash);
        })
    }

    /// Move a transaction to a terminal state. A receipt may only accompany
    /// mined outcomes; `Cancelled` never carries one.
    pub fn finalize(
        &self,
        key: &TransactionKey,
        status: FinalizedStatus,
        receipt: Option<TransactionReceipt>,
        mined_hash: Option<TxHash>,
    ) -> Result<TransactionRecord, StoreError> {
        if receipt.is_some() && !status.allows_receipt() {
            return Err(violation(StoreError::ReceiptNotAllowed {
                key: key.clone(),
                status: status.as_status(),
            }));
        }
        let record = self.transition(key, status.as_status(), |record| {
            record.receipt = receipt;
            record.confirmed_time = Some(now_ms());
            if let Some(hash) = mined_hash {
                record.hash = Some(hash);
            }
        })?;
        self.lock().in_flight.remove(key);
        Ok(record)
    }

    /// Merge fiat purchase details, creating the record when the provider
    /// reports a purchase before the engine first sees it. This is the only
    /// upsert in the store; every other mutation requires an existing key.
    pub fn merge_fiat_purchase(
        &self,
        key: &TransactionKey,
        info: FiatPurchaseInfo,
    ) -> Result<TransactionRecord, StoreError> {
        let mut inner = self.lock();
        match inner.records.get_mut(key) {
            Some(record) => {
                match &mut record.type_info {
                    TransactionTypeInfo::FiatPurchase(existing) => existing.merge_from(info),
                    _ => {
                        return Err(violation(StoreError::FiatMergeMismatch {
                            key: key.clone(),
                        }));
                    }
                }
                Ok(record.clone())
            }
            None => {
                let record = TransactionRecord {
                    id: key.id.clone(),
                    chain_id: key.chain_id,
                    owner: key.owner,
                    status: TransactionStatus::Pending,
                    type_info: TransactionTypeInfo::FiatPurchase(info),
                    request: TransactionRequestData::default(),
                    options: Default::default(),
                    hash: None,
                    cancel_request: None,
                    cancel_hash: None,
                    batch_info: None,
                    added_time: now_ms(),
                    confirmed_time: None,
                    receipt: None,
                };
                inner.insert(record.clone());
                Ok(record)
            }
        }
    }

    /// Drop a record entirely. Used by hosts clearing local history, never
    /// by the watcher.
    pub fn remove(&self, key: &TransactionKey) -> Result<TransactionRecord, StoreError> {
        let mut inner = self.lock();
        let record = inner
            .records
            .remove(key)
            .ok_or_else(|| violation(StoreError::MissingRecord { key: key.clone() }))?;
        if let Some(keys) = inner.by_owner.get_mut(&record.owner) {
            keys.remove(key);
            if keys.is_empty() {
                inner.by_owner.remove(&record.owner);
            }
        }
        inner.in_flight.remove(key);
        Ok(record)
    }

    /// All transactions for an owner, oldest first.
    pub fn transactions_for_owner(&self, owner: Address) -> Vec<TransactionRecord> {
        let inner = self.lock();
        let mut records: Vec<TransactionRecord> = inner
            .by_owner
            .get(&owner)
            .into_iter()
            .flatten()
            .filter_map(|key| inner.records.get(key).cloned())
            .collect();
        records.sort_by_key(|record| record.added_time);
        records
    }

    /// Every record that has not reached a terminal state.
    pub fn in_flight_records(&self) -> Vec<TransactionRecord> {
        let inner = self.lock();
        inner
            .in_flight
            .iter()
            .filter_map(|key| inner.records.get(key).cloned())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().records.is_empty()
    }

    fn transition(
        &self,
        key: &TransactionKey,
        to: TransactionStatus,
        apply: impl FnOnce(&mut TransactionRecord),
    ) -> Result<TransactionRecord, StoreError> {
        let mut inner = self.lock();
        let record = inner
            .records
            .get_mut(key)
            .ok_or_else(|| violation(StoreError::MissingRecord { key: key.clone() }))?;
        if !record.status.allows_transition_to(to) {
            return Err(violation(StoreError::InvalidTransition {
                key: key.clone(),
                from: record.status,
                to,
            }));
        }
        record.status = to;
        apply(record);
        Ok(record.clone())
    }
}
