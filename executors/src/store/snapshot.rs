use std::collections::BTreeMap;

use alloy::primitives::Address;
use serde::{Deserialize, Serialize};
use txflow_core::transaction::TransactionRecord;

use super::{StoreError, TransactionStore, violation};

/// Serializable view of the store, nested owner -> chain -> id so hosts
/// can persist it in their settings storage and diff it per account.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StoreSnapshot(
    pub BTreeMap<Address, BTreeMap<u64, BTreeMap<String, TransactionRecord>>>,
);

impl TransactionStore {
    pub fn snapshot(&self) -> StoreSnapshot {
        let inner = self.lock();
        let mut snapshot = StoreSnapshot::default();
        for record in inner.records.values() {
            snapshot
                .0
                .entry(record.owner)
                .or_default()
                .entry(record.chain_id)
                .or_default()
                .insert(record.id.clone(), record.clone());
        }
        snapshot
    }

    /// Rebuild a store from a persisted snapshot, validating the same
    /// invariants enforced at runtime.
    pub fn hydrate(snapshot: StoreSnapshot) -> Result<Self, StoreError> {
        let store = TransactionStore::new();
        {
            let mut inner = store.lock();
            for (owner, chains) in snapshot.0 {
                for (chain_id, records) in chains {
                    for (id, record) in records {
                        if record.owner != owner
                            || record.chain_id != chain_id
                            || record.id != id
                        {
                            return Err(violation(StoreError::SnapshotKeyMismatch {
                                key: record.key(),
                            }));
                        }
                        if record.receipt.is_some() && !record.status.is_terminal() {
                            return Err(violation(StoreError::ReceiptNotAllowed {
                                key: record.key(),
                                status: record.status,
                            }));
                        }
                        inner.insert(record);
                    }
                }
            }
        }
        Ok(store)
    }
}
