use std::time::Duration;

use serde::{Deserialize, Serialize};
use txflow_core::{
    constants::{BATCH_POLL_INTERVAL_MS, RECEIPT_POLL_INTERVAL_MS},
    gas::GasBumpConfig,
};

use crate::watcher::WatcherConfig;

/// Tunables for the orchestration layer. Deserializable so hosts can load
/// them from their settings file; defaults match mainnet block cadence.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OrchestratorConfig {
    pub receipt_poll_interval_ms: u64,
    pub batch_poll_interval_ms: u64,
    /// After this long without inclusion, a pending transaction stops being
    /// watched and is flagged stale. `None` keeps watching indefinitely.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stale_pending_ms: Option<u64>,
    pub gas_bump: GasBumpConfig,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            receipt_poll_interval_ms: RECEIPT_POLL_INTERVAL_MS,
            batch_poll_interval_ms: BATCH_POLL_INTERVAL_MS,
            stale_pending_ms: None,
            gas_bump: GasBumpConfig::default(),
        }
    }
}

impl OrchestratorConfig {
    pub fn watcher_config(&self) -> WatcherConfig {
        WatcherConfig {
            poll_interval: Duration::from_millis(self.receipt_poll_interval_ms),
            batch_poll_interval: Duration::from_millis(self.batch_poll_interval_ms),
            stale_after: self.stale_pending_ms.map(Duration::from_millis),
        }
    }
}
