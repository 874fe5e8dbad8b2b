pub mod chain;
pub mod constants;
pub mod error;
pub mod gas;
pub mod rpc_clients;
pub mod signer;
pub mod transaction;

/// Milliseconds since the unix epoch, used for record timestamps.
pub fn now_ms() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}
