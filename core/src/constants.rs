/// Interval between receipt polls for a watched transaction.
pub const RECEIPT_POLL_INTERVAL_MS: u64 = 3_000;

/// Interval between `wallet_getCallsStatus` polls for a watched batch.
pub const BATCH_POLL_INTERVAL_MS: u64 = 2_000;

/// Gas limit for a cancellation transaction (zero-value self-send).
pub const CANCELLATION_GAS_LIMIT: u64 = 21_000;

/// Percent added on top of `eth_estimateGas` results.
pub const GAS_LIMIT_BUFFER_PERCENT: u64 = 10;

/// EIP-5792 error code returned when the wallet declines an atomic batch.
pub const ATOMIC_BATCH_REJECTED_CODE: i64 = 5750;

/// EIP-1193 error code for a user-rejected request.
pub const USER_REJECTED_REQUEST_CODE: i64 = 4001;

/// EIP-1193 error code for a request the wallet is not authorized to serve.
pub const UNAUTHORIZED_REQUEST_CODE: i64 = 4100;

/// `wallet_sendCalls` payload version.
pub const SEND_CALLS_VERSION: &str = "2.0.0";
