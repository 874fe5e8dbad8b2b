mod wallet;

pub use wallet::{
    BatchCall, BatchStatusCode, CallReceipt, CallsStatus, SendCallsPayload, SendCallsResult,
    WalletRpcClient,
};
