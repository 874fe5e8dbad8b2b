#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use alloy::primitives::{Address, B256, Bytes, TxHash, U256};
use txflow_core::{
    chain::{Chain, ChainService, Eip1559Fees, ExecutionClient, ObservedReceipt},
    error::{EngineError, RpcErrorKind, RpcErrorResponse},
    gas::{GasBumpConfig, GasFeeParams},
    rpc_clients::{CallsStatus, SendCallsPayload, SendCallsResult},
    signer::{AccountMeta, AccountResolver, PreparedTransaction, SignerCapability},
    transaction::{
        TransactionReceipt, TransactionRecord, TransactionRequestData, TransactionTypeInfo,
    },
};
use txflow_executors::{
    analytics::{AnalyticsEvent, AnalyticsSink},
    batch::BatchCapabilityHooks,
    signer::TransactionSignerService,
    store::TransactionStore,
    watcher::{ConfirmationWatcher, WatcherConfig},
};

pub fn owner() -> Address {
    Address::repeat_byte(0x11)
}

pub fn other_address() -> Address {
    Address::repeat_byte(0x22)
}

pub fn hash_abc() -> TxHash {
    B256::repeat_byte(0xab)
}

pub fn rpc_error(code: i64, message: &str) -> EngineError {
    EngineError::RpcError {
        chain_id: 1,
        rpc_url: "http://mock.invalid".to_string(),
        message: message.to_string(),
        kind: RpcErrorKind::ErrorResp(RpcErrorResponse {
            code,
            message: message.to_string(),
            data: None,
        }),
    }
}

pub fn success_receipt(block_number: u64) -> ObservedReceipt {
    ObservedReceipt {
        success: true,
        receipt: TransactionReceipt {
            transaction_index: 0,
            block_hash: B256::repeat_byte(0xbb),
            block_number,
            gas_used: 21_000,
            effective_gas_price: 1_500_000_000,
        },
    }
}

pub fn reverted_receipt(block_number: u64) -> ObservedReceipt {
    ObservedReceipt {
        success: false,
        ..success_receipt(block_number)
    }
}

#[derive(Default)]
pub struct MockClientState {
    /// Scripted results for `send_raw_transaction`, popped in order. When
    /// empty, submissions succeed with a generated hash.
    pub send_results: VecDeque<Result<TxHash, EngineError>>,
    pub sent: Vec<Bytes>,
    pub receipts: HashMap<TxHash, ObservedReceipt>,
    /// Scripted transient failures for `transaction_receipt`, popped in order.
    pub receipt_errors: VecDeque<EngineError>,
    /// Hashes whose next `transaction_receipt` lookup misses even when a
    /// receipt is present, popped in order. Models a receipt landing
    /// between two polls of the same tick.
    pub receipt_misses: VecDeque<TxHash>,
    pub pending_nonce: u64,
    pub mined_nonce: u64,
    /// `None` makes EIP-1559 estimation report unsupported.
    pub eip1559: Option<Eip1559Fees>,
    pub gas_price: u128,
    pub estimated_gas: u64,
    pub code: HashMap<Address, Bytes>,
    pub send_calls_results: VecDeque<Result<SendCallsResult, EngineError>>,
    pub sent_batches: Vec<SendCallsPayload>,
    pub calls_status: HashMap<String, CallsStatus>,
}

pub struct MockClient {
    pub state: Mutex<MockClientState>,
    pub capability_queries: AtomicU32,
    hash_counter: AtomicU64,
}

impl MockClient {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockClientState {
                eip1559: Some(Eip1559Fees {
                    max_fee_per_gas: 2_000_000_000,
                    max_priority_fee_per_gas: 1_000_000_000,
                }),
                gas_price: 1_000_000_000,
                estimated_gas: 21_000,
                ..Default::default()
            }),
            capability_queries: AtomicU32::new(0),
            hash_counter: AtomicU64::new(1),
        }
    }

    pub fn with_state(&self, mutate: impl FnOnce(&mut MockClientState)) {
        mutate(&mut self.state.lock().unwrap());
    }

    pub fn insert_receipt(&self, hash: TxHash, observed: ObservedReceipt) {
        self.state.lock().unwrap().receipts.insert(hash, observed);
    }

    pub fn sent_count(&self) -> usize {
        self.state.lock().unwrap().sent.len()
    }
}

impl ExecutionClient for MockClient {
    async fn send_raw_transaction(&self, raw: &Bytes) -> Result<TxHash, EngineError> {
        let mut state = self.state.lock().unwrap();
        state.sent.push(raw.clone());
        match state.send_results.pop_front() {
            Some(result) => result,
            None => {
                let n = self.hash_counter.fetch_add(1, Ordering::SeqCst);
                Ok(B256::with_last_byte(n as u8))
            }
        }
    }

    async fn transaction_receipt(
        &self,
        hash: TxHash,
    ) -> Result<Option<ObservedReceipt>, EngineError> {
        let mut state = self.state.lock().unwrap();
        if let Some(error) = state.receipt_errors.pop_front() {
            return Err(error);
        }
        if state.receipt_misses.front() == Some(&hash) {
            state.receipt_misses.pop_front();
            return Ok(None);
        }
        Ok(state.receipts.get(&hash).cloned())
    }

    async fn transaction_count(&self, _address: Address, pending: bool) -> Result<u64, EngineError> {
        let state = self.state.lock().unwrap();
        Ok(if pending {
            state.pending_nonce
        } else {
            state.mined_nonce
        })
    }

    async fn estimate_eip1559_fees(&self) -> Result<Eip1559Fees, EngineError> {
        self.state
            .lock()
            .unwrap()
            .eip1559
            .ok_or(EngineError::RpcError {
                chain_id: 1,
                rpc_url: "http://mock.invalid".to_string(),
                message: "eth_feeHistory not supported".to_string(),
                kind: RpcErrorKind::UnsupportedFeature {
                    feature: "eip1559".to_string(),
                },
            })
    }

    async fn gas_price(&self) -> Result<u128, EngineError> {
        Ok(self.state.lock().unwrap().gas_price)
    }

    async fn estimate_gas(
        &self,
        _from: Address,
        _request: &TransactionRequestData,
    ) -> Result<u64, EngineError> {
        Ok(self.state.lock().unwrap().estimated_gas)
    }

    async fn code_at(&self, address: Address) -> Result<Bytes, EngineError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .code
            .get(&address)
            .cloned()
            .unwrap_or_default())
    }

    async fn send_calls(&self, payload: &SendCallsPayload) -> Result<SendCallsResult, EngineError> {
        let mut state = self.state.lock().unwrap();
        state.sent_batches.push(payload.clone());
        match state.send_calls_results.pop_front() {
            Some(result) => result,
            None => Ok(SendCallsResult {
                id: "batch-1".to_string(),
            }),
        }
    }

    async fn calls_status(&self, batch_id: &str) -> Result<CallsStatus, EngineError> {
        self.state
            .lock()
            .unwrap()
            .calls_status
            .get(batch_id)
            .cloned()
            .ok_or(rpc_error(-32000, "unknown batch"))
    }

    async fn capabilities(&self, _address: Address) -> Result<serde_json::Value, EngineError> {
        self.capability_queries.fetch_add(1, Ordering::SeqCst);
        Ok(serde_json::json!({ "0x1": { "atomic": { "status": "unsupported" } } }))
    }
}

#[derive(Clone)]
pub struct MockChain {
    pub chain_id: u64,
    pub client: Arc<MockClient>,
}

impl Chain for MockChain {
    type Client = MockClient;

    fn chain_id(&self) -> u64 {
        self.chain_id
    }

    fn rpc_url(&self) -> &str {
        "http://mock.invalid"
    }

    fn client(&self) -> &MockClient {
        &self.client
    }
}

pub struct MockChainService {
    pub chains: HashMap<u64, MockChain>,
    pub private_requests: Mutex<Vec<(u64, Address)>>,
}

impl MockChainService {
    pub fn single(chain_id: u64, client: Arc<MockClient>) -> Self {
        Self {
            chains: HashMap::from([(chain_id, MockChain { chain_id, client })]),
            private_requests: Mutex::new(vec![]),
        }
    }
}

impl ChainService for MockChainService {
    type Chain = MockChain;

    fn chain(&self, chain_id: u64) -> Result<MockChain, EngineError> {
        self.chains
            .get(&chain_id)
            .cloned()
            .ok_or(EngineError::ProviderUnavailable {
                chain_id,
                message: "no RPC endpoint configured for chain".to_string(),
            })
    }

    fn private_chain(&self, chain_id: u64, account: Address) -> Result<MockChain, EngineError> {
        self.private_requests
            .lock()
            .unwrap()
            .push((chain_id, account));
        self.chain(chain_id)
    }
}

pub struct MockAccounts {
    pub accounts: HashMap<Address, AccountMeta>,
}

impl MockAccounts {
    pub fn single(meta: AccountMeta) -> Self {
        Self {
            accounts: HashMap::from([(meta.address, meta)]),
        }
    }
}

impl AccountResolver for MockAccounts {
    fn resolve_account(&self, address: Address) -> Option<AccountMeta> {
        self.accounts.get(&address).cloned()
    }
}

pub enum SignerBehavior {
    Sign,
    Reject,
}

pub struct MockSigner {
    pub behavior: Mutex<SignerBehavior>,
    pub signed: Mutex<Vec<PreparedTransaction>>,
}

impl MockSigner {
    pub fn new() -> Self {
        Self {
            behavior: Mutex::new(SignerBehavior::Sign),
            signed: Mutex::new(vec![]),
        }
    }

    pub fn reject_next(&self) {
        *self.behavior.lock().unwrap() = SignerBehavior::Reject;
    }
}

impl SignerCapability for MockSigner {
    async fn sign_transaction(&self, prepared: &PreparedTransaction) -> Result<Bytes, EngineError> {
        match *self.behavior.lock().unwrap() {
            SignerBehavior::Sign => {
                self.signed.lock().unwrap().push(prepared.clone());
                Ok(Bytes::from(vec![0x02, prepared.nonce as u8]))
            }
            SignerBehavior::Reject => Err(EngineError::UserRejected {
                message: "user rejected signing".to_string(),
            }),
        }
    }
}

pub struct RecordingSink {
    pub events: Mutex<Vec<AnalyticsEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self {
            events: Mutex::new(vec![]),
        }
    }

    pub fn names(&self) -> Vec<String> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .map(|event| event.name.clone())
            .collect()
    }
}

impl AnalyticsSink for RecordingSink {
    fn emit(&self, event: &str, properties: serde_json::Value) {
        self.events.lock().unwrap().push(AnalyticsEvent {
            name: event.to_string(),
            properties,
        });
    }
}

pub struct RecordingHooks {
    pub rejected: AtomicU32,
}

impl RecordingHooks {
    pub fn new() -> Self {
        Self {
            rejected: AtomicU32::new(0),
        }
    }
}

impl BatchCapabilityHooks for RecordingHooks {
    fn on_batch_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::SeqCst);
    }
}

/// Everything a service-level test needs, wired against mocks on chain 1.
pub struct Harness {
    pub client: Arc<MockClient>,
    pub chain_service: Arc<MockChainService>,
    pub accounts: Arc<MockAccounts>,
    pub capability: Arc<MockSigner>,
    pub store: Arc<TransactionStore>,
    pub watcher: Arc<ConfirmationWatcher<MockChainService>>,
    pub analytics: Arc<RecordingSink>,
    pub service: txflow_executors::service::TransactionService<MockChainService, MockSigner>,
}

pub fn harness() -> Harness {
    harness_with_account(AccountMeta {
        address: owner(),
        smart_wallet_consent: false,
    })
}

pub fn harness_with_account(meta: AccountMeta) -> Harness {
    let client = Arc::new(MockClient::new());
    let chain_service = Arc::new(MockChainService::single(1, client.clone()));
    let accounts = Arc::new(MockAccounts::single(meta));
    let capability = Arc::new(MockSigner::new());
    let store = Arc::new(TransactionStore::new());
    let analytics = Arc::new(RecordingSink::new());
    let watcher = Arc::new(ConfirmationWatcher::new(
        chain_service.clone(),
        store.clone(),
        analytics.clone(),
        WatcherConfig {
            poll_interval: Duration::from_millis(10),
            batch_poll_interval: Duration::from_millis(10),
            stale_after: None,
        },
    ));
    let service = txflow_executors::service::TransactionService {
        chain_service: chain_service.clone(),
        accounts: accounts.clone(),
        signer: TransactionSignerService::new(capability.clone()),
        store: store.clone(),
        watcher: watcher.clone(),
        analytics: analytics.clone(),
        gas_bump: GasBumpConfig::default(),
    };

    Harness {
        client,
        chain_service,
        accounts,
        capability,
        store,
        watcher,
        analytics,
        service,
    }
}

/// A native-currency send of one ether to a fixed recipient on chain 1.
pub fn send_params() -> txflow_executors::service::SubmitTransactionParams {
    txflow_executors::service::SubmitTransactionParams {
        account: owner(),
        chain_id: 1,
        request: TransactionRequestData {
            to: Some(other_address()),
            value: U256::from(10u64).pow(U256::from(18u64)),
            ..Default::default()
        },
        type_info: TransactionTypeInfo::Send {
            recipient: other_address(),
            token_address: Address::ZERO,
            amount_raw: U256::from(10u64).pow(U256::from(18u64)),
        },
        options: Default::default(),
        transaction_id: None,
        interrupt: None,
    }
}

/// A plain pending record for store-level tests, bypassing submission.
pub fn pending_record(id: &str) -> TransactionRecord {
    TransactionRecord {
        id: id.to_string(),
        chain_id: 1,
        owner: owner(),
        status: txflow_core::transaction::TransactionStatus::Pending,
        type_info: TransactionTypeInfo::Unknown,
        request: TransactionRequestData {
            nonce: Some(0),
            gas_limit: Some(21_000),
            fee: Some(GasFeeParams::Legacy { gas_price: 1_000 }),
            ..Default::default()
        },
        options: Default::default(),
        hash: Some(B256::with_last_byte(1)),
        cancel_request: None,
        cancel_hash: None,
        batch_info: None,
        added_time: 1_000,
        confirmed_time: None,
        receipt: None,
    }
}
