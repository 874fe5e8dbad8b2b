use std::sync::Arc;

use alloy::primitives::{Address, Bytes, U256};
use txflow_core::{
    error::EngineError,
    gas::GasFeeParams,
    signer::{PreparedTransaction, SignerCapability},
    transaction::TransactionRequestData,
};
use txflow_delegation::bundle::CallBundle;

/// How a transaction reaches the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionPath {
    /// Sign the request as-is.
    Direct,
    /// Wrap the request in a call bundle executed through the owner's
    /// delegated code, signed as a self-transaction.
    Bundled,
}

/// Everything resolved about a transaction at signing time.
pub struct SigningContext<'a> {
    pub chain_id: u64,
    pub from: Address,
    pub nonce: u64,
    pub gas_limit: u64,
    pub fee: GasFeeParams,
    pub request: &'a TransactionRequestData,
}

/// Turns a resolved request into raw signed bytes, applying the chosen
/// execution path before handing off to the key holder.
pub struct TransactionSignerService<S: SignerCapability> {
    capability: Arc<S>,
}

impl<S: SignerCapability> TransactionSignerService<S> {
    pub fn new(capability: Arc<S>) -> Self {
        Self { capability }
    }

    pub async fn sign(
        &self,
        path: ExecutionPath,
        ctx: SigningContext<'_>,
    ) -> Result<Bytes, EngineError> {
        let prepared = match path {
            ExecutionPath::Direct => prepare_direct(&ctx),
            ExecutionPath::Bundled => prepare_bundled(&ctx),
        };
        self.capability.sign_transaction(&prepared).await
    }
}

fn prepare_direct(ctx: &SigningContext<'_>) -> PreparedTransaction {
    PreparedTransaction {
        chain_id: ctx.chain_id,
        from: ctx.from,
        nonce: ctx.nonce,
        gas_limit: ctx.gas_limit,
        fee: ctx.fee.clone(),
        to: ctx.request.to,
        value: ctx.request.value,
        data: ctx.request.data.clone(),
    }
}

fn prepare_bundled(ctx: &SigningContext<'_>) -> PreparedTransaction {
    let bundle = CallBundle::single(ctx.request);
    PreparedTransaction {
        chain_id: ctx.chain_id,
        from: ctx.from,
        nonce: ctx.nonce,
        gas_limit: ctx.gas_limit,
        fee: ctx.fee.clone(),
        // delegated code lives at the owner's address; value travels
        // inside the wrapped call, not on the outer transaction
        to: Some(ctx.from),
        value: U256::ZERO,
        data: bundle.self_execute_calldata(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct CapturingSigner {
        seen: Mutex<Vec<PreparedTransaction>>,
    }

    impl SignerCapability for CapturingSigner {
        async fn sign_transaction(
            &self,
            prepared: &PreparedTransaction,
        ) -> Result<Bytes, EngineError> {
            self.seen.lock().unwrap().push(prepared.clone());
            Ok(Bytes::from_static(&[0x02, 0xaa]))
        }
    }

    fn ctx<'a>(request: &'a TransactionRequestData, from: Address) -> SigningContext<'a> {
        SigningContext {
            chain_id: 1,
            from,
            nonce: 7,
            gas_limit: 50_000,
            fee: GasFeeParams::Legacy { gas_price: 10 },
            request,
        }
    }

    #[tokio::test]
    async fn direct_path_signs_request_verbatim() {
        let capability = Arc::new(CapturingSigner {
            seen: Mutex::new(vec![]),
        });
        let service = TransactionSignerService::new(capability.clone());
        let from = Address::repeat_byte(0x01);
        let request = TransactionRequestData {
            to: Some(Address::repeat_byte(0x02)),
            value: U256::from(100u64),
            ..Default::default()
        };

        service.sign(ExecutionPath::Direct, ctx(&request, from)).await.unwrap();

        let seen = capability.seen.lock().unwrap();
        assert_eq!(seen[0].to, Some(Address::repeat_byte(0x02)));
        assert_eq!(seen[0].value, U256::from(100u64));
        assert_eq!(seen[0].nonce, 7);
    }

    #[tokio::test]
    async fn bundled_path_rewrites_to_self_execution() {
        let capability = Arc::new(CapturingSigner {
            seen: Mutex::new(vec![]),
        });
        let service = TransactionSignerService::new(capability.clone());
        let from = Address::repeat_byte(0x01);
        let request = TransactionRequestData {
            to: Some(from),
            value: U256::from(100u64),
            ..Default::default()
        };

        service.sign(ExecutionPath::Bundled, ctx(&request, from)).await.unwrap();

        let seen = capability.seen.lock().unwrap();
        assert_eq!(seen[0].to, Some(from));
        assert_eq!(seen[0].value, U256::ZERO);
        assert!(!seen[0].data.is_empty());
    }
}
