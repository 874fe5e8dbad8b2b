use std::collections::HashMap;
use std::future::Future;

use alloy::{
    consensus::{SignableTransaction, TxEip1559, TxEnvelope, TxLegacy},
    eips::eip2718::Encodable2718,
    network::TxSigner,
    primitives::{Address, Bytes, U256},
    signers::local::PrivateKeySigner,
};

use crate::{error::EngineError, gas::GasFeeParams};

/// An account known to the wallet, with the consent flags that gate
/// delegated execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountMeta {
    pub address: Address,
    /// User opted in to smart wallet (EIP-7702) execution.
    pub smart_wallet_consent: bool,
}

/// Lookup of unlocked accounts. Returns `None` for addresses the wallet
/// does not hold keys for.
pub trait AccountResolver: Send + Sync {
    fn resolve_account(&self, address: Address) -> Option<AccountMeta>;
}

/// A fully resolved transaction, ready to sign. Every field the chain
/// requires is present; nothing is estimated past this point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedTransaction {
    pub chain_id: u64,
    pub from: Address,
    pub nonce: u64,
    pub gas_limit: u64,
    pub fee: GasFeeParams,
    pub to: Option<Address>,
    pub value: U256,
    pub data: Bytes,
}

/// Produces a raw signed transaction for an account this signer controls.
pub trait SignerCapability: Send + Sync {
    fn sign_transaction(
        &self,
        prepared: &PreparedTransaction,
    ) -> impl Future<Output = Result<Bytes, EngineError>> + Send;
}

/// In-process signer over locally held private keys.
pub struct LocalAccountSigner {
    signers: HashMap<Address, PrivateKeySigner>,
}

impl LocalAccountSigner {
    pub fn new(signers: impl IntoIterator<Item = PrivateKeySigner>) -> Self {
        Self {
            signers: signers
                .into_iter()
                .map(|signer| (signer.address(), signer))
                .collect(),
        }
    }

    pub fn addresses(&self) -> impl Iterator<Item = &Address> {
        self.signers.keys()
    }
}

impl SignerCapability for LocalAccountSigner {
    async fn sign_transaction(&self, prepared: &PreparedTransaction) -> Result<Bytes, EngineError> {
        let signer = self
            .signers
            .get(&prepared.from)
            .ok_or(EngineError::AccountNotFound {
                address: prepared.from,
            })?;

        let envelope: TxEnvelope = match prepared.fee {
            GasFeeParams::Eip1559 {
                max_fee_per_gas,
                max_priority_fee_per_gas,
            } => {
                let mut tx = TxEip1559 {
                    chain_id: prepared.chain_id,
                    nonce: prepared.nonce,
                    gas_limit: prepared.gas_limit,
                    max_fee_per_gas,
                    max_priority_fee_per_gas,
                    to: prepared.to.into(),
                    value: prepared.value,
                    input: prepared.data.clone(),
                    ..Default::default()
                };
                let signature = signer.sign_transaction(&mut tx).await.map_err(|error| {
                    EngineError::InternalError {
                        message: format!("signing failed: {error}"),
                    }
                })?;
                tx.into_signed(signature).into()
            }
            GasFeeParams::Legacy { gas_price } => {
                let mut tx = TxLegacy {
                    chain_id: Some(prepared.chain_id),
                    nonce: prepared.nonce,
                    gas_price,
                    gas_limit: prepared.gas_limit,
                    to: prepared.to.into(),
                    value: prepared.value,
                    input: prepared.data.clone(),
                };
                let signature = signer.sign_transaction(&mut tx).await.map_err(|error| {
                    EngineError::InternalError {
                        message: format!("signing failed: {error}"),
                    }
                })?;
                tx.into_signed(signature).into()
            }
        };

        Ok(Bytes::from(envelope.encoded_2718()))
    }
}
