use alloy::primitives::Address;
use txflow_core::{chain::Chain, error::EngineError, signer::AccountMeta};

use crate::delegated_account::DelegatedAccount;

/// Outcome of the bundling decision for a single transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DelegationCheck {
    /// Execute through the delegated smart wallet instead of signing the
    /// request as-is.
    pub use_bundled_execution: bool,
    /// The contract the owner delegates to, when delegation is live.
    pub delegated_to: Option<Address>,
}

impl DelegationCheck {
    fn direct() -> Self {
        Self {
            use_bundled_execution: false,
            delegated_to: None,
        }
    }
}

/// Decide whether a transaction should run through the smart wallet path.
///
/// Only self-transactions are candidates: the delegated code lives at the
/// owner's own address, so calls to any other target always go direct.
/// The user must also have opted in, and the delegation must actually be
/// live on chain.
pub async fn check_delegation<C: Chain>(
    account: &AccountMeta,
    chain: &C,
    to: Option<Address>,
) -> Result<DelegationCheck, EngineError> {
    if to != Some(account.address) {
        return Ok(DelegationCheck::direct());
    }
    if !account.smart_wallet_consent {
        tracing::debug!(
            address = ?account.address,
            "self-transaction without smart wallet consent, using direct execution"
        );
        return Ok(DelegationCheck::direct());
    }

    let delegated = DelegatedAccount::new(account.address, chain.clone());
    let target = delegated.delegation_target().await?;

    Ok(DelegationCheck {
        use_bundled_execution: target.is_some(),
        delegated_to: target,
    })
}
