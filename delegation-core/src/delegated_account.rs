use alloy::primitives::{Address, Bytes, FixedBytes};
use rand::Rng;
use txflow_core::{
    chain::{Chain, ExecutionClient},
    error::EngineError,
};

use crate::constants::{EIP_7702_DELEGATION_CODE_LENGTH, EIP_7702_DELEGATION_PREFIX};

/// Extract the delegation target from EOA bytecode, if the code is an
/// EIP-7702 delegation designator (`0xef0100` followed by 20 address bytes).
pub fn parse_delegation_target(code: &Bytes) -> Option<Address> {
    if code.len() < EIP_7702_DELEGATION_CODE_LENGTH
        || !code.starts_with(&EIP_7702_DELEGATION_PREFIX)
    {
        return None;
    }
    Some(Address::from_slice(&code[3..23]))
}

/// An EOA address that may carry EIP-7702 delegation, bound to a chain.
#[derive(Clone, Debug)]
pub struct DelegatedAccount<C: Chain> {
    pub address: Address,
    pub chain: C,
}

impl<C: Chain> DelegatedAccount<C> {
    pub fn new(address: Address, chain: C) -> Self {
        Self { address, chain }
    }

    /// The contract this EOA currently delegates to, if any.
    pub async fn delegation_target(&self) -> Result<Option<Address>, EngineError> {
        let code = self.chain.client().code_at(self.address).await?;

        let target = parse_delegation_target(&code);
        tracing::debug!(
            address = ?self.address,
            code_length = code.len(),
            delegation_target = ?target,
            "checked EIP-7702 delegation"
        );
        Ok(target)
    }

    /// Whether the EOA delegates to the given contract, or to anything
    /// when no contract is specified.
    pub async fn is_delegated(
        &self,
        delegation_contract: Option<Address>,
    ) -> Result<bool, EngineError> {
        let target = self.delegation_target().await?;
        Ok(match (target, delegation_contract) {
            (Some(target), Some(expected)) => target == expected,
            (Some(_), None) => true,
            (None, _) => false,
        })
    }

}

/// Generate a random UID for wrapped calls
pub fn generate_random_uid() -> FixedBytes<32> {
    let mut rng = rand::rng();
    FixedBytes::from(rng.random::<[u8; 32]>())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_delegation_designator() {
        let target = Address::repeat_byte(0x42);
        let mut code = EIP_7702_DELEGATION_PREFIX.to_vec();
        code.extend_from_slice(target.as_slice());
        assert_eq!(
            parse_delegation_target(&Bytes::from(code)),
            Some(target)
        );
    }

    #[test]
    fn rejects_short_or_plain_code() {
        assert_eq!(parse_delegation_target(&Bytes::new()), None);
        assert_eq!(
            parse_delegation_target(&Bytes::from(vec![0xef, 0x01, 0x00])),
            None
        );
        // ordinary contract bytecode of sufficient length
        assert_eq!(
            parse_delegation_target(&Bytes::from(vec![0x60u8; 32])),
            None
        );
    }
}
