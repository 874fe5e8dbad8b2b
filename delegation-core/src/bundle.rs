use alloy::{
    primitives::{Address, Bytes, FixedBytes, U256},
    sol,
    sol_types::SolCall,
};
use txflow_core::transaction::TransactionRequestData;

use crate::delegated_account::generate_random_uid;

sol!(
    #[derive(serde::Serialize, serde::Deserialize)]
    struct Call {
        address target;
        uint256 value;
        bytes data;
    }

    #[derive(serde::Serialize, serde::Deserialize)]
    struct WrappedCalls {
        Call[] calls;
        bytes32 uid;
    }

    function execute(Call[] calldata calls) external payable;
);

/// A set of calls wrapped for execution through a delegated account.
///
/// The bundle is executed by sending a transaction from the owner to
/// itself, with calldata invoking `execute` on the delegated code.
pub struct CallBundle {
    wrapped: WrappedCalls,
}

impl CallBundle {
    pub fn new(requests: &[TransactionRequestData]) -> Self {
        let calls = requests
            .iter()
            .map(|request| Call {
                target: request.to.unwrap_or(Address::ZERO),
                value: request.value,
                data: request.data.clone(),
            })
            .collect();

        Self {
            wrapped: WrappedCalls {
                calls,
                uid: generate_random_uid(),
            },
        }
    }

    pub fn single(request: &TransactionRequestData) -> Self {
        Self::new(std::slice::from_ref(request))
    }

    pub fn uid(&self) -> FixedBytes<32> {
        self.wrapped.uid
    }

    pub fn call_count(&self) -> usize {
        self.wrapped.calls.len()
    }

    /// Native value the outer transaction must carry to fund every call.
    pub fn total_value(&self) -> U256 {
        self.wrapped
            .calls
            .iter()
            .fold(U256::ZERO, |acc, call| acc.saturating_add(call.value))
    }

    /// Calldata for the owner calling `execute` on its own delegated code.
    pub fn self_execute_calldata(&self) -> Bytes {
        let execute_call = executeCall {
            calls: self.wrapped.calls.clone(),
        };

        Bytes::from(execute_call.abi_encode())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn calldata_carries_execute_selector() {
        let bundle = CallBundle::single(&TransactionRequestData {
            to: Some(Address::repeat_byte(0x11)),
            value: U256::from(5u64),
            data: Bytes::from(vec![0xde, 0xad]),
            ..Default::default()
        });

        let calldata = bundle.self_execute_calldata();
        assert_eq!(&calldata[..4], executeCall::SELECTOR.as_slice());
        assert_eq!(bundle.call_count(), 1);
        assert_eq!(bundle.total_value(), U256::from(5u64));
    }

    #[test]
    fn uids_are_unique_per_bundle() {
        let request = TransactionRequestData::default();
        let a = CallBundle::single(&request);
        let b = CallBundle::single(&request);
        assert_ne!(a.uid(), b.uid());
    }
}
