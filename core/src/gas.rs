use alloy::primitives::{Address, U256};
use serde::{Deserialize, Serialize};

use crate::{
    chain::{Chain, ExecutionClient},
    constants::GAS_LIMIT_BUFFER_PERCENT,
    error::EngineError,
    transaction::TransactionRequestData,
};

/// Fee parameters for a transaction. EIP-1559 and legacy pricing are
/// mutually exclusive; a request carries one or the other, never both.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum GasFeeParams {
    Eip1559 {
        max_fee_per_gas: u128,
        max_priority_fee_per_gas: u128,
    },
    Legacy {
        gas_price: u128,
    },
}

impl GasFeeParams {
    /// The per-gas price an account could pay at most under these params.
    pub fn fee_per_gas(&self) -> u128 {
        match self {
            GasFeeParams::Eip1559 {
                max_fee_per_gas, ..
            } => *max_fee_per_gas,
            GasFeeParams::Legacy { gas_price } => *gas_price,
        }
    }
}

/// Resolved gas limit and fee params for a transaction about to be signed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GasFeeEstimate {
    pub gas_limit: u64,
    pub params: GasFeeParams,
}

impl GasFeeEstimate {
    /// Worst-case fee in wei for this estimate.
    pub fn max_total_cost(&self) -> U256 {
        U256::from(self.gas_limit) * U256::from(self.params.fee_per_gas())
    }
}

/// Multiplier applied when repricing a stuck transaction, expressed as a
/// ratio to keep the arithmetic in integers. Defaults to 9/8 (+12.5%).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GasBumpConfig {
    pub numerator: u128,
    pub denominator: u128,
}

impl Default for GasBumpConfig {
    fn default() -> Self {
        Self {
            numerator: 9,
            denominator: 8,
        }
    }
}

/// Fee params from the network, preferring EIP-1559 and falling back to
/// legacy gas price when the chain does not support fee history.
pub async fn current_fee_params<C: Chain>(chain: &C) -> Result<GasFeeParams, EngineError> {
    match chain.client().estimate_eip1559_fees().await {
        Ok(fees) => Ok(GasFeeParams::Eip1559 {
            max_fee_per_gas: fees.max_fee_per_gas,
            max_priority_fee_per_gas: fees.max_priority_fee_per_gas,
        }),
        Err(error) if error.is_unsupported_feature() => {
            tracing::debug!(
                chain_id = chain.chain_id(),
                "EIP-1559 fee estimation unsupported, falling back to legacy gas price"
            );
            let gas_price = chain.client().gas_price().await?;
            Ok(GasFeeParams::Legacy { gas_price })
        }
        Err(error) => Err(error),
    }
}

/// Resolve fee params and gas limit for a draft request.
///
/// Caller-supplied values win; anything missing is filled from the network.
/// Estimated gas limits get a buffer on top to absorb state drift between
/// estimation and inclusion.
pub async fn estimate_gas_fees<C: Chain>(
    chain: &C,
    from: Address,
    draft: &TransactionRequestData,
) -> Result<GasFeeEstimate, EngineError> {
    let params = match &draft.fee {
        Some(fee) => fee.clone(),
        None => current_fee_params(chain).await?,
    };

    let gas_limit = match draft.gas_limit {
        Some(limit) => limit,
        None => {
            let estimated = chain.client().estimate_gas(from, draft).await?;
            buffered_gas_limit(estimated)
        }
    };

    Ok(GasFeeEstimate { gas_limit, params })
}

/// Reprice a transaction that must outbid its predecessor at the same nonce.
///
/// Each component becomes `previous * numerator / denominator + 1` wei, then
/// is clamped up to the current network estimate so a bump never prices
/// below what the network would charge anyway.
pub fn bump_fee(
    previous: &GasFeeParams,
    config: &GasBumpConfig,
    network: Option<&GasFeeParams>,
) -> GasFeeParams {
    match previous {
        GasFeeParams::Legacy { gas_price } => {
            let floor = match network {
                Some(GasFeeParams::Legacy { gas_price }) => *gas_price,
                Some(GasFeeParams::Eip1559 {
                    max_fee_per_gas, ..
                }) => *max_fee_per_gas,
                None => 0,
            };
            GasFeeParams::Legacy {
                gas_price: bump_component(*gas_price, config, floor),
            }
        }
        GasFeeParams::Eip1559 {
            max_fee_per_gas,
            max_priority_fee_per_gas,
        } => {
            let (fee_floor, tip_floor) = match network {
                Some(GasFeeParams::Eip1559 {
                    max_fee_per_gas,
                    max_priority_fee_per_gas,
                }) => (*max_fee_per_gas, *max_priority_fee_per_gas),
                Some(GasFeeParams::Legacy { gas_price }) => (*gas_price, 0),
                None => (0, 0),
            };
            GasFeeParams::Eip1559 {
                max_fee_per_gas: bump_component(*max_fee_per_gas, config, fee_floor),
                max_priority_fee_per_gas: bump_component(
                    *max_priority_fee_per_gas,
                    config,
                    tip_floor,
                ),
            }
        }
    }
}

/// An RPC-sourced estimate is untrusted input; saturate rather than overflow.
fn buffered_gas_limit(estimated: u64) -> u64 {
    estimated.saturating_add(estimated.saturating_mul(GAS_LIMIT_BUFFER_PERCENT) / 100)
}

fn bump_component(previous: u128, config: &GasBumpConfig, network_floor: u128) -> u128 {
    let bumped = previous.saturating_mul(config.numerator) / config.denominator.max(1);
    bumped.saturating_add(1).max(network_floor)
}
