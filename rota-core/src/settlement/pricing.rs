//! Settlement Pricing
//!
//! Live rate resolution and the pure amount formulas.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::SettlementEngine;
use crate::error::{RotaError, RotaResult};
use crate::math::{checked_mul, constant_product_out, mul_div, ExchangeRate};
use crate::oracle::resolve_rate;
use crate::types::{Amount, AssetId, SettlementKind};

/// Current rate between a reward asset and the settlement asset
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RateView {
    pub asset: AssetId,
    pub settlement_asset: AssetId,
    pub reward_reserve: Amount,
    pub settlement_reserve: Amount,
    /// Settlement per reward, 18-decimal fixed point
    pub rate_fixed: u128,
    pub rate: Option<Decimal>,
}

/// `burn_amount * multiplier * settlement_reserve / reward_reserve`, one floor
pub fn forward_settlement(burn_amount: Amount, rate: &ExchangeRate, multiplier: u32) -> RotaResult<Amount> {
    let boosted = checked_mul(burn_amount, u128::from(multiplier), "forward multiplier")?;
    mul_div(boosted, rate.settlement_reserve, rate.reward_reserve, "forward settlement")
}

/// Reject a zero pricing result
pub(crate) fn require_output(kind: SettlementKind, amount_in: Amount, amount_out: Amount) -> RotaResult<Amount> {
    if amount_out == 0 {
        return Err(RotaError::ZeroOutput {
            operation: kind.name().to_string(),
            amount_in,
        });
    }
    Ok(amount_out)
}

impl SettlementEngine {
    /// Reserves oriented as (reward, settlement)
    pub(crate) fn exchange_rate(&self, asset: &AssetId) -> RotaResult<ExchangeRate> {
        resolve_rate(self.rates.as_ref(), asset, &self.config.settlement_asset)
    }

    /// Rate-availability check for `asset`
    pub fn rate(&self, asset: &AssetId) -> RotaResult<RateView> {
        let rate = self.exchange_rate(asset)?;
        let rate_fixed = rate.settlement_per_reward_fixed()?;
        Ok(RateView {
            asset: asset.clone(),
            settlement_asset: self.config.settlement_asset.clone(),
            reward_reserve: rate.reward_reserve,
            settlement_reserve: rate.settlement_reserve,
            rate_fixed,
            rate: ExchangeRate::as_decimal(rate_fixed),
        })
    }

    /// Reward asset in, settlement asset out
    pub(crate) fn reward_to_settlement(&self, rate: &ExchangeRate, amount_in: Amount) -> RotaResult<Amount> {
        let out = constant_product_out(
            amount_in,
            rate.reward_reserve,
            rate.settlement_reserve,
            self.config.swap_fee_per_mille,
        )?;
        require_output(SettlementKind::SwapToSettlement, amount_in, out)
    }

    /// Settlement asset in, reward asset out
    pub(crate) fn settlement_to_reward(&self, rate: &ExchangeRate, amount_in: Amount) -> RotaResult<Amount> {
        let out = constant_product_out(
            amount_in,
            rate.settlement_reserve,
            rate.reward_reserve,
            self.config.swap_fee_per_mille,
        )?;
        require_output(SettlementKind::SwapToReward, amount_in, out)
    }
}
