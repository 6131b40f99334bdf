//! Fixed-Point and Constant-Product Math
//!
//! All intermediates that can exceed `u128` are computed in `U256` and
//! narrowed with an explicit overflow check.

use crate::error::{RotaError, RotaResult};
use crate::types::Amount;
use primitive_types::U256;
use rust_decimal::Decimal;

/// 18-decimal fixed-point scale
pub const RATE_SCALE: u128 = 1_000_000_000_000_000_000;

/// Decimal places of `RATE_SCALE`
pub const RATE_DECIMALS: u32 = 18;

/// Per-mille denominator for pool fees
pub const FEE_DENOMINATOR: u128 = 1_000;

fn narrow(value: U256, context: &str) -> RotaResult<u128> {
    if value > U256::from(u128::MAX) {
        return Err(RotaError::overflow(context));
    }
    Ok(value.as_u128())
}

/// `a * b / denominator`, floored, with a 256-bit intermediate
pub fn mul_div(a: u128, b: u128, denominator: u128, context: &str) -> RotaResult<u128> {
    if denominator == 0 {
        return Err(RotaError::InvalidAmount {
            reason: format!("zero denominator in {}", context),
        });
    }
    let product = U256::from(a)
        .checked_mul(U256::from(b))
        .ok_or_else(|| RotaError::overflow(context))?;
    narrow(product / U256::from(denominator), context)
}

/// Checked `a * b` in `u128`
pub fn checked_mul(a: u128, b: u128, context: &str) -> RotaResult<u128> {
    a.checked_mul(b).ok_or_else(|| RotaError::overflow(context))
}

/// Constant-product output, fee taken from the input:
///
/// ```text
/// in_net = amount_in * (1000 - fee)
/// out    = in_net * reserve_out / (reserve_in * 1000 + in_net)
/// ```
pub fn constant_product_out(
    amount_in: Amount,
    reserve_in: Amount,
    reserve_out: Amount,
    fee_per_mille: u32,
) -> RotaResult<Amount> {
    let fee = u128::from(fee_per_mille);
    if fee >= FEE_DENOMINATOR {
        return Err(RotaError::Configuration(format!(
            "fee {} per-mille leaves nothing to swap",
            fee
        )));
    }

    let in_net = U256::from(amount_in)
        .checked_mul(U256::from(FEE_DENOMINATOR - fee))
        .ok_or_else(|| RotaError::overflow("swap input"))?;
    let numerator = in_net
        .checked_mul(U256::from(reserve_out))
        .ok_or_else(|| RotaError::overflow("swap numerator"))?;
    let denominator = U256::from(reserve_in)
        .checked_mul(U256::from(FEE_DENOMINATOR))
        .and_then(|scaled| scaled.checked_add(in_net))
        .ok_or_else(|| RotaError::overflow("swap denominator"))?;

    if denominator.is_zero() {
        return Ok(0);
    }
    narrow(numerator / denominator, "swap output")
}

/// Reserve pair oriented as (reward, settlement)
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ExchangeRate {
    pub reward_reserve: Amount,
    pub settlement_reserve: Amount,
}

impl ExchangeRate {
    pub fn new(reward_reserve: Amount, settlement_reserve: Amount) -> Self {
        Self {
            reward_reserve,
            settlement_reserve,
        }
    }

    /// Settlement per reward, 18-decimal fixed point
    pub fn settlement_per_reward_fixed(&self) -> RotaResult<u128> {
        mul_div(
            self.settlement_reserve,
            RATE_SCALE,
            self.reward_reserve,
            "settlement_per_reward",
        )
    }

    /// Fixed-point rate as a `Decimal`, when it fits
    pub fn as_decimal(fixed: u128) -> Option<Decimal> {
        let signed = i128::try_from(fixed).ok()?;
        Decimal::try_from_i128_with_scale(signed, RATE_DECIMALS).ok()
    }
}
