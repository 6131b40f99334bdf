//! External Collaborators
//!
//! Narrow capability interfaces the engines depend on. Implementations live
//! outside this crate; `crate::testing` provides in-memory doubles.
//!
//! # Contracts
//!
//! - `HoldingLedger::active_units` is mint-only between claims: it never
//!   decreases within a cycle except through expiry.
//! - `ScheduleOracle::register_participant` is idempotent and reports
//!   whether the call created the registration.
//! - `AssetLedger::settle` applies every leg or none.

use crate::error::{RateUnavailable, RotaError, RotaResult};
use crate::math::ExchangeRate;
use crate::types::{Amount, AssetId, Cycle, ParticipantId};
use serde::{Deserialize, Serialize};

// ============================================================
// ScheduleOracle
// ============================================================

/// Today's reward asset as reported by the schedule
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TodayAsset {
    pub asset: Option<AssetId>,
    pub is_active: bool,
}

impl TodayAsset {
    pub fn active(asset: AssetId) -> Self {
        Self {
            asset: Some(asset),
            is_active: true,
        }
    }

    pub fn none() -> Self {
        Self::default()
    }

    /// The asset, when one is active
    pub fn active_asset(&self) -> Option<&AssetId> {
        if self.is_active {
            self.asset.as_ref()
        } else {
            None
        }
    }
}

/// Rotating schedule of reward assets
pub trait ScheduleOracle: Send + Sync {
    /// System-wide pause flag
    fn is_paused(&self) -> bool;

    /// Reward asset scheduled for today
    fn today_asset(&self) -> TodayAsset;

    fn is_asset_supported(&self, asset: &AssetId) -> bool;

    /// Whether the reward window for `asset` is open
    fn is_window_open(&self, asset: &AssetId) -> bool;

    /// Whether today's appearance of `asset` is a reverse cycle
    fn is_reverse_phase(&self, asset: &AssetId) -> bool;

    /// Ordinal cycle of `asset` (1-based)
    fn current_cycle(&self, asset: &AssetId) -> Cycle;

    /// Register a participant; idempotent, enforces the global cap.
    /// Returns `true` when this call created the registration.
    fn register_participant(&self, participant: &ParticipantId) -> RotaResult<bool>;

    /// Release a registration created by a call that did not complete
    fn unregister_participant(&self, participant: &ParticipantId);
}

// ============================================================
// HoldingLedger
// ============================================================

/// Participation credential balances
pub trait HoldingLedger: Send + Sync {
    /// Whole, unexpired holding units
    fn active_units(&self, participant: &ParticipantId) -> u64;
}

// ============================================================
// RateOracle
// ============================================================

/// Pool reserves as reported by the pool
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReserveSnapshot {
    pub token0: AssetId,
    pub token1: AssetId,
    pub reserve0: Amount,
    pub reserve1: Amount,
}

/// Pooled liquidity reserves
pub trait RateOracle: Send + Sync {
    /// Reserves of the pool for `(a, b)`, in either order; `None` if no pool
    fn reserves(&self, a: &AssetId, b: &AssetId) -> Option<ReserveSnapshot>;
}

/// Resolve and orient the reward/settlement pair.
///
/// Distinguishes a missing pool, an empty side and a pool reporting a
/// different pair.
pub fn resolve_rate(
    rates: &dyn RateOracle,
    reward: &AssetId,
    settlement: &AssetId,
) -> RotaResult<ExchangeRate> {
    let unavailable = |reason| RotaError::RateUnavailable {
        asset: reward.clone(),
        reason,
    };

    let snapshot = rates
        .reserves(reward, settlement)
        .ok_or_else(|| unavailable(RateUnavailable::NoPool))?;

    let rate = if &snapshot.token0 == reward && &snapshot.token1 == settlement {
        ExchangeRate::new(snapshot.reserve0, snapshot.reserve1)
    } else if &snapshot.token0 == settlement && &snapshot.token1 == reward {
        ExchangeRate::new(snapshot.reserve1, snapshot.reserve0)
    } else {
        return Err(unavailable(RateUnavailable::ReserveMismatch));
    };

    if rate.reward_reserve == 0 || rate.settlement_reserve == 0 {
        return Err(unavailable(RateUnavailable::NoLiquidity));
    }
    Ok(rate)
}

// ============================================================
// AssetLedger
// ============================================================

/// One movement against the engine's asset accounts
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransferLeg {
    /// Engine inventory -> participant
    Disburse {
        asset: AssetId,
        to: ParticipantId,
        amount: Amount,
    },
    /// Participant -> engine inventory
    Collect {
        asset: AssetId,
        from: ParticipantId,
        amount: Amount,
    },
    /// Participant balance destroyed
    Burn {
        asset: AssetId,
        from: ParticipantId,
        amount: Amount,
    },
}

impl TransferLeg {
    pub fn asset(&self) -> &AssetId {
        match self {
            TransferLeg::Disburse { asset, .. }
            | TransferLeg::Collect { asset, .. }
            | TransferLeg::Burn { asset, .. } => asset,
        }
    }

    pub fn amount(&self) -> Amount {
        match self {
            TransferLeg::Disburse { amount, .. }
            | TransferLeg::Collect { amount, .. }
            | TransferLeg::Burn { amount, .. } => *amount,
        }
    }
}

/// Asset accounts the engine moves funds through
pub trait AssetLedger: Send + Sync {
    /// Participant balance of `asset`
    fn balance_of(&self, asset: &AssetId, holder: &ParticipantId) -> Amount;

    /// Engine-held inventory of `asset`
    fn inventory(&self, asset: &AssetId) -> Amount;

    /// Amount of `asset` the engine is authorized to move
    fn allowance(&self, asset: &AssetId) -> Amount;

    /// Apply all legs atomically
    fn settle(&self, legs: &[TransferLeg]) -> RotaResult<()>;
}

/// Fresh inventory and allowance check for an outgoing amount
pub fn ensure_outflow(assets: &dyn AssetLedger, asset: &AssetId, required: Amount) -> RotaResult<()> {
    let available = assets.inventory(asset);
    if available < required {
        return Err(RotaError::InsufficientInventory {
            asset: asset.clone(),
            required,
            available,
        });
    }
    let available = assets.allowance(asset);
    if available < required {
        return Err(RotaError::InsufficientAllowance {
            asset: asset.clone(),
            required,
            available,
        });
    }
    Ok(())
}

/// Participant balance check for an incoming amount
pub fn ensure_balance(
    assets: &dyn AssetLedger,
    asset: &AssetId,
    participant: &ParticipantId,
    required: Amount,
) -> RotaResult<()> {
    let available = assets.balance_of(asset, participant);
    if available < required {
        return Err(RotaError::InsufficientBalance {
            asset: asset.clone(),
            participant: participant.clone(),
            required,
            available,
        });
    }
    Ok(())
}
