//! Ledger Records, Quotes and Receipts

use super::common::*;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

// ============================================================
// Ledger Records
// ============================================================

/// Consumption record for one (asset, participant, cycle)
///
/// Hard constraints:
/// - `consumed_units` never decreases
/// - `disbursed_amount == consumed_units * per_unit_amount`
/// - Never deleted; dormant once the asset's lifetime ends
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsumptionRecord {
    /// Cumulative holding units used for claims
    pub consumed_units: u64,
    /// Cumulative reward asset disbursed
    pub disbursed_amount: Amount,
    /// Successful claims
    pub claim_count: u32,
    /// Last successful claim
    pub last_claimed_at: Option<DateTime<Utc>>,
}

/// Aggregate totals for one day (or one asset-day)
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayStat {
    /// Reward asset disbursed
    pub amount: Amount,
    /// Holding units consumed
    pub units: u64,
}

impl DayStat {
    /// Tuple form `(amount, units)`
    pub fn as_tuple(&self) -> (Amount, u64) {
        (self.amount, self.units)
    }

    /// Add one claim
    pub fn add(&self, amount: Amount, units: u64) -> Option<Self> {
        Some(Self {
            amount: self.amount.checked_add(amount)?,
            units: self.units.checked_add(units)?,
        })
    }
}

// ============================================================
// Distribution
// ============================================================

/// Pre-flight view of a claim
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claimable {
    pub active_units: u64,
    pub new_units: u64,
    pub amount: Amount,
}

impl Claimable {
    /// Nothing claimable
    pub fn none() -> Self {
        Self::default()
    }

    /// Tuple form `(active_units, new_units, amount)`
    pub fn as_tuple(&self) -> (u64, u64, Amount) {
        (self.active_units, self.new_units, self.amount)
    }
}

/// Successful claim
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimReceipt {
    pub asset: AssetId,
    pub participant: ParticipantId,
    pub cycle: Cycle,
    pub day_index: DayIndex,
    /// Units held at claim time
    pub active_units: u64,
    /// Units claimed by this call
    pub new_units: u64,
    /// Reward asset disbursed by this call
    pub amount: Amount,
    /// Consumed units after this call
    pub consumed_units: u64,
    pub claimed_at: DateTime<Utc>,
    pub receipt_digest: ReceiptDigest,
}

impl ClaimReceipt {
    pub(crate) fn compute_digest(&mut self) {
        self.receipt_digest = CanonicalWriter::new(b"rota:claim:v1")
            .str(self.asset.as_str())
            .str(self.participant.as_str())
            .u64(self.cycle as u64)
            .u64(self.day_index)
            .u64(self.new_units)
            .u128(self.amount)
            .u64(self.consumed_units)
            .i64(self.claimed_at.timestamp())
            .finish();
    }
}

// ============================================================
// Settlement
// ============================================================

/// Settlement direction
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettlementKind {
    /// Burn reward asset, receive settlement asset
    ForwardBurn,
    /// Reverse leg 1: reward asset -> settlement balance
    SwapToSettlement,
    /// Reverse leg 2: settlement balance -> reward asset
    SwapToReward,
}

impl SettlementKind {
    pub fn name(&self) -> &'static str {
        match self {
            SettlementKind::ForwardBurn => "forward_burn",
            SettlementKind::SwapToSettlement => "swap_to_settlement",
            SettlementKind::SwapToReward => "swap_to_reward",
        }
    }
}

/// Forward burn quote
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BurnQuote {
    pub asset: AssetId,
    pub cycle: Cycle,
    /// Units priced by this quote
    pub burn_units: u64,
    pub burn_amount: Amount,
    /// Settlement per reward asset, 18-decimal fixed point
    pub rate_fixed: u128,
    /// Human-readable rate, when representable
    pub rate: Option<Decimal>,
    pub expected_settlement: Amount,
    /// False when the quote falls back to already-burned units
    pub executable: bool,
}

/// Reverse leg quote
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapQuote {
    pub kind: SettlementKind,
    pub asset: AssetId,
    pub cycle: Cycle,
    pub amount_in: Amount,
    pub amount_out: Amount,
    pub reserve_in: Amount,
    pub reserve_out: Amount,
}

/// Executed settlement step
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementReceipt {
    pub kind: SettlementKind,
    pub asset: AssetId,
    pub participant: ParticipantId,
    pub cycle: Cycle,
    /// Units burned (forward only)
    pub units: u64,
    /// Asset leaving the participant (or the step-one balance for leg 2)
    pub amount_in: Amount,
    /// Asset credited to the participant (or to the step-one balance for leg 1)
    pub amount_out: Amount,
    /// Step-one balance after this step
    pub step_one_balance: Amount,
    pub settled_at: DateTime<Utc>,
    pub receipt_digest: ReceiptDigest,
}

impl SettlementReceipt {
    pub(crate) fn compute_digest(&mut self) {
        self.receipt_digest = CanonicalWriter::new(b"rota:settlement:v1")
            .str(self.kind.name())
            .str(self.asset.as_str())
            .str(self.participant.as_str())
            .u64(self.cycle as u64)
            .u64(self.units)
            .u128(self.amount_in)
            .u128(self.amount_out)
            .u128(self.step_one_balance)
            .i64(self.settled_at.timestamp())
            .finish();
    }
}
