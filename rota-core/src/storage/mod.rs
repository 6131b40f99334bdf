//! Ledger Store
//!
//! The only state the engines own: the consumption ledger, the settlement
//! records that hang off it, and the day-indexed statistics.
//!
//! The store is a plain keyed upsert interface. Monotonicity and
//! compensation are the engines' job; a store never merges values.

pub mod memory;

pub use memory::MemoryLedgerStore;

use crate::error::RotaResult;
use crate::types::{Amount, AssetId, ConsumptionKey, ConsumptionRecord, DayIndex, DayStat};
use serde::{Deserialize, Serialize};

/// Ledger store interface
pub trait LedgerStore: Send + Sync {
    // ==================== Consumption ====================

    /// Consumption record, `None` if never written
    fn consumption(&self, key: &ConsumptionKey) -> RotaResult<Option<ConsumptionRecord>>;

    fn put_consumption(&mut self, key: &ConsumptionKey, record: ConsumptionRecord) -> RotaResult<()>;

    // ==================== Day Statistics ====================

    fn day_stat(&self, day: DayIndex) -> RotaResult<DayStat>;

    fn put_day_stat(&mut self, day: DayIndex, stat: DayStat) -> RotaResult<()>;

    fn token_day_stat(&self, asset: &AssetId, day: DayIndex) -> RotaResult<DayStat>;

    fn put_token_day_stat(&mut self, asset: &AssetId, day: DayIndex, stat: DayStat) -> RotaResult<()>;

    // ==================== Settlement ====================

    /// Units already burned in forward settlement
    fn burned_units(&self, key: &ConsumptionKey) -> RotaResult<u64>;

    fn put_burned_units(&mut self, key: &ConsumptionKey, units: u64) -> RotaResult<()>;

    /// Settlement asset held for reverse step 2
    fn step_one_balance(&self, key: &ConsumptionKey) -> RotaResult<Amount>;

    fn put_step_one_balance(&mut self, key: &ConsumptionKey, amount: Amount) -> RotaResult<()>;

    // ==================== Stats ====================

    fn stats(&self) -> RotaResult<StoreStats>;
}

/// Store statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStats {
    pub consumption_records: usize,
    pub total_consumed_units: u64,
    pub total_disbursed: Amount,
    pub days_tracked: usize,
    pub burn_records: usize,
    pub open_step_one_balances: usize,
}
