//! In-Memory Ledger Store
//!
//! HashMap-backed store for tests, development and single-process embedding.

use std::collections::HashMap;

use super::{LedgerStore, StoreStats};
use crate::error::RotaResult;
use crate::types::{Amount, AssetId, ConsumptionKey, ConsumptionRecord, DayIndex, DayStat};

/// In-memory ledger store
#[derive(Debug, Clone, Default)]
pub struct MemoryLedgerStore {
    consumption: HashMap<ConsumptionKey, ConsumptionRecord>,
    day_stats: HashMap<DayIndex, DayStat>,
    token_day_stats: HashMap<(AssetId, DayIndex), DayStat>,
    burned: HashMap<ConsumptionKey, u64>,
    step_one: HashMap<ConsumptionKey, Amount>,
}

impl MemoryLedgerStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear all data
    pub fn clear(&mut self) {
        self.consumption.clear();
        self.day_stats.clear();
        self.token_day_stats.clear();
        self.burned.clear();
        self.step_one.clear();
    }
}

impl LedgerStore for MemoryLedgerStore {
    fn consumption(&self, key: &ConsumptionKey) -> RotaResult<Option<ConsumptionRecord>> {
        Ok(self.consumption.get(key).cloned())
    }

    fn put_consumption(&mut self, key: &ConsumptionKey, record: ConsumptionRecord) -> RotaResult<()> {
        self.consumption.insert(key.clone(), record);
        Ok(())
    }

    fn day_stat(&self, day: DayIndex) -> RotaResult<DayStat> {
        Ok(self.day_stats.get(&day).copied().unwrap_or_default())
    }

    fn put_day_stat(&mut self, day: DayIndex, stat: DayStat) -> RotaResult<()> {
        self.day_stats.insert(day, stat);
        Ok(())
    }

    fn token_day_stat(&self, asset: &AssetId, day: DayIndex) -> RotaResult<DayStat> {
        Ok(self
            .token_day_stats
            .get(&(asset.clone(), day))
            .copied()
            .unwrap_or_default())
    }

    fn put_token_day_stat(&mut self, asset: &AssetId, day: DayIndex, stat: DayStat) -> RotaResult<()> {
        self.token_day_stats.insert((asset.clone(), day), stat);
        Ok(())
    }

    fn burned_units(&self, key: &ConsumptionKey) -> RotaResult<u64> {
        Ok(self.burned.get(key).copied().unwrap_or(0))
    }

    fn put_burned_units(&mut self, key: &ConsumptionKey, units: u64) -> RotaResult<()> {
        self.burned.insert(key.clone(), units);
        Ok(())
    }

    fn step_one_balance(&self, key: &ConsumptionKey) -> RotaResult<Amount> {
        Ok(self.step_one.get(key).copied().unwrap_or(0))
    }

    fn put_step_one_balance(&mut self, key: &ConsumptionKey, amount: Amount) -> RotaResult<()> {
        if amount == 0 {
            self.step_one.remove(key);
        } else {
            self.step_one.insert(key.clone(), amount);
        }
        Ok(())
    }

    fn stats(&self) -> RotaResult<StoreStats> {
        let mut stats = StoreStats {
            consumption_records: self.consumption.len(),
            days_tracked: self.day_stats.len(),
            burn_records: self.burned.len(),
            open_step_one_balances: self.step_one.len(),
            ..Default::default()
        };

        for record in self.consumption.values() {
            stats.total_consumed_units = stats.total_consumed_units.saturating_add(record.consumed_units);
            stats.total_disbursed = stats.total_disbursed.saturating_add(record.disbursed_amount);
        }

        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ParticipantId;

    fn key(cycle: u32) -> ConsumptionKey {
        ConsumptionKey::new(AssetId::new("reward"), ParticipantId::new("alice"), cycle)
    }

    #[test]
    fn test_consumption_roundtrip() {
        let mut store = MemoryLedgerStore::new();
        assert!(store.consumption(&key(1)).unwrap().is_none());

        let record = ConsumptionRecord {
            consumed_units: 3,
            disbursed_amount: 30_000,
            claim_count: 1,
            last_claimed_at: None,
        };
        store.put_consumption(&key(1), record.clone()).unwrap();

        assert_eq!(store.consumption(&key(1)).unwrap(), Some(record));
        assert!(store.consumption(&key(2)).unwrap().is_none());
    }

    #[test]
    fn test_untouched_days_are_zero() {
        let store = MemoryLedgerStore::new();
        assert_eq!(store.day_stat(19_000).unwrap(), DayStat::default());
        assert_eq!(
            store.token_day_stat(&AssetId::new("reward"), 19_000).unwrap(),
            DayStat::default()
        );
    }

    #[test]
    fn test_zero_step_one_balance_is_removed() {
        let mut store = MemoryLedgerStore::new();
        store.put_step_one_balance(&key(1), 500).unwrap();
        assert_eq!(store.stats().unwrap().open_step_one_balances, 1);

        store.put_step_one_balance(&key(1), 0).unwrap();
        assert_eq!(store.step_one_balance(&key(1)).unwrap(), 0);
        assert_eq!(store.stats().unwrap().open_step_one_balances, 0);
    }

    #[test]
    fn test_stats_totals() {
        let mut store = MemoryLedgerStore::new();
        for (cycle, units) in [(1u32, 3u64), (2, 5)] {
            store
                .put_consumption(
                    &key(cycle),
                    ConsumptionRecord {
                        consumed_units: units,
                        disbursed_amount: units as u128 * 10_000,
                        claim_count: 1,
                        last_claimed_at: None,
                    },
                )
                .unwrap();
        }
        store.put_burned_units(&key(1), 3).unwrap();

        let stats = store.stats().unwrap();
        assert_eq!(stats.consumption_records, 2);
        assert_eq!(stats.total_consumed_units, 8);
        assert_eq!(stats.total_disbursed, 80_000);
        assert_eq!(stats.burn_records, 1);

        store.clear();
        assert_eq!(store.stats().unwrap(), StoreStats::default());
    }
}
