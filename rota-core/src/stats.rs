//! Day-Index Aggregator
//!
//! Observational totals per day and per (asset, day). Never read by the
//! settlement logic.

use crate::calendar::DayCutover;
use crate::error::{RotaError, RotaResult};
use crate::storage::LedgerStore;
use crate::types::{Amount, AssetId, DayIndex, DayStat};
use chrono::{DateTime, Utc};

/// Prior totals captured by [`DayIndexAggregator::record`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DayStatsUndo {
    pub asset: AssetId,
    pub day: DayIndex,
    previous_day: DayStat,
    previous_token_day: DayStat,
}

impl DayStatsUndo {
    /// Restore the totals as they were before the recorded entry
    pub fn restore<S: LedgerStore + ?Sized>(&self, store: &mut S) -> RotaResult<()> {
        store.put_day_stat(self.day, self.previous_day)?;
        store.put_token_day_stat(&self.asset, self.day, self.previous_token_day)
    }
}

/// Day-indexed statistics
#[derive(Debug, Clone, Copy, Default)]
pub struct DayIndexAggregator {
    cutover: DayCutover,
}

impl DayIndexAggregator {
    pub fn new(cutover: DayCutover) -> Self {
        Self { cutover }
    }

    pub fn cutover(&self) -> &DayCutover {
        &self.cutover
    }

    /// Day index of `at` under the configured cutover
    pub fn day_index(&self, at: DateTime<Utc>) -> RotaResult<DayIndex> {
        self.cutover.day_index(at)
    }

    /// Add an entry to the day and asset-day totals
    pub fn record<S: LedgerStore + ?Sized>(
        &self,
        store: &mut S,
        asset: &AssetId,
        at: DateTime<Utc>,
        amount: Amount,
        units: u64,
    ) -> RotaResult<DayStatsUndo> {
        let day = self.day_index(at)?;
        let previous_day = store.day_stat(day)?;
        let previous_token_day = store.token_day_stat(asset, day)?;

        let next_day = previous_day
            .add(amount, units)
            .ok_or_else(|| RotaError::overflow(format!("day stats {}", day)))?;
        let next_token_day = previous_token_day
            .add(amount, units)
            .ok_or_else(|| RotaError::overflow(format!("token day stats {}/{}", asset, day)))?;

        store.put_day_stat(day, next_day)?;
        if let Err(e) = store.put_token_day_stat(asset, day, next_token_day) {
            return Err(match store.put_day_stat(day, previous_day) {
                Ok(()) => e,
                Err(restore) => RotaError::restore_failed(&e, &restore),
            });
        }

        Ok(DayStatsUndo {
            asset: asset.clone(),
            day,
            previous_day,
            previous_token_day,
        })
    }

    /// `(amount, units)` for a day, zero if untouched
    pub fn day_stats<S: LedgerStore + ?Sized>(&self, store: &S, day: DayIndex) -> RotaResult<(Amount, u64)> {
        Ok(store.day_stat(day)?.as_tuple())
    }

    /// `(amount, units)` for an asset-day, zero if untouched
    pub fn token_day_stats<S: LedgerStore + ?Sized>(
        &self,
        store: &S,
        asset: &AssetId,
        day: DayIndex,
    ) -> RotaResult<(Amount, u64)> {
        Ok(store.token_day_stat(asset, day)?.as_tuple())
    }
}
