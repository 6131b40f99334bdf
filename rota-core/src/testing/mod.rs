//! Testing utilities for rota-core
//!
//! In-memory implementations of the collaborator traits, shared by this
//! crate's tests and by downstream crates.

use std::collections::{HashMap, HashSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::error::{RotaError, RotaResult};
use crate::oracle::{AssetLedger, HoldingLedger, RateOracle, ReserveSnapshot, ScheduleOracle, TodayAsset, TransferLeg};
use crate::storage::{LedgerStore, MemoryLedgerStore, StoreStats};
use crate::types::{
    whole_units, Amount, AssetId, ConsumptionKey, ConsumptionRecord, Cycle, DayIndex, DayStat, ParticipantId,
};

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ============================================================
// FakeSchedule
// ============================================================

#[derive(Debug, Default)]
struct ScheduleState {
    paused: bool,
    today: TodayAsset,
    supported: HashSet<AssetId>,
    window_open: HashSet<AssetId>,
    reverse: HashSet<AssetId>,
    cycles: HashMap<AssetId, Cycle>,
    registered: HashSet<ParticipantId>,
    participant_cap: Option<u64>,
}

/// Scripted schedule
#[derive(Debug, Default)]
pub struct FakeSchedule {
    state: RwLock<ScheduleState>,
}

impl FakeSchedule {
    pub fn new() -> Self {
        Self::default()
    }

    /// `asset` is today's supported asset, window open, forward phase, cycle 1
    pub fn forward(asset: AssetId) -> Self {
        let schedule = Self::new();
        {
            let mut state = write(&schedule.state);
            state.today = TodayAsset::active(asset.clone());
            state.supported.insert(asset.clone());
            state.window_open.insert(asset.clone());
            state.cycles.insert(asset, 1);
        }
        schedule
    }

    /// Same as [`FakeSchedule::forward`] in reverse phase
    pub fn reverse(asset: AssetId) -> Self {
        let schedule = Self::forward(asset.clone());
        schedule.set_reverse(&asset, true);
        schedule
    }

    pub fn set_paused(&self, paused: bool) {
        write(&self.state).paused = paused;
    }

    pub fn set_today(&self, today: TodayAsset) {
        write(&self.state).today = today;
    }

    pub fn set_supported(&self, asset: &AssetId, supported: bool) {
        let mut state = write(&self.state);
        if supported {
            state.supported.insert(asset.clone());
        } else {
            state.supported.remove(asset);
        }
    }

    pub fn set_window_open(&self, asset: &AssetId, open: bool) {
        let mut state = write(&self.state);
        if open {
            state.window_open.insert(asset.clone());
        } else {
            state.window_open.remove(asset);
        }
    }

    pub fn set_reverse(&self, asset: &AssetId, reverse: bool) {
        let mut state = write(&self.state);
        if reverse {
            state.reverse.insert(asset.clone());
        } else {
            state.reverse.remove(asset);
        }
    }

    pub fn set_cycle(&self, asset: &AssetId, cycle: Cycle) {
        write(&self.state).cycles.insert(asset.clone(), cycle);
    }

    pub fn set_participant_cap(&self, cap: Option<u64>) {
        write(&self.state).participant_cap = cap;
    }

    pub fn is_registered(&self, participant: &ParticipantId) -> bool {
        read(&self.state).registered.contains(participant)
    }

    pub fn registered_count(&self) -> usize {
        read(&self.state).registered.len()
    }
}

impl ScheduleOracle for FakeSchedule {
    fn is_paused(&self) -> bool {
        read(&self.state).paused
    }

    fn today_asset(&self) -> TodayAsset {
        read(&self.state).today.clone()
    }

    fn is_asset_supported(&self, asset: &AssetId) -> bool {
        read(&self.state).supported.contains(asset)
    }

    fn is_window_open(&self, asset: &AssetId) -> bool {
        read(&self.state).window_open.contains(asset)
    }

    fn is_reverse_phase(&self, asset: &AssetId) -> bool {
        read(&self.state).reverse.contains(asset)
    }

    fn current_cycle(&self, asset: &AssetId) -> Cycle {
        read(&self.state).cycles.get(asset).copied().unwrap_or(0)
    }

    fn register_participant(&self, participant: &ParticipantId) -> RotaResult<bool> {
        let mut state = write(&self.state);
        if state.registered.contains(participant) {
            return Ok(false);
        }
        if let Some(cap) = state.participant_cap {
            if state.registered.len() as u64 >= cap {
                return Err(RotaError::ParticipantCapReached { cap });
            }
        }
        state.registered.insert(participant.clone());
        Ok(true)
    }

    fn unregister_participant(&self, participant: &ParticipantId) {
        write(&self.state).registered.remove(participant);
    }
}

// ============================================================
// FakeHoldings
// ============================================================

/// Raw credential balances truncated to whole units
#[derive(Debug)]
pub struct FakeHoldings {
    unit_base: Amount,
    raw: RwLock<HashMap<ParticipantId, Amount>>,
}

impl Default for FakeHoldings {
    fn default() -> Self {
        Self::new(1)
    }
}

impl FakeHoldings {
    pub fn new(unit_base: Amount) -> Self {
        Self {
            unit_base,
            raw: RwLock::new(HashMap::new()),
        }
    }

    pub fn set_units(&self, participant: &ParticipantId, units: u64) {
        let raw = Amount::from(units).saturating_mul(self.unit_base);
        self.set_raw(participant, raw);
    }

    pub fn set_raw(&self, participant: &ParticipantId, raw: Amount) {
        write(&self.raw).insert(participant.clone(), raw);
    }
}

impl HoldingLedger for FakeHoldings {
    fn active_units(&self, participant: &ParticipantId) -> u64 {
        let raw = read(&self.raw).get(participant).copied().unwrap_or(0);
        whole_units(raw, self.unit_base)
    }
}

// ============================================================
// FakeRates
// ============================================================

/// Pool reserves keyed by unordered pair
#[derive(Debug, Default)]
pub struct FakeRates {
    pools: RwLock<HashMap<(AssetId, AssetId), ReserveSnapshot>>,
}

fn pair_key(a: &AssetId, b: &AssetId) -> (AssetId, AssetId) {
    if a <= b {
        (a.clone(), b.clone())
    } else {
        (b.clone(), a.clone())
    }
}

impl FakeRates {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pool with `token0`/`token1` reserves
    pub fn set_pool(&self, token0: AssetId, token1: AssetId, reserve0: Amount, reserve1: Amount) {
        let key = pair_key(&token0, &token1);
        write(&self.pools).insert(
            key,
            ReserveSnapshot {
                token0,
                token1,
                reserve0,
                reserve1,
            },
        );
    }

    /// Answer queries for `(a, b)` with an arbitrary snapshot
    pub fn set_raw(&self, a: AssetId, b: AssetId, snapshot: ReserveSnapshot) {
        write(&self.pools).insert(pair_key(&a, &b), snapshot);
    }

    pub fn remove_pool(&self, a: &AssetId, b: &AssetId) {
        write(&self.pools).remove(&pair_key(a, b));
    }
}

impl RateOracle for FakeRates {
    fn reserves(&self, a: &AssetId, b: &AssetId) -> Option<ReserveSnapshot> {
        read(&self.pools).get(&pair_key(a, b)).cloned()
    }
}

// ============================================================
// FakeAssetLedger
// ============================================================

#[derive(Debug, Clone, Default)]
struct LedgerState {
    balances: HashMap<(AssetId, ParticipantId), Amount>,
    inventory: HashMap<AssetId, Amount>,
    allowance: HashMap<AssetId, Amount>,
    burned: HashMap<AssetId, Amount>,
}

impl LedgerState {
    fn apply(&mut self, leg: &TransferLeg) -> RotaResult<()> {
        match leg {
            TransferLeg::Disburse { asset, to, amount } => {
                let inventory = self.inventory.entry(asset.clone()).or_default();
                *inventory = inventory
                    .checked_sub(*amount)
                    .ok_or_else(|| RotaError::transfer_failed("disburse", "inventory exhausted"))?;
                let allowance = self.allowance.entry(asset.clone()).or_default();
                *allowance = allowance
                    .checked_sub(*amount)
                    .ok_or_else(|| RotaError::transfer_failed("disburse", "allowance exhausted"))?;
                let balance = self.balances.entry((asset.clone(), to.clone())).or_default();
                *balance = balance
                    .checked_add(*amount)
                    .ok_or_else(|| RotaError::overflow("fake ledger balance"))?;
            }
            TransferLeg::Collect { asset, from, amount } => {
                let balance = self.balances.entry((asset.clone(), from.clone())).or_default();
                *balance = balance
                    .checked_sub(*amount)
                    .ok_or_else(|| RotaError::transfer_failed("collect", "balance too low"))?;
                let inventory = self.inventory.entry(asset.clone()).or_default();
                *inventory = inventory
                    .checked_add(*amount)
                    .ok_or_else(|| RotaError::overflow("fake ledger inventory"))?;
            }
            TransferLeg::Burn { asset, from, amount } => {
                let balance = self.balances.entry((asset.clone(), from.clone())).or_default();
                *balance = balance
                    .checked_sub(*amount)
                    .ok_or_else(|| RotaError::transfer_failed("burn", "balance too low"))?;
                let burned = self.burned.entry(asset.clone()).or_default();
                *burned = burned.saturating_add(*amount);
            }
        }
        Ok(())
    }
}

/// Atomic in-memory asset ledger with failure injection
#[derive(Debug, Default)]
pub struct FakeAssetLedger {
    state: RwLock<LedgerState>,
    history: RwLock<Vec<TransferLeg>>,
    fail_next: RwLock<Option<String>>,
}

impl FakeAssetLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add engine inventory and the matching allowance
    pub fn fund(&self, asset: &AssetId, amount: Amount) {
        let mut state = write(&self.state);
        *state.inventory.entry(asset.clone()).or_default() += amount;
        *state.allowance.entry(asset.clone()).or_default() += amount;
    }

    pub fn set_inventory(&self, asset: &AssetId, amount: Amount) {
        write(&self.state).inventory.insert(asset.clone(), amount);
    }

    pub fn set_allowance(&self, asset: &AssetId, amount: Amount) {
        write(&self.state).allowance.insert(asset.clone(), amount);
    }

    pub fn set_balance(&self, asset: &AssetId, holder: &ParticipantId, amount: Amount) {
        write(&self.state)
            .balances
            .insert((asset.clone(), holder.clone()), amount);
    }

    /// Reject the next `settle` call with `reason`
    pub fn fail_next_settle(&self, reason: impl Into<String>) {
        *write(&self.fail_next) = Some(reason.into());
    }

    /// Total burned of `asset`
    pub fn burned(&self, asset: &AssetId) -> Amount {
        read(&self.state).burned.get(asset).copied().unwrap_or(0)
    }

    /// Every applied leg, in order
    pub fn history(&self) -> Vec<TransferLeg> {
        read(&self.history).clone()
    }

    /// Sum of disbursements of `asset` to `to`
    pub fn disbursed_to(&self, asset: &AssetId, to: &ParticipantId) -> Amount {
        read(&self.history)
            .iter()
            .filter_map(|leg| match leg {
                TransferLeg::Disburse {
                    asset: a,
                    to: t,
                    amount,
                } if a == asset && t == to => Some(*amount),
                _ => None,
            })
            .sum()
    }
}

impl AssetLedger for FakeAssetLedger {
    fn balance_of(&self, asset: &AssetId, holder: &ParticipantId) -> Amount {
        read(&self.state)
            .balances
            .get(&(asset.clone(), holder.clone()))
            .copied()
            .unwrap_or(0)
    }

    fn inventory(&self, asset: &AssetId) -> Amount {
        read(&self.state).inventory.get(asset).copied().unwrap_or(0)
    }

    fn allowance(&self, asset: &AssetId) -> Amount {
        read(&self.state).allowance.get(asset).copied().unwrap_or(0)
    }

    fn settle(&self, legs: &[TransferLeg]) -> RotaResult<()> {
        if let Some(reason) = write(&self.fail_next).take() {
            return Err(RotaError::transfer_failed("settle", reason));
        }

        let mut state = write(&self.state);
        let mut next = state.clone();
        for leg in legs {
            next.apply(leg)?;
        }
        *state = next;
        drop(state);

        write(&self.history).extend(legs.iter().cloned());
        Ok(())
    }
}

// ============================================================
// FlakyStore
// ============================================================

/// Memory store whose writes start failing after a budget
#[derive(Debug, Default)]
pub struct FlakyStore {
    inner: MemoryLedgerStore,
    writes_left: Option<usize>,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allow `writes` more successful writes, then fail every write
    pub fn fail_after(&mut self, writes: usize) {
        self.writes_left = Some(writes);
    }

    pub fn heal(&mut self) {
        self.writes_left = None;
    }

    fn spend_write(&mut self) -> RotaResult<()> {
        match self.writes_left.as_mut() {
            None => Ok(()),
            Some(0) => Err(RotaError::Storage("write refused".to_string())),
            Some(left) => {
                *left -= 1;
                Ok(())
            }
        }
    }
}

impl LedgerStore for FlakyStore {
    fn consumption(&self, key: &ConsumptionKey) -> RotaResult<Option<ConsumptionRecord>> {
        self.inner.consumption(key)
    }

    fn put_consumption(&mut self, key: &ConsumptionKey, record: ConsumptionRecord) -> RotaResult<()> {
        self.spend_write()?;
        self.inner.put_consumption(key, record)
    }

    fn day_stat(&self, day: DayIndex) -> RotaResult<DayStat> {
        self.inner.day_stat(day)
    }

    fn put_day_stat(&mut self, day: DayIndex, stat: DayStat) -> RotaResult<()> {
        self.spend_write()?;
        self.inner.put_day_stat(day, stat)
    }

    fn token_day_stat(&self, asset: &AssetId, day: DayIndex) -> RotaResult<DayStat> {
        self.inner.token_day_stat(asset, day)
    }

    fn put_token_day_stat(&mut self, asset: &AssetId, day: DayIndex, stat: DayStat) -> RotaResult<()> {
        self.spend_write()?;
        self.inner.put_token_day_stat(asset, day, stat)
    }

    fn burned_units(&self, key: &ConsumptionKey) -> RotaResult<u64> {
        self.inner.burned_units(key)
    }

    fn put_burned_units(&mut self, key: &ConsumptionKey, units: u64) -> RotaResult<()> {
        self.spend_write()?;
        self.inner.put_burned_units(key, units)
    }

    fn step_one_balance(&self, key: &ConsumptionKey) -> RotaResult<Amount> {
        self.inner.step_one_balance(key)
    }

    fn put_step_one_balance(&mut self, key: &ConsumptionKey, amount: Amount) -> RotaResult<()> {
        self.spend_write()?;
        self.inner.put_step_one_balance(key, amount)
    }

    fn stats(&self) -> RotaResult<StoreStats> {
        self.inner.stats()
    }
}
