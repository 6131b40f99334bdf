//! Ratio Settlement
//!
//! Settles today's reward asset against the settlement asset at the live
//! pool ratio.
//!
//! - Forward phase: burn claimed units' worth of reward asset, receive
//!   settlement asset at twice the market value.
//! - Reverse phase: two legs. Leg 1 swaps reward asset into a recorded
//!   settlement balance; leg 2 swaps that whole balance back.
//!
//! Phase, window and cycle are re-read from the schedule on every call.

mod forward;
mod pricing;
mod reverse;

pub use pricing::*;

use std::sync::Arc;

use crate::config::EngineConfig;
use crate::error::RotaResult;
use crate::gate::ScheduleGate;
use crate::oracle::{AssetLedger, HoldingLedger, RateOracle, ScheduleOracle};
use crate::storage::LedgerStore;
use crate::types::*;

/// Settlement engine
pub struct SettlementEngine {
    config: Arc<EngineConfig>,
    schedule: Arc<dyn ScheduleOracle>,
    holdings: Arc<dyn HoldingLedger>,
    rates: Arc<dyn RateOracle>,
    assets: Arc<dyn AssetLedger>,
}

/// Phase a settlement call requires
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    Forward,
    Reverse,
}

impl SettlementEngine {
    /// Create new settlement engine
    pub fn new(
        config: Arc<EngineConfig>,
        schedule: Arc<dyn ScheduleOracle>,
        holdings: Arc<dyn HoldingLedger>,
        rates: Arc<dyn RateOracle>,
        assets: Arc<dyn AssetLedger>,
    ) -> Self {
        Self {
            config,
            schedule,
            holdings,
            rates,
            assets,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Common gate, then phase, then lifetime
    fn open_cycle(&self, phase: Phase) -> RotaResult<(AssetId, Cycle)> {
        let gate = ScheduleGate::new(self.schedule.as_ref());
        let asset = gate.require_open_asset()?;
        match phase {
            Phase::Forward => gate.require_forward_phase(&asset)?,
            Phase::Reverse => gate.require_reverse_phase(&asset)?,
        }
        let cycle = gate.require_in_lifetime(&asset, self.config.max_cycles)?;
        Ok((asset, cycle))
    }

    /// Units burned in forward settlement for `(asset, participant, cycle)`
    pub fn burned_units<S: LedgerStore + ?Sized>(
        &self,
        store: &S,
        asset: &AssetId,
        participant: &ParticipantId,
        cycle: Cycle,
    ) -> RotaResult<u64> {
        store.burned_units(&ConsumptionKey::new(asset.clone(), participant.clone(), cycle))
    }

    /// Settlement balance awaiting reverse leg 2
    pub fn step_one_balance<S: LedgerStore + ?Sized>(
        &self,
        store: &S,
        asset: &AssetId,
        participant: &ParticipantId,
        cycle: Cycle,
    ) -> RotaResult<Amount> {
        store.step_one_balance(&ConsumptionKey::new(asset.clone(), participant.clone(), cycle))
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::airdrop::AirdropEngine;
    use crate::storage::MemoryLedgerStore;
    use crate::testing::{FakeAssetLedger, FakeHoldings, FakeRates, FakeSchedule};
    use chrono::{DateTime, TimeZone, Utc};

    pub struct Harness {
        pub schedule: Arc<FakeSchedule>,
        pub holdings: Arc<FakeHoldings>,
        pub rates: Arc<FakeRates>,
        pub assets: Arc<FakeAssetLedger>,
        pub airdrop: AirdropEngine,
        pub engine: SettlementEngine,
        pub store: MemoryLedgerStore,
    }

    pub fn reward() -> AssetId {
        AssetId::new("reward")
    }

    pub fn settlement() -> AssetId {
        AssetId::new("settlement")
    }

    pub fn alice() -> ParticipantId {
        ParticipantId::new("alice")
    }

    pub fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 3, 0, 0).unwrap()
    }

    /// Forward phase, rate 2.0 settlement per reward, both assets funded
    pub fn harness() -> Harness {
        let schedule = Arc::new(FakeSchedule::forward(reward()));
        let holdings = Arc::new(FakeHoldings::default());
        let rates = Arc::new(FakeRates::new());
        let assets = Arc::new(FakeAssetLedger::new());
        rates.set_pool(reward(), settlement(), 1_000_000, 2_000_000);
        assets.fund(&reward(), 10_000_000);
        assets.fund(&settlement(), 10_000_000);

        let config = Arc::new(EngineConfig::new(settlement()));
        let airdrop = AirdropEngine::new(
            config.clone(),
            schedule.clone(),
            holdings.clone(),
            assets.clone(),
        );
        let engine = SettlementEngine::new(
            config,
            schedule.clone(),
            holdings.clone(),
            rates.clone(),
            assets.clone(),
        );
        Harness {
            schedule,
            holdings,
            rates,
            assets,
            airdrop,
            engine,
            store: MemoryLedgerStore::new(),
        }
    }
}
