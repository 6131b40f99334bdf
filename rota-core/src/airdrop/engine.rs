//! Airdrop Engine

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use crate::config::EngineConfig;
use crate::error::{ErrorClass, RotaError, RotaResult};
use crate::gate::ScheduleGate;
use crate::math::checked_mul;
use crate::oracle::{ensure_outflow, AssetLedger, HoldingLedger, ScheduleOracle, TransferLeg};
use crate::stats::{DayIndexAggregator, DayStatsUndo};
use crate::storage::LedgerStore;
use crate::types::*;

/// A claim that passed every participant-level precondition
#[derive(Clone, Debug)]
struct Eligible {
    key: ConsumptionKey,
    previous: ConsumptionRecord,
    active_units: u64,
    new_units: u64,
    amount: Amount,
}

/// Airdrop distribution engine
pub struct AirdropEngine {
    config: Arc<EngineConfig>,
    schedule: Arc<dyn ScheduleOracle>,
    holdings: Arc<dyn HoldingLedger>,
    assets: Arc<dyn AssetLedger>,
    stats: DayIndexAggregator,
}

impl AirdropEngine {
    /// Create new airdrop engine
    pub fn new(
        config: Arc<EngineConfig>,
        schedule: Arc<dyn ScheduleOracle>,
        holdings: Arc<dyn HoldingLedger>,
        assets: Arc<dyn AssetLedger>,
    ) -> Self {
        let stats = DayIndexAggregator::new(config.day_cutover);
        Self {
            config,
            schedule,
            holdings,
            assets,
            stats,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Day-index aggregator shared with the query surface
    pub fn aggregator(&self) -> &DayIndexAggregator {
        &self.stats
    }

    /// Claim newly available units of today's asset
    pub fn claim<S: LedgerStore + ?Sized>(
        &self,
        store: &mut S,
        participant: &ParticipantId,
        now: DateTime<Utc>,
    ) -> RotaResult<ClaimReceipt> {
        self.execute_claim(store, participant, now).map_err(|e| {
            debug!(participant = %participant, code = ?e.code(), error = %e, "claim rejected");
            e
        })
    }

    fn execute_claim<S: LedgerStore + ?Sized>(
        &self,
        store: &mut S,
        participant: &ParticipantId,
        now: DateTime<Utc>,
    ) -> RotaResult<ClaimReceipt> {
        let eligible = self.evaluate(&*store, None, participant)?;
        ensure_outflow(self.assets.as_ref(), &eligible.key.asset, eligible.amount)?;

        let disbursed_amount = eligible
            .previous
            .disbursed_amount
            .checked_add(eligible.amount)
            .ok_or_else(|| RotaError::overflow("disbursed amount"))?;
        let expected = checked_mul(
            u128::from(eligible.active_units),
            self.config.per_unit_amount,
            "disbursed amount",
        )?;
        if disbursed_amount != expected {
            return Err(RotaError::invariant(
                "disbursed == consumed * per_unit",
                format!(
                    "{}: disbursed {} but {} units at {} per unit",
                    eligible.key, disbursed_amount, eligible.active_units, self.config.per_unit_amount
                ),
            ));
        }
        let day_index = self.stats.day_index(now)?;

        let registered = self.schedule.register_participant(participant)?;
        let result = self.commit_claim(store, participant, &eligible, disbursed_amount, day_index, now);
        if result.is_err() && registered {
            self.schedule.unregister_participant(participant);
        }
        result
    }

    fn commit_claim<S: LedgerStore + ?Sized>(
        &self,
        store: &mut S,
        participant: &ParticipantId,
        eligible: &Eligible,
        disbursed_amount: Amount,
        day_index: DayIndex,
        now: DateTime<Utc>,
    ) -> RotaResult<ClaimReceipt> {
        let asset = eligible.key.asset.clone();
        let record = ConsumptionRecord {
            consumed_units: eligible.active_units,
            disbursed_amount,
            claim_count: eligible.previous.claim_count.saturating_add(1),
            last_claimed_at: Some(now),
        };

        // Effects before the transfer
        store.put_consumption(&eligible.key, record)?;
        let undo = match self
            .stats
            .record(store, &asset, now, eligible.amount, eligible.new_units)
        {
            Ok(undo) => undo,
            Err(e) => return Err(self.compensate(store, eligible, None, e)),
        };

        let leg = TransferLeg::Disburse {
            asset: asset.clone(),
            to: participant.clone(),
            amount: eligible.amount,
        };
        if let Err(e) = self.assets.settle(std::slice::from_ref(&leg)) {
            warn!(key = %eligible.key, error = %e, "disbursement rejected, restoring ledger");
            let e = match e {
                RotaError::TransferFailed { .. } => e,
                other => RotaError::transfer_failed("claim", other.to_string()),
            };
            return Err(self.compensate(store, eligible, Some(&undo), e));
        }

        let mut receipt = ClaimReceipt {
            asset,
            participant: participant.clone(),
            cycle: eligible.key.cycle,
            day_index,
            active_units: eligible.active_units,
            new_units: eligible.new_units,
            amount: eligible.amount,
            consumed_units: eligible.active_units,
            claimed_at: now,
            receipt_digest: ReceiptDigest([0u8; 32]),
        };
        receipt.compute_digest();

        info!(
            key = %eligible.key,
            new_units = eligible.new_units,
            amount = %eligible.amount,
            day = day_index,
            "claim committed"
        );
        Ok(receipt)
    }

    /// Undo the claim's writes; returns the error to report
    fn compensate<S: LedgerStore + ?Sized>(
        &self,
        store: &mut S,
        eligible: &Eligible,
        undo: Option<&DayStatsUndo>,
        cause: RotaError,
    ) -> RotaError {
        let mut restored = store.put_consumption(&eligible.key, eligible.previous.clone());
        if let Some(undo) = undo {
            restored = restored.and(undo.restore(store));
        }
        match restored {
            Ok(()) => cause,
            Err(e) => {
                error!(key = %eligible.key, error = %e, "failed to restore claim ledger");
                RotaError::restore_failed(&cause, &e)
            }
        }
    }

    /// Pre-flight view of a claim; `(0, 0, 0)` when any participant-level
    /// precondition fails. Inventory is not considered.
    pub fn claimable<S: LedgerStore + ?Sized>(
        &self,
        store: &S,
        asset: &AssetId,
        participant: &ParticipantId,
    ) -> RotaResult<Claimable> {
        match self.evaluate(store, Some(asset), participant) {
            Ok(eligible) => Ok(Claimable {
                active_units: eligible.active_units,
                new_units: eligible.new_units,
                amount: eligible.amount,
            }),
            Err(e) if e.class() == ErrorClass::Internal => Err(e),
            Err(_) => Ok(Claimable::none()),
        }
    }

    fn evaluate<S: LedgerStore + ?Sized>(
        &self,
        store: &S,
        requested: Option<&AssetId>,
        participant: &ParticipantId,
    ) -> RotaResult<Eligible> {
        let gate = ScheduleGate::new(self.schedule.as_ref());
        let asset = gate.require_open_asset()?;
        if let Some(requested) = requested {
            if requested != &asset {
                return Err(RotaError::NoActiveAsset);
            }
        }
        gate.require_forward_phase(&asset)?;

        let active_units = self.holdings.active_units(participant);
        if active_units == 0 {
            return Err(RotaError::NoActiveUnits {
                participant: participant.clone(),
            });
        }

        let cycle = gate.require_in_lifetime(&asset, self.config.max_cycles)?;
        let key = ConsumptionKey::new(asset, participant.clone(), cycle);
        let previous = store.consumption(&key)?.unwrap_or_default();

        // A lowered holding is not a refund
        if active_units <= previous.consumed_units {
            return Err(RotaError::NoNewUnits {
                active: active_units,
                consumed: previous.consumed_units,
            });
        }

        let new_units = active_units - previous.consumed_units;
        let amount = checked_mul(u128::from(new_units), self.config.per_unit_amount, "claim amount")?;

        Ok(Eligible {
            key,
            previous,
            active_units,
            new_units,
            amount,
        })
    }

    /// Units consumed by `participant` for `(asset, cycle)`
    pub fn consumed_units<S: LedgerStore + ?Sized>(
        &self,
        store: &S,
        asset: &AssetId,
        participant: &ParticipantId,
        cycle: Cycle,
    ) -> RotaResult<u64> {
        let key = ConsumptionKey::new(asset.clone(), participant.clone(), cycle);
        Ok(store
            .consumption(&key)?
            .map(|record| record.consumed_units)
            .unwrap_or(0))
    }

    /// Units consumed in the asset's current cycle
    pub fn consumed_units_current_cycle<S: LedgerStore + ?Sized>(
        &self,
        store: &S,
        asset: &AssetId,
        participant: &ParticipantId,
    ) -> RotaResult<u64> {
        let cycle = self.schedule.current_cycle(asset);
        self.consumed_units(store, asset, participant, cycle)
    }

    /// Full consumption record for `(asset, participant, cycle)`
    pub fn consumption_record<S: LedgerStore + ?Sized>(
        &self,
        store: &S,
        asset: &AssetId,
        participant: &ParticipantId,
        cycle: Cycle,
    ) -> RotaResult<ConsumptionRecord> {
        let key = ConsumptionKey::new(asset.clone(), participant.clone(), cycle);
        Ok(store.consumption(&key)?.unwrap_or_default())
    }

    pub fn day_index(&self, at: DateTime<Utc>) -> RotaResult<DayIndex> {
        self.stats.day_index(at)
    }

    pub fn day_stats<S: LedgerStore + ?Sized>(&self, store: &S, day: DayIndex) -> RotaResult<(Amount, u64)> {
        self.stats.day_stats(store, day)
    }

    pub fn token_day_stats<S: LedgerStore + ?Sized>(
        &self,
        store: &S,
        asset: &AssetId,
        day: DayIndex,
    ) -> RotaResult<(Amount, u64)> {
        self.stats.token_day_stats(store, asset, day)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::TodayAsset;
    use crate::storage::MemoryLedgerStore;
    use crate::testing::{FakeAssetLedger, FakeHoldings, FakeSchedule, FlakyStore};
    use chrono::TimeZone;

    struct Harness {
        schedule: Arc<FakeSchedule>,
        holdings: Arc<FakeHoldings>,
        assets: Arc<FakeAssetLedger>,
        engine: AirdropEngine,
        store: MemoryLedgerStore,
    }

    fn reward() -> AssetId {
        AssetId::new("reward")
    }

    fn alice() -> ParticipantId {
        ParticipantId::new("alice")
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 3, 0, 0).unwrap()
    }

    fn harness() -> Harness {
        let schedule = Arc::new(FakeSchedule::forward(reward()));
        let holdings = Arc::new(FakeHoldings::default());
        let assets = Arc::new(FakeAssetLedger::new());
        assets.fund(&reward(), 1_000_000);
        let engine = AirdropEngine::new(
            Arc::new(EngineConfig::default()),
            schedule.clone(),
            holdings.clone(),
            assets.clone(),
        );
        Harness {
            schedule,
            holdings,
            assets,
            engine,
            store: MemoryLedgerStore::new(),
        }
    }

    #[test]
    fn test_claim_three_then_reject_then_five() {
        let mut h = harness();
        h.holdings.set_units(&alice(), 3);

        let receipt = h.engine.claim(&mut h.store, &alice(), now()).unwrap();
        assert_eq!(receipt.amount, 30_000);
        assert_eq!(receipt.consumed_units, 3);
        assert_eq!(h.engine.consumed_units(&h.store, &reward(), &alice(), 1).unwrap(), 3);

        let err = h.engine.claim(&mut h.store, &alice(), now()).unwrap_err();
        assert_eq!(err, RotaError::NoNewUnits { active: 3, consumed: 3 });

        h.holdings.set_units(&alice(), 5);
        let receipt = h.engine.claim(&mut h.store, &alice(), now()).unwrap();
        assert_eq!(receipt.amount, 20_000);
        assert_eq!(receipt.new_units, 2);
        assert_eq!(
            h.engine.consumed_units_current_cycle(&h.store, &reward(), &alice()).unwrap(),
            5
        );

        let record = h.engine.consumption_record(&h.store, &reward(), &alice(), 1).unwrap();
        assert_eq!(record.disbursed_amount, 50_000);
        assert_eq!(record.claim_count, 2);
        assert_eq!(h.assets.disbursed_to(&reward(), &alice()), 50_000);
    }

    #[test]
    fn test_no_new_units_leaves_state_untouched() {
        let mut h = harness();
        h.holdings.set_units(&alice(), 2);
        h.engine.claim(&mut h.store, &alice(), now()).unwrap();
        let history = h.assets.history().len();
        let day = h.engine.day_index(now()).unwrap();
        let stats = h.engine.day_stats(&h.store, day).unwrap();

        assert!(h.engine.claim(&mut h.store, &alice(), now()).is_err());
        assert_eq!(h.assets.history().len(), history);
        assert_eq!(h.engine.day_stats(&h.store, day).unwrap(), stats);
    }

    #[test]
    fn test_lowered_holding_is_not_a_claim() {
        let mut h = harness();
        h.holdings.set_units(&alice(), 4);
        h.engine.claim(&mut h.store, &alice(), now()).unwrap();

        h.holdings.set_units(&alice(), 2);
        assert_eq!(
            h.engine.claim(&mut h.store, &alice(), now()),
            Err(RotaError::NoNewUnits { active: 2, consumed: 4 })
        );
        assert_eq!(h.engine.consumed_units(&h.store, &reward(), &alice(), 1).unwrap(), 4);
    }

    #[test]
    fn test_new_cycle_starts_fresh() {
        let mut h = harness();
        h.holdings.set_units(&alice(), 3);
        h.engine.claim(&mut h.store, &alice(), now()).unwrap();

        h.schedule.set_cycle(&reward(), 2);
        let receipt = h.engine.claim(&mut h.store, &alice(), now()).unwrap();
        assert_eq!(receipt.cycle, 2);
        assert_eq!(receipt.amount, 30_000);
    }

    #[test]
    fn test_reverse_phase_excludes_claims() {
        let mut h = harness();
        h.holdings.set_units(&alice(), 3);
        h.schedule.set_reverse(&reward(), true);

        assert_eq!(
            h.engine.claim(&mut h.store, &alice(), now()),
            Err(RotaError::ReversePhase { asset: reward() })
        );
        assert_eq!(
            h.engine.claimable(&h.store, &reward(), &alice()).unwrap(),
            Claimable::none()
        );
    }

    #[test]
    fn test_lifetime_exhausted_is_permanent() {
        let mut h = harness();
        h.holdings.set_units(&alice(), 3);
        h.schedule.set_cycle(&reward(), 21);

        assert!(matches!(
            h.engine.claim(&mut h.store, &alice(), now()),
            Err(RotaError::LifetimeExhausted { cycle: 21, max_cycles: 20, .. })
        ));
        assert_eq!(
            h.engine.claimable(&h.store, &reward(), &alice()).unwrap(),
            Claimable::none()
        );
    }

    #[test]
    fn test_precondition_order() {
        let mut h = harness();

        // no units and paused: paused wins
        h.schedule.set_paused(true);
        assert_eq!(h.engine.claim(&mut h.store, &alice(), now()), Err(RotaError::Paused));
        h.schedule.set_paused(false);

        assert_eq!(
            h.engine.claim(&mut h.store, &alice(), now()),
            Err(RotaError::NoActiveUnits { participant: alice() })
        );

        h.schedule.set_today(TodayAsset::none());
        assert_eq!(
            h.engine.claim(&mut h.store, &alice(), now()),
            Err(RotaError::NoActiveAsset)
        );
    }

    #[test]
    fn test_inventory_and_allowance_prechecked() {
        let mut h = harness();
        h.holdings.set_units(&alice(), 3);

        h.assets.set_inventory(&reward(), 29_999);
        assert!(matches!(
            h.engine.claim(&mut h.store, &alice(), now()),
            Err(RotaError::InsufficientInventory { required: 30_000, available: 29_999, .. })
        ));

        h.assets.set_inventory(&reward(), 30_000);
        h.assets.set_allowance(&reward(), 10_000);
        assert!(matches!(
            h.engine.claim(&mut h.store, &alice(), now()),
            Err(RotaError::InsufficientAllowance { required: 30_000, .. })
        ));

        assert_eq!(h.engine.consumed_units(&h.store, &reward(), &alice(), 1).unwrap(), 0);
        assert!(!h.schedule.is_registered(&alice()));

        // still claimable: inventory is not eligibility
        assert_eq!(
            h.engine.claimable(&h.store, &reward(), &alice()).unwrap().as_tuple(),
            (3, 3, 30_000)
        );
    }

    #[test]
    fn test_participant_cap() {
        let mut h = harness();
        h.schedule.set_participant_cap(Some(0));
        h.holdings.set_units(&alice(), 1);

        assert_eq!(
            h.engine.claim(&mut h.store, &alice(), now()),
            Err(RotaError::ParticipantCapReached { cap: 0 })
        );
        assert_eq!(h.store.stats().unwrap().consumption_records, 0);
    }

    #[test]
    fn test_rejected_disbursement_restores_ledger() {
        let mut h = harness();
        h.holdings.set_units(&alice(), 3);
        h.engine.claim(&mut h.store, &alice(), now()).unwrap();

        h.holdings.set_units(&alice(), 5);
        h.assets.fail_next_settle("token paused");
        let err = h.engine.claim(&mut h.store, &alice(), now()).unwrap_err();
        assert!(matches!(err, RotaError::TransferFailed { .. }));

        let record = h.engine.consumption_record(&h.store, &reward(), &alice(), 1).unwrap();
        assert_eq!(record.consumed_units, 3);
        assert_eq!(record.disbursed_amount, 30_000);
        let day = h.engine.day_index(now()).unwrap();
        assert_eq!(h.engine.day_stats(&h.store, day).unwrap(), (30_000, 3));
        assert_eq!(h.engine.token_day_stats(&h.store, &reward(), day).unwrap(), (30_000, 3));

        // retry succeeds with the same delta
        let receipt = h.engine.claim(&mut h.store, &alice(), now()).unwrap();
        assert_eq!(receipt.amount, 20_000);
    }

    #[test]
    fn test_failed_claim_releases_registration() {
        let mut h = harness();
        let bob = ParticipantId::new("bob");
        h.schedule.set_participant_cap(Some(1));
        h.holdings.set_units(&alice(), 2);
        h.holdings.set_units(&bob, 1);

        h.assets.fail_next_settle("token paused");
        assert!(matches!(
            h.engine.claim(&mut h.store, &alice(), now()),
            Err(RotaError::TransferFailed { .. })
        ));
        assert!(!h.schedule.is_registered(&alice()));

        let receipt = h.engine.claim(&mut h.store, &bob, now()).unwrap();
        assert_eq!(receipt.amount, 10_000);
        assert!(h.schedule.is_registered(&bob));
        assert_eq!(
            h.engine.claim(&mut h.store, &alice(), now()),
            Err(RotaError::ParticipantCapReached { cap: 1 })
        );
    }

    #[test]
    fn test_registered_participant_kept_after_failed_claim() {
        let mut h = harness();
        h.holdings.set_units(&alice(), 1);
        h.engine.claim(&mut h.store, &alice(), now()).unwrap();

        h.holdings.set_units(&alice(), 2);
        h.assets.fail_next_settle("token paused");
        assert!(h.engine.claim(&mut h.store, &alice(), now()).is_err());
        assert!(h.schedule.is_registered(&alice()));
    }

    #[test]
    fn test_store_failure_before_effects_releases_registration() {
        let h = harness();
        let mut store = FlakyStore::new();
        store.fail_after(0);
        h.holdings.set_units(&alice(), 1);

        assert!(matches!(
            h.engine.claim(&mut store, &alice(), now()),
            Err(RotaError::Storage(_))
        ));
        assert!(!h.schedule.is_registered(&alice()));
        assert!(h.assets.history().is_empty());
    }

    #[test]
    fn test_failed_restore_is_not_a_clean_rejection() {
        let h = harness();
        let mut store = FlakyStore::new();
        h.holdings.set_units(&alice(), 3);

        // consumption and both day stats land, the restore does not
        store.fail_after(3);
        h.assets.fail_next_settle("token paused");
        let err = h.engine.claim(&mut store, &alice(), now()).unwrap_err();
        assert!(matches!(err, RotaError::InvariantViolation { .. }));
        assert!(err.to_string().contains("token paused"));
        assert_eq!(err.class(), ErrorClass::Internal);
    }

    #[derive(Clone, Copy, Debug)]
    enum Step {
        Hold(u64),
        Claim,
        FailedClaim,
        NextCycle,
    }

    #[test]
    fn test_each_unit_paid_exactly_once() {
        use Step::*;

        let scripts: &[&[Step]] = &[
            &[Hold(3), Claim, Claim, Hold(5), Claim, Claim],
            &[Hold(1), FailedClaim, Claim, Hold(4), FailedClaim, FailedClaim, Claim],
            &[Hold(2), Claim, NextCycle, Claim, Hold(6), Claim, NextCycle, Hold(7), Claim],
            &[Claim, Hold(2), NextCycle, FailedClaim, Claim, Claim, Hold(9), Claim],
            &[Hold(1), Claim, Hold(2), Claim, Hold(3), FailedClaim, Hold(8), Claim, NextCycle],
        ];

        for script in scripts {
            let mut h = harness();
            let mut cycle = 1;
            let mut last_consumed = 0;

            for step in script.iter() {
                match *step {
                    Hold(units) => h.holdings.set_units(&alice(), units),
                    Claim => {
                        let _ = h.engine.claim(&mut h.store, &alice(), now());
                    }
                    FailedClaim => {
                        h.assets.fail_next_settle("frozen");
                        let _ = h.engine.claim(&mut h.store, &alice(), now());
                        // a rejected precheck leaves the failure armed
                        let _ = h.assets.settle(&[]);
                    }
                    NextCycle => {
                        cycle += 1;
                        h.schedule.set_cycle(&reward(), cycle);
                        last_consumed = 0;
                    }
                }

                let consumed = h.engine.consumed_units(&h.store, &reward(), &alice(), cycle).unwrap();
                assert!(consumed >= last_consumed, "{:?}: consumed went down at {:?}", script, step);
                last_consumed = consumed;

                let total_units: u64 = (1..=cycle)
                    .map(|c| h.engine.consumed_units(&h.store, &reward(), &alice(), c).unwrap())
                    .sum();
                assert_eq!(
                    h.assets.disbursed_to(&reward(), &alice()),
                    u128::from(total_units) * h.engine.config().per_unit_amount,
                    "{:?}: paid amount drifted at {:?}",
                    script,
                    step
                );
            }
        }
    }

    #[test]
    fn test_claimable_matches_claim() {
        let mut h = harness();
        h.holdings.set_units(&alice(), 3);

        assert_eq!(
            h.engine.claimable(&h.store, &reward(), &alice()).unwrap().as_tuple(),
            (3, 3, 30_000)
        );
        assert_eq!(
            h.engine.claimable(&h.store, &AssetId::new("other"), &alice()).unwrap(),
            Claimable::none()
        );

        h.engine.claim(&mut h.store, &alice(), now()).unwrap();
        assert_eq!(
            h.engine.claimable(&h.store, &reward(), &alice()).unwrap(),
            Claimable::none()
        );
    }

    #[test]
    fn test_day_stats_follow_claims() {
        let mut h = harness();
        let bob = ParticipantId::new("bob");
        h.holdings.set_units(&alice(), 3);
        h.holdings.set_units(&bob, 2);

        h.engine.claim(&mut h.store, &alice(), now()).unwrap();
        h.engine.claim(&mut h.store, &bob, now()).unwrap();

        let day = h.engine.day_index(now()).unwrap();
        assert_eq!(h.engine.day_stats(&h.store, day).unwrap(), (50_000, 5));
        assert_eq!(h.engine.token_day_stats(&h.store, &reward(), day).unwrap(), (50_000, 5));
        assert_eq!(h.schedule.registered_count(), 2);
    }

    #[test]
    fn test_receipt_digest_set() {
        let mut h = harness();
        h.holdings.set_units(&alice(), 1);
        let receipt = h.engine.claim(&mut h.store, &alice(), now()).unwrap();
        assert!(!receipt.receipt_digest.is_zero());
        assert_eq!(receipt.day_index, h.engine.day_index(now()).unwrap());
    }
}
