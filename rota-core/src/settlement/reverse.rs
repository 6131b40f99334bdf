//! Reverse Settlement (two-leg swap)
//!
//! Leg 1 swaps reward asset for settlement asset, paid out to the
//! participant, and records the amount as the step-one balance keyed by
//! (asset, participant, cycle). Leg 2 is refused until that balance is
//! strictly positive, then collects all of it back for reward asset.
//!
//! A balance left behind when the window closes is still held by the
//! participant as settlement asset.

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use super::{Phase, SettlementEngine};
use crate::error::{RotaError, RotaResult};
use crate::oracle::{ensure_balance, ensure_outflow, TransferLeg};
use crate::storage::LedgerStore;
use crate::types::*;

impl SettlementEngine {
    /// Price leg 1: `amount_in` reward asset to settlement asset
    pub fn quote_swap_to_settlement(
        &self,
        participant: &ParticipantId,
        amount_in: Amount,
    ) -> RotaResult<SwapQuote> {
        let (asset, cycle) = self.open_cycle(Phase::Reverse)?;
        if amount_in == 0 {
            return Err(RotaError::InvalidAmount {
                reason: "swap amount must be positive".to_string(),
            });
        }
        if self.holdings.active_units(participant) == 0 {
            return Err(RotaError::NoActiveUnits {
                participant: participant.clone(),
            });
        }

        let rate = self.exchange_rate(&asset)?;
        let amount_out = self.reward_to_settlement(&rate, amount_in)?;
        Ok(SwapQuote {
            kind: SettlementKind::SwapToSettlement,
            asset,
            cycle,
            amount_in,
            amount_out,
            reserve_in: rate.reward_reserve,
            reserve_out: rate.settlement_reserve,
        })
    }

    /// Leg 1: collect `amount_in` reward asset, credit the step-one balance
    pub fn swap_to_settlement<S: LedgerStore + ?Sized>(
        &self,
        store: &mut S,
        participant: &ParticipantId,
        amount_in: Amount,
        now: DateTime<Utc>,
    ) -> RotaResult<SettlementReceipt> {
        self.execute_swap_to_settlement(store, participant, amount_in, now)
            .map_err(|e| {
                debug!(participant = %participant, code = ?e.code(), error = %e, "swap to settlement rejected");
                e
            })
    }

    fn execute_swap_to_settlement<S: LedgerStore + ?Sized>(
        &self,
        store: &mut S,
        participant: &ParticipantId,
        amount_in: Amount,
        now: DateTime<Utc>,
    ) -> RotaResult<SettlementReceipt> {
        let quote = self.quote_swap_to_settlement(participant, amount_in)?;
        let settlement = &self.config.settlement_asset;
        ensure_balance(self.assets.as_ref(), &quote.asset, participant, amount_in)?;
        ensure_outflow(self.assets.as_ref(), settlement, quote.amount_out)?;

        let key = ConsumptionKey::new(quote.asset.clone(), participant.clone(), quote.cycle);
        let previous = store.step_one_balance(&key)?;
        let balance = previous
            .checked_add(quote.amount_out)
            .ok_or_else(|| RotaError::overflow("step-one balance"))?;

        store.put_step_one_balance(&key, balance)?;

        let legs = [
            TransferLeg::Collect {
                asset: quote.asset.clone(),
                from: participant.clone(),
                amount: amount_in,
            },
            TransferLeg::Disburse {
                asset: settlement.clone(),
                to: participant.clone(),
                amount: quote.amount_out,
            },
        ];
        if let Err(e) = self.assets.settle(&legs) {
            warn!(key = %key, error = %e, "leg 1 settlement rejected, restoring balance");
            let e = as_transfer_failure(SettlementKind::SwapToSettlement, e);
            return Err(self.restore_step_one(store, &key, previous, e));
        }

        info!(key = %key, amount_in = %amount_in, credited = %quote.amount_out, balance = %balance, "swap to settlement");
        Ok(receipt(SettlementKind::SwapToSettlement, &quote, participant, balance, now))
    }

    /// Price leg 2: the whole step-one balance back to reward asset
    pub fn quote_swap_to_reward<S: LedgerStore + ?Sized>(
        &self,
        store: &S,
        participant: &ParticipantId,
    ) -> RotaResult<SwapQuote> {
        let (asset, cycle) = self.open_cycle(Phase::Reverse)?;
        let key = ConsumptionKey::new(asset.clone(), participant.clone(), cycle);

        let balance = store.step_one_balance(&key)?;
        if balance == 0 {
            return Err(RotaError::StepOneRequired {
                asset,
                participant: participant.clone(),
                cycle,
            });
        }

        let rate = self.exchange_rate(&asset)?;
        let amount_out = self.settlement_to_reward(&rate, balance)?;
        Ok(SwapQuote {
            kind: SettlementKind::SwapToReward,
            asset,
            cycle,
            amount_in: balance,
            amount_out,
            reserve_in: rate.settlement_reserve,
            reserve_out: rate.reward_reserve,
        })
    }

    /// Leg 2: zero the step-one balance, disburse reward asset
    pub fn swap_to_reward<S: LedgerStore + ?Sized>(
        &self,
        store: &mut S,
        participant: &ParticipantId,
        now: DateTime<Utc>,
    ) -> RotaResult<SettlementReceipt> {
        self.execute_swap_to_reward(store, participant, now).map_err(|e| {
            debug!(participant = %participant, code = ?e.code(), error = %e, "swap to reward rejected");
            e
        })
    }

    fn execute_swap_to_reward<S: LedgerStore + ?Sized>(
        &self,
        store: &mut S,
        participant: &ParticipantId,
        now: DateTime<Utc>,
    ) -> RotaResult<SettlementReceipt> {
        let quote = self.quote_swap_to_reward(&*store, participant)?;
        let settlement = &self.config.settlement_asset;
        ensure_balance(self.assets.as_ref(), settlement, participant, quote.amount_in)?;
        ensure_outflow(self.assets.as_ref(), &quote.asset, quote.amount_out)?;

        let key = ConsumptionKey::new(quote.asset.clone(), participant.clone(), quote.cycle);
        store.put_step_one_balance(&key, 0)?;

        let legs = [
            TransferLeg::Collect {
                asset: settlement.clone(),
                from: participant.clone(),
                amount: quote.amount_in,
            },
            TransferLeg::Disburse {
                asset: quote.asset.clone(),
                to: participant.clone(),
                amount: quote.amount_out,
            },
        ];
        if let Err(e) = self.assets.settle(&legs) {
            warn!(key = %key, error = %e, "leg 2 settlement rejected, restoring balance");
            let e = as_transfer_failure(SettlementKind::SwapToReward, e);
            return Err(self.restore_step_one(store, &key, quote.amount_in, e));
        }

        info!(key = %key, converted = %quote.amount_in, disbursed = %quote.amount_out, "swap to reward");
        Ok(receipt(SettlementKind::SwapToReward, &quote, participant, 0, now))
    }

    /// Put back the step-one balance; returns the error to report
    fn restore_step_one<S: LedgerStore + ?Sized>(
        &self,
        store: &mut S,
        key: &ConsumptionKey,
        amount: Amount,
        cause: RotaError,
    ) -> RotaError {
        match store.put_step_one_balance(key, amount) {
            Ok(()) => cause,
            Err(e) => {
                error!(key = %key, error = %e, "failed to restore step-one balance");
                RotaError::restore_failed(&cause, &e)
            }
        }
    }
}

fn as_transfer_failure(kind: SettlementKind, err: RotaError) -> RotaError {
    match err {
        RotaError::TransferFailed { .. } => err,
        other => RotaError::transfer_failed(kind.name(), other.to_string()),
    }
}

fn receipt(
    kind: SettlementKind,
    quote: &SwapQuote,
    participant: &ParticipantId,
    step_one_balance: Amount,
    now: DateTime<Utc>,
) -> SettlementReceipt {
    let mut receipt = SettlementReceipt {
        kind,
        asset: quote.asset.clone(),
        participant: participant.clone(),
        cycle: quote.cycle,
        units: 0,
        amount_in: quote.amount_in,
        amount_out: quote.amount_out,
        step_one_balance,
        settled_at: now,
        receipt_digest: ReceiptDigest([0u8; 32]),
    };
    receipt.compute_digest();
    receipt
}
