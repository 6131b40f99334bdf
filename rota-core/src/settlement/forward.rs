//! Forward Settlement (burn-for-settlement)

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use super::pricing::{forward_settlement, require_output};
use super::{Phase, SettlementEngine};
use crate::error::{RotaError, RotaResult};
use crate::math::{checked_mul, ExchangeRate};
use crate::oracle::{ensure_balance, ensure_outflow, TransferLeg};
use crate::storage::LedgerStore;
use crate::types::*;

struct BurnPlan {
    key: ConsumptionKey,
    consumed: u64,
    burned: u64,
    quote: BurnQuote,
}

impl SettlementEngine {
    fn plan_forward_burn<S: LedgerStore + ?Sized>(
        &self,
        store: &S,
        participant: &ParticipantId,
    ) -> RotaResult<BurnPlan> {
        let (asset, cycle) = self.open_cycle(Phase::Forward)?;
        let key = ConsumptionKey::new(asset.clone(), participant.clone(), cycle);

        let consumed = store
            .consumption(&key)?
            .map(|record| record.consumed_units)
            .unwrap_or(0);
        let burned = store.burned_units(&key)?;
        if consumed == 0 {
            return Err(RotaError::NothingToBurn { consumed, burned });
        }

        let unburned = consumed.saturating_sub(burned);
        let (burn_units, executable) = if unburned > 0 {
            (unburned, true)
        } else {
            (consumed, false)
        };

        let burn_amount = checked_mul(u128::from(burn_units), self.config.tokens_per_unit, "burn amount")?;
        let rate = self.exchange_rate(&asset)?;
        let rate_fixed = rate.settlement_per_reward_fixed()?;
        let expected = forward_settlement(burn_amount, &rate, self.config.forward_multiplier)?;
        let expected_settlement = require_output(SettlementKind::ForwardBurn, burn_amount, expected)?;

        Ok(BurnPlan {
            key,
            consumed,
            burned,
            quote: BurnQuote {
                asset,
                cycle,
                burn_units,
                burn_amount,
                rate_fixed,
                rate: ExchangeRate::as_decimal(rate_fixed),
                expected_settlement,
                executable,
            },
        })
    }

    /// Price a forward burn of the participant's unburned units.
    ///
    /// Once every consumed unit is burned, prices the cycle's consumed
    /// units with `executable = false`.
    pub fn quote_forward_burn<S: LedgerStore + ?Sized>(
        &self,
        store: &S,
        participant: &ParticipantId,
    ) -> RotaResult<BurnQuote> {
        Ok(self.plan_forward_burn(store, participant)?.quote)
    }

    /// Burn unburned units' worth of reward asset for settlement asset
    pub fn forward_burn<S: LedgerStore + ?Sized>(
        &self,
        store: &mut S,
        participant: &ParticipantId,
        now: DateTime<Utc>,
    ) -> RotaResult<SettlementReceipt> {
        self.execute_forward_burn(store, participant, now).map_err(|e| {
            debug!(participant = %participant, code = ?e.code(), error = %e, "forward burn rejected");
            e
        })
    }

    fn execute_forward_burn<S: LedgerStore + ?Sized>(
        &self,
        store: &mut S,
        participant: &ParticipantId,
        now: DateTime<Utc>,
    ) -> RotaResult<SettlementReceipt> {
        let plan = self.plan_forward_burn(&*store, participant)?;
        if !plan.quote.executable {
            return Err(RotaError::NothingToBurn {
                consumed: plan.consumed,
                burned: plan.burned,
            });
        }
        let quote = &plan.quote;
        let settlement = &self.config.settlement_asset;

        ensure_balance(self.assets.as_ref(), &quote.asset, participant, quote.burn_amount)?;
        ensure_outflow(self.assets.as_ref(), settlement, quote.expected_settlement)?;

        let burned = plan
            .burned
            .checked_add(quote.burn_units)
            .ok_or_else(|| RotaError::overflow("burned units"))?;
        if burned > plan.consumed {
            return Err(RotaError::invariant(
                "burned <= consumed",
                format!("{}: {} burned of {} consumed", plan.key, burned, plan.consumed),
            ));
        }

        store.put_burned_units(&plan.key, burned)?;

        let legs = [
            TransferLeg::Burn {
                asset: quote.asset.clone(),
                from: participant.clone(),
                amount: quote.burn_amount,
            },
            TransferLeg::Disburse {
                asset: settlement.clone(),
                to: participant.clone(),
                amount: quote.expected_settlement,
            },
        ];
        if let Err(e) = self.assets.settle(&legs) {
            warn!(key = %plan.key, error = %e, "burn settlement rejected, restoring ledger");
            let e = match e {
                RotaError::TransferFailed { .. } => e,
                other => RotaError::transfer_failed("forward_burn", other.to_string()),
            };
            if let Err(restore) = store.put_burned_units(&plan.key, plan.burned) {
                error!(key = %plan.key, error = %restore, "failed to restore burned units");
                return Err(RotaError::restore_failed(&e, &restore));
            }
            return Err(e);
        }

        let mut receipt = SettlementReceipt {
            kind: SettlementKind::ForwardBurn,
            asset: quote.asset.clone(),
            participant: participant.clone(),
            cycle: quote.cycle,
            units: quote.burn_units,
            amount_in: quote.burn_amount,
            amount_out: quote.expected_settlement,
            step_one_balance: store.step_one_balance(&plan.key)?,
            settled_at: now,
            receipt_digest: ReceiptDigest([0u8; 32]),
        };
        receipt.compute_digest();

        info!(
            key = %plan.key,
            units = quote.burn_units,
            burned = %quote.burn_amount,
            settled = %quote.expected_settlement,
            "forward burn settled"
        );
        Ok(receipt)
    }
}
