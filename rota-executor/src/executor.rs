//! Rota Executor
//!
//! Serializes every engine call through a single store lock and stamps
//! wall-clock time.

use std::env;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};

use rota_core::{
    AirdropEngine, Amount, AssetId, AssetLedger, BurnQuote, ClaimReceipt, Claimable, Cycle,
    DayIndex, EngineConfig, HoldingLedger, LedgerStore, MemoryLedgerStore, ParticipantId,
    RateOracle, RateView, ScheduleOracle, SettlementEngine, SettlementReceipt,
    StoreStats, SwapQuote,
};

use crate::error::{ExecutorError, ExecutorResult};

/// Pricing retry configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingRetryConfig {
    /// Total attempts, including the first
    pub max_attempts: u32,
    /// Delay between attempts in milliseconds
    pub delay_ms: u64,
}

impl Default for PricingRetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay_ms: 500,
        }
    }
}

/// Executor configuration
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutorConfig {
    pub engine: EngineConfig,
    #[serde(default)]
    pub pricing_retry: PricingRetryConfig,
}

impl ExecutorConfig {
    pub fn new(engine: EngineConfig) -> Self {
        Self {
            engine,
            pricing_retry: PricingRetryConfig::default(),
        }
    }

    /// Load configuration from environment variables
    ///
    /// Engine settings as in [`EngineConfig::from_env`], plus:
    /// - ROTA_PRICING_RETRY_ATTEMPTS: Total forward burn attempts
    /// - ROTA_PRICING_RETRY_DELAY_MS: Delay between attempts
    pub fn from_env() -> Self {
        let defaults = PricingRetryConfig::default();
        Self {
            engine: EngineConfig::from_env(),
            pricing_retry: PricingRetryConfig {
                max_attempts: env::var("ROTA_PRICING_RETRY_ATTEMPTS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(defaults.max_attempts),
                delay_ms: env::var("ROTA_PRICING_RETRY_DELAY_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(defaults.delay_ms),
            },
        }
    }

    pub fn with_pricing_retry(mut self, max_attempts: u32, delay_ms: u64) -> Self {
        self.pricing_retry = PricingRetryConfig {
            max_attempts,
            delay_ms,
        };
        self
    }

    pub fn validate(&self) -> ExecutorResult<()> {
        self.engine.validate()?;
        if self.pricing_retry.max_attempts == 0 {
            return Err(ExecutorError::Configuration(
                "pricing_retry.max_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// External collaborators shared by both engines
#[derive(Clone)]
pub struct Collaborators {
    pub schedule: Arc<dyn ScheduleOracle>,
    pub holdings: Arc<dyn HoldingLedger>,
    pub rates: Arc<dyn RateOracle>,
    pub assets: Arc<dyn AssetLedger>,
}

/// Executor statistics
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutorStats {
    pub claims: u64,
    pub forward_burns: u64,
    pub swaps_to_settlement: u64,
    pub swaps_to_reward: u64,
    /// Rejected mutating calls
    pub rejections: u64,
    pub pricing_retries: u64,
    /// Reward asset disbursed by claims
    pub total_claimed: Amount,
    /// Reward asset burned
    pub total_burned: Amount,
    /// Settlement asset paid out by forward burns
    pub total_settled: Amount,
}

/// Rota executor
pub struct RotaExecutor<S: LedgerStore = MemoryLedgerStore> {
    config: ExecutorConfig,
    airdrop: AirdropEngine,
    settlement: SettlementEngine,
    store: Mutex<S>,
    stats: RwLock<ExecutorStats>,
}

impl RotaExecutor<MemoryLedgerStore> {
    /// Executor over an in-memory store
    pub fn in_memory(config: ExecutorConfig, collaborators: Collaborators) -> ExecutorResult<Self> {
        Self::new(config, collaborators, MemoryLedgerStore::new())
    }
}

impl<S: LedgerStore> RotaExecutor<S> {
    /// Create new executor
    pub fn new(config: ExecutorConfig, collaborators: Collaborators, store: S) -> ExecutorResult<Self> {
        config.validate()?;
        let engine_config = Arc::new(config.engine.clone());

        let airdrop = AirdropEngine::new(
            engine_config.clone(),
            collaborators.schedule.clone(),
            collaborators.holdings.clone(),
            collaborators.assets.clone(),
        );
        let settlement = SettlementEngine::new(
            engine_config,
            collaborators.schedule,
            collaborators.holdings,
            collaborators.rates,
            collaborators.assets,
        );

        info!(
            settlement_asset = %config.engine.settlement_asset,
            per_unit = %config.engine.per_unit_amount,
            max_cycles = config.engine.max_cycles,
            "rota executor ready"
        );

        Ok(Self {
            config,
            airdrop,
            settlement,
            store: Mutex::new(store),
            stats: RwLock::new(ExecutorStats::default()),
        })
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    async fn update_stats(&self, f: impl FnOnce(&mut ExecutorStats)) {
        let mut stats = self.stats.write().await;
        f(&mut *stats);
    }

    async fn track<T>(
        &self,
        result: rota_core::RotaResult<T>,
        on_success: impl FnOnce(&mut ExecutorStats, &T),
    ) -> ExecutorResult<T> {
        match result {
            Ok(value) => {
                self.update_stats(|stats| on_success(stats, &value)).await;
                Ok(value)
            }
            Err(e) => {
                self.update_stats(|stats| stats.rejections += 1).await;
                Err(e.into())
            }
        }
    }

    // ==================== Distribution ====================

    /// Claim newly available units of today's asset
    pub async fn claim(&self, participant: &ParticipantId) -> ExecutorResult<ClaimReceipt> {
        self.claim_at(participant, Utc::now()).await
    }

    /// Claim with an explicit timestamp
    pub async fn claim_at(
        &self,
        participant: &ParticipantId,
        now: DateTime<Utc>,
    ) -> ExecutorResult<ClaimReceipt> {
        let result = {
            let mut store = self.store.lock().await;
            self.airdrop.claim(&mut *store, participant, now)
        };
        self.track(result, |stats, receipt| {
            stats.claims += 1;
            stats.total_claimed = stats.total_claimed.saturating_add(receipt.amount);
        })
        .await
    }

    pub async fn claimable(&self, asset: &AssetId, participant: &ParticipantId) -> ExecutorResult<Claimable> {
        let store = self.store.lock().await;
        Ok(self.airdrop.claimable(&*store, asset, participant)?)
    }

    pub async fn consumed_units(
        &self,
        asset: &AssetId,
        participant: &ParticipantId,
        cycle: Cycle,
    ) -> ExecutorResult<u64> {
        let store = self.store.lock().await;
        Ok(self.airdrop.consumed_units(&*store, asset, participant, cycle)?)
    }

    pub async fn consumed_units_current_cycle(
        &self,
        asset: &AssetId,
        participant: &ParticipantId,
    ) -> ExecutorResult<u64> {
        let store = self.store.lock().await;
        Ok(self
            .airdrop
            .consumed_units_current_cycle(&*store, asset, participant)?)
    }

    // ==================== Day Statistics ====================

    pub fn day_index(&self, at: DateTime<Utc>) -> ExecutorResult<DayIndex> {
        Ok(self.airdrop.day_index(at)?)
    }

    pub async fn day_stats(&self, day: DayIndex) -> ExecutorResult<(Amount, u64)> {
        let store = self.store.lock().await;
        Ok(self.airdrop.day_stats(&*store, day)?)
    }

    pub async fn token_day_stats(&self, asset: &AssetId, day: DayIndex) -> ExecutorResult<(Amount, u64)> {
        let store = self.store.lock().await;
        Ok(self.airdrop.token_day_stats(&*store, asset, day)?)
    }

    // ==================== Settlement ====================

    pub fn rate(&self, asset: &AssetId) -> ExecutorResult<RateView> {
        Ok(self.settlement.rate(asset)?)
    }

    pub async fn quote_forward_burn(&self, participant: &ParticipantId) -> ExecutorResult<BurnQuote> {
        let store = self.store.lock().await;
        Ok(self.settlement.quote_forward_burn(&*store, participant)?)
    }

    pub async fn forward_burn(&self, participant: &ParticipantId) -> ExecutorResult<SettlementReceipt> {
        let result = {
            let mut store = self.store.lock().await;
            self.settlement.forward_burn(&mut *store, participant, Utc::now())
        };
        self.track(result, |stats, receipt| {
            stats.forward_burns += 1;
            stats.total_burned = stats.total_burned.saturating_add(receipt.amount_in);
            stats.total_settled = stats.total_settled.saturating_add(receipt.amount_out);
        })
        .await
    }

    /// Forward burn, waiting out pricing unavailability.
    ///
    /// The store lock is released between attempts.
    pub async fn forward_burn_with_retry(
        &self,
        participant: &ParticipantId,
    ) -> ExecutorResult<SettlementReceipt> {
        let retry = &self.config.pricing_retry;
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            match self.forward_burn(participant).await {
                Err(ExecutorError::Engine(e)) if e.is_retryable() => {
                    if attempt >= retry.max_attempts {
                        warn!(participant = %participant, attempts = attempt, error = %e, "pricing retries exhausted");
                        return Err(ExecutorError::RetryExhausted {
                            attempts: attempt,
                            last_error: e,
                        });
                    }
                    warn!(
                        participant = %participant,
                        attempt,
                        max_attempts = retry.max_attempts,
                        error = %e,
                        "pricing unavailable, retrying"
                    );
                    self.update_stats(|stats| stats.pricing_retries += 1).await;
                    tokio::time::sleep(Duration::from_millis(retry.delay_ms)).await;
                }
                other => return other,
            }
        }
    }

    pub async fn quote_swap_to_settlement(
        &self,
        participant: &ParticipantId,
        amount_in: Amount,
    ) -> ExecutorResult<SwapQuote> {
        Ok(self.settlement.quote_swap_to_settlement(participant, amount_in)?)
    }

    pub async fn swap_to_settlement(
        &self,
        participant: &ParticipantId,
        amount_in: Amount,
    ) -> ExecutorResult<SettlementReceipt> {
        let result = {
            let mut store = self.store.lock().await;
            self.settlement
                .swap_to_settlement(&mut *store, participant, amount_in, Utc::now())
        };
        self.track(result, |stats, _| stats.swaps_to_settlement += 1).await
    }

    pub async fn quote_swap_to_reward(&self, participant: &ParticipantId) -> ExecutorResult<SwapQuote> {
        let store = self.store.lock().await;
        Ok(self.settlement.quote_swap_to_reward(&*store, participant)?)
    }

    pub async fn swap_to_reward(&self, participant: &ParticipantId) -> ExecutorResult<SettlementReceipt> {
        let result = {
            let mut store = self.store.lock().await;
            self.settlement
                .swap_to_reward(&mut *store, participant, Utc::now())
        };
        self.track(result, |stats, _| stats.swaps_to_reward += 1).await
    }

    pub async fn step_one_balance(
        &self,
        asset: &AssetId,
        participant: &ParticipantId,
        cycle: Cycle,
    ) -> ExecutorResult<Amount> {
        let store = self.store.lock().await;
        Ok(self.settlement.step_one_balance(&*store, asset, participant, cycle)?)
    }

    pub async fn burned_units(
        &self,
        asset: &AssetId,
        participant: &ParticipantId,
        cycle: Cycle,
    ) -> ExecutorResult<u64> {
        let store = self.store.lock().await;
        Ok(self.settlement.burned_units(&*store, asset, participant, cycle)?)
    }

    // ==================== Stats ====================

    /// Get executor statistics
    pub async fn stats(&self) -> ExecutorStats {
        self.stats.read().await.clone()
    }

    pub async fn store_stats(&self) -> ExecutorResult<StoreStats> {
        let store = self.store.lock().await;
        Ok(store.stats()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rota_core::testing::{FakeAssetLedger, FakeHoldings, FakeRates, FakeSchedule};
    use rota_core::RotaError;

    fn reward() -> AssetId {
        AssetId::new("reward")
    }

    fn settlement() -> AssetId {
        AssetId::new("settlement")
    }

    fn alice() -> ParticipantId {
        ParticipantId::new("alice")
    }

    struct Setup {
        schedule: Arc<FakeSchedule>,
        holdings: Arc<FakeHoldings>,
        rates: Arc<FakeRates>,
        executor: RotaExecutor,
    }

    fn setup(config: ExecutorConfig) -> Setup {
        let schedule = Arc::new(FakeSchedule::forward(reward()));
        let holdings = Arc::new(FakeHoldings::default());
        let rates = Arc::new(FakeRates::new());
        let assets = Arc::new(FakeAssetLedger::new());
        rates.set_pool(reward(), settlement(), 1_000_000, 2_000_000);
        assets.fund(&reward(), 1_000_000);
        assets.fund(&settlement(), 1_000_000);

        let executor = RotaExecutor::in_memory(
            config,
            Collaborators {
                schedule: schedule.clone(),
                holdings: holdings.clone(),
                rates: rates.clone(),
                assets,
            },
        )
        .unwrap();
        Setup {
            schedule,
            holdings,
            rates,
            executor,
        }
    }

    fn config() -> ExecutorConfig {
        ExecutorConfig::new(EngineConfig::new(settlement())).with_pricing_retry(3, 100)
    }

    #[test]
    fn test_executor_config_default() {
        let config = ExecutorConfig::default();
        assert_eq!(config.pricing_retry.max_attempts, 3);
        assert_eq!(config.pricing_retry.delay_ms, 500);
        assert!(config.validate().is_ok());
        assert!(config.with_pricing_retry(0, 1).validate().is_err());
    }

    #[tokio::test]
    async fn test_claim_updates_stats() {
        let s = setup(config());
        s.holdings.set_units(&alice(), 3);

        let receipt = s.executor.claim(&alice()).await.unwrap();
        assert_eq!(receipt.amount, 30_000);
        assert!(s.executor.claim(&alice()).await.is_err());

        let stats = s.executor.stats().await;
        assert_eq!(stats.claims, 1);
        assert_eq!(stats.rejections, 1);
        assert_eq!(stats.total_claimed, 30_000);
        assert_eq!(s.executor.store_stats().await.unwrap().consumption_records, 1);
    }

    #[tokio::test]
    async fn test_engine_reason_preserved() {
        let s = setup(config());
        s.schedule.set_paused(true);
        let err = s.executor.claim(&alice()).await.unwrap_err();
        assert!(matches!(err, ExecutorError::Engine(RotaError::Paused)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_exhausted() {
        let s = setup(config());
        s.holdings.set_units(&alice(), 3);
        s.executor.claim(&alice()).await.unwrap();
        s.rates.remove_pool(&reward(), &settlement());

        let err = s.executor.forward_burn_with_retry(&alice()).await.unwrap_err();
        match err {
            ExecutorError::RetryExhausted { attempts, last_error } => {
                assert_eq!(attempts, 3);
                assert!(last_error.is_retryable());
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(s.executor.stats().await.pricing_retries, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_recovers_when_pool_returns() {
        let s = setup(config());
        s.holdings.set_units(&alice(), 3);
        s.executor.claim(&alice()).await.unwrap();
        s.rates.remove_pool(&reward(), &settlement());

        let rates = s.rates.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            rates.set_pool(reward(), settlement(), 1_000_000, 2_000_000);
        });

        let receipt = s.executor.forward_burn_with_retry(&alice()).await.unwrap();
        assert_eq!(receipt.amount_out, 36_000);
        assert_eq!(s.executor.stats().await.forward_burns, 1);
    }

    #[tokio::test]
    async fn test_non_pricing_errors_not_retried() {
        let s = setup(config());
        let err = s.executor.forward_burn_with_retry(&alice()).await.unwrap_err();
        assert!(matches!(
            err,
            ExecutorError::Engine(RotaError::NothingToBurn { .. })
        ));
        assert_eq!(s.executor.stats().await.pricing_retries, 0);
    }
}
