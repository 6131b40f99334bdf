//! Rota Executor - Serialized Front Door
//!
//! Wraps the synchronous engines of `rota-core` for async callers.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │                 RotaExecutor                 │
//! │   claim · forward_burn · swap legs · queries │
//! │                      │                       │
//! │        tokio::sync::Mutex<LedgerStore>       │
//! │             │                  │             │
//! │      AirdropEngine      SettlementEngine     │
//! └──────────────────────────────────────────────┘
//!                        │
//!                        ▼
//!    ScheduleOracle · HoldingLedger · RateOracle · AssetLedger
//! ```
//!
//! One mutation at a time, globally. Forward burns can wait out pricing
//! unavailability with [`RotaExecutor::forward_burn_with_retry`].
//!
//! # Usage Example
//!
//! ```ignore
//! use rota_executor::{init_logging, Collaborators, ExecutorConfig, LogConfig, RotaExecutor};
//!
//! async fn example(collaborators: Collaborators) {
//!     init_logging(&LogConfig::from_env()).unwrap();
//!     let executor = RotaExecutor::in_memory(ExecutorConfig::from_env(), collaborators).unwrap();
//!
//!     let participant = rota_core::ParticipantId::new("participant:1");
//!     let receipt = executor.claim(&participant).await.unwrap();
//!     println!("claimed {} in cycle {}", receipt.amount, receipt.cycle);
//! }
//! ```

pub mod error;
pub mod executor;
pub mod telemetry;

pub use error::{ExecutorError, ExecutorResult};
pub use executor::{Collaborators, ExecutorConfig, ExecutorStats, PricingRetryConfig, RotaExecutor};
pub use telemetry::{init_logging, LogConfig, LogFormat, LogLevel};

// Re-export common types from rota-core
pub use rota_core::{
    AssetId, BurnQuote, ClaimReceipt, Claimable, EngineConfig, ParticipantId, RotaError,
    SettlementReceipt, SwapQuote,
};

/// Executor version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
