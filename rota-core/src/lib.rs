//! Rota Core - Cycle-Scoped Consumption and Settlement
//!
//! Rota rotates a reward asset through a daily schedule. Participants holding
//! whole holding units may, once per unit per cycle and while the asset's
//! window is open:
//! - **Claim**: receive a fixed per-unit amount of today's reward asset
//! - **Settle forward**: burn reward asset for settlement asset at twice the
//!   live pool ratio (forward phase)
//! - **Settle reverse**: swap reward asset for settlement asset, then swap
//!   that recorded amount back (reverse phase)
//!
//! # Invariants
//!
//! | Invariant | Requirement |
//! |-----------|-------------|
//! | **Exactly once per unit** | `consumed_units` never decreases; disbursed == consumed × per-unit amount |
//! | **Phase exclusion** | Claims and forward burns only in forward phase; reverse legs only in reverse phase |
//! | **Leg ordering** | Reverse leg 2 requires a positive leg 1 balance |
//! | **Bounded lifetime** | Cycles past `max_cycles` are permanently ineligible |
//! | **Effects first** | Ledger writes precede asset movement; a rejected movement restores them |
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │                 rota-executor (serialized front door)         │
//! ├───────────────────────────────────────────────────────────────┤
//! │   AirdropEngine        SettlementEngine      DayIndexAggregator│
//! │        │                      │                     │         │
//! │        └──────────── LedgerStore (injected) ────────┘         │
//! ├───────────────────────────────────────────────────────────────┤
//! │ ScheduleOracle │ HoldingLedger │ RateOracle │ AssetLedger      │
//! └───────────────────────────────────────────────────────────────┘
//! ```

pub mod error;
pub mod types;
pub mod calendar;
pub mod config;
pub mod math;
pub mod oracle;
pub mod gate;
pub mod storage;
pub mod stats;
pub mod airdrop;
pub mod settlement;
pub mod testing;

// Re-export error types
pub use error::{ErrorClass, RateUnavailable, RotaError, RotaResult};

// Re-export all types
pub use types::*;

pub use calendar::DayCutover;
pub use config::EngineConfig;
pub use math::{ExchangeRate, RATE_SCALE};
pub use oracle::{
    AssetLedger, HoldingLedger, RateOracle, ReserveSnapshot, ScheduleOracle, TodayAsset,
    TransferLeg,
};
pub use gate::ScheduleGate;
pub use storage::{LedgerStore, MemoryLedgerStore, StoreStats};
pub use stats::DayIndexAggregator;
pub use airdrop::AirdropEngine;
pub use settlement::{RateView, SettlementEngine};

/// Rota version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
