//! Airdrop Distribution
//!
//! Once-per-unit-per-cycle claims of today's reward asset.
//!
//! # Claim pipeline
//!
//! ```text
//! schedule gates ──► holdings ──► consumption ledger ──► inventory check
//!                                                              │
//!        ClaimReceipt ◄── disburse ◄── day stats ◄── commit ◄──┘
//! ```
//!
//! Ledger writes are committed before the disbursement. A rejected
//! disbursement restores the prior values.

mod engine;

pub use engine::*;
