//! Rota Error Codes Registry
//!
//! Error code format: ROTA-{class}-{sequence}
//! - ROTA-AUTH: Authorization/state failures (paused, wrong phase, lifetime)
//! - ROTA-FUNDS: Insufficiency failures (units, inventory, allowance)
//! - ROTA-ORDER: Ordering failures (reverse step 2 before step 1)
//! - ROTA-PRICE: Pricing failures (no pool, no liquidity, reserve mismatch)
//! - ROTA-MATH / ROTA-XFER / ROTA-STORE: Internal failures

use crate::types::{Amount, AssetId, Cycle, ParticipantId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Rota Result type
pub type RotaResult<T> = Result<T, RotaError>;

/// Rota Error type
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RotaError {
    // ============================================================
    // Authorization / State Errors (ROTA-AUTH-*)
    // ============================================================
    /// [ROTA-AUTH-001] System-wide pause flag is set
    #[error("[ROTA-AUTH-001] Distribution is paused")]
    Paused,

    /// [ROTA-AUTH-002] No reward asset is active today
    #[error("[ROTA-AUTH-002] No reward asset is active today")]
    NoActiveAsset,

    /// [ROTA-AUTH-003] Reward window is closed
    #[error("[ROTA-AUTH-003] Reward window for {asset} is closed")]
    WindowClosed { asset: AssetId },

    /// [ROTA-AUTH-004] Asset not recognized by the schedule
    #[error("[ROTA-AUTH-004] Asset {asset} is not supported")]
    UnsupportedAsset { asset: AssetId },

    /// [ROTA-AUTH-005] Forward operation attempted during reverse phase
    #[error("[ROTA-AUTH-005] {asset} is in reverse phase")]
    ReversePhase { asset: AssetId },

    /// [ROTA-AUTH-006] Reverse operation attempted during forward phase
    #[error("[ROTA-AUTH-006] {asset} is in forward phase")]
    ForwardPhase { asset: AssetId },

    /// [ROTA-AUTH-007] Asset has exhausted its lifetime cycle count
    #[error("[ROTA-AUTH-007] {asset} cycle {cycle} exceeds lifetime of {max_cycles} cycles")]
    LifetimeExhausted {
        asset: AssetId,
        cycle: Cycle,
        max_cycles: Cycle,
    },

    /// [ROTA-AUTH-008] Global participant cap reached
    #[error("[ROTA-AUTH-008] Participant cap of {cap} reached")]
    ParticipantCapReached { cap: u64 },

    // ============================================================
    // Insufficiency Errors (ROTA-FUNDS-*)
    // ============================================================
    /// [ROTA-FUNDS-001] Participant holds no active units
    #[error("[ROTA-FUNDS-001] {participant} holds no active units")]
    NoActiveUnits { participant: ParticipantId },

    /// [ROTA-FUNDS-002] Every active unit is already consumed this cycle
    #[error("[ROTA-FUNDS-002] No new units: {active} active, {consumed} already consumed")]
    NoNewUnits { active: u64, consumed: u64 },

    /// [ROTA-FUNDS-003] Engine inventory below required amount
    #[error("[ROTA-FUNDS-003] Insufficient {asset} inventory: required {required}, available {available}")]
    InsufficientInventory {
        asset: AssetId,
        required: Amount,
        available: Amount,
    },

    /// [ROTA-FUNDS-004] Engine authorization below required amount
    #[error("[ROTA-FUNDS-004] Insufficient {asset} allowance: required {required}, available {available}")]
    InsufficientAllowance {
        asset: AssetId,
        required: Amount,
        available: Amount,
    },

    /// [ROTA-FUNDS-005] Participant balance below required amount
    #[error("[ROTA-FUNDS-005] {participant} {asset} balance too low: required {required}, available {available}")]
    InsufficientBalance {
        asset: AssetId,
        participant: ParticipantId,
        required: Amount,
        available: Amount,
    },

    /// [ROTA-FUNDS-006] No claimed-but-unburned units this cycle
    #[error("[ROTA-FUNDS-006] Nothing to burn: {consumed} consumed, {burned} already burned")]
    NothingToBurn { consumed: u64, burned: u64 },

    // ============================================================
    // Ordering Errors (ROTA-ORDER-*)
    // ============================================================
    /// [ROTA-ORDER-001] Reverse step 2 requested without a step 1 balance
    #[error("[ROTA-ORDER-001] {participant} has no step-one settlement balance for {asset} cycle {cycle}")]
    StepOneRequired {
        asset: AssetId,
        participant: ParticipantId,
        cycle: Cycle,
    },

    // ============================================================
    // Pricing Errors (ROTA-PRICE-*)
    // ============================================================
    /// [ROTA-PRICE-001] Live rate cannot be derived
    #[error("[ROTA-PRICE-001] Rate for {asset} unavailable: {reason}")]
    RateUnavailable {
        asset: AssetId,
        reason: RateUnavailable,
    },

    /// [ROTA-PRICE-002] Rate exists but yields nothing for this size
    #[error("[ROTA-PRICE-002] {operation} of {amount_in} yields zero at current reserves")]
    ZeroOutput { operation: String, amount_in: Amount },

    // ============================================================
    // Internal Errors
    // ============================================================
    /// [ROTA-MATH-001] Checked arithmetic overflowed
    #[error("[ROTA-MATH-001] Arithmetic overflow in {context}")]
    ArithmeticOverflow { context: String },

    /// [ROTA-XFER-001] Asset ledger rejected a transfer batch
    #[error("[ROTA-XFER-001] Transfer failed during {operation}: {reason}")]
    TransferFailed { operation: String, reason: String },

    /// [ROTA-STORE-001] Ledger store failure
    #[error("[ROTA-STORE-001] Storage error: {0}")]
    Storage(String),

    /// Invalid amount
    #[error("Invalid amount: {reason}")]
    InvalidAmount { reason: String },

    /// Invalid state reported by a collaborator
    #[error("Invalid state: {reason}")]
    InvalidState { reason: String },

    /// Timestamp outside the representable day range
    #[error("Invalid timestamp: {reason}")]
    InvalidTimestamp { reason: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Invariant violation
    #[error("Invariant violation: {invariant} - {details}")]
    InvariantViolation { invariant: String, details: String },
}

/// Why the live rate could not be derived
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateUnavailable {
    /// No pool exists for the pair
    NoPool,
    /// Pool exists but one side holds no reserve
    NoLiquidity,
    /// Pool reports a token pair other than the one requested
    ReserveMismatch,
}

impl std::fmt::Display for RateUnavailable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RateUnavailable::NoPool => write!(f, "no_pool"),
            RateUnavailable::NoLiquidity => write!(f, "no_liquidity"),
            RateUnavailable::ReserveMismatch => write!(f, "reserve_mismatch"),
        }
    }
}

/// Failure taxonomy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// Paused, unsupported, wrong phase, lifetime exhausted
    Authorization,
    /// Units, inventory, allowance or balance shortfall
    Insufficiency,
    /// Second settlement leg before the first
    Ordering,
    /// Rate temporarily unavailable
    Pricing,
    /// Arithmetic, storage, transfer or configuration faults
    Internal,
}

impl RotaError {
    /// Create an overflow error
    pub fn overflow(context: impl Into<String>) -> Self {
        Self::ArithmeticOverflow {
            context: context.into(),
        }
    }

    /// Create an invariant violation error
    pub fn invariant(invariant: impl Into<String>, details: impl Into<String>) -> Self {
        Self::InvariantViolation {
            invariant: invariant.into(),
            details: details.into(),
        }
    }

    /// A rejected call whose ledger restore also failed
    pub fn restore_failed(original: &RotaError, restore: &RotaError) -> Self {
        Self::invariant(
            "ledger restored after rejected transfer",
            format!("{}; restore failed: {}", original, restore),
        )
    }

    /// Create a transfer failure error
    pub fn transfer_failed(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::TransferFailed {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    /// Classify the error
    pub fn class(&self) -> ErrorClass {
        match self {
            RotaError::Paused
            | RotaError::NoActiveAsset
            | RotaError::WindowClosed { .. }
            | RotaError::UnsupportedAsset { .. }
            | RotaError::ReversePhase { .. }
            | RotaError::ForwardPhase { .. }
            | RotaError::LifetimeExhausted { .. }
            | RotaError::ParticipantCapReached { .. } => ErrorClass::Authorization,

            RotaError::NoActiveUnits { .. }
            | RotaError::NoNewUnits { .. }
            | RotaError::InsufficientInventory { .. }
            | RotaError::InsufficientAllowance { .. }
            | RotaError::InsufficientBalance { .. }
            | RotaError::NothingToBurn { .. } => ErrorClass::Insufficiency,

            RotaError::StepOneRequired { .. } => ErrorClass::Ordering,

            RotaError::RateUnavailable { .. } | RotaError::ZeroOutput { .. } => {
                ErrorClass::Pricing
            }

            RotaError::ArithmeticOverflow { .. }
            | RotaError::TransferFailed { .. }
            | RotaError::Storage(_)
            | RotaError::InvalidAmount { .. }
            | RotaError::InvalidState { .. }
            | RotaError::InvalidTimestamp { .. }
            | RotaError::Configuration(_)
            | RotaError::SerializationError(_)
            | RotaError::InvariantViolation { .. } => ErrorClass::Internal,
        }
    }

    /// Pricing failures clear on their own; nothing else does
    pub fn is_retryable(&self) -> bool {
        self.class() == ErrorClass::Pricing
    }

    /// Registry code, e.g. `ROTA-AUTH-001`
    pub fn code(&self) -> Option<&'static str> {
        let code = match self {
            RotaError::Paused => "ROTA-AUTH-001",
            RotaError::NoActiveAsset => "ROTA-AUTH-002",
            RotaError::WindowClosed { .. } => "ROTA-AUTH-003",
            RotaError::UnsupportedAsset { .. } => "ROTA-AUTH-004",
            RotaError::ReversePhase { .. } => "ROTA-AUTH-005",
            RotaError::ForwardPhase { .. } => "ROTA-AUTH-006",
            RotaError::LifetimeExhausted { .. } => "ROTA-AUTH-007",
            RotaError::ParticipantCapReached { .. } => "ROTA-AUTH-008",
            RotaError::NoActiveUnits { .. } => "ROTA-FUNDS-001",
            RotaError::NoNewUnits { .. } => "ROTA-FUNDS-002",
            RotaError::InsufficientInventory { .. } => "ROTA-FUNDS-003",
            RotaError::InsufficientAllowance { .. } => "ROTA-FUNDS-004",
            RotaError::InsufficientBalance { .. } => "ROTA-FUNDS-005",
            RotaError::NothingToBurn { .. } => "ROTA-FUNDS-006",
            RotaError::StepOneRequired { .. } => "ROTA-ORDER-001",
            RotaError::RateUnavailable { .. } => "ROTA-PRICE-001",
            RotaError::ZeroOutput { .. } => "ROTA-PRICE-002",
            RotaError::ArithmeticOverflow { .. } => "ROTA-MATH-001",
            RotaError::TransferFailed { .. } => "ROTA-XFER-001",
            RotaError::Storage(_) => "ROTA-STORE-001",
            _ => return None,
        };
        Some(code)
    }
}

impl From<serde_json::Error> for RotaError {
    fn from(err: serde_json::Error) -> Self {
        RotaError::SerializationError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classes() {
        assert_eq!(RotaError::Paused.class(), ErrorClass::Authorization);
        assert_eq!(
            RotaError::NoNewUnits { active: 3, consumed: 3 }.class(),
            ErrorClass::Insufficiency
        );
        assert_eq!(
            RotaError::StepOneRequired {
                asset: AssetId::new("asset:a"),
                participant: ParticipantId::new("p:1"),
                cycle: 1,
            }
            .class(),
            ErrorClass::Ordering
        );
        assert_eq!(
            RotaError::RateUnavailable {
                asset: AssetId::new("asset:a"),
                reason: RateUnavailable::NoLiquidity,
            }
            .class(),
            ErrorClass::Pricing
        );
    }

    #[test]
    fn test_only_pricing_is_retryable() {
        let pricing = RotaError::RateUnavailable {
            asset: AssetId::new("asset:a"),
            reason: RateUnavailable::NoPool,
        };
        assert!(pricing.is_retryable());
        assert!(!RotaError::Paused.is_retryable());
        assert!(!RotaError::NoNewUnits { active: 1, consumed: 1 }.is_retryable());
    }

    #[test]
    fn test_message_carries_code() {
        let err = RotaError::NoNewUnits { active: 3, consumed: 3 };
        assert!(err.to_string().starts_with("[ROTA-FUNDS-002]"));
        assert_eq!(err.code(), Some("ROTA-FUNDS-002"));
        assert_eq!(RotaError::Configuration("x".into()).code(), None);
    }

    #[test]
    fn test_rate_unavailable_display() {
        assert_eq!(RateUnavailable::NoPool.to_string(), "no_pool");
        assert_eq!(RateUnavailable::ReserveMismatch.to_string(), "reserve_mismatch");
    }
}
