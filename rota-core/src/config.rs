//! Engine Configuration
//!
//! Constants shared by the distribution and settlement engines.
//! Supports loading from environment variables with ROTA_ prefix.

use crate::calendar::DayCutover;
use crate::error::{RotaError, RotaResult};
use crate::types::{Amount, AssetId, Cycle};
use serde::{Deserialize, Serialize};
use std::env;

/// Reward asset issued per holding unit on claim
pub const DEFAULT_PER_UNIT_AMOUNT: Amount = 10_000;

/// Reward asset burnable per holding unit on forward settlement
pub const DEFAULT_TOKENS_PER_UNIT: Amount = 3_000;

/// Lifetime of a reward asset, in cycles
pub const DEFAULT_MAX_CYCLES: Cycle = 20;

/// Pool fee in per-mille (3 = 0.3%)
pub const DEFAULT_SWAP_FEE_PER_MILLE: u32 = 3;

/// Forward settlement incentive multiplier
pub const DEFAULT_FORWARD_MULTIPLIER: u32 = 2;

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// The single settlement asset for every settlement leg
    pub settlement_asset: AssetId,
    /// Reward asset disbursed per newly claimed unit
    #[serde(default = "default_per_unit_amount")]
    pub per_unit_amount: Amount,
    /// Reward asset burned per unit in forward settlement
    #[serde(default = "default_tokens_per_unit")]
    pub tokens_per_unit: Amount,
    /// Last eligible cycle of any reward asset
    #[serde(default = "default_max_cycles")]
    pub max_cycles: Cycle,
    /// Constant-product fee, per-mille
    #[serde(default = "default_swap_fee")]
    pub swap_fee_per_mille: u32,
    /// Forward settlement multiplier applied to the market value
    #[serde(default = "default_forward_multiplier")]
    pub forward_multiplier: u32,
    /// Daily boundary for day-indexed statistics
    #[serde(default)]
    pub day_cutover: DayCutover,
}

fn default_per_unit_amount() -> Amount {
    DEFAULT_PER_UNIT_AMOUNT
}

fn default_tokens_per_unit() -> Amount {
    DEFAULT_TOKENS_PER_UNIT
}

fn default_max_cycles() -> Cycle {
    DEFAULT_MAX_CYCLES
}

fn default_swap_fee() -> u32 {
    DEFAULT_SWAP_FEE_PER_MILLE
}

fn default_forward_multiplier() -> u32 {
    DEFAULT_FORWARD_MULTIPLIER
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            settlement_asset: AssetId::new("settlement"),
            per_unit_amount: DEFAULT_PER_UNIT_AMOUNT,
            tokens_per_unit: DEFAULT_TOKENS_PER_UNIT,
            max_cycles: DEFAULT_MAX_CYCLES,
            swap_fee_per_mille: DEFAULT_SWAP_FEE_PER_MILLE,
            forward_multiplier: DEFAULT_FORWARD_MULTIPLIER,
            day_cutover: DayCutover::default(),
        }
    }
}

impl EngineConfig {
    /// Create a configuration for the given settlement asset
    pub fn new(settlement_asset: AssetId) -> Self {
        Self {
            settlement_asset,
            ..Default::default()
        }
    }

    /// Load configuration from environment variables
    ///
    /// Environment variables:
    /// - ROTA_SETTLEMENT_ASSET: Settlement asset identifier
    /// - ROTA_PER_UNIT_AMOUNT: Reward asset per claimed unit
    /// - ROTA_TOKENS_PER_UNIT: Reward asset burned per unit
    /// - ROTA_MAX_CYCLES: Lifetime cycle bound
    /// - ROTA_SWAP_FEE_PER_MILLE: Pool fee (per-mille)
    /// - ROTA_FORWARD_MULTIPLIER: Forward settlement multiplier
    /// - ROTA_CUTOVER_HOUR / ROTA_CUTOVER_MINUTE: Local cutover time
    /// - ROTA_UTC_OFFSET_SECS: Cutover zone offset east of UTC
    ///
    /// Unset or unparsable variables fall back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let cutover = defaults.day_cutover;

        Self {
            settlement_asset: env::var("ROTA_SETTLEMENT_ASSET")
                .map(AssetId::new)
                .unwrap_or(defaults.settlement_asset),
            per_unit_amount: parse_env("ROTA_PER_UNIT_AMOUNT")
                .unwrap_or(defaults.per_unit_amount),
            tokens_per_unit: parse_env("ROTA_TOKENS_PER_UNIT")
                .unwrap_or(defaults.tokens_per_unit),
            max_cycles: parse_env("ROTA_MAX_CYCLES").unwrap_or(defaults.max_cycles),
            swap_fee_per_mille: parse_env("ROTA_SWAP_FEE_PER_MILLE")
                .unwrap_or(defaults.swap_fee_per_mille),
            forward_multiplier: parse_env("ROTA_FORWARD_MULTIPLIER")
                .unwrap_or(defaults.forward_multiplier),
            day_cutover: DayCutover {
                hour: parse_env("ROTA_CUTOVER_HOUR").unwrap_or(cutover.hour),
                minute: parse_env("ROTA_CUTOVER_MINUTE").unwrap_or(cutover.minute),
                utc_offset_secs: parse_env("ROTA_UTC_OFFSET_SECS")
                    .unwrap_or(cutover.utc_offset_secs),
            },
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> RotaResult<()> {
        if self.settlement_asset.as_str().is_empty() {
            return Err(RotaError::Configuration(
                "settlement_asset must not be empty".to_string(),
            ));
        }
        if self.per_unit_amount == 0 {
            return Err(RotaError::Configuration(
                "per_unit_amount must be positive".to_string(),
            ));
        }
        if self.tokens_per_unit == 0 {
            return Err(RotaError::Configuration(
                "tokens_per_unit must be positive".to_string(),
            ));
        }
        if self.max_cycles == 0 {
            return Err(RotaError::Configuration(
                "max_cycles must be at least 1".to_string(),
            ));
        }
        if self.swap_fee_per_mille >= 1000 {
            return Err(RotaError::Configuration(format!(
                "swap_fee_per_mille {} must be below 1000",
                self.swap_fee_per_mille
            )));
        }
        if self.forward_multiplier == 0 {
            return Err(RotaError::Configuration(
                "forward_multiplier must be positive".to_string(),
            ));
        }
        self.day_cutover.validate()
    }
}

fn parse_env<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|s| s.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.per_unit_amount, 10_000);
        assert_eq!(config.tokens_per_unit, 3_000);
        assert_eq!(config.max_cycles, 20);
        assert_eq!(config.swap_fee_per_mille, 3);
        assert_eq!(config.forward_multiplier, 2);
        assert_eq!(config.day_cutover.utc_offset_secs, 8 * 3600);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = EngineConfig::default();
        config.per_unit_amount = 0;
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.swap_fee_per_mille = 1000;
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.max_cycles = 0;
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.day_cutover.hour = 25;
        assert!(matches!(config.validate(), Err(RotaError::Configuration(_))));
    }

    #[test]
    fn test_serde_defaults() {
        let json = r#"{"settlement_asset":"usd"}"#;
        let config: EngineConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.settlement_asset, AssetId::new("usd"));
        assert_eq!(config.per_unit_amount, DEFAULT_PER_UNIT_AMOUNT);
        assert_eq!(config.day_cutover, DayCutover::default());
    }

    #[test]
    fn test_from_env_overrides() {
        env::set_var("ROTA_TOKENS_PER_UNIT", "4500");
        env::set_var("ROTA_CUTOVER_HOUR", "6");
        let config = EngineConfig::from_env();
        env::remove_var("ROTA_TOKENS_PER_UNIT");
        env::remove_var("ROTA_CUTOVER_HOUR");

        assert_eq!(config.tokens_per_unit, 4_500);
        assert_eq!(config.day_cutover.hour, 6);
        assert_eq!(config.per_unit_amount, DEFAULT_PER_UNIT_AMOUNT);
    }
}
