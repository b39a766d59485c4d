//! Grid strategy configuration: the immutable input to a run.
//!
//! Loaded once (by the runner's `ConfigLoader`), validated before any
//! simulation state exists, never mutated afterwards. A trading-cost override
//! produces a new config rather than editing the loaded one.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Reasons a configuration is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("symbol must not be empty")]
    EmptySymbol,

    #[error("spacing_value must be positive, got {0}")]
    NonPositiveSpacing(Decimal),

    #[error("percentage spacing must be below 1 (a fraction of price), got {0}")]
    PercentageTooLarge(Decimal),

    #[error("levels_per_side must be at least 1")]
    ZeroLevels,

    #[error("levels_per_side must be at most {max}, got {0}", max = MAX_LEVELS_PER_SIDE)]
    TooManyLevels(u32),

    #[error("order_size must be positive, got {0}")]
    NonPositiveOrderSize(Decimal),

    #[error("trading_cost_rate must be in [0, 1), got {0}")]
    CostRateOutOfRange(Decimal),

    #[error("fixed reference price must be positive, got {0}")]
    NonPositiveReference(Decimal),

    #[error("tick_size must be positive, got {0}")]
    NonPositiveTick(Decimal),

    #[error("initial_capital must be positive, got {0}")]
    NonPositiveCapital(Decimal),

    #[error("invalid rebalance trigger: {0}")]
    InvalidTrigger(String),

    #[error("infeasible ladder: {0}")]
    InfeasibleLadder(String),
}

/// How the distance between neighbouring levels is measured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpacingType {
    /// Fixed price delta: `ref ± i·spacing`.
    Absolute,
    /// Fraction of price, compounding outward: `ref·(1 ± p)^i`.
    Percentage,
}

/// When to throw away the pending ladder and re-seed it around the latest close.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RebalanceTrigger {
    #[default]
    Never,
    /// `|close − reference| / reference ≥ threshold`.
    PriceDrift { threshold: Decimal },
    /// Every `bars` bars since the current generation was seeded.
    BarInterval { bars: u32 },
    /// Every level on one side of the ladder has filled.
    SideExhausted,
}

/// Where the first ladder is centred.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferencePrice {
    #[default]
    FirstOpen,
    FirstClose,
    Fixed(Decimal),
}

/// Upper bound on `levels_per_side`.
pub const MAX_LEVELS_PER_SIDE: u32 = 10_000;

fn default_capital() -> Decimal {
    dec!(10000)
}

/// Grid-strike strategy configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GridConfig {
    pub symbol: String,
    pub spacing_type: SpacingType,
    pub spacing_value: Decimal,
    pub levels_per_side: u32,
    pub order_size: Decimal,
    #[serde(default)]
    pub rebalanced: bool,
    #[serde(default)]
    pub rebalance_trigger: RebalanceTrigger,
    #[serde(default)]
    pub trading_cost_rate: Decimal,
    #[serde(default)]
    pub reference_price: ReferencePrice,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tick_size: Option<Decimal>,
    #[serde(default = "default_capital")]
    pub initial_capital: Decimal,
}

impl GridConfig {
    /// Minimal config with defaults for every optional field.
    pub fn new(
        symbol: impl Into<String>,
        spacing_type: SpacingType,
        spacing_value: Decimal,
        levels_per_side: u32,
        order_size: Decimal,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            spacing_type,
            spacing_value,
            levels_per_side,
            order_size,
            rebalanced: false,
            rebalance_trigger: RebalanceTrigger::Never,
            trading_cost_rate: Decimal::ZERO,
            reference_price: ReferencePrice::FirstOpen,
            tick_size: None,
            initial_capital: default_capital(),
        }
    }

    /// Check every field rule. Called before any simulation state is built.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.symbol.trim().is_empty() {
            return Err(ConfigError::EmptySymbol);
        }
        if self.spacing_value <= Decimal::ZERO {
            return Err(ConfigError::NonPositiveSpacing(self.spacing_value));
        }
        if self.spacing_type == SpacingType::Percentage && self.spacing_value >= Decimal::ONE {
            return Err(ConfigError::PercentageTooLarge(self.spacing_value));
        }
        if self.levels_per_side == 0 {
            return Err(ConfigError::ZeroLevels);
        }
        if self.levels_per_side > MAX_LEVELS_PER_SIDE {
            return Err(ConfigError::TooManyLevels(self.levels_per_side));
        }
        if self.order_size <= Decimal::ZERO {
            return Err(ConfigError::NonPositiveOrderSize(self.order_size));
        }
        validate_cost_rate(self.trading_cost_rate)?;
        if let ReferencePrice::Fixed(price) = self.reference_price {
            if price <= Decimal::ZERO {
                return Err(ConfigError::NonPositiveReference(price));
            }
        }
        if let Some(tick) = self.tick_size {
            if tick <= Decimal::ZERO {
                return Err(ConfigError::NonPositiveTick(tick));
            }
        }
        if self.initial_capital <= Decimal::ZERO {
            return Err(ConfigError::NonPositiveCapital(self.initial_capital));
        }
        match &self.rebalance_trigger {
            RebalanceTrigger::PriceDrift { threshold } if *threshold <= Decimal::ZERO => {
                return Err(ConfigError::InvalidTrigger(format!(
                    "price_drift threshold must be positive, got {threshold}"
                )));
            }
            RebalanceTrigger::BarInterval { bars: 0 } => {
                return Err(ConfigError::InvalidTrigger(
                    "bar_interval bars must be at least 1".into(),
                ));
            }
            _ => {}
        }
        Ok(())
    }

    /// Copy of this config with a different trading cost rate, validated.
    pub fn with_trading_cost(&self, rate: Decimal) -> Result<Self, ConfigError> {
        validate_cost_rate(rate)?;
        Ok(Self {
            trading_cost_rate: rate,
            ..self.clone()
        })
    }

    /// The trigger actually in force: `Never` unless `rebalanced` is set.
    pub fn effective_trigger(&self) -> &RebalanceTrigger {
        if self.rebalanced {
            &self.rebalance_trigger
        } else {
            &RebalanceTrigger::Never
        }
    }

    /// Canonical byte encoding used for config hashing.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        // Field order is fixed by the struct; decimals serialize as strings.
        serde_json::to_vec(self).unwrap_or_default()
    }
}

fn validate_cost_rate(rate: Decimal) -> Result<(), ConfigError> {
    if rate < Decimal::ZERO || rate >= Decimal::ONE {
        return Err(ConfigError::CostRateOutOfRange(rate));
    }
    Ok(())
}
