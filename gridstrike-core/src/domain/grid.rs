//! Grid levels: the resting limit orders of one ladder generation.

use crate::domain::ids::LevelId;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Order side of a grid level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// +1 for buys, -1 for sells. Applied to sizes to get signed inventory deltas.
    pub fn sign(self) -> Decimal {
        match self {
            Side::Buy => Decimal::ONE,
            Side::Sell => Decimal::NEGATIVE_ONE,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => write!(f, "buy"),
            Side::Sell => write!(f, "sell"),
        }
    }
}

/// Lifecycle of a level within its generation.
///
/// `Pending → Filled` or `Pending → Cancelled`. Both are terminal: a level is
/// never re-armed; a new generation gets new levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LevelStatus {
    Pending,
    Filled,
    Cancelled,
}

impl LevelStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, LevelStatus::Pending)
    }
}

impl fmt::Display for LevelStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LevelStatus::Pending => write!(f, "pending"),
            LevelStatus::Filled => write!(f, "filled"),
            LevelStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// One rung of the ladder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridLevel {
    pub id: LevelId,
    pub price: Decimal,
    pub side: Side,
    pub status: LevelStatus,
    pub size: Decimal,
    /// 1-based distance from the reference, counted outward per side.
    pub rung: u32,
}

impl GridLevel {
    pub fn pending(id: LevelId, price: Decimal, side: Side, size: Decimal, rung: u32) -> Self {
        Self {
            id,
            price,
            side,
            status: LevelStatus::Pending,
            size,
            rung,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == LevelStatus::Pending
    }

    pub fn generation(&self) -> u32 {
        self.id.generation
    }
}
