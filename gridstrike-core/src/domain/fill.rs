use crate::domain::grid::Side;
use crate::domain::ids::{FillId, LevelId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A simulated limit-order execution at a level's resting price.
///
/// Immutable once created. The price is always the level price, never the
/// bar's open or close.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FillEvent {
    pub id: FillId,
    pub level_id: LevelId,
    pub side: Side,
    pub price: Decimal,
    pub size: Decimal,
    pub bar_index: usize,
    pub timestamp: DateTime<Utc>,
}

impl FillEvent {
    pub fn notional(&self) -> Decimal {
        self.price * self.size
    }

    /// Size with sign: positive for buys, negative for sells.
    pub fn signed_size(&self) -> Decimal {
        self.side.sign() * self.size
    }

    pub fn generation(&self) -> u32 {
        self.level_id.generation
    }
}
