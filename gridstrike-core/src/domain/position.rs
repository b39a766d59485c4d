use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Point-in-time view of the ledger, taken after a bar's fills are applied
/// and the position is marked at the bar close.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionSnapshot {
    pub bar_index: usize,
    pub timestamp: DateTime<Utc>,
    pub mark_price: Decimal,
    /// Positive = long, negative = short.
    pub net_size: Decimal,
    /// Average entry price of the open position, zero when flat.
    pub cost_basis: Decimal,
    pub realized_pnl: Decimal,
    pub unrealized_pnl: Decimal,
    /// Cumulative trading cost paid so far.
    pub cost_paid: Decimal,
    pub equity: Decimal,
}

