//! Position ledger: applies fills to size, cost basis and PnL.
//!
//! A fill is split into a closing portion (against the open position) and an
//! opening portion (the remainder, which flips or extends the position):
//! - Closing portion: realizes `(price − basis) × size` for a long,
//!   `(basis − price) × size` for a short, minus its share of the trading cost
//! - Opening portion: re-averages the basis; its share of the cost is
//!   capitalised into the basis (raising a long basis, lowering a short one)
//!
//! The ledger is the only thing that mutates position state.

use crate::domain::{Bar, FillEvent, PositionSnapshot, Side};
use crate::engine::InvariantViolation;
use rust_decimal::Decimal;

/// Proportional trading cost on notional traded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CostModel {
    pub rate: Decimal,
}

impl CostModel {
    pub fn new(rate: Decimal) -> Self {
        Self { rate }
    }

    pub fn frictionless() -> Self {
        Self::new(Decimal::ZERO)
    }

    /// `price × size × rate`.
    pub fn cost(&self, price: Decimal, size: Decimal) -> Decimal {
        price * size * self.rate
    }
}

/// What a single fill did to the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FillOutcome {
    pub cost: Decimal,
    pub realized_pnl: Decimal,
    pub closed_size: Decimal,
    pub opened_size: Decimal,
}

#[derive(Debug, Clone)]
pub struct PositionLedger {
    cost_model: CostModel,
    initial_capital: Decimal,
    net_size: Decimal,
    cost_basis: Decimal,
    realized_pnl: Decimal,
    cost_paid: Decimal,
    bought: Decimal,
    sold: Decimal,
}

impl PositionLedger {
    pub fn new(cost_model: CostModel, initial_capital: Decimal) -> Self {
        Self {
            cost_model,
            initial_capital,
            net_size: Decimal::ZERO,
            cost_basis: Decimal::ZERO,
            realized_pnl: Decimal::ZERO,
            cost_paid: Decimal::ZERO,
            bought: Decimal::ZERO,
            sold: Decimal::ZERO,
        }
    }

    pub fn net_size(&self) -> Decimal {
        self.net_size
    }

    pub fn cost_basis(&self) -> Decimal {
        self.cost_basis
    }

    pub fn realized_pnl(&self) -> Decimal {
        self.realized_pnl
    }

    pub fn cost_paid(&self) -> Decimal {
        self.cost_paid
    }

    /// Apply one fill.
    pub fn apply(&mut self, fill: &FillEvent) -> FillOutcome {
        let cost = self.cost_model.cost(fill.price, fill.size);
        let direction = fill.side.sign();

        // Closing portion: the part of the fill that trades against the open position.
        let opposes = !self.net_size.is_zero() && self.net_size.is_sign_negative() != direction.is_sign_negative();
        let closed_size = if opposes {
            fill.size.min(self.net_size.abs())
        } else {
            Decimal::ZERO
        };
        let opened_size = fill.size - closed_size;

        let close_cost = if fill.size.is_zero() {
            Decimal::ZERO
        } else {
            cost * closed_size / fill.size
        };
        let open_cost = cost - close_cost;

        let mut realized = Decimal::ZERO;
        if closed_size > Decimal::ZERO {
            let per_unit = match fill.side {
                Side::Sell => fill.price - self.cost_basis,
                Side::Buy => self.cost_basis - fill.price,
            };
            realized = per_unit * closed_size - close_cost;
            self.net_size += direction * closed_size;
            if self.net_size.is_zero() {
                self.cost_basis = Decimal::ZERO;
            }
        }

        if opened_size > Decimal::ZERO {
            // Position is now flat or on the fill's side.
            let held = self.net_size.abs();
            let capitalised = match fill.side {
                Side::Buy => fill.price * opened_size + open_cost,
                Side::Sell => fill.price * opened_size - open_cost,
            };
            self.cost_basis = (self.cost_basis * held + capitalised) / (held + opened_size);
            self.net_size += direction * opened_size;
        }

        self.realized_pnl += realized;
        self.cost_paid += cost;
        match fill.side {
            Side::Buy => self.bought += fill.size,
            Side::Sell => self.sold += fill.size,
        }

        FillOutcome {
            cost,
            realized_pnl: realized,
            closed_size,
            opened_size,
        }
    }

    /// Mark the position at the bar close. Read-only: calling it twice on the
    /// same bar gives the same snapshot.
    pub fn mark(&self, bar: &Bar, bar_index: usize) -> PositionSnapshot {
        let unrealized = if self.net_size.is_zero() {
            Decimal::ZERO
        } else {
            (bar.close - self.cost_basis) * self.net_size
        };
        PositionSnapshot {
            bar_index,
            timestamp: bar.timestamp,
            mark_price: bar.close,
            net_size: self.net_size,
            cost_basis: self.cost_basis,
            realized_pnl: self.realized_pnl,
            unrealized_pnl: unrealized,
            cost_paid: self.cost_paid,
            equity: self.initial_capital + self.realized_pnl + unrealized,
        }
    }

    /// Net size must equal filled buy size minus filled sell size.
    pub fn verify_inventory(&self) -> Result<(), InvariantViolation> {
        if self.net_size != self.bought - self.sold {
            return Err(InvariantViolation::InventoryMismatch {
                net_size: self.net_size,
                bought: self.bought,
                sold: self.sold,
            });
        }
        Ok(())
    }
}
