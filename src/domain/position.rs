use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::OrderError;

/// Per-symbol long position
///
/// Quantity never goes below zero: short selling is not supported, so a sell
/// larger than the holding fails and leaves the position untouched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    pub quantity: Decimal,
    /// Volume-weighted average entry price
    pub average_price: Decimal,
    pub realized_pnl: Decimal,
    pub unrealized_pnl: Decimal,
    /// Last mark used for unrealized P&L
    pub last_price: Option<Decimal>,
    pub updated_at: DateTime<Utc>,
}

impl Position {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            quantity: Decimal::ZERO,
            average_price: Decimal::ZERO,
            realized_pnl: Decimal::ZERO,
            unrealized_pnl: Decimal::ZERO,
            last_price: None,
            updated_at: Utc::now(),
        }
    }

    pub fn is_flat(&self) -> bool {
        self.quantity.is_zero()
    }

    /// Blend a buy into the average entry price.
    pub fn apply_buy(&mut self, quantity: Decimal, price: Decimal) {
        let total = self.quantity + quantity;
        if !total.is_zero() {
            self.average_price = (self.quantity * self.average_price + quantity * price) / total;
        }
        self.quantity = total;
        self.refresh_unrealized();
        self.updated_at = Utc::now();
    }

    /// Reduce the holding and return the realized P&L of this sell.
    pub fn apply_sell(&mut self, quantity: Decimal, price: Decimal) -> Result<Decimal, OrderError> {
        if quantity > self.quantity {
            return Err(OrderError::InsufficientPosition {
                symbol: self.symbol.clone(),
                requested: quantity,
                held: self.quantity,
            });
        }
        let realized = (price - self.average_price) * quantity;
        self.realized_pnl += realized;
        self.quantity -= quantity;
        if self.quantity.is_zero() {
            self.average_price = Decimal::ZERO;
        }
        self.refresh_unrealized();
        self.updated_at = Utc::now();
        Ok(realized)
    }

    /// Mark the position to `price`.
    pub fn mark(&mut self, price: Decimal) {
        self.last_price = Some(price);
        self.refresh_unrealized();
        self.updated_at = Utc::now();
    }

    /// Current value at the last mark (entry price when never marked)
    pub fn notional_value(&self) -> Decimal {
        self.quantity * self.last_price.unwrap_or(self.average_price)
    }

    fn refresh_unrealized(&mut self) {
        self.unrealized_pnl = match self.last_price {
            Some(mark) => (mark - self.average_price) * self.quantity,
            None => Decimal::ZERO,
        };
    }
}
