//! Risk Gate - pre-execution risk checks
//!
//! Every limit is a fraction of portfolio value:
//! - single order size
//! - resulting position size per symbol
//! - aggregate exposure across the book
//! - running daily loss
//!
//! Checks never mutate state. Daily P&L accrues through `update_daily_pnl`,
//! which the engine calls once per booked trade.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info, warn};

use crate::domain::{Order, OrderSide, Position, Trade};
use crate::error::RiskError;

/// Risk limits snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskLimits {
    /// Max resulting position value per symbol
    pub max_position_size: Decimal,
    /// Max aggregate exposure including the new order
    pub max_total_risk: Decimal,
    /// Max daily loss before new orders are refused
    pub max_daily_loss: Decimal,
    /// Max value of a single order
    pub max_order_size: Decimal,
    /// Max number of symbols with an open position
    pub max_open_positions: usize,
}

impl Default for RiskLimits {
    fn default() -> Self {
        Self {
            max_position_size: Decimal::new(10, 2),
            max_total_risk: Decimal::new(20, 2),
            max_daily_loss: Decimal::new(5, 2),
            max_order_size: Decimal::new(2, 2),
            max_open_positions: 10,
        }
    }
}

impl RiskLimits {
    pub fn validate(&self) -> Result<(), RiskError> {
        let fractions = [
            ("max_position_size", self.max_position_size),
            ("max_total_risk", self.max_total_risk),
            ("max_daily_loss", self.max_daily_loss),
            ("max_order_size", self.max_order_size),
        ];
        for (field, value) in fractions {
            if value <= Decimal::ZERO || value > Decimal::ONE {
                return Err(RiskError::FractionOutOfRange { field, value });
            }
        }
        if self.max_open_positions == 0 {
            return Err(RiskError::ZeroOpenPositions);
        }
        Ok(())
    }
}

/// Risk check result
#[derive(Debug, Clone, PartialEq)]
pub enum RiskCheckResult {
    Passed,
    Blocked(BlockReason),
}

impl RiskCheckResult {
    pub fn is_passed(&self) -> bool {
        matches!(self, RiskCheckResult::Passed)
    }

    pub fn is_blocked(&self) -> bool {
        matches!(self, RiskCheckResult::Blocked(_))
    }
}

/// Why an order was blocked
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BlockReason {
    /// Portfolio value is zero or negative
    InvalidPortfolioValue { value: Decimal },
    /// Neither the order nor the market supplied a price
    MissingPrice,
    /// Arithmetic overflow while sizing the order
    CalculationFailed,
    ExceedsOrderSize { limit: Decimal, fraction: Decimal },
    ExceedsPositionSize { limit: Decimal, fraction: Decimal },
    ExceedsTotalRisk { limit: Decimal, fraction: Decimal },
    TooManyOpenPositions { limit: usize, current: usize },
    DailyLossExceeded { limit: Decimal, current: Decimal },
}

impl std::fmt::Display for BlockReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BlockReason::InvalidPortfolioValue { value } => {
                write!(f, "Portfolio value {} is not positive", value)
            }
            BlockReason::MissingPrice => write!(f, "No price available to value the order"),
            BlockReason::CalculationFailed => write!(f, "Risk calculation overflowed"),
            BlockReason::ExceedsOrderSize { limit, fraction } => {
                write!(f, "Order size {} of portfolio exceeds {}", fraction, limit)
            }
            BlockReason::ExceedsPositionSize { limit, fraction } => {
                write!(f, "Position size {} of portfolio exceeds {}", fraction, limit)
            }
            BlockReason::ExceedsTotalRisk { limit, fraction } => {
                write!(f, "Total exposure {} of portfolio exceeds {}", fraction, limit)
            }
            BlockReason::TooManyOpenPositions { limit, current } => {
                write!(f, "Open positions {} at limit {}", current, limit)
            }
            BlockReason::DailyLossExceeded { limit, current } => {
                write!(f, "Daily P&L ${} below limit -${}", current, limit)
            }
        }
    }
}

/// Daily P&L accumulator
#[derive(Debug, Clone, Serialize)]
pub struct DailyRiskStats {
    pub pnl: Decimal,
    pub trade_count: usize,
    pub since: DateTime<Utc>,
}

/// Risk gate
///
/// Plain state; the engine wraps it in a lock and is the only writer.
pub struct RiskGate {
    limits: RiskLimits,
    daily_pnl: Decimal,
    daily_trades: Vec<Trade>,
    since: DateTime<Utc>,
}

impl RiskGate {
    pub fn new(limits: RiskLimits) -> Self {
        Self {
            limits,
            daily_pnl: Decimal::ZERO,
            daily_trades: Vec::new(),
            since: Utc::now(),
        }
    }

    pub fn limits(&self) -> &RiskLimits {
        &self.limits
    }

    /// Replace the limits snapshot after validating it.
    pub fn update_limits(&mut self, limits: RiskLimits) -> Result<(), RiskError> {
        limits.validate()?;
        info!(?limits, "Risk limits updated");
        self.limits = limits;
        Ok(())
    }

    // ==================== checks ====================

    /// Boolean form of [`RiskGate::check`].
    pub fn check_order_risk(
        &self,
        order: &Order,
        portfolio_value: Decimal,
        positions: &HashMap<String, Position>,
        mark_price: Option<Decimal>,
    ) -> bool {
        self.check(order, portfolio_value, positions, mark_price)
            .is_passed()
    }

    /// Run every check in order and report the first failure.
    ///
    /// The order is valued at its limit/stop price, falling back to `mark_price`.
    pub fn check(
        &self,
        order: &Order,
        portfolio_value: Decimal,
        positions: &HashMap<String, Position>,
        mark_price: Option<Decimal>,
    ) -> RiskCheckResult {
        let result = self.evaluate(order, portfolio_value, positions, mark_price);
        match &result {
            RiskCheckResult::Passed => {
                debug!(order_id = %order.order_id, symbol = %order.symbol, "Risk check passed");
            }
            RiskCheckResult::Blocked(reason) => {
                warn!(
                    order_id = %order.order_id,
                    symbol = %order.symbol,
                    %reason,
                    "Risk check blocked order"
                );
            }
        }
        result
    }

    fn evaluate(
        &self,
        order: &Order,
        portfolio_value: Decimal,
        positions: &HashMap<String, Position>,
        mark_price: Option<Decimal>,
    ) -> RiskCheckResult {
        use RiskCheckResult::Blocked;

        if portfolio_value <= Decimal::ZERO {
            return Blocked(BlockReason::InvalidPortfolioValue {
                value: portfolio_value,
            });
        }
        let Some(price) = order.reference_price().or(mark_price) else {
            return Blocked(BlockReason::MissingPrice);
        };
        let Some(order_value) = order.quantity.checked_mul(price) else {
            return Blocked(BlockReason::CalculationFailed);
        };
        let Some(order_fraction) = order_value.checked_div(portfolio_value) else {
            return Blocked(BlockReason::CalculationFailed);
        };

        // 1. single order size
        if order_fraction > self.limits.max_order_size {
            return Blocked(BlockReason::ExceedsOrderSize {
                limit: self.limits.max_order_size,
                fraction: order_fraction,
            });
        }

        // 2. exposure checks apply to buys; a sell can only shrink a long book
        if order.side == OrderSide::Buy {
            let existing = positions.get(&order.symbol);
            let held = existing.map(|p| p.quantity).unwrap_or(Decimal::ZERO);

            let Some(position_fraction) = (held + order.quantity)
                .checked_mul(price)
                .and_then(|value| value.checked_div(portfolio_value))
            else {
                return Blocked(BlockReason::CalculationFailed);
            };
            if position_fraction > self.limits.max_position_size {
                return Blocked(BlockReason::ExceedsPositionSize {
                    limit: self.limits.max_position_size,
                    fraction: position_fraction,
                });
            }

            let other_exposure: Decimal = positions
                .values()
                .filter(|p| p.symbol != order.symbol)
                .map(Position::notional_value)
                .sum();
            let Some(total_fraction) = (held + order.quantity)
                .checked_mul(price)
                .and_then(|value| value.checked_add(other_exposure))
                .and_then(|value| value.checked_div(portfolio_value))
            else {
                return Blocked(BlockReason::CalculationFailed);
            };
            if total_fraction > self.limits.max_total_risk {
                return Blocked(BlockReason::ExceedsTotalRisk {
                    limit: self.limits.max_total_risk,
                    fraction: total_fraction,
                });
            }

            let opens_new = existing.map_or(true, Position::is_flat);
            let open_count = positions.values().filter(|p| !p.is_flat()).count();
            if opens_new && open_count >= self.limits.max_open_positions {
                return Blocked(BlockReason::TooManyOpenPositions {
                    limit: self.limits.max_open_positions,
                    current: open_count,
                });
            }
        }

        // 3. daily loss
        let loss_floor = -(portfolio_value * self.limits.max_daily_loss);
        if self.daily_pnl < loss_floor {
            return Blocked(BlockReason::DailyLossExceeded {
                limit: portfolio_value * self.limits.max_daily_loss,
                current: self.daily_pnl,
            });
        }

        RiskCheckResult::Passed
    }

    // ==================== daily P&L ====================

    /// Accrue a booked trade: realised P&L net of commission.
    pub fn update_daily_pnl(&mut self, trade: &Trade) {
        self.daily_pnl += trade.realized_pnl - trade.commission;
        self.daily_trades.push(trade.clone());
        debug!(
            trade_id = %trade.trade_id,
            daily_pnl = %self.daily_pnl,
            "Daily P&L updated"
        );
    }

    pub fn daily_pnl(&self) -> Decimal {
        self.daily_pnl
    }

    pub fn daily_trades(&self) -> &[Trade] {
        &self.daily_trades
    }

    pub fn daily_stats(&self) -> DailyRiskStats {
        DailyRiskStats {
            pnl: self.daily_pnl,
            trade_count: self.daily_trades.len(),
            since: self.since,
        }
    }

    /// Clear accrued P&L and the trade log (once per trading day).
    pub fn reset_daily_stats(&mut self) {
        info!(
            pnl = %self.daily_pnl,
            trades = self.daily_trades.len(),
            "Resetting daily risk stats"
        );
        self.daily_pnl = Decimal::ZERO;
        self.daily_trades.clear();
        self.since = Utc::now();
    }
}

impl Default for RiskGate {
    fn default() -> Self {
        Self::new(RiskLimits::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::OrderRequest;
    use rust_decimal_macros::dec;

    fn buy_limit(symbol: &str, quantity: Decimal, price: Decimal) -> Order {
        Order::from_request(&OrderRequest::limit(symbol, OrderSide::Buy, quantity, price))
    }

    fn held(symbol: &str, quantity: Decimal, price: Decimal) -> Position {
        let mut position = Position::new(symbol);
        position.apply_buy(quantity, price);
        position
    }

    #[test]
    fn test_basic_check() {
        let gate = RiskGate::default();
        // 1000 of 100000 = 1%
        let order = buy_limit("AAPL", dec!(10), dec!(100));
        assert!(gate.check_order_risk(&order, dec!(100000), &HashMap::new(), None));
    }

    #[test]
    fn test_single_order_limit() {
        let gate = RiskGate::default();
        // 5000 of 100000 = 5% > 2%
        let order = buy_limit("AAPL", dec!(50), dec!(100));
        let result = gate.check(&order, dec!(100000), &HashMap::new(), None);

        match result {
            RiskCheckResult::Blocked(BlockReason::ExceedsOrderSize { fraction, .. }) => {
                assert_eq!(fraction, dec!(0.05));
            }
            other => panic!("Expected ExceedsOrderSize, got {:?}", other),
        }
    }

    #[test]
    fn test_position_size_limit() {
        let gate = RiskGate::default();
        let mut positions = HashMap::new();
        // 9000 held, +1500 -> 10.5% > 10%
        positions.insert("AAPL".to_string(), held("AAPL", dec!(90), dec!(100)));

        let order = buy_limit("AAPL", dec!(15), dec!(100));
        let result = gate.check(&order, dec!(100000), &positions, None);
        assert!(matches!(
            result,
            RiskCheckResult::Blocked(BlockReason::ExceedsPositionSize { .. })
        ));
    }

    #[test]
    fn test_total_risk_limit() {
        let gate = RiskGate::default();
        let mut positions = HashMap::new();
        positions.insert("MSFT".to_string(), held("MSFT", dec!(95), dec!(100)));
        positions.insert("GOOG".to_string(), held("GOOG", dec!(95), dec!(100)));

        // 19000 elsewhere + 1500 -> 20.5% > 20%
        let order = buy_limit("AAPL", dec!(15), dec!(100));
        let result = gate.check(&order, dec!(100000), &positions, None);
        assert!(matches!(
            result,
            RiskCheckResult::Blocked(BlockReason::ExceedsTotalRisk { .. })
        ));
    }

    #[test]
    fn test_open_positions_limit() {
        let mut gate = RiskGate::default();
        gate.update_limits(RiskLimits {
            max_open_positions: 1,
            ..RiskLimits::default()
        })
        .unwrap();

        let mut positions = HashMap::new();
        positions.insert("MSFT".to_string(), held("MSFT", dec!(1), dec!(100)));

        let new_symbol = buy_limit("AAPL", dec!(1), dec!(100));
        assert!(!gate.check_order_risk(&new_symbol, dec!(100000), &positions, None));

        let add_to_existing = buy_limit("MSFT", dec!(1), dec!(100));
        assert!(gate.check_order_risk(&add_to_existing, dec!(100000), &positions, None));
    }

    #[test]
    fn test_daily_loss_blocks() {
        let mut gate = RiskGate::default();
        let order = buy_limit("AAPL", dec!(1), dec!(100));

        let mut losing = Trade::simulated(&order, dec!(1), dec!(100));
        losing.realized_pnl = dec!(-5001);
        gate.update_daily_pnl(&losing);

        let result = gate.check(&order, dec!(100000), &HashMap::new(), None);
        assert!(matches!(
            result,
            RiskCheckResult::Blocked(BlockReason::DailyLossExceeded { .. })
        ));

        gate.reset_daily_stats();
        assert_eq!(gate.daily_stats().trade_count, 0);
        assert!(gate.check_order_risk(&order, dec!(100000), &HashMap::new(), None));
    }

    #[test]
    fn test_daily_pnl_nets_commission() {
        let mut gate = RiskGate::default();
        let order = buy_limit("AAPL", dec!(1), dec!(100));
        let mut trade = Trade::simulated(&order, dec!(1), dec!(100));
        trade.realized_pnl = dec!(10);
        trade.commission = dec!(1.5);

        gate.update_daily_pnl(&trade);
        assert_eq!(gate.daily_pnl(), dec!(8.5));
        assert_eq!(gate.daily_trades().len(), 1);
    }

    #[test]
    fn test_invalid_inputs_reject_without_panic() {
        let gate = RiskGate::default();
        let order = buy_limit("AAPL", dec!(1), dec!(100));
        assert_eq!(
            gate.check(&order, Decimal::ZERO, &HashMap::new(), None),
            RiskCheckResult::Blocked(BlockReason::InvalidPortfolioValue {
                value: Decimal::ZERO
            })
        );

        let market = Order::from_request(&OrderRequest::market("AAPL", OrderSide::Buy, dec!(1)));
        assert_eq!(
            gate.check(&market, dec!(100000), &HashMap::new(), None),
            RiskCheckResult::Blocked(BlockReason::MissingPrice)
        );
        assert!(gate.check_order_risk(&market, dec!(100000), &HashMap::new(), Some(dec!(150))));
    }

    #[test]
    fn test_update_limits_validates() {
        let mut gate = RiskGate::default();
        let err = gate
            .update_limits(RiskLimits {
                max_order_size: dec!(1.5),
                ..RiskLimits::default()
            })
            .unwrap_err();
        assert!(matches!(err, RiskError::FractionOutOfRange { field: "max_order_size", .. }));
        assert_eq!(gate.limits(), &RiskLimits::default());
    }
}
