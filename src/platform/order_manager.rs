//! Order Manager - order, fill and position bookkeeping
//!
//! Owns the live order map, finished-order history, per-symbol positions and
//! the trade log. Orders leave the live map on their terminal transition, so a
//! later lookup by id fails with `OrderNotFound`; take a snapshot first.

use chrono::Utc;
use rust_decimal::Decimal;
use std::collections::HashMap;
use tracing::{debug, info};
use uuid::Uuid;

use crate::domain::{Order, OrderRequest, OrderSide, OrderStatus, Position, Trade};
use crate::error::{OrderError, Result, WarMachineError};

#[derive(Debug, Default)]
pub struct OrderManager {
    orders: HashMap<Uuid, Order>,
    order_history: Vec<Order>,
    positions: HashMap<String, Position>,
    trades: Vec<Trade>,
}

impl OrderManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate the request and register a new PENDING order.
    pub fn create_order(&mut self, request: &OrderRequest) -> Result<Order> {
        request.validate()?;

        let order = Order::from_request(request);
        info!(
            order_id = %order.order_id,
            symbol = %order.symbol,
            side = %order.side,
            order_type = %order.order_type,
            quantity = %order.quantity,
            strategy = %order.strategy,
            "Order created"
        );
        self.orders.insert(order.order_id, order.clone());
        Ok(order)
    }

    /// Move an order forward in its lifecycle.
    ///
    /// `None` leaves the filled quantity or average price unchanged. A terminal
    /// status moves the order into history and returns the final snapshot.
    pub fn update_order_status(
        &mut self,
        order_id: Uuid,
        status: OrderStatus,
        filled_quantity: Option<Decimal>,
        average_price: Option<Decimal>,
    ) -> Result<Order> {
        let order = self
            .orders
            .get_mut(&order_id)
            .ok_or(OrderError::NotFound { order_id })?;

        if !order.status.can_transition_to(status) {
            return Err(WarMachineError::InvalidStateTransition {
                from: order.status.to_string(),
                to: status.to_string(),
            });
        }
        if let Some(filled) = filled_quantity {
            if filled < Decimal::ZERO || filled > order.quantity {
                return Err(WarMachineError::Validation(format!(
                    "filled quantity {} outside [0, {}]",
                    filled, order.quantity
                )));
            }
            order.filled_quantity = filled;
        }
        if let Some(avg) = average_price {
            order.average_price = Some(avg);
        }

        debug!(
            order_id = %order_id,
            from = %order.status,
            to = %status,
            "Order status transition"
        );
        order.status = status;
        order.updated_at = Utc::now();

        if status.is_terminal() {
            // presence was checked above
            let finished = self
                .orders
                .remove(&order_id)
                .ok_or(OrderError::NotFound { order_id })?;
            info!(
                order_id = %order_id,
                symbol = %finished.symbol,
                status = %finished.status,
                filled = %finished.filled_quantity,
                "Order finalised"
            );
            self.order_history.push(finished.clone());
            return Ok(finished);
        }

        Ok(order.clone())
    }

    /// Record why an order is about to be rejected or expired.
    pub fn set_reason(&mut self, order_id: Uuid, reason: impl Into<String>) -> Result<()> {
        let order = self
            .orders
            .get_mut(&order_id)
            .ok_or(OrderError::NotFound { order_id })?;
        order.reason = Some(reason.into());
        Ok(())
    }

    /// Bump the pickup counter; returns the new count.
    pub fn record_attempt(&mut self, order_id: Uuid) -> Result<u32> {
        let order = self
            .orders
            .get_mut(&order_id)
            .ok_or(OrderError::NotFound { order_id })?;
        order.attempts += 1;
        Ok(order.attempts)
    }

    /// Book a fill against a live order.
    pub fn add_trade(
        &mut self,
        order_id: Uuid,
        trade_id: Uuid,
        quantity: Decimal,
        price: Decimal,
        commission: Decimal,
    ) -> Result<Trade> {
        let order = self
            .orders
            .get(&order_id)
            .ok_or(OrderError::NotFound { order_id })?;

        let mut trade = Trade::simulated(order, quantity, price);
        trade.trade_id = trade_id;
        trade.commission = commission;
        self.book_trade(trade)
    }

    /// Book an already-built trade. Nothing is recorded if any check fails.
    pub fn book_trade(&mut self, mut trade: Trade) -> Result<Trade> {
        let order_id = trade.order_id;
        let order = self
            .orders
            .get(&order_id)
            .ok_or(OrderError::NotFound { order_id })?;

        if trade.quantity <= Decimal::ZERO || trade.price <= Decimal::ZERO {
            return Err(WarMachineError::Validation(format!(
                "trade quantity and price must be positive, got {} @ {}",
                trade.quantity, trade.price
            )));
        }
        if order.filled_quantity + trade.quantity > order.quantity {
            return Err(OrderError::Overfill {
                order_id,
                quantity: order.quantity,
                filled: order.filled_quantity,
                trade: trade.quantity,
            }
            .into());
        }

        trade.realized_pnl = match trade.side {
            OrderSide::Buy => {
                self.positions
                    .entry(trade.symbol.clone())
                    .or_insert_with(|| Position::new(trade.symbol.clone()))
                    .apply_buy(trade.quantity, trade.price);
                Decimal::ZERO
            }
            OrderSide::Sell => match self.positions.get_mut(&trade.symbol) {
                Some(position) => position.apply_sell(trade.quantity, trade.price)?,
                None => {
                    return Err(OrderError::InsufficientPosition {
                        symbol: trade.symbol.clone(),
                        requested: trade.quantity,
                        held: Decimal::ZERO,
                    }
                    .into());
                }
            },
        };

        if let Some(order) = self.orders.get_mut(&order_id) {
            order.record_fill(trade.quantity, trade.price, trade.commission);
        }

        debug!(
            trade_id = %trade.trade_id,
            order_id = %order_id,
            symbol = %trade.symbol,
            side = %trade.side,
            quantity = %trade.quantity,
            price = %trade.price,
            "Trade booked"
        );
        self.trades.push(trade.clone());
        Ok(trade)
    }

    /// Refresh unrealized P&L for a symbol.
    pub fn mark_to_market(&mut self, symbol: &str, price: Decimal) {
        if let Some(position) = self.positions.get_mut(symbol) {
            position.mark(price);
        }
    }

    // ==================== queries ====================

    /// Live order by id (terminal orders are no longer live)
    pub fn get_order(&self, order_id: Uuid) -> Option<&Order> {
        self.orders.get(&order_id)
    }

    /// Live order, falling back to history
    pub fn find_order(&self, order_id: Uuid) -> Option<&Order> {
        self.orders.get(&order_id).or_else(|| {
            self.order_history
                .iter()
                .rev()
                .find(|o| o.order_id == order_id)
        })
    }

    /// Live orders, optionally filtered by symbol and status
    pub fn get_orders(&self, symbol: Option<&str>, status: Option<OrderStatus>) -> Vec<Order> {
        let mut orders: Vec<Order> = self
            .orders
            .values()
            .filter(|o| matches_filter(o, symbol, status))
            .cloned()
            .collect();
        orders.sort_by_key(|o| o.created_at);
        orders
    }

    /// Finished orders, optionally filtered by symbol and status
    pub fn get_order_history(
        &self,
        symbol: Option<&str>,
        status: Option<OrderStatus>,
    ) -> Vec<Order> {
        self.order_history
            .iter()
            .filter(|o| matches_filter(o, symbol, status))
            .cloned()
            .collect()
    }

    pub fn get_position(&self, symbol: &str) -> Option<&Position> {
        self.positions.get(symbol)
    }

    pub fn get_positions(&self) -> HashMap<String, Position> {
        self.positions.clone()
    }

    pub fn positions(&self) -> &HashMap<String, Position> {
        &self.positions
    }

    pub fn get_trade_history(&self, symbol: Option<&str>) -> Vec<Trade> {
        self.trades
            .iter()
            .filter(|t| symbol.map_or(true, |s| t.symbol == s))
            .cloned()
            .collect()
    }

    pub fn live_count(&self) -> usize {
        self.orders.len()
    }

    pub fn history_count(&self) -> usize {
        self.order_history.len()
    }

    pub fn count_by_status(&self, status: OrderStatus) -> usize {
        self.orders
            .values()
            .chain(self.order_history.iter())
            .filter(|o| o.status == status)
            .count()
    }

    pub fn trade_count(&self) -> usize {
        self.trades.len()
    }

    /// Held quantity for a symbol (zero when no position exists)
    pub fn held_quantity(&self, symbol: &str) -> Decimal {
        self.positions
            .get(symbol)
            .map(|p| p.quantity)
            .unwrap_or(Decimal::ZERO)
    }
}

fn matches_filter(order: &Order, symbol: Option<&str>, status: Option<OrderStatus>) -> bool {
    symbol.map_or(true, |s| order.symbol == s) && status.map_or(true, |st| order.status == st)
}
