//! Output formatting for CLI commands.
//!
//! Supports two modes: human-readable tables (default) and JSON (--json).

use rust_decimal::Decimal;
use serde::Serialize;
use tabled::{Table, Tabled};

use crate::domain::{Order, Position};
use crate::platform::ExecutionStats;

/// Output mode for command results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Table,
    Json,
}

impl OutputMode {
    pub fn from_json_flag(json: bool) -> Self {
        if json {
            OutputMode::Json
        } else {
            OutputMode::Table
        }
    }
}

/// Print a vec of Tabled + Serialize items in the chosen mode.
pub fn print_items<T: Tabled + Serialize>(items: &[T], mode: OutputMode) -> anyhow::Result<()> {
    match mode {
        OutputMode::Table => {
            if items.is_empty() {
                println!("(no results)");
            } else {
                println!("{}", Table::new(items));
            }
        }
        OutputMode::Json => {
            println!("{}", serde_json::to_string_pretty(items)?);
        }
    }
    Ok(())
}

pub fn print_stats(stats: &ExecutionStats, mode: OutputMode) -> anyhow::Result<()> {
    match mode {
        OutputMode::Table => println!("{stats}"),
        OutputMode::Json => println!("{}", serde_json::to_string_pretty(stats)?),
    }
    Ok(())
}

#[derive(Debug, Serialize, Tabled)]
pub struct OrderRow {
    pub order_id: String,
    pub symbol: String,
    pub side: String,
    #[tabled(rename = "type")]
    pub order_type: String,
    pub strategy: String,
    pub status: String,
    pub quantity: String,
    pub filled: String,
    pub avg_price: String,
    pub reason: String,
}

impl From<&Order> for OrderRow {
    fn from(order: &Order) -> Self {
        Self {
            order_id: order.order_id.to_string(),
            symbol: order.symbol.clone(),
            side: order.side.to_string(),
            order_type: order.order_type.to_string(),
            strategy: order.strategy.to_string(),
            status: order.status.to_string(),
            quantity: order.quantity.to_string(),
            filled: order.filled_quantity.to_string(),
            avg_price: optional(order.average_price),
            reason: order.reason.clone().unwrap_or_default(),
        }
    }
}

#[derive(Debug, Serialize, Tabled)]
pub struct PositionRow {
    pub symbol: String,
    pub quantity: String,
    pub average_price: String,
    pub last_price: String,
    pub realized_pnl: String,
    pub unrealized_pnl: String,
}

impl From<&Position> for PositionRow {
    fn from(position: &Position) -> Self {
        Self {
            symbol: position.symbol.clone(),
            quantity: position.quantity.to_string(),
            average_price: position.average_price.round_dp(4).to_string(),
            last_price: optional(position.last_price),
            realized_pnl: position.realized_pnl.round_dp(2).to_string(),
            unrealized_pnl: position.unrealized_pnl.round_dp(2).to_string(),
        }
    }
}

fn optional(value: Option<Decimal>) -> String {
    value
        .map(|v| v.round_dp(4).to_string())
        .unwrap_or_else(|| "-".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{OrderRequest, OrderSide};
    use rust_decimal_macros::dec;

    #[test]
    fn test_order_row_formats_missing_values() {
        let order = Order::from_request(&OrderRequest::market("AAPL", OrderSide::Buy, dec!(5)));
        let row = OrderRow::from(&order);
        assert_eq!(row.side, "BUY");
        assert_eq!(row.status, "PENDING");
        assert_eq!(row.avg_price, "-");
        assert!(row.reason.is_empty());
    }

    #[test]
    fn test_json_flag() {
        assert_eq!(OutputMode::from_json_flag(true), OutputMode::Json);
        assert_eq!(OutputMode::from_json_flag(false), OutputMode::Table);
    }
}
