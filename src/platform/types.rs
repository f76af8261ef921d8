//! Core types for the execution platform

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

use super::queue::QueueStats;
use crate::domain::{Order, OrderSide, OrderStatus, OrderType, Trade};

/// Queue tier (lower number is served first)
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum OrderPriority {
    /// Risk-reducing or emergency orders
    Critical = 0,
    High = 1,
    #[default]
    Medium = 2,
    Low = 3,
    /// Time-scheduled work that can wait for everything else
    Scheduled = 4,
}

impl OrderPriority {
    pub const ALL: [OrderPriority; 5] = [
        OrderPriority::Critical,
        OrderPriority::High,
        OrderPriority::Medium,
        OrderPriority::Low,
        OrderPriority::Scheduled,
    ];

    pub const COUNT: usize = 5;

    pub fn index(&self) -> usize {
        *self as usize
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderPriority::Critical => "critical",
            OrderPriority::High => "high",
            OrderPriority::Medium => "medium",
            OrderPriority::Low => "low",
            OrderPriority::Scheduled => "scheduled",
        }
    }
}

impl std::fmt::Display for OrderPriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str().to_ascii_uppercase())
    }
}

impl FromStr for OrderPriority {
    type Err = &'static str;

    fn from_str(raw: &str) -> std::result::Result<Self, Self::Err> {
        let normalized = raw.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|p| p.as_str() == normalized)
            .ok_or("invalid priority; expected critical|high|medium|low|scheduled")
    }
}

/// What to do with an order whose strategy produced no trades
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ZeroFillPolicy {
    /// Mark REJECTED with reason "no fill"
    #[default]
    Reject,
    /// Put it back on its tier, up to the configured attempt limit
    Requeue,
}

/// Reason text attached to zero-fill rejections
pub const NO_FILL_REASON: &str = "no fill";

/// Structured event handed to the notification sink after a terminal transition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionEvent {
    pub order_id: Uuid,
    pub symbol: String,
    pub side: OrderSide,
    pub quantity: Decimal,
    pub filled_quantity: Decimal,
    #[serde(rename = "type")]
    pub order_type: OrderType,
    pub status: OrderStatus,
    /// Average fill price
    pub price: Option<Decimal>,
    pub commission: Option<Decimal>,
    /// Average fill vs reference price, positive when adverse
    pub slippage: Option<Decimal>,
    /// Realised P&L booked by this order's fills
    pub pnl: Option<Decimal>,
    pub reason: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl ExecutionEvent {
    /// Build the event from a final order snapshot and the trades it booked.
    pub fn from_order(order: &Order, trades: &[Trade], reference_price: Option<Decimal>) -> Self {
        let pnl = if trades.is_empty() {
            None
        } else {
            Some(trades.iter().map(|t| t.realized_pnl).sum())
        };
        let slippage = match (order.average_price, reference_price) {
            (Some(avg), Some(reference)) => Some(match order.side {
                OrderSide::Buy => avg - reference,
                OrderSide::Sell => reference - avg,
            }),
            _ => None,
        };

        Self {
            order_id: order.order_id,
            symbol: order.symbol.clone(),
            side: order.side,
            quantity: order.quantity,
            filled_quantity: order.filled_quantity,
            order_type: order.order_type,
            status: order.status,
            price: order.average_price,
            commission: (!trades.is_empty()).then_some(order.commission),
            slippage,
            pnl,
            reason: order.reason.clone(),
            timestamp: Utc::now(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.status, OrderStatus::Filled | OrderStatus::Partial)
    }
}

/// Per-order processing counters kept by the worker
#[derive(Debug, Clone, Default, Serialize)]
pub struct ExecutionMetrics {
    pub processed: u64,
    pub filled: u64,
    pub partial: u64,
    pub rejected: u64,
    pub cancelled: u64,
    pub requeued: u64,
    pub avg_processing_ms: f64,
    pub max_processing_ms: f64,
}

impl ExecutionMetrics {
    pub fn record(&mut self, status: OrderStatus, elapsed_ms: f64) {
        self.processed += 1;
        match status {
            OrderStatus::Filled => self.filled += 1,
            OrderStatus::Partial => self.partial += 1,
            OrderStatus::Rejected => self.rejected += 1,
            _ => {}
        }
        let n = self.processed as f64;
        self.avg_processing_ms += (elapsed_ms - self.avg_processing_ms) / n;
        self.max_processing_ms = self.max_processing_ms.max(elapsed_ms);
    }

    pub fn success_rate(&self) -> f64 {
        if self.processed == 0 {
            return 0.0;
        }
        (self.filled + self.partial) as f64 / self.processed as f64
    }
}

/// Snapshot returned by `ExecutionEngine::get_execution_stats`
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionStats {
    pub total_orders: usize,
    pub pending_orders: usize,
    pub filled_orders: usize,
    pub total_positions: usize,
    pub total_trades: usize,
    pub daily_pnl: Decimal,
    pub queue_size: usize,
    pub metrics: ExecutionMetrics,
    pub queue: QueueStats,
}

impl std::fmt::Display for ExecutionStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Orders[total={}, pending={}, filled={}] Trades={} Positions={} PnL={} | {}",
            self.total_orders,
            self.pending_orders,
            self.filled_orders,
            self.total_trades,
            self.total_positions,
            self.daily_pnl,
            self.queue
        )
    }
}
