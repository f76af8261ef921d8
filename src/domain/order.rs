use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

use crate::error::WarMachineError;

/// Venue tag stamped on every simulated fill
pub const SIMULATED_VENUE: &str = "SIMULATED";

/// Order side (buy or sell)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "BUY"),
            OrderSide::Sell => write!(f, "SELL"),
        }
    }
}

impl FromStr for OrderSide {
    type Err = WarMachineError;

    fn from_str(raw: &str) -> std::result::Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "buy" | "b" => Ok(OrderSide::Buy),
            "sell" | "s" => Ok(OrderSide::Sell),
            other => Err(WarMachineError::Validation(format!(
                "invalid side '{other}'; expected buy|sell"
            ))),
        }
    }
}

/// Order type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderType {
    Market,
    Limit,
    Stop,
    StopLimit,
    TrailingStop,
}

impl OrderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderType::Market => "market",
            OrderType::Limit => "limit",
            OrderType::Stop => "stop",
            OrderType::StopLimit => "stop_limit",
            OrderType::TrailingStop => "trailing_stop",
        }
    }

    pub fn requires_limit_price(&self) -> bool {
        matches!(self, OrderType::Limit | OrderType::StopLimit)
    }

    pub fn requires_stop_price(&self) -> bool {
        matches!(
            self,
            OrderType::Stop | OrderType::StopLimit | OrderType::TrailingStop
        )
    }
}

impl std::fmt::Display for OrderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for OrderType {
    type Err = WarMachineError;

    fn from_str(raw: &str) -> std::result::Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "market" => Ok(OrderType::Market),
            "limit" => Ok(OrderType::Limit),
            "stop" => Ok(OrderType::Stop),
            "stop_limit" => Ok(OrderType::StopLimit),
            "trailing_stop" => Ok(OrderType::TrailingStop),
            other => Err(WarMachineError::Validation(format!(
                "invalid order type '{other}'; expected market|limit|stop|stop_limit|trailing_stop"
            ))),
        }
    }
}

/// Time in force
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TimeInForce {
    /// Valid for the trading day
    #[default]
    Day,
    /// Good Till Cancelled
    GTC,
    /// Immediate Or Cancel
    IOC,
    /// Fill Or Kill
    FOK,
}

impl FromStr for TimeInForce {
    type Err = WarMachineError;

    fn from_str(raw: &str) -> std::result::Result<Self, Self::Err> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "DAY" => Ok(TimeInForce::Day),
            "GTC" => Ok(TimeInForce::GTC),
            "IOC" => Ok(TimeInForce::IOC),
            "FOK" => Ok(TimeInForce::FOK),
            other => Err(WarMachineError::Validation(format!(
                "invalid time in force '{other}'; expected day|gtc|ioc|fok"
            ))),
        }
    }
}

/// Execution algorithm used to work an order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStrategy {
    /// Fill the whole quantity at once
    #[default]
    Immediate,
    /// Time weighted average price: equal slices
    Twap,
    /// Volume weighted average price: slices follow the volume curve
    Vwap,
    /// Show only a visible fraction at a time
    Iceberg,
    /// Track a share of market volume
    Participate,
}

impl ExecutionStrategy {
    pub const ALL: [ExecutionStrategy; 5] = [
        ExecutionStrategy::Immediate,
        ExecutionStrategy::Twap,
        ExecutionStrategy::Vwap,
        ExecutionStrategy::Iceberg,
        ExecutionStrategy::Participate,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStrategy::Immediate => "immediate",
            ExecutionStrategy::Twap => "twap",
            ExecutionStrategy::Vwap => "vwap",
            ExecutionStrategy::Iceberg => "iceberg",
            ExecutionStrategy::Participate => "participate",
        }
    }
}

impl std::fmt::Display for ExecutionStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ExecutionStrategy {
    type Err = WarMachineError;

    /// Unknown tags are an execution error: there is no algorithm to dispatch to.
    fn from_str(raw: &str) -> std::result::Result<Self, Self::Err> {
        let normalized = raw.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|strategy| strategy.as_str() == normalized)
            .ok_or_else(|| {
                WarMachineError::Execution(format!("unsupported execution strategy: {raw}"))
            })
    }
}

/// Order status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderStatus {
    /// Created, waiting in the queue
    Pending,
    /// Passed risk, being worked by a strategy
    Submitted,
    /// Some but not all quantity filled
    Partial,
    /// Fully filled
    Filled,
    /// Cancelled by an external caller
    Cancelled,
    /// Rejected by risk, validation or execution failure
    Rejected,
    /// Lapsed before execution
    Expired,
}

impl OrderStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Filled
                | OrderStatus::Cancelled
                | OrderStatus::Rejected
                | OrderStatus::Expired
        )
    }

    pub fn is_active(&self) -> bool {
        matches!(
            self,
            OrderStatus::Pending | OrderStatus::Submitted | OrderStatus::Partial
        )
    }

    /// Forward-only lifecycle.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        match (self, next) {
            (Pending, Submitted | Rejected | Cancelled | Expired) => true,
            (Submitted, Filled | Partial | Rejected | Cancelled | Expired) => true,
            (Partial, Filled | Cancelled | Expired) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            OrderStatus::Pending => "PENDING",
            OrderStatus::Submitted => "SUBMITTED",
            OrderStatus::Partial => "PARTIAL",
            OrderStatus::Filled => "FILLED",
            OrderStatus::Cancelled => "CANCELLED",
            OrderStatus::Rejected => "REJECTED",
            OrderStatus::Expired => "EXPIRED",
        };
        write!(f, "{label}")
    }
}

/// Order request (what the caller wants to do)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRequest {
    pub symbol: String,
    pub side: OrderSide,
    #[serde(default = "default_order_type")]
    pub order_type: OrderType,
    pub quantity: Decimal,
    /// Limit price
    #[serde(default)]
    pub price: Option<Decimal>,
    #[serde(default)]
    pub stop_price: Option<Decimal>,
    #[serde(default)]
    pub strategy: ExecutionStrategy,
    #[serde(default)]
    pub time_in_force: TimeInForce,
}

fn default_order_type() -> OrderType {
    OrderType::Market
}

impl OrderRequest {
    pub fn market(symbol: impl Into<String>, side: OrderSide, quantity: Decimal) -> Self {
        Self {
            symbol: symbol.into(),
            side,
            order_type: OrderType::Market,
            quantity,
            price: None,
            stop_price: None,
            strategy: ExecutionStrategy::Immediate,
            time_in_force: TimeInForce::Day,
        }
    }

    pub fn limit(
        symbol: impl Into<String>,
        side: OrderSide,
        quantity: Decimal,
        price: Decimal,
    ) -> Self {
        Self {
            order_type: OrderType::Limit,
            price: Some(price),
            ..Self::market(symbol, side, quantity)
        }
    }

    pub fn stop(
        symbol: impl Into<String>,
        side: OrderSide,
        quantity: Decimal,
        stop_price: Decimal,
    ) -> Self {
        Self {
            order_type: OrderType::Stop,
            stop_price: Some(stop_price),
            ..Self::market(symbol, side, quantity)
        }
    }

    pub fn with_strategy(mut self, strategy: ExecutionStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_order_type(mut self, order_type: OrderType) -> Self {
        self.order_type = order_type;
        self
    }

    pub fn with_price(mut self, price: Decimal) -> Self {
        self.price = Some(price);
        self
    }

    pub fn with_stop_price(mut self, stop_price: Decimal) -> Self {
        self.stop_price = Some(stop_price);
        self
    }

    pub fn with_time_in_force(mut self, time_in_force: TimeInForce) -> Self {
        self.time_in_force = time_in_force;
        self
    }

    /// Reject malformed submissions before an order exists.
    pub fn validate(&self) -> Result<(), WarMachineError> {
        if self.symbol.trim().is_empty() {
            return Err(WarMachineError::Validation("symbol is empty".to_string()));
        }
        if self.quantity <= Decimal::ZERO {
            return Err(WarMachineError::Validation(format!(
                "quantity must be positive, got {}",
                self.quantity
            )));
        }
        match self.price {
            Some(price) if price <= Decimal::ZERO => {
                return Err(WarMachineError::Validation(format!(
                    "limit price must be positive, got {price}"
                )));
            }
            None if self.order_type.requires_limit_price() => {
                return Err(WarMachineError::Validation(format!(
                    "{} order requires a limit price",
                    self.order_type
                )));
            }
            _ => {}
        }
        match self.stop_price {
            Some(stop) if stop <= Decimal::ZERO => {
                return Err(WarMachineError::Validation(format!(
                    "stop price must be positive, got {stop}"
                )));
            }
            None if self.order_type.requires_stop_price() => {
                return Err(WarMachineError::Validation(format!(
                    "{} order requires a stop price",
                    self.order_type
                )));
            }
            _ => {}
        }
        Ok(())
    }
}

/// Order (tracked by the order manager)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub order_id: Uuid,
    pub symbol: String,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub quantity: Decimal,
    pub price: Option<Decimal>,
    pub stop_price: Option<Decimal>,
    pub strategy: ExecutionStrategy,
    pub time_in_force: TimeInForce,
    pub status: OrderStatus,
    pub filled_quantity: Decimal,
    pub average_price: Option<Decimal>,
    pub commission: Decimal,
    /// Why the order was rejected or expired
    pub reason: Option<String>,
    /// Times the worker picked this order up
    pub attempts: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    pub fn from_request(request: &OrderRequest) -> Self {
        let now = Utc::now();
        Self {
            order_id: Uuid::new_v4(),
            symbol: request.symbol.trim().to_string(),
            side: request.side,
            order_type: request.order_type,
            quantity: request.quantity,
            price: request.price,
            stop_price: request.stop_price,
            strategy: request.strategy,
            time_in_force: request.time_in_force,
            status: OrderStatus::Pending,
            filled_quantity: Decimal::ZERO,
            average_price: None,
            commission: Decimal::ZERO,
            reason: None,
            attempts: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn remaining_quantity(&self) -> Decimal {
        (self.quantity - self.filled_quantity).max(Decimal::ZERO)
    }

    /// Price the caller committed to, if any (limit first, then stop).
    pub fn reference_price(&self) -> Option<Decimal> {
        self.price.or(self.stop_price)
    }

    pub fn is_fully_filled(&self) -> bool {
        self.filled_quantity >= self.quantity
    }

    /// Calculate fill percentage
    pub fn fill_pct(&self) -> Decimal {
        if self.quantity.is_zero() {
            return Decimal::ZERO;
        }
        self.filled_quantity / self.quantity * Decimal::from(100)
    }

    /// Fold a fill into the running volume-weighted average.
    pub(crate) fn record_fill(&mut self, quantity: Decimal, price: Decimal, commission: Decimal) {
        let prior_value = self.average_price.unwrap_or(Decimal::ZERO) * self.filled_quantity;
        self.filled_quantity += quantity;
        if !self.filled_quantity.is_zero() {
            self.average_price = Some((prior_value + quantity * price) / self.filled_quantity);
        }
        self.commission += commission;
        self.updated_at = Utc::now();
    }
}

/// An atomic fill against an order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub trade_id: Uuid,
    pub order_id: Uuid,
    pub symbol: String,
    pub side: OrderSide,
    pub quantity: Decimal,
    pub price: Decimal,
    pub commission: Decimal,
    /// Realised P&L booked by this fill (zero for position-increasing fills)
    #[serde(default)]
    pub realized_pnl: Decimal,
    pub timestamp: DateTime<Utc>,
    pub venue: String,
}

impl Trade {
    /// A simulated fill for `order`, with a fresh id and zero commission.
    pub fn simulated(order: &Order, quantity: Decimal, price: Decimal) -> Self {
        Self {
            trade_id: Uuid::new_v4(),
            order_id: order.order_id,
            symbol: order.symbol.clone(),
            side: order.side,
            quantity,
            price,
            commission: Decimal::ZERO,
            realized_pnl: Decimal::ZERO,
            timestamp: Utc::now(),
            venue: SIMULATED_VENUE.to_string(),
        }
    }

    pub fn notional(&self) -> Decimal {
        self.quantity * self.price
    }
}
