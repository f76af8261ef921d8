pub mod adapters;
pub mod cli;
pub mod config;
pub mod domain;
pub mod error;
pub mod platform;
pub mod strategy;

pub use adapters::{ChannelNotifier, LogNotifier, SimulatedMarketData, WebhookNotifier};
pub use crate::config::AppConfig;
pub use domain::{
    ExecutionStrategy, MarketSnapshot, Order, OrderRequest, OrderSide, OrderStatus, OrderType,
    Position, TimeInForce, Trade,
};
pub use error::{Result, WarMachineError};
pub use platform::{
    ExecutionEngine, ExecutionEvent, ExecutionStats, MarketDataProvider, NotificationSink,
    OrderManager, OrderPriority, PriorityOrderQueue, RiskCheckResult, RiskGate, RiskLimits,
    ZeroFillPolicy,
};
pub use strategy::{ExecutionStrategyEngine, SettlementDelay, StrategyParams};
