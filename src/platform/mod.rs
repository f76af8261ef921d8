//! Execution Platform - queueing, risk gating, order lifecycle and orchestration
//!
//! Orders enter through [`ExecutionEngine`], wait in the priority queue, pass
//! the risk gate and are worked by the strategy engine before booking.

mod dispatch;
mod engine;
mod order_manager;
mod queue;
mod risk;
mod traits;
mod types;

pub use engine::ExecutionEngine;
pub use order_manager::OrderManager;
pub use queue::{PriorityOrderQueue, QueueStats, QueuedOrder, SharedOrderQueue};
pub use risk::{BlockReason, DailyRiskStats, RiskCheckResult, RiskGate, RiskLimits};
pub use traits::{MarketDataProvider, NotificationSink};
pub use types::{
    ExecutionEvent, ExecutionMetrics, ExecutionStats, OrderPriority, ZeroFillPolicy,
    NO_FILL_REASON,
};

