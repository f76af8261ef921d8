//! Execution strategies: Immediate, TWAP, VWAP, Iceberg and Participate

pub mod delay;
pub mod engine;
pub mod slicing;

pub use delay::SettlementDelay;
pub use engine::{fill_price, ExecutionStrategyEngine, StrategyParams};
