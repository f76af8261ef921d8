//! Collaborator traits for the execution platform

use async_trait::async_trait;

use super::types::ExecutionEvent;
use crate::domain::MarketSnapshot;
use crate::error::Result;

/// Supplier of point-in-time market data
///
/// A slow implementation stalls the single worker; there is no per-call timeout.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    async fn get_snapshot(&self, symbol: &str) -> Result<MarketSnapshot>;
}

/// Receiver of execution events after every terminal order transition
///
/// Retry and backoff belong to the implementation; the engine only logs errors.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, event: &ExecutionEvent) -> Result<()>;
}
