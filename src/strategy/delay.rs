//! Simulated settlement delays between strategy slices
//!
//! Kept apart from the slicing logic so tests can run every strategy with
//! [`SettlementDelay::none`].

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::domain::ExecutionStrategy;

/// Pause inserted between consecutive slices, per strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementDelay {
    pub twap: Duration,
    pub vwap: Duration,
    pub iceberg: Duration,
    pub participate: Duration,
}

impl Default for SettlementDelay {
    fn default() -> Self {
        Self {
            twap: Duration::from_millis(100),
            vwap: Duration::from_millis(100),
            iceberg: Duration::from_millis(200),
            participate: Duration::from_millis(100),
        }
    }
}

impl SettlementDelay {
    /// No waiting at all
    pub fn none() -> Self {
        Self {
            twap: Duration::ZERO,
            vwap: Duration::ZERO,
            iceberg: Duration::ZERO,
            participate: Duration::ZERO,
        }
    }

    pub fn from_millis(twap: u64, vwap: u64, iceberg: u64, participate: u64) -> Self {
        Self {
            twap: Duration::from_millis(twap),
            vwap: Duration::from_millis(vwap),
            iceberg: Duration::from_millis(iceberg),
            participate: Duration::from_millis(participate),
        }
    }

    pub fn for_strategy(&self, strategy: ExecutionStrategy) -> Duration {
        match strategy {
            ExecutionStrategy::Immediate => Duration::ZERO,
            ExecutionStrategy::Twap => self.twap,
            ExecutionStrategy::Vwap => self.vwap,
            ExecutionStrategy::Iceberg => self.iceberg,
            ExecutionStrategy::Participate => self.participate,
        }
    }

    /// Wait out the simulated settlement time for one slice.
    pub async fn settle(&self, strategy: ExecutionStrategy) {
        let pause = self.for_strategy(strategy);
        if !pause.is_zero() {
            tokio::time::sleep(pause).await;
        }
    }
}
