use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{Result, WarMachineError};

/// Point-in-time read of price and volume data for one symbol
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub symbol: String,
    pub current_price: Decimal,
    /// Ordered volume weights (should sum to roughly 1)
    #[serde(default)]
    pub volume_distribution: Option<Vec<Decimal>>,
    /// Fraction of market volume an order may take per slice
    #[serde(default)]
    pub market_participation: Option<Decimal>,
    pub timestamp: DateTime<Utc>,
}

impl MarketSnapshot {
    pub fn new(symbol: impl Into<String>, current_price: Decimal) -> Self {
        Self {
            symbol: symbol.into(),
            current_price,
            volume_distribution: None,
            market_participation: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_volume_distribution(mut self, weights: Vec<Decimal>) -> Self {
        self.volume_distribution = Some(weights);
        self
    }

    pub fn with_participation(mut self, participation: Decimal) -> Self {
        self.market_participation = Some(participation);
        self
    }

    /// Sanity check before a strategy trades against this snapshot.
    pub fn validate(&self) -> Result<()> {
        if self.current_price <= Decimal::ZERO {
            return Err(WarMachineError::InvalidMarketData(format!(
                "{}: current price must be positive, got {}",
                self.symbol, self.current_price
            )));
        }
        if let Some(weights) = &self.volume_distribution {
            if weights.iter().any(|w| *w < Decimal::ZERO) {
                return Err(WarMachineError::InvalidMarketData(format!(
                    "{}: volume distribution has a negative weight",
                    self.symbol
                )));
            }
        }
        Ok(())
    }

    /// Age of the snapshot in milliseconds
    pub fn age_ms(&self) -> i64 {
        (Utc::now() - self.timestamp).num_milliseconds().max(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_non_positive_price_is_invalid() {
        assert!(MarketSnapshot::new("AAPL", dec!(150)).validate().is_ok());
        assert!(matches!(
            MarketSnapshot::new("AAPL", dec!(0)).validate(),
            Err(WarMachineError::InvalidMarketData(_))
        ));
    }

    #[test]
    fn test_negative_weight_is_invalid() {
        let snapshot = MarketSnapshot::new("AAPL", dec!(150))
            .with_volume_distribution(vec![dec!(0.5), dec!(-0.1), dec!(0.6)]);
        assert!(snapshot.validate().is_err());
    }
}
