//! Simulated market data supplier
//!
//! Serves snapshots from configured base prices, optionally moving each price
//! by a bounded random walk on every read.

use async_trait::async_trait;
use rand::Rng;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::debug;

use crate::config::MarketDataConfig;
use crate::domain::MarketSnapshot;
use crate::error::{Result, WarMachineError};
use crate::platform::MarketDataProvider;

pub struct SimulatedMarketData {
    prices: Mutex<HashMap<String, Decimal>>,
    default_price: Option<Decimal>,
    jitter_bps: u32,
    volume_distribution: Option<Vec<Decimal>>,
    market_participation: Option<Decimal>,
}

impl SimulatedMarketData {
    /// Fixed prices, no jitter
    pub fn fixed<I, S>(prices: I) -> Self
    where
        I: IntoIterator<Item = (S, Decimal)>,
        S: Into<String>,
    {
        Self {
            prices: Mutex::new(
                prices
                    .into_iter()
                    .map(|(symbol, price)| {
                        let symbol: String = symbol.into();
                        (normalize(&symbol), price)
                    })
                    .collect(),
            ),
            default_price: None,
            jitter_bps: 0,
            volume_distribution: None,
            market_participation: None,
        }
    }

    pub fn from_config(config: &MarketDataConfig) -> Self {
        Self {
            default_price: config.default_price,
            jitter_bps: config.jitter_bps,
            volume_distribution: config.volume_distribution.clone(),
            market_participation: config.market_participation,
            ..Self::fixed(config.base_prices.clone())
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

    /// Set or replace the price for a symbol.
    pub fn set_price(&self, symbol: &str, price: Decimal) -> Result<()> {
        self.lock_prices()?.insert(normalize(symbol), price);
        Ok(())
    }

    fn lock_prices(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, Decimal>>> {
        self.prices
            .lock()
            .map_err(|_| WarMachineError::Internal("market data price lock poisoned".to_string()))
    }

    fn next_price(&self, symbol: &str) -> Result<Decimal> {
        let mut prices = self.lock_prices()?;
        let key = normalize(symbol);
        let current = match prices.get(&key).copied().or(self.default_price) {
            Some(price) => price,
            None => {
                return Err(WarMachineError::MarketDataUnavailable(format!(
                    "no price for {symbol}"
                )))
            }
        };

        if self.jitter_bps == 0 {
            return Ok(current);
        }

        let bps = i64::from(self.jitter_bps);
        let step = rand::thread_rng().gen_range(-bps..=bps);
        let moved = current * (Decimal::ONE + Decimal::new(step, 4));
        // never walk to zero or below
        let next = if moved > Decimal::ZERO { moved } else { current };
        let next = next.round_dp(4);
        prices.insert(key, next);
        Ok(next)
    }
}

fn normalize(symbol: &str) -> String {
    symbol.trim().to_ascii_uppercase()
}

#[async_trait]
impl MarketDataProvider for SimulatedMarketData {
    async fn get_snapshot(&self, symbol: &str) -> Result<MarketSnapshot> {
        let price = self.next_price(symbol)?;
        let mut snapshot = MarketSnapshot::new(symbol, price);
        snapshot.volume_distribution = self.volume_distribution.clone();
        snapshot.market_participation = self.market_participation;

        debug!(symbol, price = %price, "Served simulated snapshot");
        Ok(snapshot)
    }
}
