//! Execution Strategy Engine
//!
//! Turns one order plus one market snapshot into simulated fills. Every slice
//! trades against the same snapshot; prices are not re-read between slices.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::delay::SettlementDelay;
use super::slicing;
use crate::domain::{ExecutionStrategy, MarketSnapshot, Order, OrderSide, OrderType, Trade};
use crate::error::{Result, WarMachineError};

/// Tunables shared by the slicing algorithms
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyParams {
    pub twap_slices: usize,
    pub iceberg_visible_fraction: Decimal,
    pub default_participation: Decimal,
    pub default_volume_distribution: Vec<Decimal>,
    /// Floor for iceberg and participate clips
    pub min_slice_quantity: Decimal,
    pub max_slices: usize,
}

impl Default for StrategyParams {
    fn default() -> Self {
        Self {
            twap_slices: 10,
            iceberg_visible_fraction: dec!(0.10),
            default_participation: dec!(0.05),
            default_volume_distribution: vec![
                dec!(0.1),
                dec!(0.2),
                dec!(0.3),
                dec!(0.2),
                dec!(0.1),
                dec!(0.1),
            ],
            min_slice_quantity: dec!(1),
            max_slices: 1000,
        }
    }
}

/// Dispatches an order to its execution algorithm
pub struct ExecutionStrategyEngine {
    params: StrategyParams,
    delay: SettlementDelay,
}

impl ExecutionStrategyEngine {
    pub fn new(params: StrategyParams, delay: SettlementDelay) -> Self {
        Self { params, delay }
    }

    pub fn params(&self) -> &StrategyParams {
        &self.params
    }

    /// Run the order's strategy against `snapshot`.
    ///
    /// Returns zero trades when a limit or stop condition is not met. The
    /// summed trade quantity never exceeds the order's open quantity.
    pub async fn execute_order(&self, order: &Order, snapshot: &MarketSnapshot) -> Result<Vec<Trade>> {
        snapshot.validate()?;
        if snapshot.symbol != order.symbol {
            return Err(WarMachineError::InvalidMarketData(format!(
                "snapshot for {} used for order on {}",
                snapshot.symbol, order.symbol
            )));
        }

        let quantity = order.remaining_quantity();
        if quantity <= Decimal::ZERO {
            return Ok(Vec::new());
        }

        let Some(gate_price) = fill_price(order, snapshot.current_price) else {
            debug!(
                order_id = %order.order_id,
                order_type = %order.order_type,
                current_price = %snapshot.current_price,
                "Price condition not met, no fill"
            );
            return Ok(Vec::new());
        };

        let plan = match order.strategy {
            ExecutionStrategy::Immediate => {
                // whole quantity in one trade at the gated price
                return Ok(vec![Trade::simulated(order, quantity, gate_price)]);
            }
            ExecutionStrategy::Twap => slicing::twap_plan(quantity, self.params.twap_slices),
            ExecutionStrategy::Vwap => {
                let weights = snapshot
                    .volume_distribution
                    .as_deref()
                    .filter(|w| w.iter().any(|x| *x > Decimal::ZERO))
                    .unwrap_or(self.params.default_volume_distribution.as_slice());
                slicing::vwap_plan(quantity, weights)
            }
            ExecutionStrategy::Iceberg => slicing::iceberg_plan(
                quantity,
                self.params.iceberg_visible_fraction,
                self.params.min_slice_quantity,
                self.params.max_slices,
            ),
            ExecutionStrategy::Participate => {
                let participation = snapshot
                    .market_participation
                    .unwrap_or(self.params.default_participation);
                if participation <= Decimal::ZERO || participation > Decimal::ONE {
                    return Err(WarMachineError::Execution(format!(
                        "market participation {} outside (0, 1]",
                        participation
                    )));
                }
                slicing::participate_plan(
                    quantity,
                    participation,
                    self.params.min_slice_quantity,
                    self.params.max_slices,
                )
            }
        };

        let trades = self
            .fill_slices(order, &plan, snapshot.current_price)
            .await;
        info!(
            order_id = %order.order_id,
            strategy = %order.strategy,
            slices = trades.len(),
            filled = %trades.iter().map(|t| t.quantity).sum::<Decimal>(),
            "Strategy execution finished"
        );
        Ok(trades)
    }

    async fn fill_slices(&self, order: &Order, plan: &[Decimal], price: Decimal) -> Vec<Trade> {
        let mut trades = Vec::with_capacity(plan.len());
        for (i, slice) in plan.iter().enumerate() {
            if i > 0 {
                self.delay.settle(order.strategy).await;
            }
            debug!(
                order_id = %order.order_id,
                slice = i + 1,
                of = plan.len(),
                quantity = %slice,
                "Filling slice"
            );
            trades.push(Trade::simulated(order, *slice, price));
        }
        trades
    }
}

impl Default for ExecutionStrategyEngine {
    fn default() -> Self {
        Self::new(StrategyParams::default(), SettlementDelay::default())
    }
}

/// Price at which the order may trade against `current`, or `None` if it may not.
///
/// Limit legs fill at the limit; market and stop legs fill at `current`.
pub fn fill_price(order: &Order, current: Decimal) -> Option<Decimal> {
    let limit_ok = |limit: Decimal| match order.side {
        OrderSide::Buy => current <= limit,
        OrderSide::Sell => current >= limit,
    };
    let stop_hit = |stop: Decimal| match order.side {
        OrderSide::Buy => current >= stop,
        OrderSide::Sell => current <= stop,
    };

    match order.order_type {
        OrderType::Market => Some(current),
        OrderType::Limit => order.price.filter(|l| limit_ok(*l)),
        OrderType::Stop | OrderType::TrailingStop => {
            order.stop_price.filter(|s| stop_hit(*s)).map(|_| current)
        }
        OrderType::StopLimit => match (order.stop_price, order.price) {
            (Some(stop), Some(limit)) if stop_hit(stop) && limit_ok(limit) => Some(limit),
            _ => None,
        },
    }
}
