//! End-to-end runs of the execution engine against the simulated market.

use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::Notify;
use warmachine::adapters::{ChannelNotifier, SimulatedMarketData};
use warmachine::config::{AppConfig, EngineConfig};
use warmachine::domain::{
    ExecutionStrategy, MarketSnapshot, OrderRequest, OrderSide, OrderStatus,
};
use warmachine::error::Result;
use warmachine::platform::{
    ExecutionEngine, ExecutionEvent, MarketDataProvider, OrderPriority, RiskLimits,
};
use warmachine::strategy::{ExecutionStrategyEngine, SettlementDelay, StrategyParams};

fn open_limits() -> RiskLimits {
    RiskLimits {
        max_position_size: dec!(1),
        max_total_risk: dec!(1),
        max_daily_loss: dec!(1),
        max_order_size: dec!(1),
        max_open_positions: 50,
    }
}

fn engine_with(
    market: Arc<SimulatedMarketData>,
    params: StrategyParams,
) -> (ExecutionEngine, UnboundedReceiver<ExecutionEvent>) {
    let (notifier, events) = ChannelNotifier::new();
    let engine = ExecutionEngine::from_parts(
        EngineConfig {
            poll_timeout_ms: 10,
            ..EngineConfig::default()
        },
        open_limits(),
        ExecutionStrategyEngine::new(params, SettlementDelay::none()),
        market,
        Arc::new(notifier),
    )
    .expect("engine should build");
    (engine, events)
}

fn market() -> Arc<SimulatedMarketData> {
    Arc::new(SimulatedMarketData::fixed([
        ("AAPL", dec!(150)),
        ("MSFT", dec!(300)),
        ("TSLA", dec!(195)),
    ]))
}

async fn next_event(events: &mut UnboundedReceiver<ExecutionEvent>) -> ExecutionEvent {
    tokio::time::timeout(Duration::from_secs(2), events.recv())
        .await
        .expect("event should arrive")
        .expect("channel open")
}

#[tokio::test]
async fn queued_orders_run_in_priority_order() {
    let (engine, _events) = engine_with(market(), StrategyParams::default());

    for (symbol, priority) in [
        ("AAPL", OrderPriority::Low),
        ("MSFT", OrderPriority::Critical),
        ("TSLA", OrderPriority::Medium),
    ] {
        engine
            .submit_order_with_priority(
                OrderRequest::market(symbol, OrderSide::Buy, dec!(1)),
                priority,
            )
            .await
            .unwrap();
    }
    assert_eq!(engine.run_until_idle().await.unwrap(), 3);

    let booked: Vec<_> = engine
        .get_trade_history(None)
        .await
        .into_iter()
        .map(|t| t.symbol)
        .collect();
    assert_eq!(booked, vec!["MSFT", "TSLA", "AAPL"]);
}

#[tokio::test]
async fn twap_order_fills_in_slices_and_notifies() {
    let (engine, mut events) = engine_with(market(), StrategyParams::default());
    let order = engine
        .submit_order(
            OrderRequest::market("AAPL", OrderSide::Buy, dec!(100))
                .with_strategy(ExecutionStrategy::Twap),
        )
        .await
        .unwrap();
    engine.run_until_idle().await.unwrap();

    let trades = engine.get_trade_history(Some("AAPL")).await;
    assert_eq!(trades.len(), 10);
    assert!(trades.iter().all(|t| t.quantity == dec!(10)));

    let event = next_event(&mut events).await;
    assert_eq!(event.order_id, order.order_id);
    assert_eq!(event.status, OrderStatus::Filled);
    assert_eq!(event.filled_quantity, dec!(100));
    assert_eq!(event.price, Some(dec!(150)));
    assert_eq!(event.slippage, Some(Decimal::ZERO));
    assert!(event.is_success());
}

#[tokio::test]
async fn round_trip_books_realized_pnl() {
    let market = market();
    let (engine, _events) = engine_with(market.clone(), StrategyParams::default());

    engine
        .submit_order(OrderRequest::market("AAPL", OrderSide::Buy, dec!(10)))
        .await
        .unwrap();
    engine.run_until_idle().await.unwrap();

    market.set_price("AAPL", dec!(160)).unwrap();
    let sell = engine
        .submit_order(OrderRequest::market("AAPL", OrderSide::Sell, dec!(10)))
        .await
        .unwrap();
    engine.run_until_idle().await.unwrap();

    assert_eq!(
        engine.get_order_status(sell.order_id).await.unwrap(),
        OrderStatus::Filled
    );
    let position = engine.get_position("AAPL").await.unwrap();
    assert!(position.is_flat());
    assert_eq!(position.realized_pnl, dec!(100));

    let daily = engine.daily_risk_stats().await;
    assert_eq!(daily.pnl, dec!(100));
    assert_eq!(daily.trade_count, 2);

    engine.reset_daily_stats().await;
    assert_eq!(engine.daily_risk_stats().await.pnl, Decimal::ZERO);
}

#[tokio::test]
async fn capped_participation_leaves_partial_that_can_be_cancelled() {
    let params = StrategyParams {
        max_slices: 3,
        ..StrategyParams::default()
    };
    let (engine, mut events) = engine_with(market(), params);
    let order = engine
        .submit_order(
            OrderRequest::market("MSFT", OrderSide::Buy, dec!(100))
                .with_strategy(ExecutionStrategy::Participate),
        )
        .await
        .unwrap();
    engine.run_until_idle().await.unwrap();

    let partial = engine.get_order(order.order_id).await.unwrap();
    assert_eq!(partial.status, OrderStatus::Partial);
    // 5% of what is open each slice: 5, 4, 4
    assert_eq!(partial.filled_quantity, dec!(13));
    assert_eq!(next_event(&mut events).await.status, OrderStatus::Partial);

    let cancelled = engine.cancel_order(order.order_id).await.unwrap();
    assert_eq!(cancelled.status, OrderStatus::Cancelled);
    assert_eq!(cancelled.filled_quantity, dec!(13));
    assert_eq!(next_event(&mut events).await.status, OrderStatus::Cancelled);

    let history = engine.get_order_history(Some("MSFT"), None).await;
    assert_eq!(history.len(), 1);
    assert!(engine.get_orders(None, None).await.is_empty());
}

#[tokio::test]
async fn unknown_order_is_not_found() {
    let (engine, _events) = engine_with(market(), StrategyParams::default());
    let err = engine
        .get_order_status(uuid::Uuid::new_v4())
        .await
        .unwrap_err();
    assert!(err.is_order_not_found());
}

#[tokio::test]
async fn invalid_request_is_refused_at_submission() {
    let (engine, _events) = engine_with(market(), StrategyParams::default());
    let err = engine
        .submit_order(OrderRequest::market("AAPL", OrderSide::Buy, dec!(-1)))
        .await
        .unwrap_err();
    assert!(err.is_validation());
    assert_eq!(engine.get_execution_stats().await.total_orders, 0);
}

#[tokio::test]
async fn background_worker_processes_and_stops() {
    let (engine, mut events) = engine_with(market(), StrategyParams::default());
    let worker = engine.spawn().unwrap();

    let order = engine
        .submit_order_with_priority(
            OrderRequest::limit("TSLA", OrderSide::Buy, dec!(5), dec!(200)),
            OrderPriority::High,
        )
        .await
        .unwrap();

    let event = next_event(&mut events).await;
    assert_eq!(event.order_id, order.order_id);
    assert_eq!(event.status, OrderStatus::Filled);
    // immediate limit fills at the limit
    assert_eq!(event.price, Some(dec!(200)));

    engine.stop();
    tokio::time::timeout(Duration::from_secs(2), worker)
        .await
        .expect("worker should stop")
        .unwrap();
    assert!(!engine.is_running());
}

#[tokio::test]
async fn engine_builds_from_default_config() {
    let mut config = AppConfig::default();
    config.strategy.twap_delay_ms = 0;
    config.risk.max_order_size = dec!(0.5);
    config.risk.max_position_size = dec!(0.5);
    config.risk.max_total_risk = dec!(0.5);

    let (notifier, mut events) = ChannelNotifier::new();
    let engine = ExecutionEngine::new(
        &config,
        Arc::new(SimulatedMarketData::from_config(&config.market_data)),
        Arc::new(notifier),
    )
    .unwrap();

    engine
        .submit_order(
            OrderRequest::market("ANY", OrderSide::Buy, dec!(20))
                .with_strategy(ExecutionStrategy::Twap),
        )
        .await
        .unwrap();
    engine.run_until_idle().await.unwrap();

    let event = next_event(&mut events).await;
    assert_eq!(event.status, OrderStatus::Filled);
    // default_price
    assert_eq!(event.price, Some(dec!(100)));
    assert_eq!(engine.get_trade_history(None).await.len(), 10);
}

#[tokio::test]
async fn tight_limits_reject_through_risk_gate() {
    let (notifier, mut events) = ChannelNotifier::new();
    let engine = ExecutionEngine::from_parts(
        EngineConfig::default(),
        RiskLimits::default(),
        ExecutionStrategyEngine::new(StrategyParams::default(), SettlementDelay::none()),
        market(),
        Arc::new(notifier),
    )
    .unwrap();

    // 300 * 10 = 3% of 100k, over the 2% order limit
    engine
        .submit_order(OrderRequest::market("MSFT", OrderSide::Buy, dec!(10)))
        .await
        .unwrap();
    engine.run_until_idle().await.unwrap();

    let event = next_event(&mut events).await;
    assert_eq!(event.status, OrderStatus::Rejected);
    assert!(event.reason.unwrap().starts_with("risk:"));
    assert!(engine.get_positions().await.is_empty());
}

/// Market data that holds every snapshot request until released.
#[derive(Default)]
struct GatedMarketData {
    entered: Notify,
    release: Notify,
}

#[async_trait]
impl MarketDataProvider for GatedMarketData {
    async fn get_snapshot(&self, symbol: &str) -> Result<MarketSnapshot> {
        self.entered.notify_one();
        self.release.notified().await;
        Ok(MarketSnapshot::new(symbol, dec!(150)))
    }
}

async fn wait_until_finished(engine: &ExecutionEngine, order_id: uuid::Uuid) -> OrderStatus {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let status = engine.get_order_status(order_id).await.unwrap();
            if status.is_terminal() {
                return status;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("order should finish")
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_submitters_against_running_worker() {
    const SUBMITTERS: usize = 32;
    let (engine, _events) = engine_with(market(), StrategyParams::default());
    let worker = engine.spawn().unwrap();

    let mut submitters = tokio::task::JoinSet::new();
    for i in 0..SUBMITTERS {
        let engine = engine.clone();
        submitters.spawn(async move {
            let quantity = Decimal::from(i % 4 + 1);
            let priority = [
                OrderPriority::Critical,
                OrderPriority::High,
                OrderPriority::Medium,
                OrderPriority::Low,
            ][i % 4];
            engine
                .submit_order_with_priority(
                    OrderRequest::market("AAPL", OrderSide::Buy, quantity),
                    priority,
                )
                .await
                .unwrap()
        });
    }

    let mut orders = Vec::with_capacity(SUBMITTERS);
    while let Some(order) = submitters.join_next().await {
        orders.push(order.unwrap());
    }

    for order in &orders {
        assert_eq!(
            wait_until_finished(&engine, order.order_id).await,
            OrderStatus::Filled
        );
    }
    engine.shutdown(Some(worker)).await;

    assert_eq!(engine.queue_stats().await.enqueued_total, SUBMITTERS as u64);

    let requested: Decimal = orders.iter().map(|o| o.quantity).sum();
    let booked: Decimal = engine
        .get_trade_history(Some("AAPL"))
        .await
        .iter()
        .map(|t| t.quantity)
        .sum();
    let filled: Decimal = engine
        .get_order_history(Some("AAPL"), None)
        .await
        .iter()
        .map(|o| o.filled_quantity)
        .sum();
    assert_eq!(booked, requested);
    assert_eq!(filled, requested);
    assert_eq!(engine.get_position("AAPL").await.unwrap().quantity, requested);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn order_in_flight_cannot_be_cancelled() {
    let gate = Arc::new(GatedMarketData::default());
    let (notifier, mut events) = ChannelNotifier::new();
    let engine = ExecutionEngine::from_parts(
        EngineConfig {
            poll_timeout_ms: 10,
            ..EngineConfig::default()
        },
        open_limits(),
        ExecutionStrategyEngine::new(StrategyParams::default(), SettlementDelay::none()),
        gate.clone(),
        Arc::new(notifier),
    )
    .unwrap();
    let worker = engine.spawn().unwrap();

    let order = engine
        .submit_order(OrderRequest::market("AAPL", OrderSide::Buy, dec!(3)))
        .await
        .unwrap();
    tokio::time::timeout(Duration::from_secs(2), gate.entered.notified())
        .await
        .expect("worker should pick the order up");

    let err = engine.cancel_order(order.order_id).await.unwrap_err();
    assert!(err.is_execution());
    assert_eq!(
        engine.get_order_status(order.order_id).await.unwrap(),
        OrderStatus::Pending
    );

    gate.release.notify_one();
    assert_eq!(
        wait_until_finished(&engine, order.order_id).await,
        OrderStatus::Filled
    );
    engine.shutdown(Some(worker)).await;

    let event = next_event(&mut events).await;
    assert_eq!(event.status, OrderStatus::Filled);
    assert!(events.try_recv().is_err());
}
