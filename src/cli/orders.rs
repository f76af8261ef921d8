//! Order commands: batch files, single orders, and JSON-lines streaming.

use serde::Deserialize;
use std::future::Future;
use std::path::Path;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{info, warn};
use uuid::Uuid;

use super::output::{print_items, print_stats, OrderRow, OutputMode, PositionRow};
use crate::domain::OrderRequest;
use crate::platform::{ExecutionEngine, OrderPriority};

/// One order as written in a batch file or on a stdin line
///
/// ```json
/// {"symbol": "AAPL", "side": "buy", "quantity": "100", "strategy": "twap", "priority": "high"}
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct OrderEntry {
    #[serde(flatten)]
    pub request: OrderRequest,
    #[serde(default)]
    pub priority: OrderPriority,
}

/// Read a JSON array of orders.
pub fn load_batch(path: &Path) -> anyhow::Result<Vec<OrderEntry>> {
    let raw = std::fs::read_to_string(path)?;
    parse_batch(&raw)
}

/// Parse a JSON array entry by entry; an entry that does not decode is
/// logged and skipped, only a malformed array fails the whole batch.
pub fn parse_batch(raw: &str) -> anyhow::Result<Vec<OrderEntry>> {
    let values: Vec<serde_json::Value> = serde_json::from_str(raw)?;
    let mut entries = Vec::with_capacity(values.len());
    for (index, value) in values.into_iter().enumerate() {
        match serde_json::from_value::<OrderEntry>(value) {
            Ok(entry) => entries.push(entry),
            Err(e) => warn!(index, error = %e, "Skipping malformed batch entry"),
        }
    }
    Ok(entries)
}

pub fn parse_line(line: &str) -> anyhow::Result<OrderEntry> {
    Ok(serde_json::from_str(line.trim())?)
}

/// Submit every entry, work the queue dry, then print the outcome.
pub async fn run_batch(
    engine: &ExecutionEngine,
    entries: Vec<OrderEntry>,
    mode: OutputMode,
) -> anyhow::Result<Vec<Uuid>> {
    let mut submitted = Vec::with_capacity(entries.len());
    for entry in entries {
        let symbol = entry.request.symbol.clone();
        match engine
            .submit_order_with_priority(entry.request, entry.priority)
            .await
        {
            Ok(order) => submitted.push(order.order_id),
            Err(e) => warn!(symbol = %symbol, error = %e, "Order refused at submission"),
        }
    }

    let handled = engine.run_until_idle().await?;
    engine.flush_notifications().await;
    info!(submitted = submitted.len(), handled, "Batch complete");

    report(engine, &submitted, mode).await?;
    Ok(submitted)
}

/// Read one order per line until EOF or `shutdown` resolves.
///
/// EOF drains whatever is still queued; a shutdown leaves it queued and
/// reports it as pending.
pub async fn run_stream<R, S>(
    engine: &ExecutionEngine,
    reader: R,
    shutdown: S,
    mode: OutputMode,
) -> anyhow::Result<Vec<Uuid>>
where
    R: AsyncBufRead + Unpin,
    S: Future<Output = ()>,
{
    let worker = engine.spawn()?;
    let mut lines = reader.lines();
    let mut submitted = Vec::new();
    let mut drain = true;
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("Shutdown requested, leaving queued orders in place");
                drain = false;
                break;
            }
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                if line.trim().is_empty() {
                    continue;
                }
                let entry = match parse_line(&line) {
                    Ok(entry) => entry,
                    Err(e) => {
                        warn!(error = %e, "Skipping malformed order line");
                        continue;
                    }
                };
                match engine.submit_order_with_priority(entry.request, entry.priority).await {
                    Ok(order) => submitted.push(order.order_id),
                    Err(e) => warn!(error = %e, "Order refused at submission"),
                }
            }
        }
    }

    engine.stop();
    worker.await?;
    if drain {
        engine.run_until_idle().await?;
    }
    engine.flush_notifications().await;

    report(engine, &submitted, mode).await?;
    Ok(submitted)
}

async fn report(engine: &ExecutionEngine, order_ids: &[Uuid], mode: OutputMode) -> anyhow::Result<()> {
    let mut orders = Vec::with_capacity(order_ids.len());
    for order_id in order_ids {
        orders.push(OrderRow::from(&engine.get_order(*order_id).await?));
    }
    print_items(&orders, mode)?;

    let mut positions: Vec<_> = engine.get_positions().await.into_values().collect();
    positions.sort_by(|a, b| a.symbol.cmp(&b.symbol));
    let positions: Vec<PositionRow> = positions.iter().map(PositionRow::from).collect();
    print_items(&positions, mode)?;

    print_stats(&engine.get_execution_stats().await, mode)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{LogNotifier, SimulatedMarketData};
    use crate::config::EngineConfig;
    use crate::domain::{ExecutionStrategy, OrderSide, OrderStatus, OrderType};
    use crate::platform::{ExecutionEvent, NotificationSink, RiskLimits};
    use crate::strategy::{ExecutionStrategyEngine, SettlementDelay, StrategyParams};
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn engine() -> ExecutionEngine {
        let limits = RiskLimits {
            max_position_size: dec!(1),
            max_total_risk: dec!(1),
            max_daily_loss: dec!(1),
            max_order_size: dec!(1),
            max_open_positions: 10,
        };
        ExecutionEngine::from_parts(
            EngineConfig {
                poll_timeout_ms: 10,
                ..EngineConfig::default()
            },
            limits,
            ExecutionStrategyEngine::new(StrategyParams::default(), SettlementDelay::none()),
            Arc::new(SimulatedMarketData::fixed([("AAPL", dec!(150))])),
            Arc::new(LogNotifier),
        )
        .unwrap()
    }

    #[test]
    fn test_parse_line_with_priority() {
        let entry = parse_line(
            r#"{"symbol":"AAPL","side":"sell","order_type":"limit","quantity":"10","price":"151.5","strategy":"iceberg","priority":"critical"}"#,
        )
        .unwrap();
        assert_eq!(entry.priority, OrderPriority::Critical);
        assert_eq!(entry.request.side, OrderSide::Sell);
        assert_eq!(entry.request.order_type, OrderType::Limit);
        assert_eq!(entry.request.price, Some(dec!(151.5)));
        assert_eq!(entry.request.strategy, ExecutionStrategy::Iceberg);
    }

    #[test]
    fn test_parse_line_defaults() {
        let entry = parse_line(r#"{"symbol":"AAPL","side":"buy","quantity":"1"}"#).unwrap();
        assert_eq!(entry.priority, OrderPriority::Medium);
        assert_eq!(entry.request.order_type, OrderType::Market);
        assert_eq!(entry.request.strategy, ExecutionStrategy::Immediate);
    }

    #[tokio::test]
    async fn test_run_batch_skips_invalid_requests() {
        let engine = engine();
        let entries = vec![
            parse_line(r#"{"symbol":"AAPL","side":"buy","quantity":"5"}"#).unwrap(),
            parse_line(r#"{"symbol":"AAPL","side":"buy","quantity":"0"}"#).unwrap(),
        ];
        let ids = run_batch(&engine, entries, OutputMode::Json).await.unwrap();
        assert_eq!(ids.len(), 1);
        assert_eq!(
            engine.get_order_status(ids[0]).await.unwrap(),
            OrderStatus::Filled
        );
    }

    #[test]
    fn test_parse_batch_skips_bad_entries() {
        let entries = parse_batch(
            r#"[
                {"symbol":"AAPL","side":"buy","quantity":"5"},
                {"symbol":"AAPL","side":"buy","quantity":"5","strategy":"sniper"},
                {"symbol":"MSFT","side":"sell","quantity":"2","priority":"high"}
            ]"#,
        )
        .unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].request.symbol, "AAPL");
        assert_eq!(entries[1].request.symbol, "MSFT");
        assert_eq!(entries[1].priority, OrderPriority::High);
    }

    #[test]
    fn test_parse_batch_rejects_non_array() {
        assert!(parse_batch(r#"{"symbol":"AAPL"}"#).is_err());
        assert!(parse_batch("[").is_err());
    }

    /// Counts deliveries after a delay.
    struct SlowCountingSink(AtomicUsize);

    #[async_trait::async_trait]
    impl NotificationSink for SlowCountingSink {
        async fn notify(&self, _event: &ExecutionEvent) -> crate::error::Result<()> {
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_run_batch_returns_after_notifications_delivered() {
        let sink = Arc::new(SlowCountingSink(AtomicUsize::new(0)));
        let engine = ExecutionEngine::from_parts(
            EngineConfig::default(),
            RiskLimits {
                max_position_size: dec!(1),
                max_total_risk: dec!(1),
                max_daily_loss: dec!(1),
                max_order_size: dec!(1),
                max_open_positions: 10,
            },
            ExecutionStrategyEngine::new(StrategyParams::default(), SettlementDelay::none()),
            Arc::new(SimulatedMarketData::fixed([("AAPL", dec!(150))])),
            sink.clone(),
        )
        .unwrap();
        let entries = parse_batch(
            r#"[{"symbol":"AAPL","side":"buy","quantity":"1"},{"symbol":"AAPL","side":"buy","quantity":"2"}]"#,
        )
        .unwrap();

        run_batch(&engine, entries, OutputMode::Json).await.unwrap();
        assert_eq!(sink.0.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_run_stream_drains_on_eof() {
        let engine = engine();
        let input = b"{\"symbol\":\"AAPL\",\"side\":\"buy\",\"quantity\":\"2\"}\n\nnot json\n{\"symbol\":\"AAPL\",\"side\":\"buy\",\"quantity\":\"3\",\"priority\":\"low\"}\n";
        let reader = tokio::io::BufReader::new(&input[..]);

        let ids = run_stream(&engine, reader, std::future::pending::<()>(), OutputMode::Json)
            .await
            .unwrap();
        assert_eq!(ids.len(), 2);
        assert_eq!(engine.get_position("AAPL").await.unwrap().quantity, dec!(5));
        assert!(!engine.is_running());
    }
}
