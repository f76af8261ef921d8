//! Execution Engine - the order pipeline orchestrator
//!
//! Flow per order:
//! 1. `submit_order` creates a PENDING order and queues it by priority
//! 2. the worker pops it and fetches a market snapshot
//! 3. RiskGate decides; a block ends the order as REJECTED
//! 4. the strategy engine produces trades, which are booked and fed to daily P&L
//! 5. the order ends FILLED, PARTIAL, or goes through the zero-fill policy
//!
//! One worker drains the queue. A failure while handling one order rejects
//! that order and the loop moves on.

use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::dispatch::EventDispatcher;
use super::order_manager::OrderManager;
use super::queue::{QueueStats, QueuedOrder, SharedOrderQueue};
use super::risk::{DailyRiskStats, RiskCheckResult, RiskGate, RiskLimits};
use super::traits::{MarketDataProvider, NotificationSink};
use super::types::{
    ExecutionEvent, ExecutionMetrics, ExecutionStats, OrderPriority, ZeroFillPolicy,
    NO_FILL_REASON,
};
use crate::config::{AppConfig, EngineConfig};
use crate::domain::{Order, OrderRequest, OrderSide, OrderStatus, Position, Trade};
use crate::error::{OrderError, Result, WarMachineError};
use crate::strategy::ExecutionStrategyEngine;

/// How one pickup of an order ended
enum Outcome {
    /// Final snapshot, booked trades, price used for slippage
    Done(Order, Vec<Trade>, Option<Decimal>),
    /// Put back on its tier after a zero fill
    Requeued,
    /// No longer live (cancelled while queued)
    Skipped,
}

struct EngineInner {
    settings: EngineConfig,
    order_manager: RwLock<OrderManager>,
    risk_gate: RwLock<RiskGate>,
    queue: SharedOrderQueue,
    strategies: ExecutionStrategyEngine,
    market_data: Arc<dyn MarketDataProvider>,
    events: EventDispatcher,
    metrics: RwLock<ExecutionMetrics>,
    running: AtomicBool,
    stop_requested: AtomicBool,
}

/// Order execution engine (cheap to clone)
#[derive(Clone)]
pub struct ExecutionEngine {
    inner: Arc<EngineInner>,
}

impl ExecutionEngine {
    /// Build an engine from loaded configuration.
    pub fn new(
        config: &AppConfig,
        market_data: Arc<dyn MarketDataProvider>,
        notifier: Arc<dyn NotificationSink>,
    ) -> Result<Self> {
        let strategies = ExecutionStrategyEngine::new(
            config.strategy.params(),
            config.strategy.settlement_delay(),
        );
        Self::from_parts(
            config.engine.clone(),
            config.risk.to_limits(),
            strategies,
            market_data,
            notifier,
        )
    }

    pub fn from_parts(
        settings: EngineConfig,
        limits: RiskLimits,
        strategies: ExecutionStrategyEngine,
        market_data: Arc<dyn MarketDataProvider>,
        notifier: Arc<dyn NotificationSink>,
    ) -> Result<Self> {
        limits.validate()?;
        if settings.portfolio_value <= Decimal::ZERO {
            return Err(WarMachineError::Validation(
                "portfolio value must be positive".to_string(),
            ));
        }

        Ok(Self {
            inner: Arc::new(EngineInner {
                queue: SharedOrderQueue::new(settings.tier_capacity),
                settings,
                order_manager: RwLock::new(OrderManager::new()),
                risk_gate: RwLock::new(RiskGate::new(limits)),
                strategies,
                market_data,
                events: EventDispatcher::new(notifier),
                metrics: RwLock::new(ExecutionMetrics::default()),
                running: AtomicBool::new(false),
                stop_requested: AtomicBool::new(false),
            }),
        })
    }

    // ==================== submission ====================

    /// Submit at MEDIUM priority.
    pub async fn submit_order(&self, request: OrderRequest) -> Result<Order> {
        self.submit_order_with_priority(request, OrderPriority::Medium)
            .await
    }

    /// Create a PENDING order and queue it; returns the order immediately.
    pub async fn submit_order_with_priority(
        &self,
        request: OrderRequest,
        priority: OrderPriority,
    ) -> Result<Order> {
        let order = self.inner.order_manager.write().await.create_order(&request)?;

        if let Some(dropped) = self.inner.queue.put(order.clone(), priority).await {
            self.expire_dropped(dropped).await;
        }

        info!(
            order_id = %order.order_id,
            symbol = %order.symbol,
            priority = %priority,
            "Order submitted"
        );
        Ok(order)
    }

    async fn expire_dropped(&self, dropped: QueuedOrder) {
        let order_id = dropped.order_id();
        let expired = {
            let mut manager = self.inner.order_manager.write().await;
            if let Err(e) = manager.set_reason(order_id, "dropped from full queue tier") {
                debug!(order_id = %order_id, error = %e, "Dropped order already finalised");
                return;
            }
            manager.update_order_status(order_id, OrderStatus::Expired, None, None)
        };
        match expired {
            Ok(order) => self.emit(ExecutionEvent::from_order(&order, &[], None)).await,
            Err(e) => warn!(order_id = %order_id, error = %e, "Failed to expire dropped order"),
        }
    }

    /// Cancel an order the worker has not picked up, or finalise a PARTIAL one.
    pub async fn cancel_order(&self, order_id: Uuid) -> Result<Order> {
        let dequeued = self.inner.queue.remove(order_id).await.is_some();

        let cancelled = {
            let mut manager = self.inner.order_manager.write().await;
            let status = manager
                .get_order(order_id)
                .map(|o| o.status)
                .ok_or(OrderError::NotFound { order_id })?;

            if !dequeued && status != OrderStatus::Partial {
                return Err(WarMachineError::Execution(format!(
                    "order {order_id} is being executed and cannot be cancelled"
                )));
            }
            manager.update_order_status(order_id, OrderStatus::Cancelled, None, None)?
        };

        info!(order_id = %order_id, symbol = %cancelled.symbol, "Order cancelled");
        self.inner.metrics.write().await.cancelled += 1;
        self.emit(ExecutionEvent::from_order(&cancelled, &[], None)).await;
        Ok(cancelled)
    }

    // ==================== worker ====================

    /// Drain the queue until `stop` is called.
    ///
    /// Waits at most `poll_timeout_ms` on an empty queue before re-checking the
    /// stop flag; an order in progress always finishes first.
    pub async fn run(&self) -> Result<()> {
        self.claim_worker()?;
        self.inner.stop_requested.store(false, Ordering::SeqCst);
        self.worker_loop().await;
        Ok(())
    }

    /// Claim the worker slot now and run the loop on the runtime.
    pub fn spawn(&self) -> Result<JoinHandle<()>> {
        self.claim_worker()?;
        self.inner.stop_requested.store(false, Ordering::SeqCst);
        let engine = self.clone();
        Ok(tokio::spawn(async move { engine.worker_loop().await }))
    }

    async fn worker_loop(&self) {
        info!("Execution engine started");
        let poll_timeout = self.inner.settings.poll_timeout();
        while !self.inner.stop_requested.load(Ordering::SeqCst) {
            if let Some(item) = self.inner.queue.pop_timeout(poll_timeout).await {
                self.process(item).await;
            }
        }
        self.inner.running.store(false, Ordering::SeqCst);
        info!("Execution engine stopped");
    }

    /// Process everything currently queued, then return the count handled.
    pub async fn run_until_idle(&self) -> Result<usize> {
        self.claim_worker()?;
        let mut handled = 0;
        while let Some(item) = self.inner.queue.get().await {
            self.process(item).await;
            handled += 1;
        }
        self.inner.running.store(false, Ordering::SeqCst);
        Ok(handled)
    }

    /// Process the next queued order, if any.
    pub async fn process_next(&self) -> Result<Option<Uuid>> {
        self.claim_worker()?;
        let next = self.inner.queue.get().await;
        let order_id = next.as_ref().map(QueuedOrder::order_id);
        if let Some(item) = next {
            self.process(item).await;
        }
        self.inner.running.store(false, Ordering::SeqCst);
        Ok(order_id)
    }

    /// Ask the worker to exit after its current order.
    pub fn stop(&self) {
        self.inner.stop_requested.store(true, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    fn claim_worker(&self) -> Result<()> {
        if self.inner.running.swap(true, Ordering::SeqCst) {
            return Err(WarMachineError::Execution(
                "execution worker already running".to_string(),
            ));
        }
        Ok(())
    }

    /// Handle one dequeued order; never propagates a failure.
    async fn process(&self, item: QueuedOrder) {
        let started = Instant::now();
        let order_id = item.order_id();
        let symbol = item.order.symbol.clone();
        debug!(
            order_id = %order_id,
            symbol = %symbol,
            waited_ms = item.waited().as_millis() as u64,
            "Processing order"
        );

        let (order, trades, reference) = match self.execute(&item).await {
            Ok(Outcome::Done(order, trades, reference)) => (order, trades, reference),
            Ok(Outcome::Requeued) => {
                self.inner.metrics.write().await.requeued += 1;
                return;
            }
            Ok(Outcome::Skipped) => return,
            Err(e) => {
                error!(order_id = %order_id, symbol = %symbol, error = %e, "Order processing failed");
                match self.reject(order_id, e.to_string()).await {
                    Some(order) => (order, Vec::new(), None),
                    None => return,
                }
            }
        };

        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
        self.inner
            .metrics
            .write()
            .await
            .record(order.status, elapsed_ms);

        info!(
            order_id = %order_id,
            symbol = %symbol,
            status = %order.status,
            filled = %order.filled_quantity,
            trades = trades.len(),
            elapsed_ms,
            "Order processed"
        );
        self.emit(ExecutionEvent::from_order(&order, &trades, reference)).await;
    }

    async fn execute(&self, item: &QueuedOrder) -> Result<Outcome> {
        let order_id = item.order_id();

        // 1. still live and waiting?
        let order = {
            let mut manager = self.inner.order_manager.write().await;
            let Some(order) = manager.get_order(order_id) else {
                return Ok(Outcome::Skipped);
            };
            if !matches!(order.status, OrderStatus::Pending | OrderStatus::Submitted) {
                return Ok(Outcome::Skipped);
            }
            manager.record_attempt(order_id)?;
            manager.get_order(order_id).cloned().ok_or(OrderError::NotFound { order_id })?
        };

        // 2. market snapshot
        let snapshot = self.inner.market_data.get_snapshot(&order.symbol).await?;

        // 3. risk
        let verdict = {
            let manager = self.inner.order_manager.read().await;
            let gate = self.inner.risk_gate.read().await;
            gate.check(
                &order,
                self.inner.settings.portfolio_value,
                manager.positions(),
                Some(snapshot.current_price),
            )
        };
        if let RiskCheckResult::Blocked(reason) = verdict {
            let rejected = self
                .reject(order_id, format!("risk: {reason}"))
                .await
                .ok_or(OrderError::NotFound { order_id })?;
            return Ok(Outcome::Done(rejected, Vec::new(), None));
        }

        // 4. working
        if order.status == OrderStatus::Pending {
            self.inner.order_manager.write().await.update_order_status(
                order_id,
                OrderStatus::Submitted,
                None,
                None,
            )?;
        }

        // 5. strategy
        let trades = self.inner.strategies.execute_order(&order, &snapshot).await?;
        let reference = order.reference_price().or(Some(snapshot.current_price));

        if trades.is_empty() {
            return self.handle_zero_fill(item, &order).await;
        }

        // 6. book fills
        let (booked, final_order) = {
            let mut manager = self.inner.order_manager.write().await;

            if order.side == OrderSide::Sell {
                let requested: Decimal = trades.iter().map(|t| t.quantity).sum();
                let held = manager.held_quantity(&order.symbol);
                if requested > held {
                    return Err(OrderError::InsufficientPosition {
                        symbol: order.symbol.clone(),
                        requested,
                        held,
                    }
                    .into());
                }
            }

            let mut booked = Vec::with_capacity(trades.len());
            let mut gate = self.inner.risk_gate.write().await;
            for trade in trades {
                let trade = manager.book_trade(trade)?;
                gate.update_daily_pnl(&trade);
                booked.push(trade);
            }
            drop(gate);

            manager.mark_to_market(&order.symbol, snapshot.current_price);

            let live = manager
                .get_order(order_id)
                .ok_or(OrderError::NotFound { order_id })?;
            let status = if live.is_fully_filled() {
                OrderStatus::Filled
            } else {
                OrderStatus::Partial
            };
            let final_order = manager.update_order_status(order_id, status, None, None)?;
            (booked, final_order)
        };

        Ok(Outcome::Done(final_order, booked, reference))
    }

    async fn handle_zero_fill(&self, item: &QueuedOrder, order: &Order) -> Result<Outcome> {
        let policy = self.inner.settings.zero_fill_policy;
        let attempts = order.attempts;

        if policy == ZeroFillPolicy::Requeue && attempts < self.inner.settings.max_requeue_attempts {
            warn!(
                order_id = %order.order_id,
                attempts,
                "No fill, requeueing order"
            );
            let snapshot = self
                .inner
                .order_manager
                .read()
                .await
                .get_order(order.order_id)
                .cloned()
                .ok_or(OrderError::NotFound {
                    order_id: order.order_id,
                })?;
            if let Some(dropped) = self.inner.queue.put(snapshot, item.priority).await {
                self.expire_dropped(dropped).await;
            }
            return Ok(Outcome::Requeued);
        }

        warn!(order_id = %order.order_id, attempts, "No fill, rejecting order");
        let rejected = self
            .reject(order.order_id, NO_FILL_REASON)
            .await
            .ok_or(OrderError::NotFound {
                order_id: order.order_id,
            })?;
        Ok(Outcome::Done(rejected, Vec::new(), None))
    }

    /// Mark an order REJECTED with a reason; `None` if it is no longer live.
    async fn reject(&self, order_id: Uuid, reason: impl Into<String>) -> Option<Order> {
        let mut manager = self.inner.order_manager.write().await;
        let result = manager
            .set_reason(order_id, reason)
            .and_then(|_| manager.update_order_status(order_id, OrderStatus::Rejected, None, None));
        match result {
            Ok(order) => Some(order),
            Err(e) => {
                warn!(order_id = %order_id, error = %e, "Could not reject order");
                None
            }
        }
    }

    /// Queue an event for in-order delivery to the notification sink.
    async fn emit(&self, event: ExecutionEvent) {
        self.inner.events.send(event).await;
    }

    /// Wait until every event emitted so far has reached the sink.
    pub async fn flush_notifications(&self) {
        self.inner.events.flush().await;
    }

    /// Stop the worker, wait for it to exit, then flush notifications.
    pub async fn shutdown(&self, worker: Option<JoinHandle<()>>) {
        self.stop();
        if let Some(worker) = worker {
            if let Err(e) = worker.await {
                error!(error = %e, "Execution worker task failed");
            }
        }
        self.flush_notifications().await;
    }

    // ==================== queries ====================

    /// Status of a live or finished order.
    pub async fn get_order_status(&self, order_id: Uuid) -> Result<OrderStatus> {
        self.get_order(order_id).await.map(|o| o.status)
    }

    pub async fn get_order(&self, order_id: Uuid) -> Result<Order> {
        self.inner
            .order_manager
            .read()
            .await
            .find_order(order_id)
            .cloned()
            .ok_or_else(|| OrderError::NotFound { order_id }.into())
    }

    pub async fn get_orders(&self, symbol: Option<&str>, status: Option<OrderStatus>) -> Vec<Order> {
        self.inner.order_manager.read().await.get_orders(symbol, status)
    }

    pub async fn get_order_history(
        &self,
        symbol: Option<&str>,
        status: Option<OrderStatus>,
    ) -> Vec<Order> {
        self.inner
            .order_manager
            .read()
            .await
            .get_order_history(symbol, status)
    }

    pub async fn get_position(&self, symbol: &str) -> Option<Position> {
        self.inner
            .order_manager
            .read()
            .await
            .get_position(symbol)
            .cloned()
    }

    pub async fn get_positions(&self) -> HashMap<String, Position> {
        self.inner.order_manager.read().await.get_positions()
    }

    pub async fn get_trade_history(&self, symbol: Option<&str>) -> Vec<Trade> {
        self.inner.order_manager.read().await.get_trade_history(symbol)
    }

    pub async fn queue_stats(&self) -> QueueStats {
        self.inner.queue.stats().await
    }

    pub async fn get_execution_stats(&self) -> ExecutionStats {
        let queue = self.inner.queue.stats().await;
        let manager = self.inner.order_manager.read().await;
        let daily_pnl = self.inner.risk_gate.read().await.daily_pnl();
        let metrics = self.inner.metrics.read().await.clone();

        ExecutionStats {
            total_orders: manager.live_count() + manager.history_count(),
            pending_orders: manager.get_orders(None, Some(OrderStatus::Pending)).len(),
            filled_orders: manager.count_by_status(OrderStatus::Filled),
            total_positions: manager.positions().len(),
            total_trades: manager.trade_count(),
            daily_pnl,
            queue_size: queue.current_size,
            metrics,
            queue,
        }
    }

    // ==================== risk maintenance ====================

    pub async fn risk_limits(&self) -> RiskLimits {
        self.inner.risk_gate.read().await.limits().clone()
    }

    pub async fn update_risk_limits(&self, limits: RiskLimits) -> Result<()> {
        self.inner.risk_gate.write().await.update_limits(limits)?;
        Ok(())
    }

    pub async fn daily_risk_stats(&self) -> DailyRiskStats {
        self.inner.risk_gate.read().await.daily_stats()
    }

    /// Clear daily P&L; meant for an external once-a-day scheduler.
    pub async fn reset_daily_stats(&self) {
        self.inner.risk_gate.write().await.reset_daily_stats();
    }
}
