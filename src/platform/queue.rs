//! Priority Order Queue - tiered FIFO queue
//!
//! Five tiers served in strict priority order, FIFO within a tier. There is no
//! aging, so a busy CRITICAL tier can starve SCHEDULED work indefinitely.
//! Each tier is bounded; a full tier evicts its oldest entry.

use serde::Serialize;
use std::collections::VecDeque;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, Notify};
use tracing::{debug, warn};
use uuid::Uuid;

use super::types::OrderPriority;
use crate::domain::Order;

/// Order snapshot waiting in a tier
#[derive(Debug, Clone)]
pub struct QueuedOrder {
    pub order: Order,
    pub priority: OrderPriority,
    pub enqueued_at: Instant,
}

impl QueuedOrder {
    pub fn order_id(&self) -> Uuid {
        self.order.order_id
    }

    pub fn waited(&self) -> Duration {
        self.enqueued_at.elapsed()
    }
}

/// Tiered order queue (not synchronised; see [`SharedOrderQueue`])
pub struct PriorityOrderQueue {
    tiers: [VecDeque<QueuedOrder>; OrderPriority::COUNT],
    tier_capacity: usize,
    enqueued_count: u64,
    dequeued_count: u64,
    dropped_count: u64,
    total_wait: Duration,
    max_wait: Duration,
}

impl PriorityOrderQueue {
    pub fn new(tier_capacity: usize) -> Self {
        Self {
            tiers: Default::default(),
            tier_capacity: tier_capacity.max(1),
            enqueued_count: 0,
            dequeued_count: 0,
            dropped_count: 0,
            total_wait: Duration::ZERO,
            max_wait: Duration::ZERO,
        }
    }

    /// Append to the tail of the order's tier.
    ///
    /// Returns the entry evicted to make room when the tier was full.
    pub fn put(&mut self, order: Order, priority: OrderPriority) -> Option<QueuedOrder> {
        let tier = &mut self.tiers[priority.index()];
        let evicted = if tier.len() >= self.tier_capacity {
            tier.pop_front()
        } else {
            None
        };

        if let Some(dropped) = &evicted {
            self.dropped_count += 1;
            warn!(
                order_id = %dropped.order_id(),
                symbol = %dropped.order.symbol,
                priority = %priority,
                "Tier full, dropped oldest queued order"
            );
        }

        debug!(
            order_id = %order.order_id,
            symbol = %order.symbol,
            priority = %priority,
            "Enqueuing order"
        );

        tier.push_back(QueuedOrder {
            order,
            priority,
            enqueued_at: Instant::now(),
        });
        self.enqueued_count += 1;

        evicted
    }

    /// Pop the head of the highest non-empty tier.
    pub fn get(&mut self) -> Option<QueuedOrder> {
        let item = self.tiers.iter_mut().find_map(|tier| tier.pop_front())?;

        let waited = item.waited();
        self.dequeued_count += 1;
        self.total_wait += waited;
        self.max_wait = self.max_wait.max(waited);

        Some(item)
    }

    /// Head of the highest non-empty tier, without removing it
    pub fn peek(&self) -> Option<&QueuedOrder> {
        self.tiers.iter().find_map(|tier| tier.front())
    }

    /// Remove a queued order wherever it sits.
    pub fn remove(&mut self, order_id: Uuid) -> Option<QueuedOrder> {
        self.tiers.iter_mut().find_map(|tier| {
            let pos = tier.iter().position(|item| item.order_id() == order_id)?;
            tier.remove(pos)
        })
    }

    pub fn contains(&self, order_id: Uuid) -> bool {
        self.tiers
            .iter()
            .any(|tier| tier.iter().any(|item| item.order_id() == order_id))
    }

    pub fn len(&self) -> usize {
        self.tiers.iter().map(VecDeque::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.tiers.iter().all(VecDeque::is_empty)
    }

    pub fn stats(&self) -> QueueStats {
        let avg_wait_ms = if self.dequeued_count == 0 {
            0.0
        } else {
            self.total_wait.as_secs_f64() * 1000.0 / self.dequeued_count as f64
        };

        let mut tier_sizes = [0usize; OrderPriority::COUNT];
        for (size, tier) in tier_sizes.iter_mut().zip(self.tiers.iter()) {
            *size = tier.len();
        }

        QueueStats {
            current_size: self.len(),
            tier_capacity: self.tier_capacity,
            enqueued_total: self.enqueued_count,
            dequeued_total: self.dequeued_count,
            dropped_total: self.dropped_count,
            avg_wait_ms,
            max_wait_ms: self.max_wait.as_secs_f64() * 1000.0,
            tier_sizes,
        }
    }
}

/// Queue statistics
#[derive(Debug, Clone, Default, Serialize)]
pub struct QueueStats {
    pub current_size: usize,
    pub tier_capacity: usize,
    pub enqueued_total: u64,
    pub dequeued_total: u64,
    pub dropped_total: u64,
    pub avg_wait_ms: f64,
    pub max_wait_ms: f64,
    /// Sizes indexed by `OrderPriority::index()`
    pub tier_sizes: [usize; OrderPriority::COUNT],
}

impl QueueStats {
    pub fn tier_size(&self, priority: OrderPriority) -> usize {
        self.tier_sizes[priority.index()]
    }
}

impl std::fmt::Display for QueueStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Queue[{}, enq={}, deq={}, drop={}, wait avg={:.1}ms max={:.1}ms, C={}/H={}/M={}/L={}/S={}]",
            self.current_size,
            self.enqueued_total,
            self.dequeued_total,
            self.dropped_total,
            self.avg_wait_ms,
            self.max_wait_ms,
            self.tier_sizes[0],
            self.tier_sizes[1],
            self.tier_sizes[2],
            self.tier_sizes[3],
            self.tier_sizes[4]
        )
    }
}

/// Mutex-guarded queue with a wakeup for the worker
///
/// `put` and `get` take the same lock, so a tier scan never races a concurrent put.
pub struct SharedOrderQueue {
    inner: Mutex<PriorityOrderQueue>,
    notify: Notify,
}

impl SharedOrderQueue {
    pub fn new(tier_capacity: usize) -> Self {
        Self {
            inner: Mutex::new(PriorityOrderQueue::new(tier_capacity)),
            notify: Notify::new(),
        }
    }

    pub async fn put(&self, order: Order, priority: OrderPriority) -> Option<QueuedOrder> {
        let evicted = self.inner.lock().await.put(order, priority);
        self.notify.notify_one();
        evicted
    }

    pub async fn get(&self) -> Option<QueuedOrder> {
        self.inner.lock().await.get()
    }

    /// Wait up to `timeout` for the next order.
    pub async fn pop_timeout(&self, timeout: Duration) -> Option<QueuedOrder> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if let Some(item) = self.get().await {
                return Some(item);
            }
            // notify_one stores a permit when nobody waits, so a put between
            // the check above and this await is not lost.
            if tokio::time::timeout_at(deadline, self.notify.notified())
                .await
                .is_err()
            {
                return None;
            }
        }
    }

    pub async fn remove(&self, order_id: Uuid) -> Option<QueuedOrder> {
        self.inner.lock().await.remove(order_id)
    }

    pub async fn contains(&self, order_id: Uuid) -> bool {
        self.inner.lock().await.contains(order_id)
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.is_empty()
    }

    pub async fn stats(&self) -> QueueStats {
        self.inner.lock().await.stats()
    }
}
