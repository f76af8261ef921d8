//! Ordered delivery of execution events to the notification sink
//!
//! Events go through one mpsc channel drained by a single task, so a sink sees
//! them in the order the engine produced them. `flush` closes the channel and
//! waits for the task, which lets a process exit without losing deliveries.

use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use super::traits::NotificationSink;
use super::types::ExecutionEvent;

struct Delivery {
    tx: mpsc::UnboundedSender<ExecutionEvent>,
    task: JoinHandle<()>,
}

pub(crate) struct EventDispatcher {
    notifier: Arc<dyn NotificationSink>,
    delivery: Mutex<Option<Delivery>>,
}

impl EventDispatcher {
    pub(crate) fn new(notifier: Arc<dyn NotificationSink>) -> Self {
        Self {
            notifier,
            delivery: Mutex::new(None),
        }
    }

    /// Queue an event; the delivery task starts on first use.
    pub(crate) async fn send(&self, event: ExecutionEvent) {
        let mut delivery = self.delivery.lock().await;
        let delivery = delivery.get_or_insert_with(|| self.start());
        if let Err(e) = delivery.tx.send(event) {
            // task only ends once its sender is dropped
            error!(order_id = %e.0.order_id, "Event delivery task gone, event dropped");
        }
    }

    /// Wait until every queued event has been handed to the sink.
    pub(crate) async fn flush(&self) {
        let Some(Delivery { tx, task }) = self.delivery.lock().await.take() else {
            return;
        };
        drop(tx);
        if let Err(e) = task.await {
            error!(error = %e, "Event delivery task failed");
        }
    }

    fn start(&self) -> Delivery {
        let (tx, mut rx) = mpsc::unbounded_channel::<ExecutionEvent>();
        let notifier = self.notifier.clone();
        let task = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                match notifier.notify(&event).await {
                    Ok(()) => debug!(order_id = %event.order_id, status = %event.status, "Event delivered"),
                    Err(e) => {
                        warn!(order_id = %event.order_id, error = %e, "Notification delivery failed")
                    }
                }
            }
        });
        Delivery { tx, task }
    }
}
