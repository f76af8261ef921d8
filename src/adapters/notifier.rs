//! Execution event sinks
//!
//! The engine fires events and forgets them; any retrying happens here.

use async_trait::async_trait;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::config::NotificationConfig;
use crate::error::{Result, WarMachineError};
use crate::platform::{ExecutionEvent, NotificationSink};

/// Writes each event to the log
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

#[async_trait]
impl NotificationSink for LogNotifier {
    async fn notify(&self, event: &ExecutionEvent) -> Result<()> {
        info!(
            order_id = %event.order_id,
            symbol = %event.symbol,
            side = %event.side,
            status = %event.status,
            filled = %event.filled_quantity,
            price = ?event.price,
            slippage = ?event.slippage,
            pnl = ?event.pnl,
            reason = event.reason.as_deref().unwrap_or(""),
            "Execution event"
        );
        Ok(())
    }
}

/// Forwards events into an mpsc channel
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    tx: mpsc::UnboundedSender<ExecutionEvent>,
}

impl ChannelNotifier {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ExecutionEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl NotificationSink for ChannelNotifier {
    async fn notify(&self, event: &ExecutionEvent) -> Result<()> {
        self.tx
            .send(event.clone())
            .map_err(|_| WarMachineError::Notification("event receiver dropped".to_string()))
    }
}

/// Posts events as JSON to a webhook, retrying with exponential backoff
#[derive(Clone)]
pub struct WebhookNotifier {
    client: Client,
    webhook_url: String,
    max_retries: u32,
    initial_backoff: Duration,
}

impl WebhookNotifier {
    pub fn new(
        webhook_url: impl Into<String>,
        max_retries: u32,
        initial_backoff: Duration,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            webhook_url: webhook_url.into(),
            max_retries,
            initial_backoff,
        })
    }

    async fn post_once(&self, event: &ExecutionEvent) -> Result<()> {
        let resp = self
            .client
            .post(&self.webhook_url)
            .json(event)
            .send()
            .await?;

        if resp.status().is_success() {
            debug!(order_id = %event.order_id, "Webhook notification sent");
            Ok(())
        } else {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            Err(WarMachineError::Notification(format!("HTTP {}: {}", status, body)))
        }
    }
}

#[async_trait]
impl NotificationSink for WebhookNotifier {
    async fn notify(&self, event: &ExecutionEvent) -> Result<()> {
        let mut backoff = self.initial_backoff;
        let mut attempt = 0;
        loop {
            match self.post_once(event).await {
                Ok(()) => return Ok(()),
                Err(e) if attempt < self.max_retries => {
                    attempt += 1;
                    warn!(
                        order_id = %event.order_id,
                        attempt,
                        error = %e,
                        "Webhook notification failed, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                    backoff = backoff.saturating_mul(2);
                }
                Err(e) => {
                    error!(order_id = %event.order_id, error = %e, "Webhook notification gave up");
                    return Err(e);
                }
            }
        }
    }
}

/// Pick the sink the configuration asks for.
pub fn build_notifier(config: &NotificationConfig) -> Result<Arc<dyn NotificationSink>> {
    match &config.webhook_url {
        Some(url) => {
            info!("Webhook notifications enabled");
            Ok(Arc::new(WebhookNotifier::new(
                url.clone(),
                config.max_retries,
                Duration::from_millis(config.initial_backoff_ms),
                Duration::from_millis(config.timeout_ms),
            )?))
        }
        None => Ok(Arc::new(LogNotifier)),
    }
}
