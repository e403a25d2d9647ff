use bytes::Bytes;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::error::{ProxyError, Result};
use crate::telemetry::metrics::values;
use crate::telemetry::Metrics;

/// Upper bound on a single notification POST
pub const NOTIFY_TIMEOUT: Duration = Duration::from_secs(10);

pub const RATE_LIMIT_MESSAGE: &str = "Rate limit exceeded";

/// Errors that can occur while delivering a notification
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Failed to serialize notification payload: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Failed to deliver notification: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Webhook responded with status {0}")]
    Status(u16),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyOutcome {
    /// No webhook configured
    Skipped,
    /// Webhook accepted the payload
    Delivered { status: u16 },
}

/// Rate limit notification body. Field order is the wire order.
#[derive(Debug, Serialize)]
pub struct RateLimitPayload<'a> {
    pub container_id: &'a str,
    pub limit_expected_rps: u32,
    pub limit_exceeded_rps: u32,
    pub message: &'static str,
}

impl<'a> RateLimitPayload<'a> {
    pub fn new(container_id: &'a str, expected: u32, exceeded: u32) -> Self {
        Self {
            container_id,
            limit_expected_rps: expected,
            limit_exceeded_rps: exceeded,
            message: RATE_LIMIT_MESSAGE,
        }
    }

    pub fn to_bytes(&self) -> std::result::Result<Bytes, NotifyError> {
        Ok(Bytes::from(serde_json::to_vec(self)?))
    }
}

/// Posts rate limit violations to an external webhook.
///
/// Cheap to clone; clones share one connection pool.
#[derive(Debug, Clone)]
pub struct Notifier {
    client: reqwest::Client,
    webhook_url: Option<Arc<str>>,
    container_id: Arc<str>,
}

impl Notifier {
    pub fn new(webhook_url: Option<&str>, container_id: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(NOTIFY_TIMEOUT)
            .build()
            .map_err(|e| ProxyError::Http(format!("Failed to build webhook client: {e}")))?;

        Ok(Self {
            client,
            webhook_url: webhook_url.filter(|u| !u.is_empty()).map(Arc::from),
            container_id: Arc::from(container_id),
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.webhook_url.is_some()
    }

    /// Send one notification. Without a webhook this is a no-op returning
    /// [`NotifyOutcome::Skipped`]. Never retries.
    pub async fn notify_rate_limit(
        &self,
        expected: u32,
        exceeded: u32,
    ) -> std::result::Result<NotifyOutcome, NotifyError> {
        let Some(url) = self.webhook_url.as_deref() else {
            debug!("Webhook URL is not set, skipping notification");
            return Ok(NotifyOutcome::Skipped);
        };

        let body = RateLimitPayload::new(&self.container_id, expected, exceeded).to_bytes()?;

        let resp = self
            .client
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(NotifyError::Status(status.as_u16()));
        }

        info!(status = status.as_u16(), "Webhook notification sent");
        Ok(NotifyOutcome::Delivered { status: status.as_u16() })
    }

    /// Fire-and-forget notification on the current runtime.
    ///
    /// Failures are logged and counted, never returned.
    pub fn spawn_rate_limit_notification(
        &self,
        expected: u32,
        exceeded: u32,
        metrics: Option<Arc<Metrics>>,
    ) -> tokio::task::JoinHandle<()> {
        let notifier = self.clone();
        tokio::spawn(async move {
            let result = match notifier.notify_rate_limit(expected, exceeded).await {
                Ok(NotifyOutcome::Skipped) => values::NOTIFY_SKIPPED,
                Ok(NotifyOutcome::Delivered { .. }) => values::NOTIFY_DELIVERED,
                Err(e) => {
                    warn!(error = %e, expected, exceeded, "Rate limit notification failed");
                    values::NOTIFY_FAILED
                }
            };
            if let Some(m) = metrics {
                m.record_notification(result);
            }
        })
    }
}
