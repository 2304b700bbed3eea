//! Notification dispatcher.
//!
//! Fans one update event out to its registered endpoints with bounded
//! concurrency. Every delivery retries transient failures independently;
//! one endpoint failing never blocks its siblings.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use reqwest::Client;
use serde::Serialize;

use crate::error::{AppError, Result};
use crate::fetch::backoff_delay;
use crate::models::{
    DeliveryOutcome, DeliveryResult, DispatchConfig, Endpoint, FetchConfig, UpdateEvent,
};

/// Wire payload POSTed to each endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct NotificationPayload {
    pub series_title: String,
    pub source: String,
    pub chapters: Vec<PayloadChapter>,
    pub detected_at: chrono::DateTime<chrono::Utc>,
    /// Pre-rendered announcement text
    pub content: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PayloadChapter {
    pub label: String,
    pub url: String,
}

impl NotificationPayload {
    pub fn from_event(event: &UpdateEvent, template: &str) -> Self {
        let content = event
            .chapters
            .iter()
            .map(|c| event.format_chapter(template, c))
            .collect::<Vec<_>>()
            .join("\n");

        Self {
            series_title: event.series_title.clone(),
            source: event.source.clone(),
            chapters: event
                .chapters
                .iter()
                .map(|c| PayloadChapter {
                    label: c.label.clone(),
                    url: c.url.clone(),
                })
                .collect(),
            detected_at: event.detected_at,
            content,
        }
    }
}

/// Outbound transport seam. Production posts webhooks; tests inject
/// counting fakes.
#[async_trait]
pub trait NotificationTransport: Send + Sync {
    async fn post(&self, endpoint: &Endpoint, payload: &NotificationPayload) -> Result<()>;
}

/// Webhook transport: JSON POST, 2xx is success, anything else is a
/// retryable delivery failure.
pub struct WebhookTransport {
    client: Client,
}

impl WebhookTransport {
    pub fn new(config: &FetchConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl NotificationTransport for WebhookTransport {
    async fn post(&self, endpoint: &Endpoint, payload: &NotificationPayload) -> Result<()> {
        let content = match &endpoint.mention {
            Some(mention) => format!("{} {}", mention, payload.content),
            None => payload.content.clone(),
        };

        let body = serde_json::json!({
            "content": content,
            "series_title": payload.series_title,
            "source": payload.source,
            "chapters": payload.chapters,
            "detected_at": payload.detected_at,
        });

        let response = self.client.post(&endpoint.url).json(&body).send().await?;
        if !response.status().is_success() {
            return Err(AppError::delivery(
                &endpoint.id,
                format!("status {}", response.status()),
            ));
        }
        Ok(())
    }
}

/// Fans update events out to endpoints with bounded concurrency.
pub struct NotificationDispatcher {
    transport: Arc<dyn NotificationTransport>,
    config: DispatchConfig,
}

impl NotificationDispatcher {
    pub fn new(transport: Arc<dyn NotificationTransport>, config: DispatchConfig) -> Self {
        Self { transport, config }
    }

    /// Deliver one event to every endpoint, at most
    /// `max_concurrent_deliveries` in flight at once.
    pub async fn dispatch(
        &self,
        event: &UpdateEvent,
        endpoints: &[Endpoint],
    ) -> Vec<DeliveryResult> {
        if endpoints.is_empty() {
            log::debug!("No endpoints registered for '{}'", event.series_id);
            return Vec::new();
        }

        let payload = NotificationPayload::from_event(event, &self.config.message_template);
        let width = self.config.max_concurrent_deliveries.max(1);

        stream::iter(endpoints)
            .map(|endpoint| self.deliver(endpoint, &payload))
            .buffer_unordered(width)
            .collect()
            .await
    }

    /// Deliver to a single endpoint with independent bounded retries.
    async fn deliver(&self, endpoint: &Endpoint, payload: &NotificationPayload) -> DeliveryResult {
        let attempts = self.config.max_retry_attempts.max(1);
        let mut last_failure = String::new();

        for attempt in 0..attempts {
            match self.transport.post(endpoint, payload).await {
                Ok(()) => {
                    return DeliveryResult {
                        endpoint_id: endpoint.id.clone(),
                        attempts: attempt + 1,
                        outcome: DeliveryOutcome::Delivered,
                    };
                }
                Err(e) => {
                    last_failure = e.to_string();
                    if attempt + 1 < attempts {
                        tokio::time::sleep(backoff_delay(self.config.retry_base_delay_ms, attempt))
                            .await;
                    }
                }
            }
        }

        log::warn!(
            "Delivery to '{}' failed after {} attempts: {}",
            endpoint.id,
            attempts,
            last_failure
        );
        DeliveryResult {
            endpoint_id: endpoint.id.clone(),
            attempts,
            outcome: DeliveryOutcome::Failed(last_failure),
        }
    }
}
