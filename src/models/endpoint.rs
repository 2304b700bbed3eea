//! Notification endpoints and per-endpoint delivery outcomes.

use serde::{Deserialize, Serialize};

/// A notification delivery target registered against one or more series.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    /// Store-wide unique identifier
    pub id: String,

    /// Webhook URL notifications are POSTed to
    pub url: String,

    /// Optional mention string prepended to the message text
    #[serde(default)]
    pub mention: Option<String>,
}

/// Outcome of one endpoint delivery, after retries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryResult {
    pub endpoint_id: String,
    pub attempts: u32,
    pub outcome: DeliveryOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered,
    Failed(String),
}

impl DeliveryResult {
    pub fn is_delivered(&self) -> bool {
        matches!(self.outcome, DeliveryOutcome::Delivered)
    }
}
