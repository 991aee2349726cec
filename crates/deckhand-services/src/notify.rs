//! Webhook notification delivery.
//!
//! Fire-and-forget: delivery problems are logged and swallowed, so a
//! dead endpoint can never fail an export or import.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;

use deckhand_core::stores::{Notifier, NotifyEvent};
use deckhand_core::AppError;

const DELIVERY_TIMEOUT_SECS: u64 = 10;

pub struct WebhookNotifier {
    client: Client,
    endpoint: Option<String>,
}

impl WebhookNotifier {
    /// `endpoint: None` disables delivery entirely (events are logged at
    /// debug level only).
    pub fn new(endpoint: Option<String>) -> Result<Self, AppError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(DELIVERY_TIMEOUT_SECS))
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client, endpoint })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, event: NotifyEvent) {
        let Some(endpoint) = &self.endpoint else {
            tracing::debug!(?event, "Notification endpoint not configured, dropping event");
            return;
        };

        let payload = serde_json::json!({
            "source": "deckhand-backup",
            "timestamp": Utc::now(),
            "payload": event,
        });

        match self.client.post(endpoint).json(&payload).send().await {
            Ok(response) if response.status().is_success() => {
                tracing::debug!(endpoint = %endpoint, "Notification delivered");
            }
            Ok(response) => {
                tracing::warn!(
                    endpoint = %endpoint,
                    status = %response.status(),
                    "Notification endpoint returned an error, continuing"
                );
            }
            Err(e) => {
                tracing::warn!(
                    endpoint = %endpoint,
                    error = %e,
                    "Notification delivery failed, continuing"
                );
            }
        }
    }
}
