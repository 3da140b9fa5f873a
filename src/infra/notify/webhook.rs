//! Webhook event delivery.
//!
//! Posts lifecycle events to a configured endpoint. When no endpoint is
//! configured every call is a quiet no-op, so callers never need to guard
//! on whether notifications are enabled.

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, instrument};

use crate::domain::{AppError, Notifier};

/// Webhook notifier configuration
#[derive(Debug, Clone, Default)]
pub struct WebhookConfig {
    /// Endpoint to POST events to; `None` disables delivery
    pub url: Option<String>,
    /// Optional bearer token sent with each delivery
    pub auth_token: Option<String>,
}

pub struct WebhookNotifier {
    config: WebhookConfig,
    http: reqwest::Client,
}

impl WebhookNotifier {
    #[must_use]
    pub fn new(config: WebhookConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(5))
            .build()
            .unwrap_or_default();
        Self { config, http }
    }

    /// A notifier that drops every event
    #[must_use]
    pub fn disabled() -> Self {
        Self::new(WebhookConfig::default())
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    #[instrument(skip(self, payload))]
    async fn notify(
        &self,
        batch_id: &str,
        event: &str,
        payload: serde_json::Value,
    ) -> Result<(), AppError> {
        let Some(url) = &self.config.url else {
            debug!(batch_id, event, "Webhook delivery disabled, dropping event");
            return Ok(());
        };

        let body = serde_json::json!({
            "batch_id": batch_id,
            "event": event,
            "payload": payload,
            "emitted_at": Utc::now().to_rfc3339(),
        });
        let mut request = self.http.post(url).json(&body);
        if let Some(token) = &self.config.auth_token {
            request = request.bearer_auth(token);
        }
        let response = request
            .send()
            .await
            .map_err(|e| AppError::Internal(format!("webhook delivery failed: {e}")))?;
        if !response.status().is_success() {
            return Err(AppError::Internal(format!(
                "webhook endpoint returned {}",
                response.status()
            )));
        }
        debug!(batch_id, event, "Webhook delivered");
        Ok(())
    }
}
