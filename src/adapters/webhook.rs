//! Webhook sink: one JSON POST per alert, fire-and-forget.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::ports::{WebhookPayload, WebhookSink};

/// Delivery timeout per webhook POST.
const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(5);

pub struct HttpWebhookSink {
    client: Client,
}

impl HttpWebhookSink {
    pub fn new() -> DomainResult<Self> {
        let client = Client::builder()
            .timeout(WEBHOOK_TIMEOUT)
            .build()
            .map_err(|e| DomainError::AlertDispatch {
                channel: "webhook".into(),
                reason: format!("client: {e}"),
            })?;
        Ok(Self { client })
    }
}

#[async_trait]
impl WebhookSink for HttpWebhookSink {
    async fn deliver(&self, url: &str, payload: &WebhookPayload) -> DomainResult<()> {
        let response = self
            .client
            .post(url)
            .json(payload)
            .send()
            .await
            .map_err(|e| DomainError::AlertDispatch {
                channel: "webhook".into(),
                reason: e.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(DomainError::AlertDispatch {
                channel: "webhook".into(),
                reason: format!("HTTP {}", response.status().as_u16()),
            });
        }
        Ok(())
    }
}
