//! Alert delivery sinks: email and webhook.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::TargetStatus;

/// A rendered alert email.
#[derive(Debug, Clone, PartialEq)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[async_trait]
pub trait EmailSink: Send + Sync {
    async fn send(&self, message: &EmailMessage) -> DomainResult<()>;
}

/// JSON body POSTed to a target's webhook URL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookPayload {
    pub event: String,
    pub server: WebhookServer,
    pub old_status: TargetStatus,
    pub new_status: TargetStatus,
    pub response_time: Option<i64>,
    pub error: Option<String>,
    /// ISO-8601 UTC.
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookServer {
    pub id: Uuid,
    pub name: String,
    pub url: String,
    pub status: TargetStatus,
}

#[async_trait]
pub trait WebhookSink: Send + Sync {
    /// Deliver the payload. Webhooks are fire-and-forget by contract:
    /// callers log failures and do not retry.
    async fn deliver(&self, url: &str, payload: &WebhookPayload) -> DomainResult<()>;
}
