//! Real-time status update publication.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::models::TargetStatus;

/// One message on the `monitor-updates` channel, emitted after every
/// probe completion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusUpdate {
    pub server_id: Uuid,
    pub status: TargetStatus,
    pub latency: Option<i64>,
    pub last_checked: DateTime<Utc>,
}

/// Fire-and-forget publisher. Implementations must not block probe
/// processing; a publish with no subscribers is not an error.
pub trait UpdatePublisher: Send + Sync {
    fn publish(&self, update: StatusUpdate);
}
