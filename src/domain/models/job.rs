//! Queue job and job-log models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Queue topics. Probes and alerts are kept on separate topics so that
/// a probe backlog never starves alert delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueTopic {
    Probes,
    Alerts,
}

impl QueueTopic {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Probes => "probes",
            Self::Alerts => "alerts",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "probes" => Some(Self::Probes),
            "alerts" => Some(Self::Alerts),
            _ => None,
        }
    }
}

/// Lifecycle of a queued job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueJobStatus {
    /// Waiting to be claimed (possibly backed off after a failure).
    Pending,
    /// Claimed by a worker.
    Active,
    /// Acked.
    Completed,
    /// Retries exhausted; retained for operator inspection.
    Dead,
}

impl QueueJobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Dead => "dead",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "active" => Some(Self::Active),
            "completed" => Some(Self::Completed),
            "dead" => Some(Self::Dead),
            _ => None,
        }
    }
}

/// A persisted queue job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueJob {
    pub id: i64,
    pub topic: QueueTopic,
    pub payload: serde_json::Value,
    pub dedup_key: Option<String>,
    /// Lower is claimed sooner.
    pub priority: i64,
    pub status: QueueJobStatus,
    /// Delivery attempts so far, including the current one when active.
    pub attempts: u32,
    pub max_attempts: u32,
    /// Base delay for exponential backoff between redeliveries.
    pub backoff_base_ms: i64,
    /// Earliest time the job may be claimed.
    pub run_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub last_error: Option<String>,
}

/// Payload of a probe job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeJob {
    pub target_id: Uuid,
    pub enqueued_at: DateTime<Utc>,
    pub priority_score: i64,
}

impl ProbeJob {
    /// Deduplication key scoped to one scheduler tick: at most one probe
    /// job per target per tick.
    pub fn dedup_key(target_id: Uuid, tick_ms: i64) -> String {
        format!("check-{target_id}-{tick_ms}")
    }
}

/// Status of a background job run (scheduler tick, retention sweep).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobRunStatus {
    Running,
    Completed,
    Failed,
    Skipped,
}

impl JobRunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "skipped" => Some(Self::Skipped),
            _ => None,
        }
    }
}

/// Bookkeeping row for one background job run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobLogEntry {
    pub id: i64,
    pub name: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub status: JobRunStatus,
    /// Structured result statistics, when the run produced any.
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
}
