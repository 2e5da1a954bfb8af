//! Job-log port: bookkeeping for scheduler ticks and retention runs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::errors::DomainResult;
use crate::domain::models::{JobLogEntry, JobRunStatus};

#[async_trait]
pub trait JobLogRepository: Send + Sync {
    /// Record the start of a run; returns the entry id.
    async fn start(&self, name: &str, started_at: DateTime<Utc>) -> DomainResult<i64>;

    /// Close out a run with its final status and optional result/error.
    async fn finish(
        &self,
        id: i64,
        status: JobRunStatus,
        completed_at: DateTime<Utc>,
        result: Option<serde_json::Value>,
        error: Option<String>,
    ) -> DomainResult<()>;

    /// Record a run that never started (e.g. a skipped tick).
    async fn record_skipped(&self, name: &str, at: DateTime<Utc>, reason: &str)
        -> DomainResult<()>;

    /// Most recent entries for a job name, newest first.
    async fn recent(&self, name: &str, limit: i64) -> DomainResult<Vec<JobLogEntry>>;

    async fn count(&self) -> DomainResult<i64>;

    /// Delete entries started before `cutoff`. Returns rows removed.
    async fn prune_before(&self, cutoff: DateTime<Utc>) -> DomainResult<u64>;

    /// Delete every entry. Returns rows removed.
    async fn delete_all(&self) -> DomainResult<u64>;
}
