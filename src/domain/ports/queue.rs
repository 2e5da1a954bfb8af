//! Persistent job queue port.
//!
//! At-least-once, priority-ordered delivery with retry/backoff and
//! deduplication keys. Probes and alerts ride separate topics.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::errors::DomainResult;
use crate::domain::models::{QueueJob, QueueTopic};

/// Options applied when enqueuing a job.
#[derive(Debug, Clone)]
pub struct EnqueueOptions {
    /// Rejects a second enqueue carrying the same key on the same
    /// topic.
    pub dedup_key: Option<String>,
    /// Lower is claimed sooner.
    pub priority: i64,
    pub max_attempts: u32,
    /// Base delay for exponential backoff between redeliveries.
    pub backoff_base_ms: i64,
}

impl Default for EnqueueOptions {
    fn default() -> Self {
        Self {
            dedup_key: None,
            priority: 5,
            max_attempts: 3,
            backoff_base_ms: 1000,
        }
    }
}

/// Result of an enqueue call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// Job accepted under this id.
    Enqueued(i64),
    /// A job with the same dedup key already exists.
    Duplicate,
}

/// Result of a NACK.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NackOutcome {
    /// Redelivery scheduled at this time.
    Retried { run_at: DateTime<Utc> },
    /// Attempts exhausted; the job moved to the dead-letter set.
    DeadLettered,
}

/// Rows removed by a maintenance sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueSweepStats {
    pub completed_removed: u64,
    pub dead_removed: u64,
}

#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn enqueue(
        &self,
        topic: QueueTopic,
        payload: &serde_json::Value,
        options: EnqueueOptions,
    ) -> DomainResult<EnqueueOutcome>;

    /// Atomically claim the next due job on a topic: lowest priority
    /// score first, then oldest `run_at`. Returns `None` when nothing
    /// is due.
    async fn claim(&self, topic: QueueTopic) -> DomainResult<Option<QueueJob>>;

    /// Acknowledge successful processing.
    async fn ack(&self, job_id: i64) -> DomainResult<()>;

    /// Report failed processing. Schedules redelivery with exponential
    /// backoff, or dead-letters the job once attempts are exhausted.
    async fn nack(&self, job_id: i64, error: &str) -> DomainResult<NackOutcome>;

    /// Return a claimed job to the queue without consuming an attempt.
    /// Used to defer work that must not run yet (per-target ordering).
    async fn release(&self, job_id: i64, delay_ms: i64) -> DomainResult<()>;

    /// Purge terminal jobs past their retention: completed after one
    /// hour (and beyond the most recent 1000), dead after 24 hours.
    async fn sweep(&self, now: DateTime<Utc>) -> DomainResult<QueueSweepStats>;

    /// Jobs currently pending or backed off on a topic.
    async fn pending_count(&self, topic: QueueTopic) -> DomainResult<i64>;

    /// Dead-lettered jobs on a topic, newest first.
    async fn dead_letters(&self, topic: QueueTopic, limit: i64) -> DomainResult<Vec<QueueJob>>;
}
