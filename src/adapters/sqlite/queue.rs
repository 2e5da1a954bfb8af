//! SQLite-backed persistent job queue.
//!
//! Provides at-least-once, priority-ordered delivery for the probe and
//! alert topics. Deduplication relies on a partial unique index over
//! `(topic, dedup_key)`, so a key only collides within its own topic;
//! claims are serialized through a transaction with a rows-affected
//! check, mirroring how the rest of the storage layer guards concurrent
//! writers.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::{Row, SqlitePool};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{QueueJob, QueueJobStatus, QueueTopic};
use crate::domain::ports::{
    EnqueueOptions, EnqueueOutcome, JobQueue, NackOutcome, QueueSweepStats,
};

/// Completed jobs are purged after this many hours.
const COMPLETED_RETENTION_HOURS: i64 = 1;
/// At most this many completed jobs are retained regardless of age.
const COMPLETED_RETENTION_MAX: i64 = 1000;
/// Dead-lettered jobs are retained this many hours for operator
/// inspection.
const DEAD_RETENTION_HOURS: i64 = 24;

#[derive(Clone)]
pub struct SqliteJobQueue {
    pool: SqlitePool,
}

impl SqliteJobQueue {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobQueue for SqliteJobQueue {
    async fn enqueue(
        &self,
        topic: QueueTopic,
        payload: &serde_json::Value,
        options: EnqueueOptions,
    ) -> DomainResult<EnqueueOutcome> {
        let now = Utc::now();
        let result = sqlx::query(
            r"INSERT OR IGNORE INTO queue_jobs
               (topic, payload, dedup_key, priority, status, attempts, max_attempts,
                backoff_base_ms, run_at, created_at, updated_at)
               VALUES (?, ?, ?, ?, 'pending', 0, ?, ?, ?, ?, ?)",
        )
        .bind(topic.as_str())
        .bind(payload.to_string())
        .bind(&options.dedup_key)
        .bind(options.priority)
        .bind(options.max_attempts)
        .bind(options.backoff_base_ms)
        .bind(now.to_rfc3339())
        .bind(now.to_rfc3339())
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| DomainError::Queue(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Ok(EnqueueOutcome::Duplicate);
        }
        Ok(EnqueueOutcome::Enqueued(result.last_insert_rowid()))
    }

    async fn claim(&self, topic: QueueTopic) -> DomainResult<Option<QueueJob>> {
        let now = Utc::now();
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| DomainError::Queue(e.to_string()))?;

        let row = sqlx::query(
            r"SELECT id FROM queue_jobs
               WHERE topic = ? AND status = 'pending' AND run_at <= ?
               ORDER BY priority ASC, run_at ASC, id ASC
               LIMIT 1",
        )
        .bind(topic.as_str())
        .bind(now.to_rfc3339())
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| DomainError::Queue(e.to_string()))?;

        let Some(row) = row else {
            tx.rollback()
                .await
                .map_err(|e| DomainError::Queue(e.to_string()))?;
            return Ok(None);
        };

        let job_id: i64 = row.get("id");

        // The rows-affected check is the actual claim: a concurrent
        // claimer that won the race leaves nothing for us to update.
        let updated = sqlx::query(
            r"UPDATE queue_jobs
               SET status = 'active', attempts = attempts + 1, updated_at = ?
               WHERE id = ? AND status = 'pending'",
        )
        .bind(now.to_rfc3339())
        .bind(job_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| DomainError::Queue(e.to_string()))?;

        if updated.rows_affected() == 0 {
            tx.rollback()
                .await
                .map_err(|e| DomainError::Queue(e.to_string()))?;
            return Ok(None);
        }

        let job_row: QueueJobRow = sqlx::query_as("SELECT * FROM queue_jobs WHERE id = ?")
            .bind(job_id)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| DomainError::Queue(e.to_string()))?;

        tx.commit()
            .await
            .map_err(|e| DomainError::Queue(e.to_string()))?;

        Ok(Some(job_row.try_into()?))
    }

    async fn ack(&self, job_id: i64) -> DomainResult<()> {
        let now = Utc::now();
        sqlx::query(
            "UPDATE queue_jobs SET status = 'completed', completed_at = ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(now.to_rfc3339())
        .bind(now.to_rfc3339())
        .bind(job_id)
        .execute(&self.pool)
        .await
        .map_err(|e| DomainError::Queue(e.to_string()))?;
        Ok(())
    }

    async fn nack(&self, job_id: i64, error: &str) -> DomainResult<NackOutcome> {
        let now = Utc::now();
        let row: Option<QueueJobRow> = sqlx::query_as("SELECT * FROM queue_jobs WHERE id = ?")
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| DomainError::Queue(e.to_string()))?;

        let Some(row) = row else {
            return Err(DomainError::Queue(format!("no such job: {job_id}")));
        };

        if row.attempts >= row.max_attempts {
            sqlx::query(
                "UPDATE queue_jobs SET status = 'dead', last_error = ?, updated_at = ?
                 WHERE id = ?",
            )
            .bind(error)
            .bind(now.to_rfc3339())
            .bind(job_id)
            .execute(&self.pool)
            .await
            .map_err(|e| DomainError::Queue(e.to_string()))?;
            return Ok(NackOutcome::DeadLettered);
        }

        // Exponential backoff: base * 2^(attempts-1).
        let exponent = row.attempts.saturating_sub(1).min(16);
        let delay_ms = row.backoff_base_ms.saturating_mul(1 << exponent);
        let run_at = now + Duration::milliseconds(delay_ms);

        sqlx::query(
            "UPDATE queue_jobs SET status = 'pending', run_at = ?, last_error = ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(run_at.to_rfc3339())
        .bind(error)
        .bind(now.to_rfc3339())
        .bind(job_id)
        .execute(&self.pool)
        .await
        .map_err(|e| DomainError::Queue(e.to_string()))?;

        Ok(NackOutcome::Retried { run_at })
    }

    async fn release(&self, job_id: i64, delay_ms: i64) -> DomainResult<()> {
        let now = Utc::now();
        let run_at = now + Duration::milliseconds(delay_ms);
        // The attempt is handed back as well: a release is not a failure.
        sqlx::query(
            r"UPDATE queue_jobs
               SET status = 'pending', attempts = CASE WHEN attempts > 0 THEN attempts - 1 ELSE 0 END,
                   run_at = ?, updated_at = ?
               WHERE id = ? AND status = 'active'",
        )
        .bind(run_at.to_rfc3339())
        .bind(now.to_rfc3339())
        .bind(job_id)
        .execute(&self.pool)
        .await
        .map_err(|e| DomainError::Queue(e.to_string()))?;
        Ok(())
    }

    async fn sweep(&self, now: DateTime<Utc>) -> DomainResult<QueueSweepStats> {
        let completed_cutoff = (now - Duration::hours(COMPLETED_RETENTION_HOURS)).to_rfc3339();
        let aged = sqlx::query(
            "DELETE FROM queue_jobs WHERE status = 'completed' AND completed_at < ?",
        )
        .bind(&completed_cutoff)
        .execute(&self.pool)
        .await
        .map_err(|e| DomainError::Queue(e.to_string()))?;

        // Keep only the most recent completed jobs regardless of age.
        let overflow = sqlx::query(
            r"DELETE FROM queue_jobs WHERE status = 'completed' AND id NOT IN (
                SELECT id FROM queue_jobs WHERE status = 'completed'
                ORDER BY completed_at DESC LIMIT ?
              )",
        )
        .bind(COMPLETED_RETENTION_MAX)
        .execute(&self.pool)
        .await
        .map_err(|e| DomainError::Queue(e.to_string()))?;

        let dead_cutoff = (now - Duration::hours(DEAD_RETENTION_HOURS)).to_rfc3339();
        let dead = sqlx::query("DELETE FROM queue_jobs WHERE status = 'dead' AND updated_at < ?")
            .bind(&dead_cutoff)
            .execute(&self.pool)
            .await
            .map_err(|e| DomainError::Queue(e.to_string()))?;

        Ok(QueueSweepStats {
            completed_removed: aged.rows_affected() + overflow.rows_affected(),
            dead_removed: dead.rows_affected(),
        })
    }

    async fn pending_count(&self, topic: QueueTopic) -> DomainResult<i64> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM queue_jobs WHERE topic = ? AND status = 'pending'",
        )
        .bind(topic.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| DomainError::Queue(e.to_string()))?;
        Ok(count)
    }

    async fn dead_letters(&self, topic: QueueTopic, limit: i64) -> DomainResult<Vec<QueueJob>> {
        let rows: Vec<QueueJobRow> = sqlx::query_as(
            "SELECT * FROM queue_jobs WHERE topic = ? AND status = 'dead'
             ORDER BY updated_at DESC LIMIT ?",
        )
        .bind(topic.as_str())
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| DomainError::Queue(e.to_string()))?;

        rows.into_iter().map(TryInto::try_into).collect()
    }
}

#[derive(sqlx::FromRow)]
struct QueueJobRow {
    id: i64,
    topic: String,
    payload: String,
    dedup_key: Option<String>,
    priority: i64,
    status: String,
    attempts: u32,
    max_attempts: u32,
    backoff_base_ms: i64,
    run_at: String,
    created_at: String,
    #[allow(dead_code)]
    updated_at: String,
    #[allow(dead_code)]
    completed_at: Option<String>,
    last_error: Option<String>,
}

impl TryFrom<QueueJobRow> for QueueJob {
    type Error = DomainError;

    fn try_from(row: QueueJobRow) -> Result<Self, Self::Error> {
        let parse = |raw: &str| {
            DateTime::parse_from_rfc3339(raw)
                .map(|t| t.with_timezone(&Utc))
                .map_err(|e| DomainError::Queue(format!("invalid timestamp {raw}: {e}")))
        };
        Ok(QueueJob {
            id: row.id,
            topic: QueueTopic::from_str(&row.topic)
                .ok_or_else(|| DomainError::Queue(format!("unknown topic: {}", row.topic)))?,
            payload: serde_json::from_str(&row.payload)?,
            dedup_key: row.dedup_key,
            priority: row.priority,
            status: QueueJobStatus::from_str(&row.status)
                .ok_or_else(|| DomainError::Queue(format!("unknown status: {}", row.status)))?,
            attempts: row.attempts,
            max_attempts: row.max_attempts,
            backoff_base_ms: row.backoff_base_ms,
            run_at: parse(&row.run_at)?,
            created_at: parse(&row.created_at)?,
            last_error: row.last_error,
        })
    }
}
