//! SQLite implementation of the job log.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{JobLogEntry, JobRunStatus};
use crate::domain::ports::JobLogRepository;

#[derive(Clone)]
pub struct SqliteJobLogRepository {
    pool: SqlitePool,
}

impl SqliteJobLogRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobLogRepository for SqliteJobLogRepository {
    async fn start(&self, name: &str, started_at: DateTime<Utc>) -> DomainResult<i64> {
        let result = sqlx::query(
            "INSERT INTO job_log (name, started_at, status) VALUES (?, ?, ?)",
        )
        .bind(name)
        .bind(started_at.to_rfc3339())
        .bind(JobRunStatus::Running.as_str())
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    async fn finish(
        &self,
        id: i64,
        status: JobRunStatus,
        completed_at: DateTime<Utc>,
        result: Option<serde_json::Value>,
        error: Option<String>,
    ) -> DomainResult<()> {
        let result_json = result.map(|r| r.to_string());
        sqlx::query(
            "UPDATE job_log SET status = ?, completed_at = ?, result = ?, error = ? WHERE id = ?",
        )
        .bind(status.as_str())
        .bind(completed_at.to_rfc3339())
        .bind(result_json)
        .bind(error)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn record_skipped(
        &self,
        name: &str,
        at: DateTime<Utc>,
        reason: &str,
    ) -> DomainResult<()> {
        sqlx::query(
            "INSERT INTO job_log (name, started_at, completed_at, status, error)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(name)
        .bind(at.to_rfc3339())
        .bind(at.to_rfc3339())
        .bind(JobRunStatus::Skipped.as_str())
        .bind(reason)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn recent(&self, name: &str, limit: i64) -> DomainResult<Vec<JobLogEntry>> {
        let rows: Vec<JobLogRow> = sqlx::query_as(
            "SELECT * FROM job_log WHERE name = ? ORDER BY started_at DESC LIMIT ?",
        )
        .bind(name)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn count(&self) -> DomainResult<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM job_log")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn prune_before(&self, cutoff: DateTime<Utc>) -> DomainResult<u64> {
        let result = sqlx::query("DELETE FROM job_log WHERE started_at < ?")
            .bind(cutoff.to_rfc3339())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn delete_all(&self) -> DomainResult<u64> {
        let result = sqlx::query("DELETE FROM job_log").execute(&self.pool).await?;
        Ok(result.rows_affected())
    }
}

#[derive(sqlx::FromRow)]
struct JobLogRow {
    id: i64,
    name: String,
    started_at: String,
    completed_at: Option<String>,
    status: String,
    result: Option<String>,
    error: Option<String>,
}

impl TryFrom<JobLogRow> for JobLogEntry {
    type Error = DomainError;

    fn try_from(row: JobLogRow) -> Result<Self, Self::Error> {
        let parse = |raw: &str| {
            DateTime::parse_from_rfc3339(raw)
                .map(|t| t.with_timezone(&Utc))
                .map_err(|e| DomainError::Storage(format!("invalid timestamp {raw}: {e}")))
        };
        Ok(JobLogEntry {
            id: row.id,
            name: row.name,
            started_at: parse(&row.started_at)?,
            completed_at: row.completed_at.as_deref().map(parse).transpose()?,
            status: JobRunStatus::from_str(&row.status)
                .ok_or_else(|| DomainError::Storage(format!("unknown status: {}", row.status)))?,
            result: row
                .result
                .as_deref()
                .map(serde_json::from_str)
                .transpose()?,
            error: row.error,
        })
    }
}
