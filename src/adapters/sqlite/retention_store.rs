//! SQLite implementation of the retention maintenance port.

use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::ports::{RetentionStore, StoreStats};

#[derive(Clone)]
pub struct SqliteRetentionStore {
    pool: SqlitePool,
}

impl SqliteRetentionStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RetentionStore for SqliteRetentionStore {
    async fn stats(&self) -> DomainResult<StoreStats> {
        let (page_count,): (i64,) = sqlx::query_as("PRAGMA page_count")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| DomainError::Sweeper(e.to_string()))?;
        let (page_size,): (i64,) = sqlx::query_as("PRAGMA page_size")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| DomainError::Sweeper(e.to_string()))?;
        let (observation_count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM observations")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| DomainError::Sweeper(e.to_string()))?;
        let (job_log_count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM job_log")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| DomainError::Sweeper(e.to_string()))?;

        Ok(StoreStats {
            total_bytes: page_count * page_size,
            observation_count,
            job_log_count,
        })
    }

    async fn compact(&self) -> DomainResult<()> {
        sqlx::query("VACUUM")
            .execute(&self.pool)
            .await
            .map_err(|e| DomainError::Sweeper(e.to_string()))?;
        Ok(())
    }
}
