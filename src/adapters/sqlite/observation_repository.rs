//! SQLite implementation of the observation store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{CheckType, Observation, TargetStatus};
use crate::domain::ports::ObservationRepository;

#[derive(Clone)]
pub struct SqliteObservationRepository {
    pool: SqlitePool,
}

impl SqliteObservationRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ObservationRepository for SqliteObservationRepository {
    async fn insert(&self, observation: &Observation) -> DomainResult<()> {
        sqlx::query(
            r"INSERT INTO observations (id, target_id, status, response_time_ms, error,
               timestamp, check_type) VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(observation.id.to_string())
        .bind(observation.target_id.to_string())
        .bind(observation.status.as_str())
        .bind(observation.response_time_ms)
        .bind(&observation.error)
        .bind(observation.timestamp.to_rfc3339())
        .bind(observation.check_type.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn history(&self, target_id: Uuid, limit: i64) -> DomainResult<Vec<Observation>> {
        let rows: Vec<ObservationRow> = sqlx::query_as(
            "SELECT * FROM observations WHERE target_id = ? ORDER BY timestamp DESC LIMIT ?",
        )
        .bind(target_id.to_string())
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn count(&self) -> DomainResult<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM observations")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn prune_before(&self, cutoff: DateTime<Utc>) -> DomainResult<u64> {
        let result = sqlx::query("DELETE FROM observations WHERE timestamp < ?")
            .bind(cutoff.to_rfc3339())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn delete_all(&self) -> DomainResult<u64> {
        let result = sqlx::query("DELETE FROM observations")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[derive(sqlx::FromRow)]
struct ObservationRow {
    id: String,
    target_id: String,
    status: String,
    response_time_ms: Option<i64>,
    error: Option<String>,
    timestamp: String,
    check_type: String,
}

impl TryFrom<ObservationRow> for Observation {
    type Error = DomainError;

    fn try_from(row: ObservationRow) -> Result<Self, Self::Error> {
        Ok(Observation {
            id: Uuid::parse_str(&row.id)
                .map_err(|e| DomainError::Storage(format!("invalid uuid {}: {e}", row.id)))?,
            target_id: Uuid::parse_str(&row.target_id)
                .map_err(|e| DomainError::Storage(format!("invalid uuid {}: {e}", row.target_id)))?,
            status: TargetStatus::from_str(&row.status)
                .ok_or_else(|| DomainError::Storage(format!("unknown status: {}", row.status)))?,
            response_time_ms: row.response_time_ms,
            error: row.error,
            timestamp: DateTime::parse_from_rfc3339(&row.timestamp)
                .map(|t| t.with_timezone(&Utc))
                .map_err(|e| {
                    DomainError::Storage(format!("invalid timestamp {}: {e}", row.timestamp))
                })?,
            check_type: CheckType::from_str(&row.check_type).ok_or_else(|| {
                DomainError::Storage(format!("unknown check type: {}", row.check_type))
            })?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::connection::create_test_pool;
    use crate::adapters::sqlite::migrations::Migrator;
    use chrono::Duration;

    async fn repo() -> SqliteObservationRepository {
        let pool = create_test_pool().await.unwrap();
        Migrator::new(pool.clone()).run().await.unwrap();
        SqliteObservationRepository::new(pool)
    }

    fn obs(target_id: Uuid, ts: DateTime<Utc>, status: TargetStatus) -> Observation {
        Observation::new(
            target_id,
            status,
            (status == TargetStatus::Up).then_some(100),
            None,
            ts,
            CheckType::Automated,
        )
    }

    #[tokio::test]
    async fn history_is_newest_first() {
        let repo = repo().await;
        let target_id = Uuid::new_v4();
        let base = Utc::now();
        for i in 0..3 {
            repo.insert(&obs(target_id, base + Duration::minutes(i), TargetStatus::Up))
                .await
                .unwrap();
        }

        let history = repo.history(target_id, 10).await.unwrap();
        assert_eq!(history.len(), 3);
        assert!(history[0].timestamp > history[1].timestamp);
        assert!(history[1].timestamp > history[2].timestamp);
    }

    #[tokio::test]
    async fn prune_before_removes_only_older() {
        let repo = repo().await;
        let target_id = Uuid::new_v4();
        let now = Utc::now();
        repo.insert(&obs(target_id, now - Duration::hours(30), TargetStatus::Up))
            .await
            .unwrap();
        repo.insert(&obs(target_id, now - Duration::hours(1), TargetStatus::Up))
            .await
            .unwrap();

        let removed = repo.prune_before(now - Duration::hours(24)).await.unwrap();
        assert_eq!(removed, 1);
        assert_eq!(repo.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn delete_all_empties_store() {
        let repo = repo().await;
        let target_id = Uuid::new_v4();
        for _ in 0..5 {
            repo.insert(&obs(target_id, Utc::now(), TargetStatus::Down))
                .await
                .unwrap();
        }
        assert_eq!(repo.delete_all().await.unwrap(), 5);
        assert_eq!(repo.count().await.unwrap(), 0);
    }
}
