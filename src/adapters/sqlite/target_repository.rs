//! SQLite implementation of the TargetRepository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    MonitoringConfig, OwnerPlan, OwnerRole, Target, TargetKind, TargetStatus, UserPriority,
};
use crate::domain::ports::{ProbePatch, TargetFilter, TargetRepository};

#[derive(Clone)]
pub struct SqliteTargetRepository {
    pool: SqlitePool,
}

impl SqliteTargetRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TargetRepository for SqliteTargetRepository {
    async fn insert(&self, target: &Target) -> DomainResult<()> {
        let monitoring_json = serde_json::to_string(&target.monitoring)?;
        let emails_json = serde_json::to_string(&target.contact_emails)?;
        let phones_json = serde_json::to_string(&target.contact_phones)?;

        let result = sqlx::query(
            r"INSERT INTO targets (id, name, address, kind, owner_id, owner_plan, owner_role,
               priority, monitoring, contact_emails, contact_phones, status, last_checked,
               last_status_change, last_response_time_ms, last_error, created_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(target.id.to_string())
        .bind(&target.name)
        .bind(&target.address)
        .bind(target.kind.as_str())
        .bind(target.owner_id.to_string())
        .bind(target.owner_plan.as_str())
        .bind(target.owner_role.as_str())
        .bind(target.priority.as_str())
        .bind(&monitoring_json)
        .bind(&emails_json)
        .bind(&phones_json)
        .bind(target.status.as_str())
        .bind(target.last_checked.map(|t| t.to_rfc3339()))
        .bind(target.last_status_change.map(|t| t.to_rfc3339()))
        .bind(target.last_response_time_ms)
        .bind(&target.last_error)
        .bind(target.created_at.to_rfc3339())
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db)) if db.message().contains("UNIQUE") => {
                Err(DomainError::DuplicateTarget {
                    owner_id: target.owner_id,
                    address: target.address.clone(),
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn get(&self, id: Uuid) -> DomainResult<Option<Target>> {
        let row: Option<TargetRow> = sqlx::query_as("SELECT * FROM targets WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn list(&self, filter: &TargetFilter) -> DomainResult<Vec<Target>> {
        let mut sql = String::from("SELECT * FROM targets WHERE 1=1");
        if filter.owner_id.is_some() {
            sql.push_str(" AND owner_id = ?");
        }
        if filter.status.is_some() {
            sql.push_str(" AND status = ?");
        }
        sql.push_str(" ORDER BY created_at ASC");

        let mut query = sqlx::query_as::<_, TargetRow>(&sql);
        if let Some(owner_id) = filter.owner_id {
            query = query.bind(owner_id.to_string());
        }
        if let Some(status) = filter.status {
            query = query.bind(status.as_str());
        }

        let rows = query.fetch_all(&self.pool).await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn apply_probe_patch(&self, id: Uuid, patch: &ProbePatch) -> DomainResult<()> {
        let result = sqlx::query(
            r"UPDATE targets SET status = ?, last_checked = ?, last_response_time_ms = ?,
               last_error = ?,
               last_status_change = COALESCE(?, last_status_change)
               WHERE id = ?",
        )
        .bind(patch.status.as_str())
        .bind(patch.last_checked.to_rfc3339())
        .bind(patch.last_response_time_ms)
        .bind(&patch.last_error)
        .bind(patch.last_status_change.map(|t| t.to_rfc3339()))
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DomainError::TargetNotFound(id));
        }
        Ok(())
    }

    async fn update(&self, target: &Target) -> DomainResult<()> {
        let monitoring_json = serde_json::to_string(&target.monitoring)?;
        let emails_json = serde_json::to_string(&target.contact_emails)?;
        let phones_json = serde_json::to_string(&target.contact_phones)?;

        let result = sqlx::query(
            r"UPDATE targets SET name = ?, address = ?, kind = ?, owner_plan = ?,
               owner_role = ?, priority = ?, monitoring = ?, contact_emails = ?,
               contact_phones = ? WHERE id = ?",
        )
        .bind(&target.name)
        .bind(&target.address)
        .bind(target.kind.as_str())
        .bind(target.owner_plan.as_str())
        .bind(target.owner_role.as_str())
        .bind(target.priority.as_str())
        .bind(&monitoring_json)
        .bind(&emails_json)
        .bind(&phones_json)
        .bind(target.id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DomainError::TargetNotFound(target.id));
        }
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> DomainResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM observations WHERE target_id = ?")
            .bind(id.to_string())
            .execute(&mut *tx)
            .await?;

        let result = sqlx::query("DELETE FROM targets WHERE id = ?")
            .bind(id.to_string())
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Err(DomainError::TargetNotFound(id));
        }

        tx.commit().await?;
        Ok(())
    }

    async fn count(&self, filter: &TargetFilter) -> DomainResult<i64> {
        let mut sql = String::from("SELECT COUNT(*) FROM targets WHERE 1=1");
        if filter.owner_id.is_some() {
            sql.push_str(" AND owner_id = ?");
        }
        if filter.status.is_some() {
            sql.push_str(" AND status = ?");
        }

        let mut query = sqlx::query_as::<_, (i64,)>(&sql);
        if let Some(owner_id) = filter.owner_id {
            query = query.bind(owner_id.to_string());
        }
        if let Some(status) = filter.status {
            query = query.bind(status.as_str());
        }

        let (count,) = query.fetch_one(&self.pool).await?;
        Ok(count)
    }
}

#[derive(sqlx::FromRow)]
struct TargetRow {
    id: String,
    name: String,
    address: String,
    kind: String,
    owner_id: String,
    owner_plan: String,
    owner_role: String,
    priority: String,
    monitoring: String,
    contact_emails: String,
    contact_phones: String,
    status: String,
    last_checked: Option<String>,
    last_status_change: Option<String>,
    last_response_time_ms: Option<i64>,
    last_error: Option<String>,
    created_at: String,
}

impl TryFrom<TargetRow> for Target {
    type Error = DomainError;

    fn try_from(row: TargetRow) -> Result<Self, Self::Error> {
        let monitoring: MonitoringConfig = serde_json::from_str(&row.monitoring)?;
        let contact_emails: Vec<String> = serde_json::from_str(&row.contact_emails)?;
        let contact_phones: Vec<String> = serde_json::from_str(&row.contact_phones)?;

        Ok(Target {
            id: parse_uuid(&row.id)?,
            name: row.name,
            address: row.address,
            kind: TargetKind::from_str(&row.kind)
                .ok_or_else(|| DomainError::Storage(format!("unknown target kind: {}", row.kind)))?,
            owner_id: parse_uuid(&row.owner_id)?,
            owner_plan: OwnerPlan::from_str(&row.owner_plan).ok_or_else(|| {
                DomainError::Storage(format!("unknown owner plan: {}", row.owner_plan))
            })?,
            owner_role: OwnerRole::from_str(&row.owner_role).ok_or_else(|| {
                DomainError::Storage(format!("unknown owner role: {}", row.owner_role))
            })?,
            priority: UserPriority::from_str(&row.priority).ok_or_else(|| {
                DomainError::Storage(format!("unknown priority: {}", row.priority))
            })?,
            monitoring,
            contact_emails,
            contact_phones,
            status: TargetStatus::from_str(&row.status)
                .ok_or_else(|| DomainError::Storage(format!("unknown status: {}", row.status)))?,
            last_checked: parse_optional_ts(row.last_checked.as_deref())?,
            last_status_change: parse_optional_ts(row.last_status_change.as_deref())?,
            last_response_time_ms: row.last_response_time_ms,
            last_error: row.last_error,
            created_at: parse_ts(&row.created_at)?,
        })
    }
}

fn parse_uuid(raw: &str) -> DomainResult<Uuid> {
    Uuid::parse_str(raw).map_err(|e| DomainError::Storage(format!("invalid uuid {raw}: {e}")))
}

fn parse_ts(raw: &str) -> DomainResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| DomainError::Storage(format!("invalid timestamp {raw}: {e}")))
}

fn parse_optional_ts(raw: Option<&str>) -> DomainResult<Option<DateTime<Utc>>> {
    raw.map(parse_ts).transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::connection::create_test_pool;
    use crate::adapters::sqlite::migrations::Migrator;
    use crate::domain::models::NewTarget;

    async fn repo() -> SqliteTargetRepository {
        let pool = create_test_pool().await.unwrap();
        Migrator::new(pool.clone()).run().await.unwrap();
        SqliteTargetRepository::new(pool)
    }

    fn sample_target(owner_id: Uuid, address: &str) -> Target {
        Target::new(
            NewTarget {
                name: "A".into(),
                address: address.into(),
                kind: TargetKind::Website,
                owner_id,
                owner_plan: OwnerPlan::Premium,
                owner_role: OwnerRole::User,
                priority: UserPriority::Medium,
                monitoring: MonitoringConfig::default(),
                contact_emails: vec!["x@y".into()],
                contact_phones: vec![],
            },
            Utc::now(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn insert_and_get_round_trips() {
        let repo = repo().await;
        let target = sample_target(Uuid::new_v4(), "example.com");
        repo.insert(&target).await.unwrap();

        let loaded = repo.get(target.id).await.unwrap().unwrap();
        assert_eq!(loaded.address, "example.com");
        assert_eq!(loaded.status, TargetStatus::Unknown);
        assert_eq!(loaded.monitoring, target.monitoring);
        assert_eq!(loaded.contact_emails, vec!["x@y".to_string()]);
    }

    #[tokio::test]
    async fn duplicate_owner_address_rejected() {
        let repo = repo().await;
        let owner = Uuid::new_v4();
        repo.insert(&sample_target(owner, "example.com")).await.unwrap();

        let err = repo
            .insert(&sample_target(owner, "example.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::DuplicateTarget { .. }));

        // A different owner may monitor the same address.
        repo.insert(&sample_target(Uuid::new_v4(), "example.com"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn probe_patch_updates_observation_fields_only() {
        let repo = repo().await;
        let target = sample_target(Uuid::new_v4(), "example.com");
        repo.insert(&target).await.unwrap();

        let now = Utc::now();
        repo.apply_probe_patch(
            target.id,
            &ProbePatch {
                status: TargetStatus::Up,
                last_checked: now,
                last_response_time_ms: Some(120),
                last_error: None,
                last_status_change: Some(now),
            },
        )
        .await
        .unwrap();

        let loaded = repo.get(target.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, TargetStatus::Up);
        assert_eq!(loaded.last_response_time_ms, Some(120));
        assert!(loaded.last_status_change.is_some());
        assert_eq!(loaded.name, "A");

        // A patch without a status change preserves last_status_change.
        let later = now + chrono::Duration::minutes(5);
        repo.apply_probe_patch(
            target.id,
            &ProbePatch {
                status: TargetStatus::Up,
                last_checked: later,
                last_response_time_ms: Some(80),
                last_error: None,
                last_status_change: None,
            },
        )
        .await
        .unwrap();

        let loaded2 = repo.get(target.id).await.unwrap().unwrap();
        assert_eq!(loaded2.last_status_change, loaded.last_status_change);
        assert_eq!(loaded2.last_response_time_ms, Some(80));
    }

    #[tokio::test]
    async fn list_filters_by_status() {
        let repo = repo().await;
        let up = sample_target(Uuid::new_v4(), "a.example.com");
        let down = sample_target(Uuid::new_v4(), "b.example.com");
        repo.insert(&up).await.unwrap();
        repo.insert(&down).await.unwrap();

        repo.apply_probe_patch(
            down.id,
            &ProbePatch {
                status: TargetStatus::Down,
                last_checked: Utc::now(),
                last_response_time_ms: None,
                last_error: Some("timeout".into()),
                last_status_change: Some(Utc::now()),
            },
        )
        .await
        .unwrap();

        let downs = repo
            .list(&TargetFilter {
                status: Some(TargetStatus::Down),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(downs.len(), 1);
        assert_eq!(downs[0].id, down.id);

        assert_eq!(repo.count(&TargetFilter::default()).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn delete_missing_target_errors() {
        let repo = repo().await;
        let err = repo.delete(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, DomainError::TargetNotFound(_)));
    }
}
