//! Target catalog: the hook surface the REST collaborator uses for
//! target lifecycle and read-only queries.
//!
//! The monitoring core owns no HTTP endpoints; this service is the
//! boundary it exposes instead. Writes here touch only config-side
//! fields, keeping the worker pool's observation-side patches disjoint.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{NewTarget, Observation, Target, TargetStatus};
use crate::domain::ports::{ObservationRepository, TargetFilter, TargetRepository};
use crate::services::reliability::ReliabilityTracker;

/// History queries return at most this many observations.
const MAX_HISTORY_LIMIT: i64 = 1000;

pub struct TargetCatalog {
    targets: Arc<dyn TargetRepository>,
    observations: Arc<dyn ObservationRepository>,
    tracker: Arc<ReliabilityTracker>,
}

impl TargetCatalog {
    pub fn new(
        targets: Arc<dyn TargetRepository>,
        observations: Arc<dyn ObservationRepository>,
        tracker: Arc<ReliabilityTracker>,
    ) -> Self {
        Self {
            targets,
            observations,
            tracker,
        }
    }

    /// Register a new target. The address is normalized and the
    /// free-plan trial stamped here; `(owner, address)` duplicates are
    /// refused by the store's unique index.
    #[instrument(skip(self, input), err)]
    pub async fn register(&self, input: NewTarget) -> DomainResult<Target> {
        let target = Target::new(input, Utc::now())?;
        self.targets.insert(&target).await?;
        info!(target_id = %target.id, address = %target.address, "target registered");
        Ok(target)
    }

    pub async fn get(&self, id: Uuid) -> DomainResult<Target> {
        self.targets
            .get(id)
            .await?
            .ok_or(DomainError::TargetNotFound(id))
    }

    pub async fn list(&self, owner_id: Option<Uuid>) -> DomainResult<Vec<Target>> {
        self.targets
            .list(&TargetFilter {
                owner_id,
                status: None,
            })
            .await
    }

    pub async fn list_by_status(&self, status: TargetStatus) -> DomainResult<Vec<Target>> {
        self.targets
            .list(&TargetFilter {
                owner_id: None,
                status: Some(status),
            })
            .await
    }

    /// Recent observation history, newest first. Consumers sort by
    /// timestamp; persistence order may differ under probe retries.
    pub async fn history(&self, id: Uuid, limit: i64) -> DomainResult<Vec<Observation>> {
        self.get(id).await?;
        self.observations
            .history(id, limit.clamp(1, MAX_HISTORY_LIMIT))
            .await
    }

    /// Update config-side fields after re-normalizing. Observation-side
    /// fields on `updated` are ignored; the worker pool owns them.
    #[instrument(skip(self, updated), fields(target_id = %updated.id), err)]
    pub async fn update(&self, mut updated: Target) -> DomainResult<Target> {
        let current = self.get(updated.id).await?;
        updated.address =
            crate::domain::models::normalize_address(&updated.address, updated.kind)?;
        updated.monitoring = updated.monitoring.normalized()?;

        // Observation-side fields stay whatever the workers last wrote.
        updated.status = current.status;
        updated.last_checked = current.last_checked;
        updated.last_status_change = current.last_status_change;
        updated.last_response_time_ms = current.last_response_time_ms;
        updated.last_error = current.last_error;

        self.targets.update(&updated).await?;
        Ok(updated)
    }

    /// Delete a target, its observations, and its reliability cell.
    #[instrument(skip(self), err)]
    pub async fn delete(&self, id: Uuid) -> DomainResult<()> {
        self.targets.delete(id).await?;
        // Invalidate target-local state held by the core.
        self.tracker.evict_target(id);
        info!(target_id = %id, "target deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::{
        create_test_pool, Migrator, SqliteObservationRepository, SqliteTargetRepository,
    };
    use crate::domain::models::{
        MonitoringConfig, OwnerPlan, OwnerRole, TargetKind, UserPriority,
    };

    async fn catalog() -> (TargetCatalog, Arc<ReliabilityTracker>) {
        let pool = create_test_pool().await.unwrap();
        Migrator::new(pool.clone()).run().await.unwrap();
        let tracker = Arc::new(ReliabilityTracker::new());
        (
            TargetCatalog::new(
                Arc::new(SqliteTargetRepository::new(pool.clone())),
                Arc::new(SqliteObservationRepository::new(pool)),
                tracker.clone(),
            ),
            tracker,
        )
    }

    fn new_target(address: &str) -> NewTarget {
        NewTarget {
            name: "A".into(),
            address: address.into(),
            kind: TargetKind::Website,
            owner_id: Uuid::new_v4(),
            owner_plan: OwnerPlan::Premium,
            owner_role: OwnerRole::User,
            priority: UserPriority::Medium,
            monitoring: MonitoringConfig::default(),
            contact_emails: vec![],
            contact_phones: vec![],
        }
    }

    #[tokio::test]
    async fn register_normalizes_and_lists() {
        let (catalog, _) = catalog().await;
        let target = catalog
            .register(new_target("https://example.com/"))
            .await
            .unwrap();
        assert_eq!(target.address, "https://example.com");

        let all = catalog.list(None).await.unwrap();
        assert_eq!(all.len(), 1);
        let mine = catalog.list(Some(target.owner_id)).await.unwrap();
        assert_eq!(mine.len(), 1);
        assert!(catalog.list(Some(Uuid::new_v4())).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn update_preserves_observation_fields() {
        let (catalog, _) = catalog().await;
        let target = catalog.register(new_target("example.com")).await.unwrap();

        // Simulate a worker writing observation-side state.
        let obs_repo = {
            // Reuse the repository behind the catalog via a raw patch.
            catalog.targets.clone()
        };
        obs_repo
            .apply_probe_patch(
                target.id,
                &crate::domain::ports::ProbePatch {
                    status: TargetStatus::Up,
                    last_checked: Utc::now(),
                    last_response_time_ms: Some(55),
                    last_error: None,
                    last_status_change: Some(Utc::now()),
                },
            )
            .await
            .unwrap();

        let mut edited = target.clone();
        edited.name = "renamed".into();
        edited.status = TargetStatus::Down; // must be ignored
        let saved = catalog.update(edited).await.unwrap();

        assert_eq!(saved.name, "renamed");
        assert_eq!(saved.status, TargetStatus::Up);
        let reloaded = catalog.get(target.id).await.unwrap();
        assert_eq!(reloaded.name, "renamed");
        assert_eq!(reloaded.status, TargetStatus::Up);
        assert_eq!(reloaded.last_response_time_ms, Some(55));
    }

    #[tokio::test]
    async fn history_rejects_unknown_target() {
        let (catalog, _) = catalog().await;
        let err = catalog.history(Uuid::new_v4(), 10).await.unwrap_err();
        assert!(matches!(err, DomainError::TargetNotFound(_)));
    }

    #[tokio::test]
    async fn delete_clears_reliability_cell() {
        let (catalog, tracker) = catalog().await;
        let target = catalog.register(new_target("example.com")).await.unwrap();
        tracker.record(target.id, false);
        assert_eq!(tracker.len(), 1);

        catalog.delete(target.id).await.unwrap();
        assert_eq!(tracker.len(), 0);
        assert!(matches!(
            catalog.get(target.id).await.unwrap_err(),
            DomainError::TargetNotFound(_)
        ));
    }
}
