//! Target repository port.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::{Target, TargetStatus};

/// Patch applied by the worker pool after a probe. The REST layer owns
/// the config fields; probe writers touch only this disjoint set.
#[derive(Debug, Clone)]
pub struct ProbePatch {
    pub status: TargetStatus,
    pub last_checked: DateTime<Utc>,
    pub last_response_time_ms: Option<i64>,
    pub last_error: Option<String>,
    /// Set iff the status changed with this probe.
    pub last_status_change: Option<DateTime<Utc>>,
}

/// Filters for listing targets.
#[derive(Debug, Clone, Default)]
pub struct TargetFilter {
    pub owner_id: Option<Uuid>,
    pub status: Option<TargetStatus>,
}

#[async_trait]
pub trait TargetRepository: Send + Sync {
    /// Insert a new target. Fails with `DuplicateTarget` when the owner
    /// already monitors the same normalized address.
    async fn insert(&self, target: &Target) -> DomainResult<()>;

    async fn get(&self, id: Uuid) -> DomainResult<Option<Target>>;

    async fn list(&self, filter: &TargetFilter) -> DomainResult<Vec<Target>>;

    /// Apply observation-side fields after a probe.
    async fn apply_probe_patch(&self, id: Uuid, patch: &ProbePatch) -> DomainResult<()>;

    /// Replace config-side fields (REST collaborator hook).
    async fn update(&self, target: &Target) -> DomainResult<()>;

    /// Delete a target, cascading to its observations.
    async fn delete(&self, id: Uuid) -> DomainResult<()>;

    async fn count(&self, filter: &TargetFilter) -> DomainResult<i64>;
}
