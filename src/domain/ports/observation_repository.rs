//! Observation store port.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::Observation;

#[async_trait]
pub trait ObservationRepository: Send + Sync {
    async fn insert(&self, observation: &Observation) -> DomainResult<()>;

    /// Most recent observations for a target, newest first.
    async fn history(&self, target_id: Uuid, limit: i64) -> DomainResult<Vec<Observation>>;

    async fn count(&self) -> DomainResult<i64>;

    /// Delete observations older than `cutoff`. Returns rows removed.
    async fn prune_before(&self, cutoff: DateTime<Utc>) -> DomainResult<u64>;

    /// Delete every observation. Returns rows removed.
    async fn delete_all(&self) -> DomainResult<u64>;
}
