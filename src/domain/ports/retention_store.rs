//! Storage maintenance port used by the retention sweeper.

use async_trait::async_trait;

use crate::domain::errors::DomainResult;

/// Size and volume of the backing store, as reported by the adapter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub total_bytes: i64,
    pub observation_count: i64,
    pub job_log_count: i64,
}

#[async_trait]
pub trait RetentionStore: Send + Sync {
    async fn stats(&self) -> DomainResult<StoreStats>;

    /// Reclaim space after bulk deletes (e.g. SQLite `VACUUM`).
    async fn compact(&self) -> DomainResult<()>;
}
