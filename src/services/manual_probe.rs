//! Manual probe service: on-demand single and batch probes.
//!
//! This is the hook surface the REST collaborator calls into. Probes
//! run through the same pipeline as scheduled ones, with `manual` or
//! `batch` check types and the user-facing rate limits applied here.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::instrument;
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::CheckType;
use crate::domain::ports::TargetRepository;
use crate::services::probe_runner::{ProbeRunSummary, ProbeRunner};

/// A user-initiated probe is refused while the last check is fresher
/// than this, unless forced.
const MIN_PROBE_GAP_SECS: i64 = 30;
/// Batch calls accept at most this many targets.
const BATCH_CAP: usize = 10;
/// Sub-batches run with this internal concurrency.
const BATCH_CONCURRENCY: usize = 5;
/// Pause between sub-batches.
const BATCH_SPACING: Duration = Duration::from_millis(200);

/// Per-target outcome of a batch probe.
#[derive(Debug)]
pub enum BatchProbeOutcome {
    Completed(ProbeRunSummary),
    NotFound,
    Failed(String),
}

pub struct ManualProbeService {
    targets: Arc<dyn TargetRepository>,
    runner: Arc<ProbeRunner>,
}

impl ManualProbeService {
    pub fn new(targets: Arc<dyn TargetRepository>, runner: Arc<ProbeRunner>) -> Self {
        Self { targets, runner }
    }

    /// Probe one target now.
    ///
    /// Refused with `RateLimited` when the target was checked within
    /// the last 30 seconds and `force` is not set.
    #[instrument(skip(self), err)]
    pub async fn probe_one(&self, target_id: Uuid, force: bool) -> DomainResult<ProbeRunSummary> {
        let target = self
            .targets
            .get(target_id)
            .await?
            .ok_or(DomainError::TargetNotFound(target_id))?;

        if !force {
            if let Some(last) = target.last_checked {
                let elapsed = (Utc::now() - last).num_seconds();
                if elapsed < MIN_PROBE_GAP_SECS {
                    return Err(DomainError::RateLimited {
                        retry_after_secs: MIN_PROBE_GAP_SECS - elapsed,
                    });
                }
            }
        }

        self.runner
            .execute(target_id, CheckType::Manual)
            .await?
            .ok_or(DomainError::TargetNotFound(target_id))
    }

    /// Probe up to ten targets, five at a time with 200ms spacing
    /// between sub-batches. Individual failures do not abort the batch.
    #[instrument(skip(self), err)]
    pub async fn probe_batch(
        &self,
        target_ids: &[Uuid],
    ) -> DomainResult<Vec<(Uuid, BatchProbeOutcome)>> {
        if target_ids.len() > BATCH_CAP {
            return Err(DomainError::ValidationFailed(format!(
                "batch probes are capped at {BATCH_CAP} targets, got {}",
                target_ids.len()
            )));
        }

        let mut results = Vec::with_capacity(target_ids.len());
        let mut chunks = target_ids.chunks(BATCH_CONCURRENCY).peekable();

        while let Some(chunk) = chunks.next() {
            let probes = chunk
                .iter()
                .map(|&id| async move {
                    let outcome = match self.runner.execute(id, CheckType::Batch).await {
                        Ok(Some(summary)) => BatchProbeOutcome::Completed(summary),
                        Ok(None) => BatchProbeOutcome::NotFound,
                        Err(e) => BatchProbeOutcome::Failed(e.to_string()),
                    };
                    (id, outcome)
                });
            results.extend(futures::future::join_all(probes).await);

            if chunks.peek().is_some() {
                tokio::time::sleep(BATCH_SPACING).await;
            }
        }

        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::broadcast::BroadcastPublisher;
    use crate::adapters::sqlite::{
        create_test_pool, Migrator, SqliteJobQueue, SqliteObservationRepository,
        SqliteTargetRepository,
    };
    use crate::domain::models::{
        MonitoringConfig, NewTarget, OwnerPlan, OwnerRole, ProbeOutcome, ProbeResult,
        ReliabilityCell, Target, TargetKind, TargetStatus, UserPriority,
    };
    use crate::domain::ports::{ObservationRepository, ProbePatch, Prober};
    use crate::services::reliability::ReliabilityTracker;
    use async_trait::async_trait;
    use chrono::Duration as ChronoDuration;

    struct UpProber;

    #[async_trait]
    impl Prober for UpProber {
        async fn probe(&self, _target: &Target, _cell: &ReliabilityCell) -> ProbeResult {
            ProbeResult::new(ProbeOutcome::Up { latency_ms: 10 }, 1)
        }
    }

    async fn fixture() -> (
        ManualProbeService,
        Arc<SqliteTargetRepository>,
        Arc<SqliteObservationRepository>,
        Target,
    ) {
        let pool = create_test_pool().await.unwrap();
        Migrator::new(pool.clone()).run().await.unwrap();
        let targets = Arc::new(SqliteTargetRepository::new(pool.clone()));
        let observations = Arc::new(SqliteObservationRepository::new(pool.clone()));
        let queue = Arc::new(SqliteJobQueue::new(pool));

        let target = Target::new(
            NewTarget {
                name: "A".into(),
                address: "example.com".into(),
                kind: TargetKind::Website,
                owner_id: Uuid::new_v4(),
                owner_plan: OwnerPlan::Premium,
                owner_role: OwnerRole::User,
                priority: UserPriority::Medium,
                monitoring: MonitoringConfig::default(),
                contact_emails: vec![],
                contact_phones: vec![],
            },
            Utc::now(),
        )
        .unwrap();
        use crate::domain::ports::TargetRepository as _;
        targets.insert(&target).await.unwrap();

        let runner = Arc::new(ProbeRunner::new(
            targets.clone(),
            observations.clone(),
            queue,
            Arc::new(BroadcastPublisher::default()),
            Arc::new(ReliabilityTracker::new()),
            Arc::new(UpProber),
        ));

        (
            ManualProbeService::new(targets.clone(), runner),
            targets,
            observations,
            target,
        )
    }

    #[tokio::test]
    async fn manual_probe_records_manual_observation() {
        let (service, _targets, observations, target) = fixture().await;

        let summary = service.probe_one(target.id, false).await.unwrap();
        assert_eq!(summary.new_status, TargetStatus::Up);

        let history = observations.history(target.id, 10).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].check_type, CheckType::Manual);
    }

    #[tokio::test]
    async fn fresh_check_is_rate_limited_unless_forced() {
        let (service, targets, _observations, target) = fixture().await;

        use crate::domain::ports::TargetRepository as _;
        targets
            .apply_probe_patch(
                target.id,
                &ProbePatch {
                    status: TargetStatus::Up,
                    last_checked: Utc::now() - ChronoDuration::seconds(5),
                    last_response_time_ms: Some(10),
                    last_error: None,
                    last_status_change: None,
                },
            )
            .await
            .unwrap();

        let err = service.probe_one(target.id, false).await.unwrap_err();
        match err {
            DomainError::RateLimited { retry_after_secs } => {
                assert!(retry_after_secs > 0 && retry_after_secs <= 30);
            }
            other => panic!("expected rate limit, got {other}"),
        }

        // force bypasses the gap.
        service.probe_one(target.id, true).await.unwrap();
    }

    #[tokio::test]
    async fn unknown_target_is_not_found() {
        let (service, ..) = fixture().await;
        let err = service.probe_one(Uuid::new_v4(), false).await.unwrap_err();
        assert!(matches!(err, DomainError::TargetNotFound(_)));
    }

    #[tokio::test]
    async fn batch_caps_at_ten() {
        let (service, ..) = fixture().await;
        let ids: Vec<Uuid> = (0..11).map(|_| Uuid::new_v4()).collect();
        let err = service.probe_batch(&ids).await.unwrap_err();
        assert!(matches!(err, DomainError::ValidationFailed(_)));
    }

    #[tokio::test]
    async fn batch_mixes_found_and_missing() {
        let (service, _targets, observations, target) = fixture().await;
        let missing = Uuid::new_v4();

        let results = service.probe_batch(&[target.id, missing]).await.unwrap();
        assert_eq!(results.len(), 2);
        assert!(matches!(
            results.iter().find(|(id, _)| *id == target.id).unwrap().1,
            BatchProbeOutcome::Completed(_)
        ));
        assert!(matches!(
            results.iter().find(|(id, _)| *id == missing).unwrap().1,
            BatchProbeOutcome::NotFound
        ));

        let history = observations.history(target.id, 10).await.unwrap();
        assert_eq!(history[0].check_type, CheckType::Batch);
    }
}
