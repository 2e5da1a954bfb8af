//! Shared per-probe pipeline: probe, persist, publish, emit alerts.
//!
//! Both the queue-driven worker pool and the manual probe service run
//! probes through this one path so the bookkeeping (observation row,
//! target patch, reliability update, alert intent) never diverges.

use std::sync::Arc;

use chrono::Utc;
use tracing::{instrument, warn};
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::{
    AlertIntent, AlertKind, CheckType, Observation, ProbeOutcome, ProbeSnapshot, QueueTopic,
    TargetStatus,
};
use crate::domain::ports::{
    EnqueueOptions, JobQueue, ObservationRepository, ProbePatch, Prober, StatusUpdate,
    TargetRepository, UpdatePublisher,
};
use crate::services::reliability::ReliabilityTracker;

/// Queue retry policy for alert intents.
const ALERT_MAX_ATTEMPTS: u32 = 3;
const ALERT_BACKOFF_BASE_MS: i64 = 2000;

/// What one probe run did, for callers and tests.
#[derive(Debug, Clone)]
pub struct ProbeRunSummary {
    pub target_id: Uuid,
    pub old_status: TargetStatus,
    pub new_status: TargetStatus,
    pub outcome: ProbeOutcome,
    pub status_changed: bool,
    pub alert_enqueued: bool,
    pub attempts: u32,
}

pub struct ProbeRunner {
    targets: Arc<dyn TargetRepository>,
    observations: Arc<dyn ObservationRepository>,
    queue: Arc<dyn JobQueue>,
    publisher: Arc<dyn UpdatePublisher>,
    tracker: Arc<ReliabilityTracker>,
    prober: Arc<dyn Prober>,
}

impl ProbeRunner {
    pub fn new(
        targets: Arc<dyn TargetRepository>,
        observations: Arc<dyn ObservationRepository>,
        queue: Arc<dyn JobQueue>,
        publisher: Arc<dyn UpdatePublisher>,
        tracker: Arc<ReliabilityTracker>,
        prober: Arc<dyn Prober>,
    ) -> Self {
        Self {
            targets,
            observations,
            queue,
            publisher,
            tracker,
            prober,
        }
    }

    pub fn tracker(&self) -> &Arc<ReliabilityTracker> {
        &self.tracker
    }

    /// Execute one probe for `target_id`.
    ///
    /// Returns `Ok(None)` when the target no longer exists (callers ack
    /// and move on). Storage failures propagate so queue-driven callers
    /// can NACK for redelivery; the target state is left untouched in
    /// that case.
    #[instrument(skip(self), err)]
    pub async fn execute(
        &self,
        target_id: Uuid,
        check_type: CheckType,
    ) -> DomainResult<Option<ProbeRunSummary>> {
        let Some(target) = self.targets.get(target_id).await? else {
            return Ok(None);
        };

        let old_status = target.status;
        let cell = self.tracker.get(target_id);
        let result = self.prober.probe(&target, &cell).await;

        let now = Utc::now();
        let new_status = result.outcome.status();
        let latency_ms = result.outcome.latency_ms();
        let error = result.outcome.error_text();
        let status_changed = old_status != new_status;

        let observation = Observation::new(
            target_id,
            new_status,
            latency_ms,
            error.clone(),
            now,
            check_type,
        );
        let patch = ProbePatch {
            status: new_status,
            last_checked: now,
            last_response_time_ms: latency_ms,
            last_error: error.clone(),
            last_status_change: status_changed.then_some(now),
        };

        // Publish is fire-and-forget; persistence runs concurrently.
        self.publisher.publish(StatusUpdate {
            server_id: target_id,
            status: new_status,
            latency: latency_ms,
            last_checked: now,
        });

        let (observation_result, patch_result) = tokio::join!(
            self.observations.insert(&observation),
            self.targets.apply_probe_patch(target_id, &patch),
        );
        observation_result?;
        patch_result?;

        // Slow responses are successes for reliability purposes.
        self.tracker.record(target_id, new_status == TargetStatus::Up);

        let alert_enqueued = if status_changed || result.outcome.is_slow() {
            self.enqueue_alert_intent(&target.name, target_id, old_status, new_status, &result.outcome, &error, now)
                .await
        } else {
            false
        };

        Ok(Some(ProbeRunSummary {
            target_id,
            old_status,
            new_status,
            outcome: result.outcome,
            status_changed,
            alert_enqueued,
            attempts: result.attempts,
        }))
    }

    #[allow(clippy::too_many_arguments)]
    async fn enqueue_alert_intent(
        &self,
        target_name: &str,
        target_id: Uuid,
        old_status: TargetStatus,
        new_status: TargetStatus,
        outcome: &ProbeOutcome,
        error: &Option<String>,
        detected_at: chrono::DateTime<Utc>,
    ) -> bool {
        let Some(kind) = AlertKind::classify(old_status, new_status, error.as_deref()) else {
            return false;
        };

        let intent = AlertIntent {
            target_id,
            old_status,
            new_status,
            probe: ProbeSnapshot {
                status: new_status,
                response_time_ms: outcome.latency_ms(),
                error: error.clone(),
            },
            detected_at,
            kind,
        };

        let payload = match serde_json::to_value(&intent) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(target_id = %target_id, error = %e, "alert intent serialization failed");
                return false;
            }
        };

        let options = EnqueueOptions {
            dedup_key: None,
            priority: intent.priority().score(),
            max_attempts: ALERT_MAX_ATTEMPTS,
            backoff_base_ms: ALERT_BACKOFF_BASE_MS,
        };

        // Alert loss here is recoverable operator-side; the probe job
        // itself must not fail over it.
        match self.queue.enqueue(QueueTopic::Alerts, &payload, options).await {
            Ok(_) => true,
            Err(e) => {
                warn!(target = target_name, error = %e, "alert enqueue failed");
                false
            }
        }
    }
}
