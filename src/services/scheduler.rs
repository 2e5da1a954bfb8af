//! Probe scheduler: decides which targets are due and enqueues exactly
//! one probe job per due target per tick.
//!
//! The tick loop is single-threaded and cooperative; execution overlaps
//! only with the worker pool through the queue. A tick that outlives
//! the interval never overlaps the next: ticks are mutually exclusive
//! via a process-local lock and an overlapped tick is skipped and
//! logged.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Datelike, Duration, Utc};
use chrono_tz::Tz;
use tokio::sync::Mutex;
use tracing::{info, instrument, warn};

use crate::domain::errors::DomainResult;
use crate::domain::models::{ProbeJob, QueueTopic, Target, TargetStatus};
use crate::domain::ports::{
    EnqueueOptions, EnqueueOutcome, JobLogRepository, JobQueue, TargetFilter, TargetRepository,
};

/// Job-log name for scheduler ticks.
pub const TICK_JOB_NAME: &str = "scheduler-tick";
/// Down targets are polled at least this often to catch recovery.
const DOWN_POLL_MINUTES: i64 = 2;
/// Unknown targets are polled at least this often.
const UNKNOWN_POLL_MINUTES: i64 = 3;
/// A status change within this window marks a target unstable and
/// promotes it to high priority.
const INSTABILITY_WINDOW_MINUTES: i64 = 30;
/// Queue retry policy for probe jobs.
const PROBE_MAX_ATTEMPTS: u32 = 3;
const PROBE_BACKOFF_BASE_MS: i64 = 1000;

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub tick_interval: StdDuration,
    /// Timezone for day-of-week and time-window evaluation.
    pub timezone: Tz,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval: StdDuration::from_secs(60),
            timezone: chrono_tz::UTC,
        }
    }
}

/// Result of one tick, for logging and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickStats {
    pub candidates: usize,
    pub selected: usize,
    pub enqueued: usize,
    pub duplicates: usize,
    pub enqueue_errors: usize,
}

/// Outcome of a tick invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Ran(TickStats),
    /// The previous tick was still running.
    Skipped,
}

pub struct Scheduler {
    targets: Arc<dyn TargetRepository>,
    queue: Arc<dyn JobQueue>,
    job_log: Arc<dyn JobLogRepository>,
    config: SchedulerConfig,
    tick_lock: Mutex<()>,
}

impl Scheduler {
    pub fn new(
        targets: Arc<dyn TargetRepository>,
        queue: Arc<dyn JobQueue>,
        job_log: Arc<dyn JobLogRepository>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            targets,
            queue,
            job_log,
            config,
            tick_lock: Mutex::new(()),
        }
    }

    /// Run the tick loop until `running` is cleared.
    pub async fn run(self: Arc<Self>, running: Arc<AtomicBool>) {
        let mut ticker = tokio::time::interval(self.config.tick_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        info!(interval_secs = self.config.tick_interval.as_secs(), "scheduler started");

        while running.load(Ordering::SeqCst) {
            ticker.tick().await;
            if !running.load(Ordering::SeqCst) {
                break;
            }
            if let Err(e) = self.tick(Utc::now()).await {
                warn!(error = %e, "scheduler tick failed");
            }
        }
        info!("scheduler stopped");
    }

    /// One scheduling pass at `now`.
    #[instrument(skip(self), err)]
    pub async fn tick(&self, now: DateTime<Utc>) -> DomainResult<TickOutcome> {
        let Ok(_guard) = self.tick_lock.try_lock() else {
            warn!("previous tick still running, skipping");
            self.job_log
                .record_skipped(TICK_JOB_NAME, now, "previous tick still running")
                .await?;
            return Ok(TickOutcome::Skipped);
        };

        let log_id = self.job_log.start(TICK_JOB_NAME, now).await?;
        let stats = self.enqueue_due_targets(now).await;

        match &stats {
            Ok(stats) => {
                self.job_log
                    .finish(
                        log_id,
                        crate::domain::models::JobRunStatus::Completed,
                        Utc::now(),
                        Some(serde_json::json!({
                            "candidates": stats.candidates,
                            "selected": stats.selected,
                            "enqueued": stats.enqueued,
                            "duplicates": stats.duplicates,
                            "enqueue_errors": stats.enqueue_errors,
                        })),
                        None,
                    )
                    .await?;
            }
            Err(e) => {
                self.job_log
                    .finish(
                        log_id,
                        crate::domain::models::JobRunStatus::Failed,
                        Utc::now(),
                        None,
                        Some(e.to_string()),
                    )
                    .await?;
            }
        }

        stats.map(TickOutcome::Ran)
    }

    async fn enqueue_due_targets(&self, now: DateTime<Utc>) -> DomainResult<TickStats> {
        let targets = self.targets.list(&TargetFilter::default()).await?;
        let mut stats = TickStats {
            candidates: targets.len(),
            ..Default::default()
        };

        let mut due: Vec<&Target> = targets
            .iter()
            .filter(|t| is_due(t, now) && passes_gates(t, now, self.config.timezone))
            .collect();

        // Within a priority class, oldest observation first; targets
        // never probed lead the line.
        due.sort_by_key(|t| {
            (
                priority_for(t, now),
                t.last_checked.map_or(i64::MIN, |c| c.timestamp_millis()),
            )
        });
        stats.selected = due.len();

        let tick_ms = now.timestamp_millis();
        for target in due {
            let priority = priority_for(target, now);
            let payload = serde_json::to_value(ProbeJob {
                target_id: target.id,
                enqueued_at: now,
                priority_score: priority,
            })?;

            let options = EnqueueOptions {
                dedup_key: Some(ProbeJob::dedup_key(target.id, tick_ms)),
                priority,
                max_attempts: PROBE_MAX_ATTEMPTS,
                backoff_base_ms: PROBE_BACKOFF_BASE_MS,
            };

            // Probes are idempotent: an enqueue failure is recovered on
            // the next tick because the selection predicate stays true.
            match self.queue.enqueue(QueueTopic::Probes, &payload, options).await {
                Ok(EnqueueOutcome::Enqueued(_)) => stats.enqueued += 1,
                Ok(EnqueueOutcome::Duplicate) => stats.duplicates += 1,
                Err(e) => {
                    warn!(target_id = %target.id, error = %e, "probe enqueue failed");
                    stats.enqueue_errors += 1;
                }
            }
        }

        info!(
            selected = stats.selected,
            enqueued = stats.enqueued,
            duplicates = stats.duplicates,
            "tick complete"
        );
        Ok(stats)
    }
}

/// How often a target should currently be probed. Down targets are
/// polled more aggressively to detect recovery.
pub fn adaptive_interval(target: &Target) -> Duration {
    let configured = i64::from(target.monitoring.frequency_minutes);
    let minutes = match target.status {
        TargetStatus::Up => configured,
        TargetStatus::Down => configured.min(DOWN_POLL_MINUTES),
        TargetStatus::Unknown => configured.min(UNKNOWN_POLL_MINUTES),
    };
    Duration::minutes(minutes)
}

/// Selection predicate: never probed, or the adaptive interval elapsed.
pub fn is_due(target: &Target, now: DateTime<Utc>) -> bool {
    match target.last_checked {
        None => true,
        Some(last) => now - last >= adaptive_interval(target),
    }
}

/// Post-selection gates: trial expiry (admins bypass), active days, and
/// active time windows, evaluated in the configured timezone.
pub fn passes_gates(target: &Target, now: DateTime<Utc>, tz: Tz) -> bool {
    if target.monitoring.trial_expired(now) && !target.is_admin() {
        return false;
    }

    let local = now.with_timezone(&tz);
    if !target.monitoring.active_on(local.weekday()) {
        return false;
    }
    target.monitoring.in_time_windows(local.time())
}

/// Queue priority for a selected target: the user-assigned class,
/// promoted to high for down or recently unstable targets.
pub fn priority_for(target: &Target, now: DateTime<Utc>) -> i64 {
    if target.status == TargetStatus::Down {
        return 1;
    }
    if let Some(changed) = target.last_status_change {
        if now - changed <= Duration::minutes(INSTABILITY_WINDOW_MINUTES) {
            return 1;
        }
    }
    target.priority.score()
}
