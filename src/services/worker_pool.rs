//! Worker pool: consumes probe jobs and drives them through the probe
//! pipeline.
//!
//! Parallel workers share one claim path on the persistent queue. Each
//! worker processes a job to completion before taking the next. A
//! per-target in-flight guard makes duplicate jobs for the same target
//! skip-and-ack rather than double-probe; together with the scheduler's
//! dedup keys this keeps at most one probe per target in flight.

use std::collections::HashSet;
use std::num::NonZeroU32;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domain::models::{CheckType, ProbeJob, QueueJob, QueueTopic};
use crate::domain::ports::JobQueue;
use crate::services::probe_runner::ProbeRunner;

/// How long an idle worker sleeps before polling the queue again.
const IDLE_POLL_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Debug, Clone)]
pub struct WorkerPoolConfig {
    pub concurrency: usize,
    pub rate_limit_per_sec: u32,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            concurrency: 50,
            rate_limit_per_sec: 100,
        }
    }
}

pub struct WorkerPool {
    queue: Arc<dyn JobQueue>,
    runner: Arc<ProbeRunner>,
    limiter: Arc<DefaultDirectRateLimiter>,
    in_flight: Arc<Mutex<HashSet<Uuid>>>,
    config: WorkerPoolConfig,
}

impl WorkerPool {
    pub fn new(
        queue: Arc<dyn JobQueue>,
        runner: Arc<ProbeRunner>,
        config: WorkerPoolConfig,
    ) -> Self {
        let per_sec = NonZeroU32::new(config.rate_limit_per_sec.max(1))
            .expect("rate limit is non-zero");
        Self {
            queue,
            runner,
            limiter: Arc::new(RateLimiter::direct(Quota::per_second(per_sec))),
            in_flight: Arc::new(Mutex::new(HashSet::new())),
            config,
        }
    }

    /// Run the pool until `running` is cleared, then drain: workers
    /// finish their current job and exit.
    pub async fn run(self: Arc<Self>, running: Arc<AtomicBool>) {
        info!(
            concurrency = self.config.concurrency,
            rate_limit = self.config.rate_limit_per_sec,
            "worker pool started"
        );

        let mut workers = JoinSet::new();
        for worker_id in 0..self.config.concurrency {
            let pool = Arc::clone(&self);
            let running = Arc::clone(&running);
            workers.spawn(async move { pool.worker_loop(worker_id, running).await });
        }

        while workers.join_next().await.is_some() {}
        info!("worker pool drained");
    }

    async fn worker_loop(&self, worker_id: usize, running: Arc<AtomicBool>) {
        debug!(worker_id, "worker started");
        while running.load(Ordering::SeqCst) {
            self.limiter.until_ready().await;

            match self.queue.claim(QueueTopic::Probes).await {
                Ok(Some(job)) => self.process(job).await,
                Ok(None) => tokio::time::sleep(IDLE_POLL_INTERVAL).await,
                Err(e) => {
                    warn!(worker_id, error = %e, "queue claim failed");
                    tokio::time::sleep(IDLE_POLL_INTERVAL).await;
                }
            }
        }
        debug!(worker_id, "worker stopped");
    }

    /// Process one claimed probe job to completion.
    pub async fn process(&self, job: QueueJob) {
        let probe_job: ProbeJob = match serde_json::from_value(job.payload.clone()) {
            Ok(parsed) => parsed,
            Err(e) => {
                // A payload that cannot parse will never parse; drop it.
                warn!(job_id = job.id, error = %e, "unparseable probe job, acking");
                self.ack(job.id).await;
                return;
            }
        };

        let target_id = probe_job.target_id;

        let Some(_guard) = InFlightGuard::acquire(&self.in_flight, target_id) else {
            // A probe for this target is already running: skip-and-ack,
            // never re-enqueue.
            debug!(target_id = %target_id, job_id = job.id, "probe already in flight, skipping");
            self.ack(job.id).await;
            return;
        };

        match self.runner.execute(target_id, CheckType::Automated).await {
            Ok(Some(summary)) => {
                debug!(
                    target_id = %target_id,
                    old = %summary.old_status,
                    new = %summary.new_status,
                    attempts = summary.attempts,
                    "probe complete"
                );
                self.ack(job.id).await;
            }
            Ok(None) => {
                debug!(target_id = %target_id, "target gone, acking");
                self.ack(job.id).await;
            }
            Err(e) => {
                // Storage failure: NACK for queue-driven retry; on
                // exhaustion the job dead-letters.
                warn!(target_id = %target_id, job_id = job.id, error = %e, "probe job failed");
                if let Err(nack_err) = self.queue.nack(job.id, &e.to_string()).await {
                    warn!(job_id = job.id, error = %nack_err, "nack failed");
                }
            }
        }
    }

    async fn ack(&self, job_id: i64) {
        if let Err(e) = self.queue.ack(job_id).await {
            warn!(job_id, error = %e, "ack failed");
        }
    }
}

/// Holds a target id in the in-flight set for the duration of a probe.
struct InFlightGuard {
    set: Arc<Mutex<HashSet<Uuid>>>,
    target_id: Uuid,
}

impl InFlightGuard {
    fn acquire(set: &Arc<Mutex<HashSet<Uuid>>>, target_id: Uuid) -> Option<Self> {
        let inserted = set.lock().expect("in-flight lock poisoned").insert(target_id);
        inserted.then(|| Self {
            set: Arc::clone(set),
            target_id,
        })
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.set
            .lock()
            .expect("in-flight lock poisoned")
            .remove(&self.target_id);
    }
}
