//! Alert pipeline: gates, classifies, and dispatches alert intents.
//!
//! Consumes the alert topic with its own small worker pool. Intents for
//! the same target are processed in FIFO order (a busy target defers
//! later intents back onto the queue); intents across targets may
//! reorder freely. Email delivery rides the queue's retry machinery;
//! webhooks are fire-and-forget by contract.

use std::collections::HashSet;
use std::num::NonZeroU32;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::NaiveTime;
use chrono_tz::Tz;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domain::models::{AlertIntent, AlertKind, QueueJob, QueueTopic, ReliabilityCell, Target};
use crate::domain::ports::{
    EmailMessage, EmailSink, JobQueue, TargetRepository, WebhookPayload, WebhookServer,
    WebhookSink,
};
use crate::services::reliability::ReliabilityTracker;

/// How long an idle alert worker sleeps between queue polls.
const IDLE_POLL_INTERVAL: Duration = Duration::from_millis(500);
/// Deferral applied when another intent for the same target is active.
const STICKY_DEFER_MS: i64 = 250;

#[derive(Debug, Clone)]
pub struct AlertPipelineConfig {
    pub concurrency: usize,
    pub rate_limit_per_sec: u32,
    /// Timezone for the alert-time-window gate.
    pub timezone: Tz,
}

impl Default for AlertPipelineConfig {
    fn default() -> Self {
        Self {
            concurrency: 10,
            rate_limit_per_sec: 50,
            timezone: chrono_tz::UTC,
        }
    }
}

/// Why an intent was dropped at the gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateRefusal {
    AlertsDisabled,
    OutsideWindow,
    Flapping,
}

pub struct AlertPipeline {
    queue: Arc<dyn JobQueue>,
    targets: Arc<dyn TargetRepository>,
    tracker: Arc<ReliabilityTracker>,
    email: Arc<dyn EmailSink>,
    webhook: Arc<dyn WebhookSink>,
    limiter: Arc<DefaultDirectRateLimiter>,
    in_flight: Arc<Mutex<HashSet<Uuid>>>,
    config: AlertPipelineConfig,
}

impl AlertPipeline {
    pub fn new(
        queue: Arc<dyn JobQueue>,
        targets: Arc<dyn TargetRepository>,
        tracker: Arc<ReliabilityTracker>,
        email: Arc<dyn EmailSink>,
        webhook: Arc<dyn WebhookSink>,
        config: AlertPipelineConfig,
    ) -> Self {
        let per_sec = NonZeroU32::new(config.rate_limit_per_sec.max(1))
            .expect("rate limit is non-zero");
        Self {
            queue,
            targets,
            tracker,
            email,
            webhook,
            limiter: Arc::new(RateLimiter::direct(Quota::per_second(per_sec))),
            in_flight: Arc::new(Mutex::new(HashSet::new())),
            config,
        }
    }

    /// Run the pipeline until `running` is cleared.
    pub async fn run(self: Arc<Self>, running: Arc<AtomicBool>) {
        info!(
            concurrency = self.config.concurrency,
            rate_limit = self.config.rate_limit_per_sec,
            "alert pipeline started"
        );

        let mut workers = JoinSet::new();
        for worker_id in 0..self.config.concurrency {
            let pipeline = Arc::clone(&self);
            let running = Arc::clone(&running);
            workers.spawn(async move { pipeline.worker_loop(worker_id, running).await });
        }

        while workers.join_next().await.is_some() {}
        info!("alert pipeline drained");
    }

    async fn worker_loop(&self, worker_id: usize, running: Arc<AtomicBool>) {
        while running.load(Ordering::SeqCst) {
            self.limiter.until_ready().await;

            match self.queue.claim(QueueTopic::Alerts).await {
                Ok(Some(job)) => self.process(job).await,
                Ok(None) => tokio::time::sleep(IDLE_POLL_INTERVAL).await,
                Err(e) => {
                    warn!(worker_id, error = %e, "alert claim failed");
                    tokio::time::sleep(IDLE_POLL_INTERVAL).await;
                }
            }
        }
    }

    /// Process one claimed alert job to completion.
    pub async fn process(&self, job: QueueJob) {
        let intent: AlertIntent = match serde_json::from_value(job.payload.clone()) {
            Ok(intent) => intent,
            Err(e) => {
                warn!(job_id = job.id, error = %e, "unparseable alert intent, acking");
                self.ack(job.id).await;
                return;
            }
        };

        // Sticky key: same-target intents stay FIFO by deferring this
        // one while an earlier one is still dispatching.
        let Some(_guard) = StickyGuard::acquire(&self.in_flight, intent.target_id) else {
            if let Err(e) = self.queue.release(job.id, STICKY_DEFER_MS).await {
                warn!(job_id = job.id, error = %e, "alert defer failed");
            }
            return;
        };

        let target = match self.targets.get(intent.target_id).await {
            Ok(Some(target)) => target,
            Ok(None) => {
                debug!(target_id = %intent.target_id, "target gone, dropping alert");
                self.ack(job.id).await;
                return;
            }
            Err(e) => {
                warn!(target_id = %intent.target_id, error = %e, "target load failed");
                if let Err(nack_err) = self.queue.nack(job.id, &e.to_string()).await {
                    warn!(job_id = job.id, error = %nack_err, "nack failed");
                }
                return;
            }
        };

        let cell = self.tracker.get(intent.target_id);
        let local_time = intent
            .detected_at
            .with_timezone(&self.config.timezone)
            .time();
        if let Err(refusal) = evaluate_gates(&target, &intent, &cell, local_time) {
            info!(
                target_id = %intent.target_id,
                kind = intent.kind.as_str(),
                ?refusal,
                "alert gated out"
            );
            self.ack(job.id).await;
            return;
        }

        // Webhooks fire exactly once, on the first delivery attempt:
        // redeliveries exist only to retry the email channel.
        if job.attempts <= 1 {
            self.dispatch_webhook(&target, &intent).await;
        }

        match self.dispatch_email(&target, &intent).await {
            Ok(()) => self.ack(job.id).await,
            Err(reason) => {
                warn!(target_id = %intent.target_id, reason = %reason, "email dispatch failed");
                if let Err(e) = self.queue.nack(job.id, &reason).await {
                    warn!(job_id = job.id, error = %e, "nack failed");
                }
            }
        }
    }

    /// Email channel. Succeeds when every recipient accepted, or the
    /// channel is off. A failure here NACKs the intent so the queue's
    /// 2s/4s/8s backoff drives the remaining attempts; exhaustion lands
    /// the intent in the dead-letter set for 24h.
    async fn dispatch_email(&self, target: &Target, intent: &AlertIntent) -> Result<(), String> {
        if !target.monitoring.alerts.email || target.contact_emails.is_empty() {
            return Ok(());
        }

        let subject = render_subject(intent.kind, &target.name);
        let body = render_body(target, intent);

        let mut failures = Vec::new();
        for recipient in &target.contact_emails {
            let message = EmailMessage {
                to: recipient.clone(),
                subject: subject.clone(),
                body: body.clone(),
            };
            if let Err(e) = self.email.send(&message).await {
                failures.push(format!("{recipient}: {e}"));
            }
        }

        if failures.is_empty() {
            debug!(target = %target.name, subject = %subject, "alert emails sent");
            Ok(())
        } else {
            Err(failures.join("; "))
        }
    }

    /// Webhook channel: one POST, failures logged and dropped.
    async fn dispatch_webhook(&self, target: &Target, intent: &AlertIntent) {
        let Some(url) = target
            .monitoring
            .alerts
            .webhook_url
            .as_deref()
            .filter(|u| !u.is_empty())
        else {
            return;
        };

        let payload = WebhookPayload {
            event: intent.kind.as_str().to_string(),
            server: WebhookServer {
                id: target.id,
                name: target.name.clone(),
                url: target.address.clone(),
                status: intent.new_status,
            },
            old_status: intent.old_status,
            new_status: intent.new_status,
            response_time: intent.probe.response_time_ms,
            error: intent.probe.error.clone(),
            timestamp: intent.detected_at,
        };

        if let Err(e) = self.webhook.deliver(url, &payload).await {
            warn!(target = %target.name, url, error = %e, "webhook delivery failed");
        }
    }

    async fn ack(&self, job_id: i64) {
        if let Err(e) = self.queue.ack(job_id).await {
            warn!(job_id, error = %e, "ack failed");
        }
    }
}

/// Gate chain, evaluated in order; the first refusal wins.
pub fn evaluate_gates(
    target: &Target,
    intent: &AlertIntent,
    cell: &ReliabilityCell,
    local_time: NaiveTime,
) -> Result<(), GateRefusal> {
    if !target.monitoring.alerts.enabled {
        return Err(GateRefusal::AlertsDisabled);
    }
    if !target.monitoring.alerts.window_allows(local_time) {
        return Err(GateRefusal::OutsideWindow);
    }
    if cell.is_flapping() && intent.kind.is_transition() {
        return Err(GateRefusal::Flapping);
    }
    Ok(())
}

/// Email subject per alert kind.
pub fn render_subject(kind: AlertKind, target_name: &str) -> String {
    match kind {
        AlertKind::ServerDown => format!("{target_name} is DOWN"),
        AlertKind::ServerRecovery => format!("{target_name} is UP"),
        AlertKind::SlowResponse => format!("Slow response on {target_name}"),
    }
}

fn render_body(target: &Target, intent: &AlertIntent) -> String {
    let mut body = format!(
        "Monitor: {}\nAddress: {}\nStatus: {} -> {}\nDetected: {}\n",
        target.name,
        target.address,
        intent.old_status,
        intent.new_status,
        intent.detected_at.to_rfc3339(),
    );
    if let Some(latency) = intent.probe.response_time_ms {
        body.push_str(&format!("Response time: {latency}ms\n"));
    }
    if let Some(error) = &intent.probe.error {
        body.push_str(&format!("Detail: {error}\n"));
    }
    body
}

/// Sticky-key guard keeping same-target dispatch FIFO.
struct StickyGuard {
    set: Arc<Mutex<HashSet<Uuid>>>,
    target_id: Uuid,
}

impl StickyGuard {
    fn acquire(set: &Arc<Mutex<HashSet<Uuid>>>, target_id: Uuid) -> Option<Self> {
        let inserted = set.lock().expect("sticky lock poisoned").insert(target_id);
        inserted.then(|| Self {
            set: Arc::clone(set),
            target_id,
        })
    }
}

impl Drop for StickyGuard {
    fn drop(&mut self) {
        self.set
            .lock()
            .expect("sticky lock poisoned")
            .remove(&self.target_id);
    }
}
