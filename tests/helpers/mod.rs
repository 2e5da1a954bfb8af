//! Shared wiring for integration tests: in-memory storage, a scripted
//! prober, and recording alert sinks.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use vigil::adapters::broadcast::BroadcastPublisher;
use vigil::adapters::sqlite::{
    create_test_pool, Migrator, SqliteJobLogRepository, SqliteJobQueue,
    SqliteObservationRepository, SqliteRetentionStore, SqliteTargetRepository,
};
use vigil::domain::errors::{DomainError, DomainResult};
use vigil::domain::models::{
    AlertConfig, MonitoringConfig, NewTarget, OwnerPlan, OwnerRole, ProbeOutcome, ProbeResult,
    QueueTopic, ReliabilityCell, Target, TargetKind, UserPriority,
};
use vigil::domain::ports::{
    EmailMessage, EmailSink, JobQueue, Prober, TargetRepository, WebhookPayload, WebhookSink,
};
use vigil::services::{
    AlertPipeline, AlertPipelineConfig, ProbeRunner, ReliabilityTracker, RetentionSweeper,
    RetentionSweeperConfig, Scheduler, SchedulerConfig, WorkerPool, WorkerPoolConfig,
};

/// Prober that replays a scripted sequence of outcomes, then falls back
/// to the default outcome.
pub struct ScriptedProber {
    script: Mutex<VecDeque<ProbeOutcome>>,
    default: ProbeOutcome,
}

impl ScriptedProber {
    pub fn up() -> Self {
        Self::with_default(ProbeOutcome::Up { latency_ms: 123 })
    }

    pub fn with_default(default: ProbeOutcome) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            default,
        }
    }

    pub fn push(&self, outcome: ProbeOutcome) {
        self.script.lock().unwrap().push_back(outcome);
    }
}

#[async_trait]
impl Prober for ScriptedProber {
    async fn probe(&self, _target: &Target, _cell: &ReliabilityCell) -> ProbeResult {
        let outcome = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.default.clone());
        ProbeResult::new(outcome, 1)
    }
}

/// Email sink that records every send; can be told to fail.
#[derive(Default)]
pub struct RecordingEmailSink {
    pub sent: Mutex<Vec<EmailMessage>>,
    pub failing: AtomicBool,
}

#[async_trait]
impl EmailSink for RecordingEmailSink {
    async fn send(&self, message: &EmailMessage) -> DomainResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(DomainError::AlertDispatch {
                channel: "email".into(),
                reason: "scripted failure".into(),
            });
        }
        self.sent.lock().unwrap().push(message.clone());
        Ok(())
    }
}

/// Webhook sink that records every delivery.
#[derive(Default)]
pub struct RecordingWebhookSink {
    pub delivered: Mutex<Vec<(String, WebhookPayload)>>,
}

#[async_trait]
impl WebhookSink for RecordingWebhookSink {
    async fn deliver(&self, url: &str, payload: &WebhookPayload) -> DomainResult<()> {
        self.delivered
            .lock()
            .unwrap()
            .push((url.to_string(), payload.clone()));
        Ok(())
    }
}

/// Fully wired monitoring core over in-memory SQLite.
pub struct Harness {
    pub pool: sqlx::SqlitePool,
    pub targets: Arc<SqliteTargetRepository>,
    pub observations: Arc<SqliteObservationRepository>,
    pub job_log: Arc<SqliteJobLogRepository>,
    pub queue: Arc<SqliteJobQueue>,
    pub tracker: Arc<ReliabilityTracker>,
    pub publisher: Arc<BroadcastPublisher>,
    pub prober: Arc<ScriptedProber>,
    pub runner: Arc<ProbeRunner>,
    pub worker: Arc<WorkerPool>,
    pub scheduler: Arc<Scheduler>,
    pub email: Arc<RecordingEmailSink>,
    pub webhook: Arc<RecordingWebhookSink>,
    pub alerts: Arc<AlertPipeline>,
    pub sweeper: RetentionSweeper,
}

impl Harness {
    pub async fn new() -> Self {
        Self::with_prober(Arc::new(ScriptedProber::up())).await
    }

    pub async fn with_prober(prober: Arc<ScriptedProber>) -> Self {
        let pool = create_test_pool().await.unwrap();
        Migrator::new(pool.clone()).run().await.unwrap();

        let targets = Arc::new(SqliteTargetRepository::new(pool.clone()));
        let observations = Arc::new(SqliteObservationRepository::new(pool.clone()));
        let job_log = Arc::new(SqliteJobLogRepository::new(pool.clone()));
        let queue = Arc::new(SqliteJobQueue::new(pool.clone()));
        let retention_store = Arc::new(SqliteRetentionStore::new(pool.clone()));
        let tracker = Arc::new(ReliabilityTracker::new());
        let publisher = Arc::new(BroadcastPublisher::default());

        let runner = Arc::new(ProbeRunner::new(
            targets.clone(),
            observations.clone(),
            queue.clone(),
            publisher.clone(),
            tracker.clone(),
            prober.clone(),
        ));

        let worker = Arc::new(WorkerPool::new(
            queue.clone(),
            runner.clone(),
            WorkerPoolConfig::default(),
        ));

        let scheduler = Arc::new(Scheduler::new(
            targets.clone(),
            queue.clone(),
            job_log.clone(),
            SchedulerConfig::default(),
        ));

        let email = Arc::new(RecordingEmailSink::default());
        let webhook = Arc::new(RecordingWebhookSink::default());
        let alerts = Arc::new(AlertPipeline::new(
            queue.clone(),
            targets.clone(),
            tracker.clone(),
            email.clone(),
            webhook.clone(),
            AlertPipelineConfig::default(),
        ));

        let sweeper = RetentionSweeper::new(
            observations.clone(),
            job_log.clone(),
            retention_store,
            RetentionSweeperConfig::default(),
        );

        Self {
            pool,
            targets,
            observations,
            job_log,
            queue,
            tracker,
            publisher,
            prober,
            runner,
            worker,
            scheduler,
            email,
            webhook,
            alerts,
            sweeper,
        }
    }

    /// Register a target and return it as stored.
    pub async fn add_target(&self, spec: TargetSpec) -> Target {
        let target = Target::new(
            NewTarget {
                name: spec.name,
                address: spec.address,
                kind: TargetKind::Website,
                owner_id: Uuid::new_v4(),
                owner_plan: spec.plan,
                owner_role: OwnerRole::User,
                priority: UserPriority::Medium,
                monitoring: spec.monitoring,
                contact_emails: spec.contact_emails,
                contact_phones: vec![],
            },
            Utc::now(),
        )
        .unwrap();
        self.targets.insert(&target).await.unwrap();
        target
    }

    /// Process every claimable probe job.
    pub async fn drain_probes(&self) -> usize {
        let mut processed = 0;
        while let Some(job) = self.queue.claim(QueueTopic::Probes).await.unwrap() {
            self.worker.process(job).await;
            processed += 1;
        }
        processed
    }

    /// Process every claimable alert job.
    pub async fn drain_alerts(&self) -> usize {
        let mut processed = 0;
        while let Some(job) = self.queue.claim(QueueTopic::Alerts).await.unwrap() {
            self.alerts.process(job).await;
            processed += 1;
        }
        processed
    }

    pub fn sent_emails(&self) -> Vec<EmailMessage> {
        self.email.sent.lock().unwrap().clone()
    }
}

/// Target registration shorthand for tests.
pub struct TargetSpec {
    pub name: String,
    pub address: String,
    pub plan: OwnerPlan,
    pub monitoring: MonitoringConfig,
    pub contact_emails: Vec<String>,
}

impl Default for TargetSpec {
    fn default() -> Self {
        Self {
            name: "A".into(),
            address: "example.com".into(),
            plan: OwnerPlan::Premium,
            monitoring: MonitoringConfig::default(),
            contact_emails: vec![],
        }
    }
}

impl TargetSpec {
    pub fn alerting(mut self) -> Self {
        self.monitoring.alerts = AlertConfig {
            enabled: true,
            email: true,
            ..AlertConfig::default()
        };
        self.contact_emails = vec!["x@y".into()];
        self
    }
}
