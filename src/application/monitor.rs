//! Monitor daemon: dependency wiring and lifecycle.
//!
//! Every process-wide singleton (DB pool, HTTP clients, queue handles,
//! reliability tracker) is an explicit, injected object with start/stop
//! semantics rather than a module-load side effect, so tests can wire
//! deterministic replacements.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use chrono_tz::Tz;
use sqlx::SqlitePool;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::adapters::broadcast::BroadcastPublisher;
use crate::adapters::email::SmtpEmailSink;
use crate::adapters::sqlite::{
    verify_connection, Database, SqliteJobLogRepository, SqliteJobQueue,
    SqliteObservationRepository, SqliteRetentionStore, SqliteTargetRepository,
};
use crate::adapters::webhook::HttpWebhookSink;
use crate::domain::models::Config;
use crate::domain::ports::{JobQueue, StatusUpdate};
use crate::services::{
    AlertPipeline, AlertPipelineConfig, ManualProbeService, ProbeEngine, ProbeEngineConfig,
    ProbeRunner, ReliabilityTracker, RetentionSweeper, RetentionSweeperConfig, Scheduler,
    SchedulerConfig, TargetCatalog, WorkerPool, WorkerPoolConfig,
};

/// Interval of the queue maintenance sweep.
const QUEUE_SWEEP_INTERVAL: Duration = Duration::from_secs(3600);
/// Cadence of the storage health watchdog.
const HEALTH_PING_INTERVAL: Duration = Duration::from_secs(10);
/// Storage unreachable for longer than this shuts the process down for
/// supervisor restart.
const HEALTH_FATAL_AFTER: Duration = Duration::from_secs(60);

/// The assembled monitoring daemon.
pub struct Monitor {
    running: Arc<AtomicBool>,
    tasks: Vec<JoinHandle<()>>,
    fatal_rx: watch::Receiver<Option<String>>,
    fatal_tx: watch::Sender<Option<String>>,

    pool: SqlitePool,
    queue: Arc<SqliteJobQueue>,
    publisher: Arc<BroadcastPublisher>,
    tracker: Arc<ReliabilityTracker>,
    scheduler: Arc<Scheduler>,
    worker_pool: Arc<WorkerPool>,
    alert_pipeline: Arc<AlertPipeline>,
    sweeper: Arc<RetentionSweeper>,
    manual_probes: Arc<ManualProbeService>,
    catalog: Arc<TargetCatalog>,

    drain_timeout: Duration,
}

impl Monitor {
    /// Wire the full dependency graph from configuration. Runs
    /// migrations; does not start any background work yet.
    pub async fn build(config: &Config) -> Result<Self> {
        let timezone: Tz = config
            .scheduler
            .timezone
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid timezone {}: {e}", config.scheduler.timezone))?;

        let db = Database::connect(&config.database)
            .await
            .context("Failed to open database")?;
        db.migrate()
            .await
            .context("Failed to run database migrations")?;
        let pool = db.pool().clone();

        let targets = Arc::new(SqliteTargetRepository::new(pool.clone()));
        let observations = Arc::new(SqliteObservationRepository::new(pool.clone()));
        let job_log = Arc::new(SqliteJobLogRepository::new(pool.clone()));
        let retention_store = Arc::new(SqliteRetentionStore::new(pool.clone()));
        let queue = Arc::new(SqliteJobQueue::new(pool.clone()));
        let publisher = Arc::new(BroadcastPublisher::default());
        let tracker = Arc::new(ReliabilityTracker::new());

        let engine = Arc::new(
            ProbeEngine::new(ProbeEngineConfig {
                attempt_timeout: Duration::from_secs(config.probe.attempt_timeout_secs),
            })
            .context("Failed to build probe engine")?,
        );

        let runner = Arc::new(ProbeRunner::new(
            targets.clone(),
            observations.clone(),
            queue.clone(),
            publisher.clone(),
            tracker.clone(),
            engine,
        ));

        let scheduler = Arc::new(Scheduler::new(
            targets.clone(),
            queue.clone(),
            job_log.clone(),
            SchedulerConfig {
                tick_interval: Duration::from_secs(config.scheduler.tick_interval_secs),
                timezone,
            },
        ));

        let worker_pool = Arc::new(WorkerPool::new(
            queue.clone(),
            runner.clone(),
            WorkerPoolConfig {
                concurrency: config.worker.concurrency,
                rate_limit_per_sec: config.worker.rate_limit_per_sec,
            },
        ));

        let email = Arc::new(
            SmtpEmailSink::new(&config.smtp).context("Failed to build SMTP transport")?,
        );
        let webhook = Arc::new(HttpWebhookSink::new().context("Failed to build webhook client")?);

        let alert_pipeline = Arc::new(AlertPipeline::new(
            queue.clone(),
            targets.clone(),
            tracker.clone(),
            email,
            webhook,
            AlertPipelineConfig {
                concurrency: config.alerts.concurrency,
                rate_limit_per_sec: config.alerts.rate_limit_per_sec,
                timezone,
            },
        ));

        let sweeper = Arc::new(RetentionSweeper::new(
            observations.clone(),
            job_log,
            retention_store,
            RetentionSweeperConfig {
                timezone,
                settings: config.retention.clone(),
            },
        ));

        let manual_probes = Arc::new(ManualProbeService::new(targets.clone(), runner.clone()));
        let catalog = Arc::new(TargetCatalog::new(
            targets,
            observations.clone(),
            tracker.clone(),
        ));

        let (fatal_tx, fatal_rx) = watch::channel(None);

        Ok(Self {
            running: Arc::new(AtomicBool::new(false)),
            tasks: Vec::new(),
            fatal_rx,
            fatal_tx,
            pool,
            queue,
            publisher,
            tracker,
            scheduler,
            worker_pool,
            alert_pipeline,
            sweeper,
            manual_probes,
            catalog,
            drain_timeout: Duration::from_secs(config.worker.drain_timeout_secs),
        })
    }

    /// Spawn all background loops.
    pub fn start(&mut self) {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("monitor already started");
            return;
        }
        info!("starting monitor");

        self.tasks.push(tokio::spawn(
            Arc::clone(&self.scheduler).run(Arc::clone(&self.running)),
        ));
        self.tasks.push(tokio::spawn(
            Arc::clone(&self.worker_pool).run(Arc::clone(&self.running)),
        ));
        self.tasks.push(tokio::spawn(
            Arc::clone(&self.alert_pipeline).run(Arc::clone(&self.running)),
        ));
        self.tasks.push(tokio::spawn(
            Arc::clone(&self.tracker).run_eviction_loop(Arc::clone(&self.running)),
        ));
        self.tasks.push(tokio::spawn(
            Arc::clone(&self.sweeper).run_schedule(Arc::clone(&self.running)),
        ));

        let queue = Arc::clone(&self.queue);
        let running = Arc::clone(&self.running);
        self.tasks.push(tokio::spawn(async move {
            queue_sweep_loop(queue, running).await;
        }));

        let pool = self.pool.clone();
        let running = Arc::clone(&self.running);
        let fatal_tx = self.fatal_tx.clone();
        self.tasks.push(tokio::spawn(async move {
            storage_watchdog(pool, running, fatal_tx).await;
        }));
    }

    /// Stop accepting work, wait for in-flight probes up to the drain
    /// timeout, then force-terminate. Interrupted work is safe: probes
    /// are idempotent and the queue redelivers.
    pub async fn stop(mut self) {
        info!("stopping monitor");
        self.running.store(false, Ordering::SeqCst);

        let mut tasks = std::mem::take(&mut self.tasks);
        let drain = futures::future::join_all(tasks.iter_mut());
        if tokio::time::timeout(self.drain_timeout, drain).await.is_err() {
            warn!(
                timeout_secs = self.drain_timeout.as_secs(),
                "drain timed out, force-terminating workers"
            );
            for task in &tasks {
                task.abort();
            }
        }

        self.pool.close().await;
        info!("monitor stopped");
    }

    /// Start, then block until SIGTERM/SIGINT or a fatal infrastructure
    /// fault, then drain.
    pub async fn run_until_shutdown(mut self) -> Result<()> {
        self.start();
        let mut fatal_rx = self.fatal_rx.clone();

        tokio::select! {
            _ = shutdown_signal() => {
                info!("shutdown signal received");
            }
            _ = fatal_rx.changed() => {
                let reason = fatal_rx.borrow().clone().unwrap_or_default();
                error!(reason = %reason, "fatal infrastructure fault");
                self.stop().await;
                anyhow::bail!("fatal infrastructure fault: {reason}");
            }
        }

        self.stop().await;
        Ok(())
    }

    /// Hook surface for the REST collaborator.
    pub fn manual_probes(&self) -> Arc<ManualProbeService> {
        Arc::clone(&self.manual_probes)
    }

    /// Target lifecycle and read-only query hooks.
    pub fn catalog(&self) -> Arc<TargetCatalog> {
        Arc::clone(&self.catalog)
    }

    /// Subscribe to live `monitor-updates` messages.
    pub fn subscribe_updates(&self) -> tokio::sync::broadcast::Receiver<StatusUpdate> {
        self.publisher.subscribe()
    }

    /// One immediate retention sweep (CLI hook).
    pub async fn sweep_retention_now(&self) -> Result<()> {
        self.sweeper
            .run_once(Utc::now())
            .await
            .context("retention sweep failed")?;
        Ok(())
    }
}

/// Hourly queue maintenance: purge terminal jobs past retention.
async fn queue_sweep_loop(queue: Arc<SqliteJobQueue>, running: Arc<AtomicBool>) {
    let mut ticker = tokio::time::interval(QUEUE_SWEEP_INTERVAL);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    while running.load(Ordering::SeqCst) {
        ticker.tick().await;
        if !running.load(Ordering::SeqCst) {
            break;
        }
        match queue.sweep(Utc::now()).await {
            Ok(stats) => {
                if stats.completed_removed + stats.dead_removed > 0 {
                    info!(
                        completed = stats.completed_removed,
                        dead = stats.dead_removed,
                        "queue sweep"
                    );
                }
            }
            Err(e) => warn!(error = %e, "queue sweep failed"),
        }
    }
}

/// Pings storage; a continuous failure window longer than
/// [`HEALTH_FATAL_AFTER`] reports a fatal fault so the supervisor can
/// restart the process.
async fn storage_watchdog(
    pool: SqlitePool,
    running: Arc<AtomicBool>,
    fatal_tx: watch::Sender<Option<String>>,
) {
    let mut last_ok = Utc::now();
    let mut ticker = tokio::time::interval(HEALTH_PING_INTERVAL);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    while running.load(Ordering::SeqCst) {
        ticker.tick().await;
        match verify_connection(&pool).await {
            Ok(()) => last_ok = Utc::now(),
            Err(e) => {
                let unreachable_for = (Utc::now() - last_ok)
                    .to_std()
                    .unwrap_or(Duration::ZERO);
                warn!(error = %e, ?unreachable_for, "storage ping failed");
                if unreachable_for > HEALTH_FATAL_AFTER {
                    let _ = fatal_tx.send(Some(format!(
                        "storage unreachable for {}s: {e}",
                        unreachable_for.as_secs()
                    )));
                    return;
                }
            }
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => {}
            _ = sigterm.recv() => {}
        }
    }

    #[cfg(not(unix))]
    {
        let _ = ctrl_c.await;
    }
}
