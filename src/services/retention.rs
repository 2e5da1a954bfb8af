//! Retention sweeper: keeps the observation store bounded.
//!
//! Purely destructive; there is no archival tier. One of three policies
//! is selected per run from the store size the adapter reports. Runs
//! daily at local midnight under a process-wide lock.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{info, instrument, warn};

use crate::domain::errors::DomainResult;
use crate::domain::models::{JobRunStatus, RetentionSettings};
use crate::domain::ports::{JobLogRepository, ObservationRepository, RetentionStore, StoreStats};

/// Cleanup tier, selected per run from current store pressure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RetentionTier {
    Selective,
    Aggressive,
    Emergency,
}

impl RetentionTier {
    /// Job-log name recorded for a run of this tier.
    pub fn job_name(&self) -> &'static str {
        match self {
            Self::Selective => "retention-selective",
            Self::Aggressive => "retention-aggressive",
            Self::Emergency => "retention-emergency",
        }
    }
}

/// What one sweep did.
#[derive(Debug, Clone, Serialize)]
pub struct SweepReport {
    pub tier: RetentionTier,
    pub observations_removed: u64,
    pub job_logs_removed: u64,
    pub compacted: bool,
    pub store_bytes_before: i64,
    pub observations_before: i64,
}

#[derive(Debug, Clone)]
pub struct RetentionSweeperConfig {
    pub timezone: Tz,
    pub settings: RetentionSettings,
}

impl Default for RetentionSweeperConfig {
    fn default() -> Self {
        Self {
            timezone: chrono_tz::UTC,
            settings: RetentionSettings::default(),
        }
    }
}

pub struct RetentionSweeper {
    observations: Arc<dyn ObservationRepository>,
    job_log: Arc<dyn JobLogRepository>,
    store: Arc<dyn RetentionStore>,
    config: RetentionSweeperConfig,
    run_lock: Mutex<()>,
}

impl RetentionSweeper {
    pub fn new(
        observations: Arc<dyn ObservationRepository>,
        job_log: Arc<dyn JobLogRepository>,
        store: Arc<dyn RetentionStore>,
        config: RetentionSweeperConfig,
    ) -> Self {
        Self {
            observations,
            job_log,
            store,
            config,
            run_lock: Mutex::new(()),
        }
    }

    /// One sweep at `now`. Returns `None` when another run holds the
    /// single-instance lock.
    #[instrument(skip(self), err)]
    pub async fn run_once(&self, now: DateTime<Utc>) -> DomainResult<Option<SweepReport>> {
        let Ok(_guard) = self.run_lock.try_lock() else {
            warn!("retention sweep already running, skipping");
            return Ok(None);
        };

        let stats = self.store.stats().await?;
        let tier = select_tier(&stats, &self.config.settings);
        info!(
            ?tier,
            bytes = stats.total_bytes,
            observations = stats.observation_count,
            "retention sweep starting"
        );

        let outcome = self.execute_tier(tier, &stats, now).await;

        // The log entry is written after the destructive work so the
        // emergency tier cannot erase its own record.
        let log_id = self.job_log.start(tier.job_name(), now).await?;
        match &outcome {
            Ok(report) => {
                self.job_log
                    .finish(
                        log_id,
                        JobRunStatus::Completed,
                        Utc::now(),
                        Some(serde_json::to_value(report)?),
                        None,
                    )
                    .await?;
            }
            Err(e) => {
                self.job_log
                    .finish(
                        log_id,
                        JobRunStatus::Failed,
                        Utc::now(),
                        None,
                        Some(e.to_string()),
                    )
                    .await?;
            }
        }

        outcome.map(Some)
    }

    async fn execute_tier(
        &self,
        tier: RetentionTier,
        stats: &StoreStats,
        now: DateTime<Utc>,
    ) -> DomainResult<SweepReport> {
        let settings = &self.config.settings;
        let mut report = SweepReport {
            tier,
            observations_removed: 0,
            job_logs_removed: 0,
            compacted: false,
            store_bytes_before: stats.total_bytes,
            observations_before: stats.observation_count,
        };

        match tier {
            RetentionTier::Selective => {
                let obs_cutoff = now - Duration::days(settings.check_data_retention_days);
                let log_cutoff = now - Duration::days(settings.log_retention_days);
                report.observations_removed = self.observations.prune_before(obs_cutoff).await?;
                report.job_logs_removed = self.job_log.prune_before(log_cutoff).await?;
            }
            RetentionTier::Aggressive => {
                report.observations_removed = self.observations.delete_all().await?;
                report.job_logs_removed =
                    self.job_log.prune_before(now - Duration::hours(24)).await?;
                self.store.compact().await?;
                report.compacted = true;
            }
            RetentionTier::Emergency => {
                report.observations_removed = self.observations.delete_all().await?;
                report.job_logs_removed = self.job_log.delete_all().await?;
            }
        }

        info!(
            ?tier,
            observations_removed = report.observations_removed,
            job_logs_removed = report.job_logs_removed,
            "retention sweep complete"
        );
        Ok(report)
    }

    /// Daily schedule: sleep to the next local midnight, sweep, repeat.
    pub async fn run_schedule(self: Arc<Self>, running: Arc<AtomicBool>) {
        info!(timezone = %self.config.timezone, "retention schedule started");
        while running.load(Ordering::SeqCst) {
            let now = Utc::now();
            let wait = until_next_midnight(now, self.config.timezone);

            // Sleep in short slices so shutdown is prompt.
            let deadline = now + Duration::from_std(wait).unwrap_or(Duration::hours(24));
            while running.load(Ordering::SeqCst) && Utc::now() < deadline {
                tokio::time::sleep(StdDuration::from_secs(30).min(wait)).await;
            }
            if !running.load(Ordering::SeqCst) {
                break;
            }

            if let Err(e) = self.run_once(Utc::now()).await {
                warn!(error = %e, "retention sweep failed; next day's run will catch up");
            }
        }
        info!("retention schedule stopped");
    }
}

/// Pick the cleanup tier from store pressure.
///
/// At exactly the aggressive threshold the selective tier still wins;
/// one byte over tips it.
pub fn select_tier(stats: &StoreStats, settings: &RetentionSettings) -> RetentionTier {
    if stats.total_bytes > settings.emergency_above_bytes {
        RetentionTier::Emergency
    } else if stats.total_bytes > settings.aggressive_above_bytes
        || stats.observation_count > settings.aggressive_above_observations
    {
        RetentionTier::Aggressive
    } else {
        RetentionTier::Selective
    }
}

/// Duration from `now` until the next midnight in `tz`.
pub fn until_next_midnight(now: DateTime<Utc>, tz: Tz) -> StdDuration {
    let local = now.with_timezone(&tz);
    let Some(tomorrow) = (local.date_naive() + Duration::days(1)).and_hms_opt(0, 0, 0) else {
        return StdDuration::from_secs(24 * 3600);
    };
    // DST gaps around midnight resolve to the earliest valid instant.
    let next = tomorrow
        .and_local_timezone(tz)
        .earliest()
        .or_else(|| (tomorrow + Duration::hours(1)).and_local_timezone(tz).earliest());
    match next {
        Some(next) => (next.with_timezone(&Utc) - now)
            .to_std()
            .unwrap_or(StdDuration::from_secs(60)),
        None => StdDuration::from_secs(24 * 3600),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::{
        create_test_pool, Migrator, SqliteJobLogRepository, SqliteObservationRepository,
        SqliteRetentionStore,
    };
    use crate::domain::models::{CheckType, Observation, TargetStatus};
    use chrono::TimeZone;
    use uuid::Uuid;

    fn settings() -> RetentionSettings {
        RetentionSettings::default()
    }

    #[test]
    fn tier_selection_boundaries() {
        let s = settings();
        let mut stats = StoreStats {
            total_bytes: 500 * 1024 * 1024,
            observation_count: 50_000,
            job_log_count: 10,
        };
        // Exactly 500 MB stays selective.
        assert_eq!(select_tier(&stats, &s), RetentionTier::Selective);

        // One byte over tips aggressive.
        stats.total_bytes += 1;
        assert_eq!(select_tier(&stats, &s), RetentionTier::Aggressive);

        // Observation volume alone can tip aggressive.
        stats.total_bytes = 1024;
        stats.observation_count = 100_001;
        assert_eq!(select_tier(&stats, &s), RetentionTier::Aggressive);
        stats.observation_count = 100_000;
        assert_eq!(select_tier(&stats, &s), RetentionTier::Selective);

        // Over 1 GB is an emergency regardless of counts.
        stats.total_bytes = 1024 * 1024 * 1024 + 1;
        stats.observation_count = 0;
        assert_eq!(select_tier(&stats, &s), RetentionTier::Emergency);
    }

    #[test]
    fn next_midnight_respects_timezone() {
        let now = Utc.with_ymd_and_hms(2025, 6, 1, 22, 0, 0).unwrap();
        let wait_utc = until_next_midnight(now, chrono_tz::UTC);
        assert_eq!(wait_utc, StdDuration::from_secs(2 * 3600));

        // Berlin (UTC+2 in June): local midnight arrives at 22:00 UTC,
        // which is right now, so the next one is a day out.
        let wait_berlin = until_next_midnight(now, chrono_tz::Europe::Berlin);
        assert_eq!(wait_berlin, StdDuration::from_secs(24 * 3600));
    }

    async fn sweeper_fixture() -> (
        RetentionSweeper,
        Arc<SqliteObservationRepository>,
        Arc<SqliteJobLogRepository>,
    ) {
        let pool = create_test_pool().await.unwrap();
        Migrator::new(pool.clone()).run().await.unwrap();
        let observations = Arc::new(SqliteObservationRepository::new(pool.clone()));
        let job_log = Arc::new(SqliteJobLogRepository::new(pool.clone()));
        let store = Arc::new(SqliteRetentionStore::new(pool));
        let sweeper = RetentionSweeper::new(
            observations.clone(),
            job_log.clone(),
            store,
            RetentionSweeperConfig::default(),
        );
        (sweeper, observations, job_log)
    }

    fn obs_at(ts: DateTime<Utc>) -> Observation {
        Observation::new(
            Uuid::new_v4(),
            TargetStatus::Up,
            Some(100),
            None,
            ts,
            CheckType::Automated,
        )
    }

    #[tokio::test]
    async fn selective_sweep_prunes_by_age() {
        let (sweeper, observations, job_log) = sweeper_fixture().await;
        let now = Utc::now();

        observations.insert(&obs_at(now - Duration::hours(30))).await.unwrap();
        observations.insert(&obs_at(now - Duration::hours(1))).await.unwrap();

        let report = sweeper.run_once(now).await.unwrap().unwrap();
        assert_eq!(report.tier, RetentionTier::Selective);
        assert_eq!(report.observations_removed, 1);
        assert_eq!(observations.count().await.unwrap(), 1);

        let entries = job_log.recent("retention-selective", 5).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].status, JobRunStatus::Completed);
        assert!(entries[0].result.is_some());
    }

    #[tokio::test]
    async fn aggressive_sweep_deletes_all_observations() {
        let (sweeper, observations, job_log) = sweeper_fixture().await;
        let now = Utc::now();

        // Trip the aggressive tier via observation volume.
        let mut config = RetentionSweeperConfig::default();
        config.settings.aggressive_above_observations = 3;
        let sweeper = RetentionSweeper {
            config,
            ..sweeper
        };

        for i in 0..5 {
            observations
                .insert(&obs_at(now - Duration::hours(i)))
                .await
                .unwrap();
        }
        // A stale log entry past the aggressive 24h cutoff.
        let old_log = job_log.start("scheduler-tick", now - Duration::hours(30)).await.unwrap();
        job_log
            .finish(old_log, JobRunStatus::Completed, now - Duration::hours(30), None, None)
            .await
            .unwrap();

        let report = sweeper.run_once(now).await.unwrap().unwrap();
        assert_eq!(report.tier, RetentionTier::Aggressive);
        assert_eq!(report.observations_removed, 5);
        assert!(report.compacted);
        assert_eq!(observations.count().await.unwrap(), 0);

        // Old entry pruned; the sweep's own record survives.
        assert!(job_log.recent("scheduler-tick", 5).await.unwrap().is_empty());
        let entries = job_log.recent("retention-aggressive", 5).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].status, JobRunStatus::Completed);
    }

    #[tokio::test]
    async fn emergency_sweep_wipes_everything_but_records_itself() {
        let (sweeper, observations, job_log) = sweeper_fixture().await;
        let now = Utc::now();

        let mut config = RetentionSweeperConfig::default();
        config.settings.emergency_above_bytes = 0;
        let sweeper = RetentionSweeper {
            config,
            ..sweeper
        };

        observations.insert(&obs_at(now)).await.unwrap();
        let log = job_log.start("scheduler-tick", now).await.unwrap();
        job_log
            .finish(log, JobRunStatus::Completed, now, None, None)
            .await
            .unwrap();

        let report = sweeper.run_once(now).await.unwrap().unwrap();
        assert_eq!(report.tier, RetentionTier::Emergency);
        assert_eq!(observations.count().await.unwrap(), 0);

        let entries = job_log.recent("retention-emergency", 5).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert!(job_log.recent("scheduler-tick", 5).await.unwrap().is_empty());
    }
}
