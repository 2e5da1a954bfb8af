//! Scheduler-to-queue integration: dedup semantics, cadence, trial
//! gating, and claim ordering.

mod helpers;

use chrono::{Duration, Utc};

use helpers::{Harness, TargetSpec};
use vigil::domain::models::{OwnerPlan, ProbeJob, QueueTopic, TargetStatus, UserPriority};
use vigil::domain::ports::{JobQueue, ObservationRepository, ProbePatch, TargetRepository};
use vigil::services::TickOutcome;

fn stats(outcome: TickOutcome) -> vigil::services::TickStats {
    match outcome {
        TickOutcome::Ran(stats) => stats,
        TickOutcome::Skipped => panic!("tick skipped"),
    }
}

/// Running the scheduler twice with no time advance enqueues each
/// target exactly once in total: the second tick hits dedup keys.
#[tokio::test]
async fn back_to_back_ticks_dedupe() {
    let harness = Harness::new().await;
    harness.add_target(TargetSpec::default()).await;

    let now = Utc::now();
    let first = stats(harness.scheduler.tick(now).await.unwrap());
    assert_eq!(first.enqueued, 1);

    let second = stats(harness.scheduler.tick(now).await.unwrap());
    assert_eq!(second.enqueued, 0);
    assert_eq!(second.duplicates, 1);

    assert_eq!(harness.queue.pending_count(QueueTopic::Probes).await.unwrap(), 1);
}

/// Repeating a tick many times without advancing time never yields a
/// second enqueue for the same (target, tick) pair.
#[tokio::test]
async fn repeated_ticks_keep_single_job_per_target() {
    let harness = Harness::new().await;
    harness.add_target(TargetSpec::default()).await;

    let now = Utc::now();
    for _ in 0..50 {
        harness.scheduler.tick(now).await.unwrap();
    }

    assert_eq!(harness.queue.pending_count(QueueTopic::Probes).await.unwrap(), 1);
}

/// A 1-minute target probed across N one-minute ticks yields N
/// observations.
#[tokio::test]
async fn one_minute_cadence_yields_one_observation_per_tick() {
    let harness = Harness::new().await;
    let mut spec = TargetSpec::default();
    spec.monitoring.frequency_minutes = 1;
    let target = harness.add_target(spec).await;

    let base = Utc::now();
    let ticks = 5;
    for i in 0..ticks {
        let now = base + Duration::seconds(i * 60);
        let tick = stats(harness.scheduler.tick(now).await.unwrap());
        assert_eq!(tick.enqueued, 1, "tick {i} should enqueue");
        assert_eq!(harness.drain_probes().await, 1);
    }

    let history = harness.observations.history(target.id, 100).await.unwrap();
    assert_eq!(history.len(), ticks as usize);
}

/// A free-plan target whose trial lapsed is skipped strictly after the
/// expiry instant.
#[tokio::test]
async fn expired_trial_is_skipped() {
    let harness = Harness::new().await;
    let spec = TargetSpec {
        plan: OwnerPlan::Free,
        ..Default::default()
    };
    let target = harness.add_target(spec).await;
    let trial_ends = harness
        .targets
        .get(target.id)
        .await
        .unwrap()
        .unwrap()
        .monitoring
        .trial_ends_at
        .expect("free plan stamps a trial");

    // Exactly at the boundary the target still runs.
    let at_boundary = stats(harness.scheduler.tick(trial_ends).await.unwrap());
    assert_eq!(at_boundary.selected, 1);

    // The first tick strictly after skips it.
    let after = stats(
        harness
            .scheduler
            .tick(trial_ends + Duration::milliseconds(1))
            .await
            .unwrap(),
    );
    assert_eq!(after.selected, 0);
}

/// Down targets jump the queue ahead of healthy low-priority targets.
#[tokio::test]
async fn down_targets_claim_first() {
    let harness = Harness::new().await;

    let healthy = harness
        .add_target(TargetSpec {
            name: "healthy".into(),
            address: "healthy.example.com".into(),
            ..Default::default()
        })
        .await;
    let broken = harness
        .add_target(TargetSpec {
            name: "broken".into(),
            address: "broken.example.com".into(),
            ..Default::default()
        })
        .await;

    let now = Utc::now();
    // healthy: up, checked long ago; broken: down.
    harness
        .targets
        .apply_probe_patch(
            healthy.id,
            &ProbePatch {
                status: TargetStatus::Up,
                last_checked: now - Duration::hours(2),
                last_response_time_ms: Some(10),
                last_error: None,
                last_status_change: Some(now - Duration::hours(2)),
            },
        )
        .await
        .unwrap();
    harness
        .targets
        .apply_probe_patch(
            broken.id,
            &ProbePatch {
                status: TargetStatus::Down,
                last_checked: now - Duration::hours(2),
                last_response_time_ms: None,
                last_error: Some("down".into()),
                last_status_change: Some(now - Duration::hours(2)),
            },
        )
        .await
        .unwrap();

    let tick = stats(harness.scheduler.tick(now).await.unwrap());
    assert_eq!(tick.enqueued, 2);

    let first = harness.queue.claim(QueueTopic::Probes).await.unwrap().unwrap();
    let job: ProbeJob = serde_json::from_value(first.payload).unwrap();
    assert_eq!(job.target_id, broken.id);
    assert_eq!(job.priority_score, 1);
}

/// User priority shapes claim order between otherwise equal targets.
#[tokio::test]
async fn user_priority_orders_claims() {
    let harness = Harness::new().await;

    let mut low_spec = TargetSpec {
        name: "low".into(),
        address: "low.example.com".into(),
        ..Default::default()
    };
    low_spec.monitoring.frequency_minutes = 1;
    let low = harness.add_target(low_spec).await;

    let mut high_spec = TargetSpec {
        name: "high".into(),
        address: "high.example.com".into(),
        ..Default::default()
    };
    high_spec.monitoring.frequency_minutes = 1;
    let high = harness.add_target(high_spec).await;

    // Adjust priorities through the config-side update path.
    let mut low_target = harness.targets.get(low.id).await.unwrap().unwrap();
    low_target.priority = UserPriority::Low;
    harness.targets.update(&low_target).await.unwrap();
    let mut high_target = harness.targets.get(high.id).await.unwrap().unwrap();
    high_target.priority = UserPriority::High;
    harness.targets.update(&high_target).await.unwrap();

    let tick = stats(harness.scheduler.tick(Utc::now()).await.unwrap());
    assert_eq!(tick.enqueued, 2);

    let first = harness.queue.claim(QueueTopic::Probes).await.unwrap().unwrap();
    let job: ProbeJob = serde_json::from_value(first.payload).unwrap();
    assert_eq!(job.target_id, high.id);
}
