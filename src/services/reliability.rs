//! In-memory reliability tracker.
//!
//! One cell per target, written by the worker pool after every probe
//! and read by the probe engine (retry budget) and the alert pipeline
//! (flap suppression). Readers tolerate momentarily stale values, so a
//! plain process-local lock is all the coordination required. Cells are
//! never persisted; restarts reset them to "no evidence of flapping".

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info};
use uuid::Uuid;

use crate::domain::models::ReliabilityCell;

/// Cells idle longer than this many minutes are dropped and recreated
/// lazily.
const IDLE_EVICTION_MINUTES: i64 = 60;
/// Cadence of the eviction sweep.
pub const EVICTION_INTERVAL: StdDuration = StdDuration::from_secs(600);

#[derive(Default)]
pub struct ReliabilityTracker {
    cells: Mutex<HashMap<Uuid, ReliabilityCell>>,
}

impl ReliabilityTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one probe result for a target.
    pub fn record(&self, target_id: Uuid, success: bool) {
        let now = Utc::now();
        let mut cells = self.cells.lock().expect("reliability lock poisoned");
        let cell = cells
            .entry(target_id)
            .or_insert_with(|| ReliabilityCell::zero(now));
        cell.record(success, now);
    }

    /// Current cell for a target; a zero cell when none exists.
    pub fn get(&self, target_id: Uuid) -> ReliabilityCell {
        let cells = self.cells.lock().expect("reliability lock poisoned");
        cells
            .get(&target_id)
            .copied()
            .unwrap_or_else(|| ReliabilityCell::zero(Utc::now()))
    }

    /// Replace a target's cell wholesale. Intended for tests and
    /// operator tooling.
    pub fn set(&self, target_id: Uuid, cell: ReliabilityCell) {
        let mut cells = self.cells.lock().expect("reliability lock poisoned");
        cells.insert(target_id, cell);
    }

    /// Drop one target's cell outright (target deleted).
    pub fn evict_target(&self, target_id: Uuid) {
        let mut cells = self.cells.lock().expect("reliability lock poisoned");
        cells.remove(&target_id);
    }

    /// Drop cells idle for more than an hour. Returns how many were
    /// evicted.
    pub fn evict_idle(&self, now: DateTime<Utc>) -> usize {
        let mut cells = self.cells.lock().expect("reliability lock poisoned");
        let before = cells.len();
        cells.retain(|_, cell| now - cell.last_updated <= Duration::minutes(IDLE_EVICTION_MINUTES));
        before - cells.len()
    }

    pub fn len(&self) -> usize {
        self.cells.lock().expect("reliability lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Periodic eviction sweep. Runs until `running` is cleared.
    pub async fn run_eviction_loop(self: Arc<Self>, running: Arc<AtomicBool>) {
        let mut ticker = tokio::time::interval(EVICTION_INTERVAL);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        info!("reliability eviction sweep started");
        while running.load(Ordering::SeqCst) {
            ticker.tick().await;
            if !running.load(Ordering::SeqCst) {
                break;
            }
            let evicted = self.evict_idle(Utc::now());
            if evicted > 0 {
                debug!(evicted, "evicted idle reliability cells");
            }
        }
        info!("reliability eviction sweep stopped");
    }
}
