//! Per-target rolling reliability statistics.
//!
//! Cells are cheap in-memory counters with exponential decay, used for
//! two policy knobs: the probe retry budget and alert flap suppression.
//! They are never persisted; a restart simply means "no evidence of
//! flapping yet".

use chrono::{DateTime, Utc};

/// Decay kicks in once a cell has seen this many checks.
pub const DECAY_AFTER_CHECKS: f64 = 100.0;
/// Both counters are scaled by this factor on decay.
pub const DECAY_FACTOR: f64 = 0.9;
/// Failure rate above which the probe engine grants an extra attempt.
pub const HIGH_FAILURE_RATE: f64 = 0.5;
/// Failure rate above which status-transition alerts are suppressed.
pub const FLAPPING_RATE: f64 = 0.8;

/// Rolling success/failure statistics for one target.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReliabilityCell {
    pub total_checks: f64,
    pub failures: f64,
    pub failure_rate: f64,
    pub last_updated: DateTime<Utc>,
}

impl ReliabilityCell {
    pub fn zero(now: DateTime<Utc>) -> Self {
        Self {
            total_checks: 0.0,
            failures: 0.0,
            failure_rate: 0.0,
            last_updated: now,
        }
    }

    /// Record one probe result, applying the decay rule: once
    /// `total_checks` exceeds [`DECAY_AFTER_CHECKS`], both counters are
    /// scaled by [`DECAY_FACTOR`] so old history fades.
    pub fn record(&mut self, success: bool, now: DateTime<Utc>) {
        self.total_checks += 1.0;
        if !success {
            self.failures += 1.0;
        }
        if self.total_checks > DECAY_AFTER_CHECKS {
            self.total_checks *= DECAY_FACTOR;
            self.failures *= DECAY_FACTOR;
        }
        self.failure_rate = if self.total_checks > 0.0 {
            self.failures / self.total_checks
        } else {
            0.0
        };
        self.last_updated = now;
    }

    /// Whether the probe engine should budget an extra attempt.
    pub fn high_failure(&self) -> bool {
        self.failure_rate > HIGH_FAILURE_RATE
    }

    /// Whether status-transition alerts should be suppressed.
    pub fn is_flapping(&self) -> bool {
        self.failure_rate > FLAPPING_RATE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_cell_reports_clean() {
        let cell = ReliabilityCell::zero(Utc::now());
        assert_eq!(cell.failure_rate, 0.0);
        assert!(!cell.high_failure());
        assert!(!cell.is_flapping());
    }

    #[test]
    fn rate_tracks_failures() {
        let now = Utc::now();
        let mut cell = ReliabilityCell::zero(now);
        cell.record(true, now);
        cell.record(false, now);
        assert!((cell.failure_rate - 0.5).abs() < 1e-9);
        assert!(!cell.high_failure());
        cell.record(false, now);
        assert!(cell.high_failure());
    }

    #[test]
    fn decay_scales_counters_past_hundred() {
        let now = Utc::now();
        let mut cell = ReliabilityCell::zero(now);
        for _ in 0..100 {
            cell.record(true, now);
        }
        assert_eq!(cell.total_checks, 100.0);
        cell.record(false, now);
        // 101 checks tripped the decay: both counters scaled by 0.9.
        assert!((cell.total_checks - 90.9).abs() < 1e-9);
        assert!((cell.failures - 0.9).abs() < 1e-9);
        assert!((cell.failure_rate - 0.9 / 90.9).abs() < 1e-9);
    }

    #[test]
    fn decay_preserves_rate() {
        let now = Utc::now();
        let mut cell = ReliabilityCell::zero(now);
        for i in 0..200 {
            cell.record(i % 2 == 0, now);
        }
        // Alternating success/failure hovers near 0.5 regardless of decay.
        assert!((cell.failure_rate - 0.5).abs() < 0.05);
    }

    #[test]
    fn flapping_threshold() {
        let now = Utc::now();
        let mut cell = ReliabilityCell::zero(now);
        for _ in 0..9 {
            cell.record(false, now);
        }
        cell.record(true, now);
        assert!((cell.failure_rate - 0.9).abs() < 1e-9);
        assert!(cell.is_flapping());
    }
}
