//! Probe outcomes.
//!
//! Internally a probe result is a tagged value; the `Slow response:`
//! string the alert pipeline keys off is synthesized only at the
//! persistence boundary via [`ProbeOutcome::error_text`].

use serde::{Deserialize, Serialize};

use crate::domain::models::target::TargetStatus;

/// Literal prefix of the error string carried by slow-but-up
/// observations. The alert pipeline matches on this substring.
pub const SLOW_RESPONSE_PREFIX: &str = "Slow response:";

/// The decided outcome of one probe invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ProbeOutcome {
    /// Target responded within the configured threshold.
    Up { latency_ms: i64 },
    /// Target responded, but slower than the configured threshold.
    /// Still counts as up everywhere except the slow-response alert.
    Slow { latency_ms: i64, threshold_ms: i64 },
    /// Target did not respond acceptably.
    Down { reason: String },
}

impl ProbeOutcome {
    /// Classify a successful measurement against a threshold.
    pub fn up(latency_ms: i64, threshold_ms: i64) -> Self {
        if latency_ms > threshold_ms {
            Self::Slow {
                latency_ms,
                threshold_ms,
            }
        } else {
            Self::Up { latency_ms }
        }
    }

    pub fn status(&self) -> TargetStatus {
        match self {
            Self::Up { .. } | Self::Slow { .. } => TargetStatus::Up,
            Self::Down { .. } => TargetStatus::Down,
        }
    }

    pub fn latency_ms(&self) -> Option<i64> {
        match self {
            Self::Up { latency_ms } | Self::Slow { latency_ms, .. } => Some(*latency_ms),
            Self::Down { .. } => None,
        }
    }

    pub fn is_slow(&self) -> bool {
        matches!(self, Self::Slow { .. })
    }

    /// The error string persisted alongside the observation, if any.
    pub fn error_text(&self) -> Option<String> {
        match self {
            Self::Up { .. } => None,
            Self::Slow {
                latency_ms,
                threshold_ms,
            } => Some(format!(
                "{SLOW_RESPONSE_PREFIX} {latency_ms}ms exceeds {threshold_ms}ms"
            )),
            Self::Down { reason } => Some(reason.clone()),
        }
    }
}

/// A probe outcome plus how many attempts it took to decide.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeResult {
    pub outcome: ProbeOutcome,
    pub attempts: u32,
}

impl ProbeResult {
    pub fn new(outcome: ProbeOutcome, attempts: u32) -> Self {
        Self { outcome, attempts }
    }
}
