//! Alert intents emitted by the worker pool and consumed by the alert
//! pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::models::probe::SLOW_RESPONSE_PREFIX;
use crate::domain::models::target::TargetStatus;

/// What an alert is about. Kinds are mutually exclusive for one decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    ServerDown,
    ServerRecovery,
    SlowResponse,
}

impl AlertKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ServerDown => "server_down",
            Self::ServerRecovery => "server_recovery",
            Self::SlowResponse => "slow_response",
        }
    }

    /// Decide the kind for one observed transition, if it warrants an
    /// alert at all.
    ///
    /// - `server_down`: up -> down
    /// - `server_recovery`: not-up -> up
    /// - `slow_response`: still up, error tagged `Slow response:`
    pub fn classify(
        old_status: TargetStatus,
        new_status: TargetStatus,
        error: Option<&str>,
    ) -> Option<Self> {
        match (old_status, new_status) {
            (TargetStatus::Up, TargetStatus::Down) => Some(Self::ServerDown),
            (old, TargetStatus::Up) if old != TargetStatus::Up => Some(Self::ServerRecovery),
            (_, TargetStatus::Up) => {
                error.filter(|e| e.starts_with(SLOW_RESPONSE_PREFIX))?;
                Some(Self::SlowResponse)
            }
            _ => None,
        }
    }

    /// Whether this kind represents a status transition (as opposed to a
    /// slow-response notice). Flap suppression only applies to
    /// transitions.
    pub fn is_transition(&self) -> bool {
        !matches!(self, Self::SlowResponse)
    }
}

/// Queue priority for an alert intent. Lower dispatches sooner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertPriority {
    High,
    Normal,
    Low,
}

impl AlertPriority {
    pub fn score(&self) -> i64 {
        match self {
            Self::High => 1,
            Self::Normal => 5,
            Self::Low => 10,
        }
    }
}

/// Snapshot of the probe that triggered an alert decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeSnapshot {
    pub status: TargetStatus,
    pub response_time_ms: Option<i64>,
    pub error: Option<String>,
}

/// An alert decision in flight: emitted by the worker pool, gated and
/// dispatched by the alert pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertIntent {
    pub target_id: Uuid,
    pub old_status: TargetStatus,
    pub new_status: TargetStatus,
    pub probe: ProbeSnapshot,
    pub detected_at: DateTime<Utc>,
    pub kind: AlertKind,
}

impl AlertIntent {
    /// Dispatch priority: down transitions are urgent, the rest normal.
    pub fn priority(&self) -> AlertPriority {
        if self.new_status == TargetStatus::Down {
            AlertPriority::High
        } else {
            AlertPriority::Normal
        }
    }
}
