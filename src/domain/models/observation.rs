//! Observation domain model: one recorded probe result.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::models::target::TargetStatus;

/// How a probe was initiated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckType {
    Automated,
    Manual,
    Batch,
}

impl CheckType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Automated => "automated",
            Self::Manual => "manual",
            Self::Batch => "batch",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "automated" => Some(Self::Automated),
            "manual" => Some(Self::Manual),
            "batch" => Some(Self::Batch),
            _ => None,
        }
    }
}

/// A single probe measurement, appended to the observation store.
///
/// Invariant: `status == Up` implies `response_time_ms` is present and
/// non-negative; a down observation may carry no latency at all.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub id: Uuid,
    pub target_id: Uuid,
    pub status: TargetStatus,
    pub response_time_ms: Option<i64>,
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub check_type: CheckType,
}

impl Observation {
    pub fn new(
        target_id: Uuid,
        status: TargetStatus,
        response_time_ms: Option<i64>,
        error: Option<String>,
        timestamp: DateTime<Utc>,
        check_type: CheckType,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            target_id,
            status,
            response_time_ms,
            error,
            timestamp,
            check_type,
        }
    }
}
