//! Target domain model.
//!
//! A target is a user-registered endpoint under monitoring: an HTTP(S)
//! URL or a raw `host:port` pair, plus the configuration that shapes how
//! and when it is probed.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::monitoring::MonitoringConfig;

/// Hours of monitoring granted to free-plan targets at creation.
pub const FREE_TRIAL_HOURS: i64 = 48;

/// Observed status of a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetStatus {
    Up,
    Down,
    Unknown,
}

impl Default for TargetStatus {
    fn default() -> Self {
        Self::Unknown
    }
}

impl TargetStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Up => "up",
            Self::Down => "down",
            Self::Unknown => "unknown",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "up" => Some(Self::Up),
            "down" => Some(Self::Down),
            "unknown" => Some(Self::Unknown),
            _ => None,
        }
    }
}

impl std::fmt::Display for TargetStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What kind of endpoint a target is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetKind {
    Website,
    Api,
    Tcp,
    Database,
}

impl TargetKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Website => "website",
            Self::Api => "api",
            Self::Tcp => "tcp",
            Self::Database => "database",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "website" => Some(Self::Website),
            "api" => Some(Self::Api),
            "tcp" => Some(Self::Tcp),
            "database" => Some(Self::Database),
            _ => None,
        }
    }

    /// Whether this kind is probed over HTTP. TCP and database targets
    /// are probed with a plain socket connect.
    pub fn is_http(&self) -> bool {
        matches!(self, Self::Website | Self::Api)
    }
}

/// User-assigned scheduling priority. Lower is sooner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserPriority {
    High,
    Medium,
    Low,
}

impl Default for UserPriority {
    fn default() -> Self {
        Self::Medium
    }
}

impl UserPriority {
    /// Queue priority score: high=1, medium=2, low=3.
    pub fn score(&self) -> i64 {
        match self {
            Self::High => 1,
            Self::Medium => 2,
            Self::Low => 3,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "high" => Some(Self::High),
            "medium" => Some(Self::Medium),
            "low" => Some(Self::Low),
            _ => None,
        }
    }
}

/// Billing plan of the target's owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OwnerPlan {
    Free,
    Premium,
    Admin,
}

impl Default for OwnerPlan {
    fn default() -> Self {
        Self::Free
    }
}

impl OwnerPlan {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Premium => "premium",
            Self::Admin => "admin",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "free" => Some(Self::Free),
            "premium" => Some(Self::Premium),
            "admin" => Some(Self::Admin),
            _ => None,
        }
    }
}

/// Role of the target's owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OwnerRole {
    User,
    Admin,
}

impl Default for OwnerRole {
    fn default() -> Self {
        Self::User
    }
}

impl OwnerRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Admin => "admin",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "user" => Some(Self::User),
            "admin" => Some(Self::Admin),
            _ => None,
        }
    }
}

/// A monitored endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Target {
    pub id: Uuid,
    pub name: String,
    /// Normalized address: URL for HTTP kinds, `host:port` for TCP kinds.
    pub address: String,
    pub kind: TargetKind,
    pub owner_id: Uuid,
    pub owner_plan: OwnerPlan,
    pub owner_role: OwnerRole,
    pub priority: UserPriority,
    pub monitoring: MonitoringConfig,
    pub contact_emails: Vec<String>,
    pub contact_phones: Vec<String>,
    pub status: TargetStatus,
    pub last_checked: Option<DateTime<Utc>>,
    pub last_status_change: Option<DateTime<Utc>>,
    pub last_response_time_ms: Option<i64>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Input for registering a new target.
#[derive(Debug, Clone)]
pub struct NewTarget {
    pub name: String,
    pub address: String,
    pub kind: TargetKind,
    pub owner_id: Uuid,
    pub owner_plan: OwnerPlan,
    pub owner_role: OwnerRole,
    pub priority: UserPriority,
    pub monitoring: MonitoringConfig,
    pub contact_emails: Vec<String>,
    pub contact_phones: Vec<String>,
}

impl Target {
    /// Register a target: normalize the address, validate the monitoring
    /// config, and stamp the free-plan trial window.
    pub fn new(input: NewTarget, now: DateTime<Utc>) -> DomainResult<Self> {
        let address = normalize_address(&input.address, input.kind)?;
        let mut monitoring = input.monitoring.normalized()?;
        if input.owner_plan == OwnerPlan::Free && monitoring.trial_ends_at.is_none() {
            monitoring.trial_ends_at = Some(now + Duration::hours(FREE_TRIAL_HOURS));
        }
        Ok(Self {
            id: Uuid::new_v4(),
            name: input.name,
            address,
            kind: input.kind,
            owner_id: input.owner_id,
            owner_plan: input.owner_plan,
            owner_role: input.owner_role,
            priority: input.priority,
            monitoring,
            contact_emails: input.contact_emails,
            contact_phones: input.contact_phones,
            status: TargetStatus::Unknown,
            last_checked: None,
            last_status_change: None,
            last_response_time_ms: None,
            last_error: None,
            created_at: now,
        })
    }

    /// Whether the owner bypasses trial gating.
    pub fn is_admin(&self) -> bool {
        self.owner_role == OwnerRole::Admin || self.owner_plan == OwnerPlan::Admin
    }

    /// The slow-response threshold configured for this target.
    pub fn response_threshold_ms(&self) -> i64 {
        self.monitoring.alerts.response_threshold_ms
    }
}

/// Normalize a target address.
///
/// HTTP kinds: collapse duplicated scheme prefixes, trim whitespace, and
/// strip trailing slashes. TCP kinds: trim and reject an empty host.
/// Normalization is idempotent.
pub fn normalize_address(raw: &str, kind: TargetKind) -> DomainResult<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(DomainError::InvalidAddress("address is empty".into()));
    }

    if !kind.is_http() {
        let host = trimmed.split(':').next().unwrap_or("");
        if host.is_empty() {
            return Err(DomainError::InvalidAddress(format!(
                "missing host in {trimmed}"
            )));
        }
        return Ok(trimmed.to_string());
    }

    // Peel stacked scheme prefixes ("https://http://example.com"),
    // keeping the innermost remainder and the outermost scheme.
    let mut rest = trimmed;
    let mut scheme: Option<&str> = None;
    loop {
        if let Some(r) = rest.strip_prefix("https://") {
            scheme.get_or_insert("https");
            rest = r;
        } else if let Some(r) = rest.strip_prefix("http://") {
            scheme.get_or_insert("http");
            rest = r;
        } else {
            break;
        }
    }
    let rest = rest.trim_end_matches('/');
    if rest.is_empty() {
        return Err(DomainError::InvalidAddress(format!(
            "no host in {trimmed}"
        )));
    }
    match scheme {
        Some(s) => Ok(format!("{s}://{rest}")),
        None => Ok(rest.to_string()),
    }
}
