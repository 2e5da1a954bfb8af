//! Per-target monitoring configuration.
//!
//! Normalized at construction: defaults are applied once, and downstream
//! code never distinguishes "absent" from "null".

use chrono::{DateTime, NaiveTime, Utc, Weekday};
use serde::{Deserialize, Serialize};

use crate::domain::errors::{DomainError, DomainResult};

/// Minimum accepted slow-response threshold in milliseconds.
pub const MIN_RESPONSE_THRESHOLD_MS: i64 = 100;

/// A wall-clock time window expressed as `HH:MM` boundaries.
///
/// A window with `start <= end` is the closed interval `[start, end]`.
/// A window with `start > end` spans midnight and matches times at or
/// after `start` or at or before `end`. The window `00:00`..`00:00` is
/// the 24/7 sentinel and accepts every time of day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    #[serde(with = "hhmm")]
    pub start: NaiveTime,
    #[serde(with = "hhmm")]
    pub end: NaiveTime,
}

impl TimeWindow {
    /// Parse a window from two `HH:MM` strings.
    pub fn parse(start: &str, end: &str) -> DomainResult<Self> {
        let parse_one = |s: &str| {
            NaiveTime::parse_from_str(s, "%H:%M")
                .map_err(|_| DomainError::ValidationFailed(format!("invalid HH:MM time: {s}")))
        };
        Ok(Self {
            start: parse_one(start)?,
            end: parse_one(end)?,
        })
    }

    /// The `{00:00, 00:00}` sentinel meaning "always".
    pub fn all_day() -> Self {
        Self {
            start: NaiveTime::MIN,
            end: NaiveTime::MIN,
        }
    }

    pub fn is_all_day(&self) -> bool {
        self.start == NaiveTime::MIN && self.end == NaiveTime::MIN
    }

    /// Whether `t` falls inside this window, honoring midnight spans.
    pub fn contains(&self, t: NaiveTime) -> bool {
        if self.is_all_day() {
            return true;
        }
        if self.start <= self.end {
            self.start <= t && t <= self.end
        } else {
            t >= self.start || t <= self.end
        }
    }
}

mod hhmm {
    use chrono::NaiveTime;
    use serde::{self, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(t: &NaiveTime, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&t.format("%H:%M").to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveTime, D::Error> {
        let raw = String::deserialize(d)?;
        NaiveTime::parse_from_str(&raw, "%H:%M").map_err(serde::de::Error::custom)
    }
}

/// Alert channel configuration embedded in [`MonitoringConfig`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertConfig {
    pub enabled: bool,
    /// Email channel. Defaults to true.
    pub email: bool,
    /// Phone channel. Reserved in the schema; never dispatched.
    pub phone: bool,
    pub webhook_url: Option<String>,
    /// Latency above this value marks an up observation as slow.
    pub response_threshold_ms: i64,
    /// Window during which alerts may be dispatched. `None` means always.
    pub time_window: Option<TimeWindow>,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            email: true,
            phone: false,
            webhook_url: None,
            response_threshold_ms: 1000,
            time_window: None,
        }
    }
}

impl AlertConfig {
    /// Whether alerts may fire at local time `t`.
    pub fn window_allows(&self, t: NaiveTime) -> bool {
        match &self.time_window {
            None => true,
            Some(w) => w.contains(t),
        }
    }
}

/// How a target is monitored: cadence, active days/windows, alerting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitoringConfig {
    /// Minutes between scheduled probes. At least 1.
    pub frequency_minutes: u32,
    /// Days the target is monitored, Sunday = 0. Empty means every day.
    pub days_of_week: Vec<u8>,
    /// Active windows. Empty means 24/7.
    pub time_windows: Vec<TimeWindow>,
    pub alerts: AlertConfig,
    /// End of the free-plan trial; `None` for non-trial targets.
    pub trial_ends_at: Option<DateTime<Utc>>,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            frequency_minutes: 5,
            days_of_week: Vec::new(),
            time_windows: Vec::new(),
            alerts: AlertConfig::default(),
            trial_ends_at: None,
        }
    }
}

impl MonitoringConfig {
    /// Normalize and validate a raw configuration.
    ///
    /// Day values of 7 are aliased to Sunday (0); duplicates are removed
    /// and days sorted. Fails on frequency 0, days above 7, or a
    /// response threshold below [`MIN_RESPONSE_THRESHOLD_MS`].
    pub fn normalized(mut self) -> DomainResult<Self> {
        if self.frequency_minutes < 1 {
            return Err(DomainError::ValidationFailed(
                "frequency_minutes must be at least 1".into(),
            ));
        }
        if self.alerts.response_threshold_ms < MIN_RESPONSE_THRESHOLD_MS {
            return Err(DomainError::ValidationFailed(format!(
                "response_threshold_ms must be at least {MIN_RESPONSE_THRESHOLD_MS}"
            )));
        }
        for day in &mut self.days_of_week {
            if *day == 7 {
                *day = 0;
            } else if *day > 7 {
                return Err(DomainError::ValidationFailed(format!(
                    "day_of_week out of range: {day}"
                )));
            }
        }
        self.days_of_week.sort_unstable();
        self.days_of_week.dedup();
        Ok(self)
    }

    /// Whether any window is the 24/7 sentinel, or no windows are set.
    pub fn is_always(&self) -> bool {
        self.time_windows.is_empty() || self.time_windows.iter().any(TimeWindow::is_all_day)
    }

    /// Whether local time `t` falls inside at least one active window.
    pub fn in_time_windows(&self, t: NaiveTime) -> bool {
        self.is_always() || self.time_windows.iter().any(|w| w.contains(t))
    }

    /// Whether `weekday` is an active monitoring day.
    pub fn active_on(&self, weekday: Weekday) -> bool {
        if self.days_of_week.is_empty() {
            return true;
        }
        let day = weekday.num_days_from_sunday() as u8;
        self.days_of_week.contains(&day)
    }

    /// Whether the free-plan trial has lapsed at `now`.
    pub fn trial_expired(&self, now: DateTime<Utc>) -> bool {
        matches!(self.trial_ends_at, Some(ends) if ends < now)
    }
}
