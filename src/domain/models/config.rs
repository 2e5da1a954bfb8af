//! Application configuration model.
//!
//! Loaded by `infrastructure::config::ConfigLoader` from defaults, an
//! optional YAML file, and environment variables.

use serde::{Deserialize, Serialize};

/// Top-level configuration for the monitoring daemon.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub scheduler: SchedulerSettings,
    pub worker: WorkerSettings,
    pub alerts: AlertPipelineSettings,
    pub probe: ProbeSettings,
    pub smtp: SmtpConfig,
    pub retention: RetentionSettings,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Storage DSN. SQLite path, e.g. `sqlite:vigil.db`.
    pub url: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite:vigil.db".into(),
            max_connections: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerSettings {
    /// Seconds between scheduler ticks.
    pub tick_interval_secs: u64,
    /// IANA timezone for window evaluation and retention scheduling.
    pub timezone: String,
    /// Default probe cadence applied to targets created without one.
    pub default_check_frequency_minutes: u32,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            tick_interval_secs: 60,
            timezone: "UTC".into(),
            default_check_frequency_minutes: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerSettings {
    /// Concurrent probe workers per process.
    pub concurrency: usize,
    /// Probe jobs per second, per process.
    pub rate_limit_per_sec: u32,
    /// Seconds to wait for in-flight probes on shutdown.
    pub drain_timeout_secs: u64,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            concurrency: 50,
            rate_limit_per_sec: 100,
            drain_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertPipelineSettings {
    pub concurrency: usize,
    /// Alerts per second, across the process.
    pub rate_limit_per_sec: u32,
}

impl Default for AlertPipelineSettings {
    fn default() -> Self {
        Self {
            concurrency: 10,
            rate_limit_per_sec: 50,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeSettings {
    /// Per-attempt timeout in seconds.
    pub attempt_timeout_secs: u64,
    /// Threshold applied to targets created without one.
    pub default_response_threshold_ms: i64,
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            attempt_timeout_secs: 8,
            default_response_threshold_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub from_email: String,
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: 587,
            username: None,
            password: None,
            from_email: "alerts@localhost".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionSettings {
    /// Days of observations kept by the selective tier.
    pub check_data_retention_days: i64,
    /// Days of job logs kept by the selective tier.
    pub log_retention_days: i64,
    /// Store size above which the aggressive tier is chosen, in bytes.
    pub aggressive_above_bytes: i64,
    /// Store size above which the emergency tier is chosen, in bytes.
    pub emergency_above_bytes: i64,
    /// Observation count above which the aggressive tier is chosen.
    pub aggressive_above_observations: i64,
}

impl Default for RetentionSettings {
    fn default() -> Self {
        Self {
            check_data_retention_days: 1,
            log_retention_days: 2,
            aggressive_above_bytes: 500 * 1024 * 1024,
            emergency_above_bytes: 1024 * 1024 * 1024,
            aggressive_above_observations: 100_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// trace, debug, info, warn, or error.
    pub level: String,
    /// json or pretty.
    pub format: String,
    /// When set, logs also roll daily into this directory.
    pub log_dir: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "pretty".into(),
            log_dir: None,
        }
    }
}
