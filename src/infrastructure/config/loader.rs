//! Configuration loading with hierarchical merging.

use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use thiserror::Error;

use crate::domain::models::Config;

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid worker concurrency: {0}. Must be between 1 and 500")]
    InvalidConcurrency(usize),

    #[error("Invalid rate limit: {0}. Must be positive")]
    InvalidRateLimit(u32),

    #[error("Invalid timezone: {0}. Must be an IANA timezone name")]
    InvalidTimezone(String),

    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),

    #[error("Database URL cannot be empty")]
    EmptyDatabaseUrl,

    #[error("Invalid tick interval: {0}s. Must be at least 1")]
    InvalidTickInterval(u64),

    #[error("Invalid response threshold: {0}ms. Must be at least 100")]
    InvalidResponseThreshold(i64),

    #[error(
        "Invalid retention thresholds: aggressive ({0}) must be below emergency ({1})"
    )]
    InvalidRetentionThresholds(i64, i64),
}

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging.
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults (Serialized)
    /// 2. vigil.yaml (project config, optional)
    /// 3. Environment variables (`VIGIL_*` prefix)
    /// 4. Well-known deployment variables (`SMTP_HOST`, `TIMEZONE`, ...)
    pub fn load() -> Result<Config> {
        let mut config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file("vigil.yaml"))
            .merge(Env::prefixed("VIGIL_").split("__"))
            .extract()
            .context("Failed to extract configuration from figment")?;

        apply_deployment_env(&mut config);
        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file
    pub fn load_from_file(path: impl AsRef<std::path::Path>) -> Result<Config> {
        let mut config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path.as_ref()))
            .extract()
            .context(format!(
                "Failed to load config from {}",
                path.as_ref().display()
            ))?;

        apply_deployment_env(&mut config);
        Self::validate(&config)?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        if config.database.url.is_empty() {
            return Err(ConfigError::EmptyDatabaseUrl);
        }
        if config.worker.concurrency == 0 || config.worker.concurrency > 500 {
            return Err(ConfigError::InvalidConcurrency(config.worker.concurrency));
        }
        if config.worker.rate_limit_per_sec == 0 {
            return Err(ConfigError::InvalidRateLimit(config.worker.rate_limit_per_sec));
        }
        if config.alerts.rate_limit_per_sec == 0 {
            return Err(ConfigError::InvalidRateLimit(config.alerts.rate_limit_per_sec));
        }
        if config.scheduler.tick_interval_secs == 0 {
            return Err(ConfigError::InvalidTickInterval(
                config.scheduler.tick_interval_secs,
            ));
        }
        if config.probe.default_response_threshold_ms < 100 {
            return Err(ConfigError::InvalidResponseThreshold(
                config.probe.default_response_threshold_ms,
            ));
        }
        if config.retention.aggressive_above_bytes >= config.retention.emergency_above_bytes {
            return Err(ConfigError::InvalidRetentionThresholds(
                config.retention.aggressive_above_bytes,
                config.retention.emergency_above_bytes,
            ));
        }
        if config.scheduler.timezone.parse::<chrono_tz::Tz>().is_err() {
            return Err(ConfigError::InvalidTimezone(
                config.scheduler.timezone.clone(),
            ));
        }
        match config.logging.level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            other => return Err(ConfigError::InvalidLogLevel(other.to_string())),
        }
        match config.logging.format.as_str() {
            "json" | "pretty" => {}
            other => return Err(ConfigError::InvalidLogFormat(other.to_string())),
        }
        Ok(())
    }
}

/// Overlay the well-known deployment environment variables used by
/// operators, without the `VIGIL_` prefix.
fn apply_deployment_env(config: &mut Config) {
    if let Ok(url) = std::env::var("DATABASE_URL") {
        config.database.url = url;
    }
    if let Ok(tz) = std::env::var("TIMEZONE") {
        config.scheduler.timezone = tz;
    }
    if let Ok(host) = std::env::var("SMTP_HOST") {
        config.smtp.host = host;
    }
    if let Ok(port) = std::env::var("SMTP_PORT") {
        if let Ok(port) = port.parse() {
            config.smtp.port = port;
        }
    }
    if let Ok(user) = std::env::var("SMTP_USER") {
        config.smtp.username = Some(user);
    }
    if let Ok(password) = std::env::var("SMTP_PASSWORD") {
        config.smtp.password = Some(password);
    }
    if let Ok(from) = std::env::var("SMTP_FROM_EMAIL") {
        config.smtp.from_email = from;
    }
    if let Ok(value) = std::env::var("WORKER_CONCURRENCY") {
        if let Ok(value) = value.parse() {
            config.worker.concurrency = value;
        }
    }
    if let Ok(value) = std::env::var("WORKER_RATE_LIMIT_PER_SEC") {
        if let Ok(value) = value.parse() {
            config.worker.rate_limit_per_sec = value;
        }
    }
    if let Ok(value) = std::env::var("DEFAULT_CHECK_FREQUENCY") {
        if let Ok(value) = value.parse() {
            config.scheduler.default_check_frequency_minutes = value;
        }
    }
    if let Ok(value) = std::env::var("DEFAULT_RESPONSE_THRESHOLD") {
        if let Ok(value) = value.parse() {
            config.probe.default_response_threshold_ms = value;
        }
    }
    if let Ok(value) = std::env::var("CHECK_DATA_RETENTION_DAYS") {
        if let Ok(value) = value.parse() {
            config.retention.check_data_retention_days = value;
        }
    }
    if let Ok(value) = std::env::var("LOG_RETENTION_DAYS") {
        if let Ok(value) = value.parse() {
            config.retention.log_retention_days = value;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        let config = Config::default();
        ConfigLoader::validate(&config).unwrap();
        assert_eq!(config.worker.concurrency, 50);
        assert_eq!(config.worker.rate_limit_per_sec, 100);
        assert_eq!(config.scheduler.tick_interval_secs, 60);
        assert_eq!(config.scheduler.timezone, "UTC");
        assert_eq!(config.probe.default_response_threshold_ms, 1000);
    }

    #[test]
    fn bad_timezone_rejected() {
        let mut config = Config::default();
        config.scheduler.timezone = "Mars/Olympus_Mons".into();
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidTimezone(_))
        ));
    }

    #[test]
    fn zero_concurrency_rejected() {
        let mut config = Config::default();
        config.worker.concurrency = 0;
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidConcurrency(0))
        ));
    }

    #[test]
    fn low_threshold_rejected() {
        let mut config = Config::default();
        config.probe.default_response_threshold_ms = 50;
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidResponseThreshold(50))
        ));
    }
}
