//! SQLite database handle: pool, migrations, health ping.

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

use crate::adapters::sqlite::migrations::{MigrationError, Migrator};
use crate::domain::models::DatabaseConfig;

/// Storage operations wait at most this long for a pooled connection.
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(10);
const BUSY_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("invalid storage DSN {dsn}: {reason}")]
    InvalidDsn { dsn: String, reason: String },
    #[error("failed to prepare database directory {}: {source}", path.display())]
    Bootstrap {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to open connection pool: {0}")]
    Open(#[source] sqlx::Error),
    #[error("storage ping failed: {0}")]
    Ping(#[source] sqlx::Error),
}

/// Owned database handle. All repositories clone the underlying pool.
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open a WAL-mode pool against the configured DSN, creating the
    /// database file and its parent directories when missing.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, DatabaseError> {
        if let Some(parent) = backing_file(&config.url).as_deref().and_then(Path::parent) {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|source| DatabaseError::Bootstrap {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }

        let connect_options = SqliteConnectOptions::from_str(&config.url)
            .map_err(|e| DatabaseError::InvalidDsn {
                dsn: config.url.clone(),
                reason: e.to_string(),
            })?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true)
            .busy_timeout(BUSY_TIMEOUT);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(1)
            .acquire_timeout(ACQUIRE_TIMEOUT)
            .connect_with(connect_options)
            .await
            .map_err(DatabaseError::Open)?;

        Ok(Self { pool })
    }

    /// Apply pending embedded migrations. Returns how many ran.
    pub async fn migrate(&self) -> Result<usize, MigrationError> {
        Migrator::new(self.pool.clone()).run().await
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(self) {
        self.pool.close().await;
    }
}

/// The on-disk file behind a `sqlite:` DSN, when there is one.
/// In-memory databases have no backing file and need no bootstrap.
fn backing_file(dsn: &str) -> Option<PathBuf> {
    let path = ["sqlite://", "sqlite:"]
        .iter()
        .find_map(|scheme| dsn.strip_prefix(scheme))
        .unwrap_or(dsn);
    let path = path.split('?').next().unwrap_or(path);

    if path.is_empty() || path == ":memory:" {
        return None;
    }
    Some(PathBuf::from(path))
}

/// In-memory pool for tests. Single connection so the database lives as
/// long as the pool.
pub async fn create_test_pool() -> Result<SqlitePool, DatabaseError> {
    let connect_options = SqliteConnectOptions::from_str("sqlite::memory:")
        .map_err(|e| DatabaseError::InvalidDsn {
            dsn: "sqlite::memory:".into(),
            reason: e.to_string(),
        })?
        .foreign_keys(true)
        .shared_cache(true);

    SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(connect_options)
        .await
        .map_err(DatabaseError::Open)
}

/// Liveness ping used by the storage watchdog.
pub async fn verify_connection(pool: &SqlitePool) -> Result<(), DatabaseError> {
    sqlx::query("SELECT 1")
        .fetch_one(pool)
        .await
        .map_err(DatabaseError::Ping)?;
    Ok(())
}
