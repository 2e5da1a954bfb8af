//! SQLite schema migration management.

use sqlx::SqlitePool;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("Failed to execute migration {version}: {source}")]
    ExecutionError {
        version: i64,
        #[source]
        source: sqlx::Error,
    },
    #[error("Failed to get schema version: {0}")]
    VersionCheckError(#[source] sqlx::Error),
}

#[derive(Debug, Clone)]
pub struct Migration {
    pub version: i64,
    pub description: String,
    pub sql: String,
}

/// All embedded migrations, in order.
pub fn embedded_migrations() -> Vec<Migration> {
    vec![
        Migration {
            version: 1,
            description: "targets".into(),
            sql: r"
                CREATE TABLE IF NOT EXISTS targets (
                    id TEXT PRIMARY KEY,
                    name TEXT NOT NULL,
                    address TEXT NOT NULL,
                    kind TEXT NOT NULL,
                    owner_id TEXT NOT NULL,
                    owner_plan TEXT NOT NULL,
                    owner_role TEXT NOT NULL,
                    priority TEXT NOT NULL,
                    monitoring TEXT NOT NULL,
                    contact_emails TEXT NOT NULL,
                    contact_phones TEXT NOT NULL,
                    status TEXT NOT NULL,
                    last_checked TEXT,
                    last_status_change TEXT,
                    last_response_time_ms INTEGER,
                    last_error TEXT,
                    created_at TEXT NOT NULL
                );
                CREATE UNIQUE INDEX IF NOT EXISTS idx_targets_owner_address
                    ON targets(owner_id, address);
                CREATE INDEX IF NOT EXISTS idx_targets_owner ON targets(owner_id);
                CREATE INDEX IF NOT EXISTS idx_targets_status ON targets(status);
                CREATE INDEX IF NOT EXISTS idx_targets_last_checked ON targets(last_checked);
                CREATE INDEX IF NOT EXISTS idx_targets_status_checked
                    ON targets(status, last_checked);
            "
            .into(),
        },
        Migration {
            version: 2,
            description: "observations".into(),
            sql: r"
                CREATE TABLE IF NOT EXISTS observations (
                    id TEXT PRIMARY KEY,
                    target_id TEXT NOT NULL,
                    status TEXT NOT NULL,
                    response_time_ms INTEGER,
                    error TEXT,
                    timestamp TEXT NOT NULL,
                    check_type TEXT NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_observations_target_ts
                    ON observations(target_id, timestamp DESC);
                CREATE INDEX IF NOT EXISTS idx_observations_ts ON observations(timestamp);
            "
            .into(),
        },
        Migration {
            version: 3,
            description: "job log".into(),
            sql: r"
                CREATE TABLE IF NOT EXISTS job_log (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT NOT NULL,
                    started_at TEXT NOT NULL,
                    completed_at TEXT,
                    status TEXT NOT NULL,
                    result TEXT,
                    error TEXT
                );
                CREATE INDEX IF NOT EXISTS idx_job_log_name_started
                    ON job_log(name, started_at DESC);
                CREATE INDEX IF NOT EXISTS idx_job_log_status ON job_log(status);
            "
            .into(),
        },
        Migration {
            version: 4,
            description: "queue jobs".into(),
            sql: r"
                CREATE TABLE IF NOT EXISTS queue_jobs (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    topic TEXT NOT NULL,
                    payload TEXT NOT NULL,
                    dedup_key TEXT,
                    priority INTEGER NOT NULL DEFAULT 5,
                    status TEXT NOT NULL DEFAULT 'pending',
                    attempts INTEGER NOT NULL DEFAULT 0,
                    max_attempts INTEGER NOT NULL DEFAULT 3,
                    backoff_base_ms INTEGER NOT NULL DEFAULT 1000,
                    run_at TEXT NOT NULL,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL,
                    completed_at TEXT,
                    last_error TEXT
                );
                CREATE UNIQUE INDEX IF NOT EXISTS idx_queue_jobs_dedup
                    ON queue_jobs(topic, dedup_key) WHERE dedup_key IS NOT NULL;
                CREATE INDEX IF NOT EXISTS idx_queue_jobs_claim
                    ON queue_jobs(topic, status, run_at, priority);
            "
            .into(),
        },
    ]
}

pub struct Migrator {
    pool: SqlitePool,
}

impl Migrator {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Apply every embedded migration newer than the current schema
    /// version. Returns how many were applied.
    pub async fn run(&self) -> Result<usize, MigrationError> {
        self.run_migrations(embedded_migrations()).await
    }

    pub async fn run_migrations(
        &self,
        migrations: Vec<Migration>,
    ) -> Result<usize, MigrationError> {
        self.ensure_migrations_table().await?;
        let current_version = self.get_current_version().await?;
        let pending: Vec<_> = migrations
            .into_iter()
            .filter(|m| m.version > current_version)
            .collect();

        if pending.is_empty() {
            return Ok(0);
        }

        for migration in &pending {
            self.apply_migration(migration).await?;
        }

        Ok(pending.len())
    }

    async fn ensure_migrations_table(&self) -> Result<(), MigrationError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL DEFAULT (datetime('now')),
                description TEXT
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| MigrationError::ExecutionError {
            version: 0,
            source: e,
        })?;
        Ok(())
    }

    pub async fn get_current_version(&self) -> Result<i64, MigrationError> {
        let result: Option<(i64,)> =
            sqlx::query_as("SELECT COALESCE(MAX(version), 0) FROM schema_migrations")
                .fetch_optional(&self.pool)
                .await
                .map_err(MigrationError::VersionCheckError)?;
        Ok(result.map(|(v,)| v).unwrap_or(0))
    }

    async fn apply_migration(&self, migration: &Migration) -> Result<(), MigrationError> {
        sqlx::raw_sql(&migration.sql)
            .execute(&self.pool)
            .await
            .map_err(|e| MigrationError::ExecutionError {
                version: migration.version,
                source: e,
            })?;

        sqlx::query("INSERT OR IGNORE INTO schema_migrations (version, description) VALUES (?, ?)")
            .bind(migration.version)
            .bind(&migration.description)
            .execute(&self.pool)
            .await
            .map_err(|e| MigrationError::ExecutionError {
                version: migration.version,
                source: e,
            })?;

        Ok(())
    }
}
