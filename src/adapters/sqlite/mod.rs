//! SQLite adapters implementing the domain storage ports.

pub mod connection;
pub mod job_log_repository;
pub mod migrations;
pub mod observation_repository;
pub mod queue;
pub mod retention_store;
pub mod target_repository;

pub use connection::{create_test_pool, verify_connection, Database, DatabaseError};
pub use job_log_repository::SqliteJobLogRepository;
pub use migrations::{embedded_migrations, Migration, MigrationError, Migrator};
pub use observation_repository::SqliteObservationRepository;
pub use queue::SqliteJobQueue;
pub use retention_store::SqliteRetentionStore;
pub use target_repository::SqliteTargetRepository;
