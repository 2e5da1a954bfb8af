//! Domain ports (interfaces) for the Vigil monitoring core.

pub mod alert_sink;
pub mod job_log_repository;
pub mod observation_repository;
pub mod prober;
pub mod publisher;
pub mod queue;
pub mod retention_store;
pub mod target_repository;

pub use alert_sink::{EmailMessage, EmailSink, WebhookPayload, WebhookServer, WebhookSink};
pub use job_log_repository::JobLogRepository;
pub use observation_repository::ObservationRepository;
pub use prober::Prober;
pub use publisher::{StatusUpdate, UpdatePublisher};
pub use queue::{EnqueueOptions, EnqueueOutcome, JobQueue, NackOutcome, QueueSweepStats};
pub use retention_store::{RetentionStore, StoreStats};
pub use target_repository::{ProbePatch, TargetFilter, TargetRepository};
