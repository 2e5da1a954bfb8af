//! Service layer: the monitoring core's moving parts.

pub mod alert_pipeline;
pub mod manual_probe;
pub mod probe_engine;
pub mod probe_runner;
pub mod reliability;
pub mod retention;
pub mod scheduler;
pub mod target_catalog;
pub mod worker_pool;

pub use alert_pipeline::{AlertPipeline, AlertPipelineConfig, GateRefusal};
pub use manual_probe::{BatchProbeOutcome, ManualProbeService};
pub use probe_engine::{ProbeEngine, ProbeEngineConfig};
pub use probe_runner::{ProbeRunSummary, ProbeRunner};
pub use reliability::ReliabilityTracker;
pub use retention::{RetentionSweeper, RetentionSweeperConfig, RetentionTier, SweepReport};
pub use scheduler::{Scheduler, SchedulerConfig, TickOutcome, TickStats};
pub use target_catalog::TargetCatalog;
pub use worker_pool::{WorkerPool, WorkerPoolConfig};
