//! Vigil - uptime monitoring core
//!
//! Continuously probes a catalog of registered endpoints (HTTP(S) URLs
//! and raw TCP host:port pairs), records each observation, classifies
//! status transitions, and dispatches alerts:
//! - Tick-based scheduler with adaptive per-target intervals
//! - Persistent priority job queue (probes and alerts on separate topics)
//! - Parallel worker pool with per-target in-flight guarding
//! - Alert pipeline with flap suppression, email and webhook channels
//! - Size-tiered destructive retention

pub mod adapters;
pub mod application;
pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

pub use application::Monitor;
