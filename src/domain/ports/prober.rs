//! Prober port.
//!
//! The worker pool and the manual probe service depend on this trait
//! rather than the concrete engine so tests can script outcomes.

use async_trait::async_trait;

use crate::domain::models::{ProbeResult, ReliabilityCell, Target};

#[async_trait]
pub trait Prober: Send + Sync {
    /// Perform one probe of `target`, in bounded time.
    ///
    /// `reliability` is the tracker's current view of the target and
    /// shapes the retry budget. Probe failures are data, not errors:
    /// the result is always produced.
    async fn probe(&self, target: &Target, reliability: &ReliabilityCell) -> ProbeResult;
}
