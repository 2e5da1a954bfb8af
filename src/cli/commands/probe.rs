//! `vigil probe`: probe one target immediately.

use anyhow::Result;
use uuid::Uuid;

use crate::application::Monitor;
use crate::domain::models::Config;

pub async fn handle_probe(config: &Config, target_id: Uuid, force: bool) -> Result<()> {
    let monitor = Monitor::build(config).await?;
    let summary = monitor.manual_probes().probe_one(target_id, force).await?;

    println!(
        "{}: {} -> {} ({} attempt(s))",
        summary.target_id, summary.old_status, summary.new_status, summary.attempts
    );
    if let Some(latency) = summary.outcome.latency_ms() {
        println!("latency: {latency}ms");
    }
    if let Some(error) = summary.outcome.error_text() {
        println!("detail: {error}");
    }
    Ok(())
}
