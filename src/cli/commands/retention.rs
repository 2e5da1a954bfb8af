//! `vigil retention`: run one retention sweep immediately.

use anyhow::Result;

use crate::application::Monitor;
use crate::domain::models::Config;

pub async fn handle_retention(config: &Config) -> Result<()> {
    let monitor = Monitor::build(config).await?;
    monitor.sweep_retention_now().await?;
    println!("retention sweep complete");
    Ok(())
}
