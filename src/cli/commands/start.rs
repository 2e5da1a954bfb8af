//! `vigil start`: run the monitoring daemon.

use anyhow::Result;

use crate::application::Monitor;
use crate::domain::models::Config;

pub async fn handle_start(config: &Config) -> Result<()> {
    let monitor = Monitor::build(config).await?;
    monitor.run_until_shutdown().await
}
