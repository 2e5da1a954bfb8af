//! `vigil migrate`: apply pending schema migrations.

use anyhow::{Context, Result};

use crate::adapters::sqlite::Database;
use crate::domain::models::Config;

pub async fn handle_migrate(config: &Config) -> Result<()> {
    let db = Database::connect(&config.database)
        .await
        .context("Failed to open database")?;

    let applied = db.migrate().await.context("Failed to run migrations")?;

    if applied == 0 {
        println!("schema up to date");
    } else {
        println!("applied {applied} migration(s)");
    }
    Ok(())
}
