//! CLI definitions for the vigil binary.

pub mod commands;

use clap::{Parser, Subcommand};
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "vigil", version, about = "Uptime monitoring core")]
pub struct Cli {
    /// Path to a configuration file (defaults to vigil.yaml + env).
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the monitoring daemon: scheduler, workers, alerts, retention.
    Start,

    /// Apply pending database migrations and exit.
    Migrate,

    /// Register a new target.
    AddTarget {
        /// Display name.
        #[arg(long)]
        name: String,

        /// URL or host:port to monitor.
        #[arg(long)]
        address: String,

        /// website, api, tcp, or database.
        #[arg(long, default_value = "website")]
        kind: String,

        /// Owner id; generated when omitted.
        #[arg(long)]
        owner: Option<Uuid>,

        /// free, premium, or admin.
        #[arg(long, default_value = "premium")]
        plan: String,

        /// high, medium, or low.
        #[arg(long, default_value = "medium")]
        priority: String,

        /// Minutes between probes.
        #[arg(long)]
        frequency_minutes: Option<u32>,

        /// Alert recipient; repeatable.
        #[arg(long = "email")]
        emails: Vec<String>,
    },

    /// Probe one target immediately.
    Probe {
        /// Target id to probe.
        target_id: Uuid,

        /// Bypass the 30-second manual probe rate limit.
        #[arg(long)]
        force: bool,
    },

    /// Run one retention sweep immediately.
    Retention,
}
