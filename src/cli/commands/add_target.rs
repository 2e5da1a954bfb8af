//! `vigil add-target`: register a target from the command line.

use anyhow::{bail, Result};
use uuid::Uuid;

use crate::application::Monitor;
use crate::domain::models::{
    Config, MonitoringConfig, NewTarget, OwnerPlan, OwnerRole, TargetKind, UserPriority,
};

#[allow(clippy::too_many_arguments)]
pub async fn handle_add_target(
    config: &Config,
    name: String,
    address: String,
    kind: String,
    owner: Option<Uuid>,
    plan: String,
    priority: String,
    frequency_minutes: Option<u32>,
    emails: Vec<String>,
) -> Result<()> {
    let Some(kind) = TargetKind::from_str(&kind) else {
        bail!("unknown kind {kind}: expected website, api, tcp, or database");
    };
    let Some(plan) = OwnerPlan::from_str(&plan) else {
        bail!("unknown plan {plan}: expected free, premium, or admin");
    };
    let Some(priority) = UserPriority::from_str(&priority) else {
        bail!("unknown priority {priority}: expected high, medium, or low");
    };

    let mut monitoring = MonitoringConfig {
        frequency_minutes: frequency_minutes
            .unwrap_or(config.scheduler.default_check_frequency_minutes),
        ..Default::default()
    };
    monitoring.alerts.response_threshold_ms = config.probe.default_response_threshold_ms;

    let monitor = Monitor::build(config).await?;
    let target = monitor
        .catalog()
        .register(NewTarget {
            name,
            address,
            kind,
            owner_id: owner.unwrap_or_else(Uuid::new_v4),
            owner_plan: plan,
            owner_role: OwnerRole::User,
            priority,
            monitoring,
            contact_emails: emails,
            contact_phones: vec![],
        })
        .await?;

    println!("registered {} ({})", target.id, target.address);
    if let Some(trial_ends) = target.monitoring.trial_ends_at {
        println!("trial ends {}", trial_ends.to_rfc3339());
    }
    Ok(())
}
