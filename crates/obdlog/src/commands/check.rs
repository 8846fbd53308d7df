//! Check command - connection test and optional health monitoring

use std::time::Duration;

use anyhow::{Context, Result};
use obdlog_core::{catalog, CancelFlag, Reading};
use obdlog_link::ConnectionManager;

use crate::output::{OutputContext, PidRow};

/// Connect, list supported PIDs, read RPM once; with `watch`, keep the link
/// healthy until Ctrl+C
pub async fn check(
    link: &mut ConnectionManager,
    watch: bool,
    interval: Duration,
    cancel: &CancelFlag,
    ctx: &OutputContext,
) -> Result<()> {
    super::connect(link, ctx).await?;

    if let Some(identity) = link.identity() {
        ctx.info(&format!(
            "Protocol: {} on {}",
            identity.name, identity.port
        ));
    }

    let supported = link.supported_commands();
    ctx.info(&format!("Supported PIDs: {}", supported.len()));
    let rows: Vec<PidRow> = supported
        .iter()
        .map(|command| PidRow {
            command: command.code(),
            name: command.name.clone(),
            description: command.description.clone(),
            value: String::new(),
            unit: catalog::unit_for(command).unwrap_or_default().to_string(),
        })
        .collect();
    ctx.print(&rows);

    if let Some(rpm) = catalog::lookup("RPM") {
        match link.read(&rpm.command).await {
            Reading::Value { value, unit } => ctx.success(&format!(
                "RPM: {} {}",
                value,
                unit.unwrap_or_default()
            )),
            Reading::Absent(reason) => ctx.warn(&format!("RPM read failed: {}", reason)),
        }
    }

    if watch {
        ctx.info(&format!(
            "Checking connection every {}s (Ctrl+C to stop)",
            interval.as_secs_f64()
        ));
        link.maintain(interval, cancel)
            .await
            .context("Connection could not be maintained")?;
        ctx.info("Monitoring stopped");
    }
    Ok(())
}
