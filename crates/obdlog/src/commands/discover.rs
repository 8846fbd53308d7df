//! Discover command - protocol detection and PID sweeps

use std::sync::Arc;

use anyhow::{Context, Result};
use obdlog_core::{CancelFlag, EventSink};
use obdlog_discovery::{DiscoveryConfig, DiscoveryScanner, DiscoveryStore};
use obdlog_link::ConnectionManager;

use crate::output::{CustomPidRow, OutputContext, PidRow};

/// Run a discovery and save the results under `<data_dir>/protocol_discovery`
pub async fn discover(
    link: &mut ConnectionManager,
    config: &DiscoveryConfig,
    store: &DiscoveryStore,
    include_custom: bool,
    events: Arc<dyn EventSink>,
    cancel: &CancelFlag,
    ctx: &OutputContext,
) -> Result<()> {
    super::connect(link, ctx).await?;

    if include_custom {
        ctx.info(&format!(
            "Full scan: standard PIDs plus modes {} over 0x{:02X}-0x{:02X}",
            config
                .manufacturer_modes
                .iter()
                .map(|m| format!("{:02X}", m))
                .collect::<Vec<_>>()
                .join(", "),
            config.manufacturer_range.start,
            config.manufacturer_range.end
        ));
    } else {
        ctx.info("Quick scan: standard PIDs only");
    }

    let mut scanner = DiscoveryScanner::new(link, config.clone(), events, cancel.clone());
    let saved = scanner
        .run_full_discovery(include_custom, store)
        .await
        .context("Discovery failed")?;
    let record = scanner.into_record();

    ctx.heading("RESPONDING PIDs");
    let rows: Vec<PidRow> = record
        .standard_pids
        .values()
        .map(|pid| PidRow {
            command: pid.command.clone(),
            name: pid.name.clone(),
            description: pid.description.clone(),
            value: pid.value.clone(),
            unit: pid.unit.clone(),
        })
        .collect();
    ctx.print(&rows);

    if include_custom {
        let custom: Vec<CustomPidRow> = record
            .manufacturer_modes
            .iter()
            .flat_map(|(mode, hits)| {
                hits.values().map(move |hit| CustomPidRow {
                    mode: mode.clone(),
                    pid: hit.pid.clone(),
                    response: hit.raw_response.clone(),
                })
            })
            .collect();
        ctx.heading("MANUFACTURER MODES");
        ctx.print(&custom);
    }

    for sweep in record.sweeps.iter().filter(|s| !s.is_complete()) {
        ctx.warn(&format!(
            "Sweep '{}' stopped after {}/{} probes ({:.0}%): {}",
            sweep.sweep,
            sweep.probed,
            sweep.total,
            sweep.percent_complete(),
            sweep.interrupted.as_deref().unwrap_or("unknown reason")
        ));
    }

    ctx.success(&format!("Results saved to: {}", saved.results.display()));
    ctx.info(&format!("Summary: {}", saved.summary.display()));
    Ok(())
}
