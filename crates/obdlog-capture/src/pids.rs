//! Monitored channel selection

use std::sync::Arc;

use obdlog_core::catalog::{self, PRIORITY_PIDS};
use obdlog_core::{EventSink, PidSpec, TelemetryEvent};
use obdlog_link::ConnectionManager;

/// Resolve the channels to monitor for a session.
///
/// With explicit names, each is looked up in the PID catalog and unknown
/// names are skipped. Without, the ECU's supported commands are filtered
/// down to the priority list, keeping the order the ECU reported them in.
pub fn configure_pids(
    link: &ConnectionManager,
    names: &[String],
    events: &Arc<dyn EventSink>,
) -> Vec<PidSpec> {
    let mut pids: Vec<PidSpec> = Vec::new();

    if names.is_empty() {
        for command in link.supported_commands() {
            if !PRIORITY_PIDS.contains(&command.name.as_str())
                || pids.iter().any(|p| p.name == command.name)
            {
                continue;
            }
            events.emit(TelemetryEvent::PidConfigured {
                name: command.name.clone(),
            });
            pids.push(catalog::pid_spec_for(&command));
        }
    } else {
        for name in names {
            match catalog::lookup(name) {
                Some(spec) if pids.iter().any(|p| p.name == spec.name) => {}
                Some(spec) => {
                    events.emit(TelemetryEvent::PidConfigured {
                        name: spec.name.clone(),
                    });
                    pids.push(spec);
                }
                None => events.emit(TelemetryEvent::PidUnknown { name: name.clone() }),
            }
        }
    }

    if pids.is_empty() {
        tracing::warn!("No PIDs configured for monitoring");
    } else {
        tracing::info!(count = pids.len(), "PIDs configured");
    }
    pids
}
