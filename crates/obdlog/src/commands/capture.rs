//! Capture command - scenario-based data capture session

use std::io::{self, BufRead, Write};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use obdlog_capture::layout::render_summary;
use obdlog_capture::{
    configure_pids, AutoContinue, SamplingScheduler, SessionControl, SessionDecision,
    SessionLayout, SessionMetadata,
};
use obdlog_core::{CancelFlag, EventSink, Scenario, ScenarioPlan, Session};
use obdlog_link::ConnectionManager;

use crate::config::AppConfig;
use crate::output::OutputContext;

/// Run the selected scenarios and write the session to the data directory
pub async fn capture(
    link: &mut ConnectionManager,
    config: &AppConfig,
    scenario_ids: &[String],
    assume_yes: bool,
    events: Arc<dyn EventSink>,
    cancel: &CancelFlag,
    ctx: &OutputContext,
) -> Result<()> {
    super::connect(link, ctx).await?;

    let plans = config.capture.select_scenarios(scenario_ids)?;

    ctx.info("Detecting supported PIDs...");
    let pids = configure_pids(link, &config.capture.pids, &events);
    if pids.is_empty() {
        bail!("No PIDs available for monitoring");
    }
    ctx.success(&format!("Configured {} PIDs for monitoring", pids.len()));

    let mut session = Session::start();
    let layout = SessionLayout::new(&config.data_dir, &session);
    layout
        .create()
        .with_context(|| format!("Failed to create {}", layout.session_dir().display()))?;

    ctx.heading("DATA CAPTURE SESSION");
    ctx.info(&format!("Session ID: {}", session.id));
    ctx.info(&format!("Sampling rate: {} Hz", config.capture.sampling_rate_hz));
    ctx.info("\nScenarios:");
    for (i, plan) in plans.iter().enumerate() {
        ctx.info(&format!(
            "  {}. {}: {}",
            i + 1,
            plan.title(),
            clock(plan.duration_secs)
        ));
    }
    let total: f64 = plans.iter().map(|p| p.duration_secs).sum();
    ctx.info(&format!("\nTotal duration: ~{}", clock(total)));

    let mut control: Box<dyn SessionControl> = if assume_yes {
        Box::new(AutoContinue)
    } else {
        if !prompt("\nPress ENTER to begin data capture session (Ctrl+C to cancel)... ")?
            || cancel.is_cancelled()
        {
            ctx.warn("Cancelled by user");
            return Ok(());
        }
        Box::new(Prompter {
            cancel: cancel.clone(),
        })
    };

    let mut scheduler = SamplingScheduler::new(
        link,
        pids.clone(),
        config.capture.clone(),
        events,
        cancel.clone(),
    );
    let scenarios = scheduler
        .run_session(&plans, &layout.sinks(), &mut session, control.as_mut())
        .await;

    let identity = if link.is_connected() {
        link.identity()
    } else {
        None
    };
    let metadata = SessionMetadata::new(
        &session,
        config.capture.sampling_rate_hz,
        &pids,
        identity,
    );
    if let Err(e) = layout.write_metadata(&metadata) {
        ctx.error(&format!("Error saving metadata: {}", e));
    }

    ctx.info(&render_summary(&session, plans.len(), layout.session_dir()));
    if scenarios.iter().all(|s| s.outcome().is_some_and(|o| o.is_success()))
        && scenarios.len() == plans.len()
    {
        ctx.success("Data capture session complete!");
    }
    Ok(())
}

/// `m:ss` for a duration in seconds
fn clock(secs: f64) -> String {
    let secs = secs.max(0.0).round() as u64;
    format!("{}:{:02}", secs / 60, secs % 60)
}

/// Ask on stdin; false on end of input
fn prompt(question: &str) -> Result<bool> {
    tokio::task::block_in_place(|| -> Result<bool> {
        print!("{}", question);
        io::stdout().flush()?;
        let mut line = String::new();
        let read = io::stdin().lock().read_line(&mut line)?;
        Ok(read > 0)
    })
}

/// Yes/no question on stdin
fn ask_yes(question: &str) -> Result<bool> {
    tokio::task::block_in_place(|| -> Result<bool> {
        print!("{}", question);
        io::stdout().flush()?;
        let mut line = String::new();
        io::stdin().lock().read_line(&mut line)?;
        Ok(line.trim().eq_ignore_ascii_case("y"))
    })
}

/// Operator prompts between scenarios
struct Prompter {
    cancel: CancelFlag,
}

impl SessionControl for Prompter {
    fn before_scenario(&mut self, plan: &ScenarioPlan) -> SessionDecision {
        println!(
            "\nPrepare for {} scenario.",
            plan.id.replace('_', " ")
        );
        println!(
            "Duration: {} seconds ({})",
            plan.duration_secs,
            clock(plan.duration_secs)
        );
        match prompt("Press ENTER when ready to start (Ctrl+C for emergency stop)... ") {
            Ok(true) if !self.cancel.is_cancelled() => SessionDecision::Continue,
            _ => SessionDecision::Abort,
        }
    }

    fn after_failure(&mut self, scenario: &Scenario) -> SessionDecision {
        if self.cancel.is_cancelled() {
            return SessionDecision::Abort;
        }
        eprintln!("Failed to complete {}", scenario.id);
        match ask_yes("\nContinue with remaining scenarios? (y/n): ") {
            Ok(true) => SessionDecision::Continue,
            _ => SessionDecision::Abort,
        }
    }
}
