//! obdlog - ECU telemetry capture and PID discovery
//!
//! Connects to an ECU through an OBD adapter, captures timed scenarios to CSV,
//! and probes which PIDs and manufacturer modes the ECU answers.
//!
//! Usage:
//!   obdlog check [--watch]              Test the connection
//!   obdlog capture [--pids RPM,SPEED]   Run a capture session
//!   obdlog discover [--full]            Sweep PIDs and save the results

mod commands;
mod config;
mod output;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use obdlog_core::{CancelFlag, EventSink, TracingEvents};
use obdlog_discovery::{DiscoveryStore, IdRange};
use obdlog_link::ConnectionManager;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::AppConfig;
use crate::output::{OutputContext, OutputFormat};

const DEFAULT_FILTER: &str =
    "obdlog=info,obdlog_core=info,obdlog_link=info,obdlog_capture=info,obdlog_discovery=info";
const VERBOSE_FILTER: &str =
    "obdlog=debug,obdlog_core=debug,obdlog_link=debug,obdlog_capture=debug,obdlog_discovery=debug";

#[derive(Parser)]
#[command(name = "obdlog")]
#[command(author, version, about = "ECU telemetry capture and PID discovery")]
#[command(propagate_version = true)]
struct Cli {
    /// Configuration file path (default: ./obdlog.toml if present)
    #[arg(short, long, env = "OBDLOG_CONFIG")]
    config: Option<PathBuf>,

    /// Serial port of the OBD adapter (auto-detect when omitted)
    #[arg(short, long, env = "OBDLOG_PORT")]
    port: Option<String>,

    /// Output directory for sessions and discovery results
    #[arg(long, env = "OBDLOG_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "table")]
    output: OutputFormat,

    /// Disable colored output
    #[arg(long)]
    no_color: bool,

    /// Minimal output (for scripting)
    #[arg(short, long)]
    quiet: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Test the ECU connection
    Check {
        /// Keep checking and reconnect when the link drops
        #[arg(long)]
        watch: bool,

        /// Seconds between checks with --watch
        #[arg(long, default_value = "10")]
        interval: u64,
    },

    /// Capture telemetry across timed scenarios
    Capture {
        /// PIDs to monitor (auto-detect when omitted)
        #[arg(long, value_delimiter = ',')]
        pids: Vec<String>,

        /// Sampling rate in Hz
        #[arg(long)]
        rate: Option<f64>,

        /// Scenario(s) to run, in plan order (all when omitted)
        #[arg(long = "scenario")]
        scenarios: Vec<String>,

        /// Do not prompt between scenarios; continue past failures
        #[arg(short, long)]
        yes: bool,
    },

    /// Detect the protocol and sweep for responding PIDs
    Discover {
        /// Also probe manufacturer-specific modes (slower)
        #[arg(long)]
        full: bool,

        /// Manufacturer mode(s) to probe, in hex (implies --full)
        #[arg(long = "mode", value_parser = parse_hex_byte)]
        modes: Vec<u8>,

        /// Identifier range per mode, e.g. "00-FF" (implies --full)
        #[arg(long, value_parser = parse_id_range)]
        range: Option<IdRange>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            if cli.verbose {
                VERBOSE_FILTER.into()
            } else {
                DEFAULT_FILTER.into()
            }
        }))
        .with(fmt::layer().with_target(false))
        .init();

    // Load config file
    let mut config = match &cli.config {
        Some(path) => AppConfig::load_from(path)?,
        None => AppConfig::load()?,
    };
    if let Some(port) = &cli.port {
        config.link.port = Some(port.clone());
    }
    if let Some(data_dir) = &cli.data_dir {
        config.data_dir = data_dir.clone();
    }
    apply_command_overrides(&mut config, &cli.command);
    config.validate()?;

    let ctx = OutputContext::new(cli.output, cli.no_color, cli.quiet);

    // First Ctrl+C stops cooperatively, a second one exits at once
    let cancel = CancelFlag::new();
    let flag = cancel.clone();
    ctrlc::set_handler(move || {
        if flag.is_cancelled() {
            std::process::exit(130);
        }
        tracing::warn!("Emergency stop requested");
        flag.cancel();
    })
    .context("Failed to install Ctrl+C handler")?;

    let events: Arc<dyn EventSink> = Arc::new(TracingEvents);
    let connector = obdlog_link::create_connector(&config.link.transport);
    let mut link = ConnectionManager::new(connector, config.link.clone(), events.clone());

    let result = match &cli.command {
        Commands::Check { watch, interval } => {
            commands::check(
                &mut link,
                *watch,
                Duration::from_secs(*interval),
                &cancel,
                &ctx,
            )
            .await
        }

        Commands::Capture { scenarios, yes, .. } => {
            commands::capture(
                &mut link,
                &config,
                scenarios,
                *yes,
                events.clone(),
                &cancel,
                &ctx,
            )
            .await
        }

        Commands::Discover {
            full, modes, range, ..
        } => {
            let include_custom = *full || !modes.is_empty() || range.is_some();
            let store = DiscoveryStore::new(&config.data_dir);
            commands::discover(
                &mut link,
                &config.discovery,
                &store,
                include_custom,
                events.clone(),
                &cancel,
                &ctx,
            )
            .await
        }
    };

    // Always release the adapter
    ctx.info("Disconnecting from ECU...");
    link.disconnect().await;
    ctx.info("Done.");

    result
}

/// Fold command-line options into the loaded configuration
fn apply_command_overrides(config: &mut AppConfig, command: &Commands) {
    match command {
        Commands::Capture { pids, rate, .. } => {
            if !pids.is_empty() {
                config.capture.pids = pids.clone();
            }
            if let Some(rate) = rate {
                config.capture.sampling_rate_hz = *rate;
            }
        }
        Commands::Discover { modes, range, .. } => {
            if !modes.is_empty() {
                config.discovery.manufacturer_modes = modes.clone();
            }
            if let Some(range) = range {
                config.discovery.manufacturer_range = *range;
            }
        }
        Commands::Check { .. } => {}
    }
}

/// Parse a byte written in hex, with or without a `0x` prefix
fn parse_hex_byte(s: &str) -> Result<u8, String> {
    let digits = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s);
    u8::from_str_radix(digits, 16).map_err(|e| format!("invalid hex byte '{}': {}", s, e))
}

/// Parse `START-END` in hex
fn parse_id_range(s: &str) -> Result<IdRange, String> {
    let (start, end) = s
        .split_once('-')
        .ok_or_else(|| format!("expected START-END, got '{}'", s))?;
    let range = IdRange {
        start: parse_hex_byte(start.trim())?,
        end: parse_hex_byte(end.trim())?,
    };
    if range.start > range.end {
        return Err(format!("range start is past its end in '{}'", s));
    }
    Ok(range)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_hex_byte() {
        assert_eq!(parse_hex_byte("22"), Ok(0x22));
        assert_eq!(parse_hex_byte("0x2F"), Ok(0x2F));
        assert!(parse_hex_byte("100").is_err());
        assert!(parse_hex_byte("zz").is_err());
    }

    #[test]
    fn test_parse_id_range() {
        assert_eq!(
            parse_id_range("00-FF"),
            Ok(IdRange {
                start: 0x00,
                end: 0xFF
            })
        );
        assert!(parse_id_range("10-0F").is_err());
        assert!(parse_id_range("10").is_err());
    }

    #[test]
    fn test_capture_overrides() {
        let cli = Cli::parse_from([
            "obdlog",
            "capture",
            "--pids",
            "RPM,SPEED",
            "--rate",
            "2.5",
            "--scenario",
            "idle",
        ]);
        let mut config = AppConfig::default();
        apply_command_overrides(&mut config, &cli.command);

        assert_eq!(config.capture.pids, vec!["RPM", "SPEED"]);
        assert_eq!(config.capture.sampling_rate_hz, 2.5);
        let Commands::Capture { scenarios, .. } = &cli.command else {
            panic!("expected capture");
        };
        assert_eq!(scenarios, &vec!["idle".to_string()]);
    }

    #[test]
    fn test_discover_overrides() {
        let cli = Cli::parse_from(["obdlog", "discover", "--mode", "22", "--range", "00-3F"]);
        let mut config = AppConfig::default();
        apply_command_overrides(&mut config, &cli.command);

        assert_eq!(config.discovery.manufacturer_modes, vec![0x22]);
        assert_eq!(config.discovery.manufacturer_range.as_range(), 0x00..=0x3F);
    }
}
