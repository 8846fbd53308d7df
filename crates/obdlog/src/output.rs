//! Output formatting for obdlog (table or json)

use clap::ValueEnum;
use colored::Colorize;
use serde::Serialize;
use tabled::{Table, Tabled};

/// Output format options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// ASCII table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
}

/// Context for output rendering
pub struct OutputContext {
    pub format: OutputFormat,
    pub quiet: bool,
}

impl OutputContext {
    pub fn new(format: OutputFormat, no_color: bool, quiet: bool) -> Self {
        if no_color {
            colored::control::set_override(false);
        }
        Self { format, quiet }
    }

    /// Print a success message (unless in quiet mode)
    pub fn success(&self, msg: &str) {
        if !self.quiet {
            println!("{} {}", "✓".green(), msg);
        }
    }

    /// Print an info message (unless in quiet mode)
    pub fn info(&self, msg: &str) {
        if !self.quiet {
            println!("{}", msg);
        }
    }

    /// Print a section heading (unless in quiet mode)
    pub fn heading(&self, title: &str) {
        if !self.quiet {
            let rule = "=".repeat(60);
            println!("{}\n{}\n{}", rule, title.bold(), rule);
        }
    }

    pub fn warn(&self, msg: &str) {
        eprintln!("{}", msg.yellow());
    }

    pub fn error(&self, msg: &str) {
        eprintln!("{} {}", "✗".red(), msg.red());
    }

    /// Print rows in the configured format
    pub fn print<T: Tabled + Serialize>(&self, data: &[T]) {
        match self.format {
            OutputFormat::Table => {
                if data.is_empty() {
                    if !self.quiet {
                        println!("No data");
                    }
                } else {
                    println!("{}", Table::new(data));
                }
            }
            OutputFormat::Json => match serde_json::to_string_pretty(data) {
                Ok(json) => println!("{}", json),
                Err(e) => self.error(&format!("Failed to serialize output: {}", e)),
            },
        }
    }
}

/// A supported or discovered PID
#[derive(Debug, Tabled, Serialize)]
pub struct PidRow {
    #[tabled(rename = "Command")]
    pub command: String,
    #[tabled(rename = "Name")]
    pub name: String,
    #[tabled(rename = "Description")]
    pub description: String,
    #[tabled(rename = "Value")]
    pub value: String,
    #[tabled(rename = "Unit")]
    pub unit: String,
}

/// A manufacturer-space identifier that answered
#[derive(Debug, Tabled, Serialize)]
pub struct CustomPidRow {
    #[tabled(rename = "Mode")]
    pub mode: String,
    #[tabled(rename = "PID")]
    pub pid: String,
    #[tabled(rename = "Response")]
    pub response: String,
}
