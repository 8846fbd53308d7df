//! Command implementations for obdlog

pub mod capture;
pub mod check;
pub mod discover;

pub use capture::capture;
pub use check::check;
pub use discover::discover;

use anyhow::Result;
use obdlog_link::ConnectionManager;

use crate::output::OutputContext;

/// Connect, explaining the usual causes when it fails
pub async fn connect(link: &mut ConnectionManager, ctx: &OutputContext) -> Result<()> {
    ctx.info("Initializing ECU connection...");
    if let Err(e) = link.connect().await {
        ctx.error("Failed to connect to ECU");
        ctx.info("\nPlease ensure:");
        ctx.info("  1. Bluetooth adapter is paired and connected");
        ctx.info("  2. Vehicle ignition is ON");
        ctx.info("  3. ELM327 adapter is functioning");
        return Err(e.into());
    }
    ctx.success("ECU connected");
    Ok(())
}
