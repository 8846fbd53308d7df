//! Catalog of standard mode 01 PIDs
//!
//! Used to resolve PID names from configuration and to give units to
//! commands the transport advertises.

use crate::models::{CommandSpec, PidSpec, MODE_CURRENT_DATA};

struct CatalogEntry {
    name: &'static str,
    pid: u8,
    description: &'static str,
    unit: Option<&'static str>,
}

const fn entry(
    name: &'static str,
    pid: u8,
    description: &'static str,
    unit: Option<&'static str>,
) -> CatalogEntry {
    CatalogEntry {
        name,
        pid,
        description,
        unit,
    }
}

const CATALOG: &[CatalogEntry] = &[
    entry("STATUS", 0x01, "Status since DTCs cleared", None),
    entry("FUEL_STATUS", 0x03, "Fuel System Status", None),
    entry("ENGINE_LOAD", 0x04, "Calculated Engine Load", Some("percent")),
    entry("COOLANT_TEMP", 0x05, "Engine Coolant Temperature", Some("degC")),
    entry("FUEL_PRESSURE", 0x0A, "Fuel Pressure", Some("kilopascal")),
    entry("INTAKE_PRESSURE", 0x0B, "Intake Manifold Pressure", Some("kilopascal")),
    entry("RPM", 0x0C, "Engine RPM", Some("revolutions_per_minute")),
    entry("SPEED", 0x0D, "Vehicle Speed", Some("kph")),
    entry("TIMING_ADVANCE", 0x0E, "Timing Advance", Some("degree")),
    entry("INTAKE_TEMP", 0x0F, "Intake Air Temp", Some("degC")),
    entry("MAF", 0x10, "Air Flow Rate (MAF)", Some("grams_per_second")),
    entry("THROTTLE_POS", 0x11, "Throttle Position", Some("percent")),
    entry("RUN_TIME", 0x1F, "Engine Run Time", Some("second")),
    entry("FUEL_LEVEL", 0x2F, "Fuel Level Input", Some("percent")),
    entry("BAROMETRIC_PRESSURE", 0x33, "Barometric Pressure", Some("kilopascal")),
    entry("CONTROL_MODULE_VOLTAGE", 0x42, "Control module voltage", Some("volt")),
    entry("ABSOLUTE_LOAD", 0x43, "Absolute load value", Some("percent")),
    entry("AMBIANT_AIR_TEMP", 0x46, "Ambient air temperature", Some("degC")),
    entry("THROTTLE_ACTUATOR", 0x4C, "Commanded throttle actuator", Some("percent")),
    entry("OIL_TEMP", 0x5C, "Engine oil temperature", Some("degC")),
    entry("FUEL_RATE", 0x5E, "Engine fuel rate", Some("liters_per_hour")),
];

/// PIDs monitored when none are configured, if the ECU supports them
pub const PRIORITY_PIDS: &[&str] = &[
    "RPM",
    "SPEED",
    "THROTTLE_POS",
    "ENGINE_LOAD",
    "COOLANT_TEMP",
    "INTAKE_TEMP",
    "MAF",
    "FUEL_LEVEL",
    "FUEL_PRESSURE",
    "TIMING_ADVANCE",
    "INTAKE_PRESSURE",
    "FUEL_RATE",
    "ABSOLUTE_LOAD",
    "THROTTLE_ACTUATOR",
    "CONTROL_MODULE_VOLTAGE",
    "AMBIANT_AIR_TEMP",
];

impl CatalogEntry {
    fn command(&self) -> CommandSpec {
        CommandSpec::new(self.name, MODE_CURRENT_DATA, self.pid, self.description)
    }
}

/// Resolve a PID by name (case-insensitive)
pub fn lookup(name: &str) -> Option<PidSpec> {
    CATALOG
        .iter()
        .find(|e| e.name.eq_ignore_ascii_case(name))
        .map(|e| PidSpec::new(e.command(), e.unit))
}

/// Every cataloged command, in PID order
pub fn commands() -> Vec<CommandSpec> {
    CATALOG.iter().map(CatalogEntry::command).collect()
}

/// Unit for a command, if the catalog knows it
pub fn unit_for(command: &CommandSpec) -> Option<&'static str> {
    CATALOG
        .iter()
        .find(|e| command.mode == MODE_CURRENT_DATA && e.pid == command.pid)
        .and_then(|e| e.unit)
}

/// Build a monitored-channel spec for a command the transport advertised
pub fn pid_spec_for(command: &CommandSpec) -> PidSpec {
    PidSpec::new(command.clone(), unit_for(command))
}
