//! Test utilities for obdlog-capture
//!
//! [`MemorySinkFactory`] stands in for the CSV sink and records everything
//! written, per scenario.

use std::collections::HashMap;
use std::io;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::sink::{SampleSink, SinkFactory};

/// What one scenario's sink received
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordedOutput {
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
    pub flushes: usize,
    pub closes: usize,
}

#[derive(Debug, Default)]
struct Faults {
    open: bool,
    header: bool,
    close: bool,
}

/// In-memory sink factory
#[derive(Debug, Clone, Default)]
pub struct MemorySinkFactory {
    outputs: Arc<Mutex<HashMap<String, RecordedOutput>>>,
    faults: Arc<Mutex<Faults>>,
}

impl MemorySinkFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `open` fail
    pub fn fail_open(&self) {
        self.faults.lock().open = true;
    }

    /// Make header writes fail
    pub fn fail_header(&self) {
        self.faults.lock().header = true;
    }

    /// Make `close` report an error (the sink still counts as closed)
    pub fn fail_close(&self) {
        self.faults.lock().close = true;
    }

    /// Output recorded for a scenario
    pub fn output(&self, scenario_id: &str) -> Option<RecordedOutput> {
        self.outputs.lock().get(scenario_id).cloned()
    }

    pub fn rows(&self, scenario_id: &str) -> Vec<Vec<String>> {
        self.output(scenario_id)
            .map(|o| o.rows)
            .unwrap_or_default()
    }

    pub fn closes(&self, scenario_id: &str) -> usize {
        self.output(scenario_id).map(|o| o.closes).unwrap_or(0)
    }
}

impl SinkFactory for MemorySinkFactory {
    fn open(&self, scenario_id: &str) -> io::Result<Box<dyn SampleSink>> {
        if self.faults.lock().open {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "read-only file system",
            ));
        }
        self.outputs
            .lock()
            .insert(scenario_id.to_string(), RecordedOutput::default());
        Ok(Box::new(MemorySink {
            scenario_id: scenario_id.to_string(),
            outputs: self.outputs.clone(),
            faults: self.faults.clone(),
            closed: false,
        }))
    }
}

struct MemorySink {
    scenario_id: String,
    outputs: Arc<Mutex<HashMap<String, RecordedOutput>>>,
    faults: Arc<Mutex<Faults>>,
    closed: bool,
}

impl MemorySink {
    fn with_output(&mut self, f: impl FnOnce(&mut RecordedOutput)) -> io::Result<()> {
        if self.closed {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "sink is closed"));
        }
        let mut outputs = self.outputs.lock();
        f(outputs.entry(self.scenario_id.clone()).or_default());
        Ok(())
    }
}

impl SampleSink for MemorySink {
    fn write_header(&mut self, columns: &[String]) -> io::Result<()> {
        if self.faults.lock().header {
            return Err(io::Error::new(io::ErrorKind::Other, "disk full"));
        }
        self.with_output(|o| o.header = columns.to_vec())
    }

    fn write_row(&mut self, values: &[String]) -> io::Result<()> {
        self.with_output(|o| o.rows.push(values.to_vec()))
    }

    fn flush(&mut self) -> io::Result<()> {
        self.with_output(|o| o.flushes += 1)
    }

    fn close(&mut self) -> io::Result<()> {
        // Count every call so tests can assert a single close
        let mut outputs = self.outputs.lock();
        outputs
            .entry(self.scenario_id.clone())
            .or_default()
            .closes += 1;
        self.closed = true;
        if self.faults.lock().close {
            return Err(io::Error::new(io::ErrorKind::Other, "device busy"));
        }
        Ok(())
    }
}
