//! Scenario output sinks

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Tabular output for one scenario
pub trait SampleSink: Send {
    fn write_header(&mut self, columns: &[String]) -> io::Result<()>;

    fn write_row(&mut self, values: &[String]) -> io::Result<()>;

    fn flush(&mut self) -> io::Result<()>;

    /// Flush and release the output. Further writes fail.
    fn close(&mut self) -> io::Result<()>;
}

/// Opens a sink per scenario
pub trait SinkFactory: Send + Sync {
    fn open(&self, scenario_id: &str) -> io::Result<Box<dyn SampleSink>>;
}

/// Writes `<dir>/<scenario>.csv`
#[derive(Debug, Clone)]
pub struct CsvSinkFactory {
    dir: PathBuf,
}

impl CsvSinkFactory {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, scenario_id: &str) -> PathBuf {
        self.dir.join(format!("{}.csv", scenario_id))
    }
}

impl SinkFactory for CsvSinkFactory {
    fn open(&self, scenario_id: &str) -> io::Result<Box<dyn SampleSink>> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path_for(scenario_id);
        let file = File::create(&path)?;
        tracing::info!(path = %path.display(), "Created CSV file");
        Ok(Box::new(CsvSink {
            writer: Some(BufWriter::new(file)),
        }))
    }
}

struct CsvSink {
    writer: Option<BufWriter<File>>,
}

impl CsvSink {
    fn writer(&mut self) -> io::Result<&mut BufWriter<File>> {
        self.writer
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "sink is closed"))
    }

    fn write_record(&mut self, fields: &[String]) -> io::Result<()> {
        let line = fields
            .iter()
            .map(|f| escape_field(f))
            .collect::<Vec<_>>()
            .join(",");
        let writer = self.writer()?;
        writer.write_all(line.as_bytes())?;
        writer.write_all(b"\r\n")
    }
}

impl SampleSink for CsvSink {
    fn write_header(&mut self, columns: &[String]) -> io::Result<()> {
        self.write_record(columns)
    }

    fn write_row(&mut self, values: &[String]) -> io::Result<()> {
        self.write_record(values)?;
        // A failed scenario must leave every written row on disk
        self.writer()?.flush()
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer()?.flush()
    }

    fn close(&mut self) -> io::Result<()> {
        match self.writer.take() {
            Some(mut writer) => writer.flush(),
            None => Ok(()),
        }
    }
}

/// Quote a field when it contains a delimiter, quote or line break
fn escape_field(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_field() {
        assert_eq!(escape_field("850"), "850");
        assert_eq!(escape_field(""), "");
        assert_eq!(escape_field("MIL off, 0 DTC"), "\"MIL off, 0 DTC\"");
        assert_eq!(escape_field("say \"hi\""), "\"say \"\"hi\"\"\"");
    }

    #[test]
    fn test_csv_sink_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let factory = CsvSinkFactory::new(dir.path().join("session"));

        let mut sink = factory.open("idle").unwrap();
        sink.write_header(&["timestamp".into(), "elapsed_time".into(), "RPM".into()])
            .unwrap();
        sink.write_row(&["t0".into(), "0.000".into(), "850".into()])
            .unwrap();
        sink.write_row(&["t1".into(), "1.000".into(), "".into()])
            .unwrap();
        sink.close().unwrap();
        sink.close().unwrap();

        let text = fs::read_to_string(factory.path_for("idle")).unwrap();
        assert_eq!(
            text,
            "timestamp,elapsed_time,RPM\r\nt0,0.000,850\r\nt1,1.000,\r\n"
        );
        assert!(sink.write_row(&["late".into()]).is_err());
    }
}
