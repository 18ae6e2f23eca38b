//! Record sources and result sinks. CSV implementations for the CLI.

use anyhow::{Context, Result, bail};
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::Path;
use std::sync::Arc;

/// Ordered input records. `Ok(None)` means the source is exhausted.
pub trait RecordSource: Send {
    fn headers(&self) -> &Arc<[String]>;
    fn read(&mut self) -> Result<Option<Vec<String>>>;
}

/// Destination for result rows. Called from a single writer thread.
pub trait ResultSink: Send {
    fn write(&mut self, fields: &[String]) -> Result<()>;
    fn flush(&mut self) -> Result<()>;
}

/// CSV file (or any reader) with a header row.
pub struct CsvSource<R: Read> {
    reader: csv::Reader<R>,
    headers: Arc<[String]>,
    record: csv::StringRecord,
}

impl CsvSource<File> {
    pub fn open(path: &Path) -> Result<Self> {
        let file =
            File::open(path).with_context(|| format!("open data file {}", path.display()))?;
        Self::from_reader(file).with_context(|| format!("read headers of {}", path.display()))
    }
}

impl<R: Read> CsvSource<R> {
    pub fn from_reader(r: R) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new().flexible(false).from_reader(r);
        let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
        if headers.is_empty() {
            bail!("data has no header row");
        }
        Ok(Self {
            reader,
            headers: headers.into(),
            record: csv::StringRecord::new(),
        })
    }
}

impl<R: Read + Send> RecordSource for CsvSource<R> {
    fn headers(&self) -> &Arc<[String]> {
        &self.headers
    }

    fn read(&mut self) -> Result<Option<Vec<String>>> {
        if !self.reader.read_record(&mut self.record)? {
            return Ok(None);
        }
        Ok(Some(self.record.iter().map(str::to_string).collect()))
    }
}

/// CSV result log.
pub struct CsvSink<W: Write> {
    writer: csv::Writer<W>,
}

impl CsvSink<File> {
    /// Open `path` for appending. Writes `headers` first if the file is new or empty.
    pub fn append(path: &Path, headers: &[String]) -> Result<Self> {
        let empty = std::fs::metadata(path).map(|m| m.len() == 0).unwrap_or(true);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("open log file {}", path.display()))?;
        let mut sink = Self::from_writer(file);
        if empty {
            sink.write(headers)?;
            sink.flush()?;
        }
        Ok(sink)
    }
}

impl<W: Write> CsvSink<W> {
    pub fn from_writer(w: W) -> Self {
        Self {
            writer: csv::WriterBuilder::new().from_writer(w),
        }
    }
}

impl<W: Write + Send> ResultSink for CsvSink<W> {
    fn write(&mut self, fields: &[String]) -> Result<()> {
        self.writer.write_record(fields).context("write log record")
    }

    fn flush(&mut self) -> Result<()> {
        self.writer.flush().context("flush log")
    }
}

/// Sink that drops everything; used when no log file is configured.
pub struct NullSink;

impl ResultSink for NullSink {
    fn write(&mut self, _fields: &[String]) -> Result<()> {
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}
