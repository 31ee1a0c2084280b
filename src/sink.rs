//! Append-only storage of raw samples.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use log::info;

use crate::errors::{DriverError, Result};

/// One stored sample event: UTC time and the raw value of every channel.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleRow {
    pub time_utc: f64,
    pub values: Vec<u32>,
}

/// Destination for sample rows.
pub trait SampleSink {
    /// Append one row and make it durable before returning.
    fn append(&mut self, row: &SampleRow) -> Result<()>;

    /// Flush and release the destination. Further appends fail.
    fn close(&mut self) -> Result<()>;
}

/// Seconds since the Unix epoch.
pub fn utc_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or_default()
}

/// CSV file sink with columns `time_utc,data_ch0,...`.
///
/// Opening an existing file with the same columns appends to it; a file with
/// different columns is refused.
pub struct CsvSink {
    path: PathBuf,
    channels: usize,
    writer: Option<BufWriter<File>>,
}

impl CsvSink {
    pub fn open(path: impl AsRef<Path>, channels: usize) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let header = Self::header(channels);

        let existing = match std::fs::metadata(&path) {
            Ok(meta) => meta.len() > 0,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
            Err(e) => return Err(e.into()),
        };

        if existing {
            let mut first = String::new();
            BufReader::new(File::open(&path)?).read_line(&mut first)?;
            if first.trim_end() != header {
                return Err(DriverError::Storage(format!(
                    "{} has columns `{}`, expected `{header}`",
                    path.display(),
                    first.trim_end()
                )));
            }
        }

        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let mut writer = BufWriter::new(file);
        if existing {
            info!("Appending to existing table in {}", path.display());
        } else {
            writeln!(writer, "{header}")?;
            writer.flush()?;
            info!("Created new table in {}", path.display());
        }

        Ok(Self {
            path,
            channels,
            writer: Some(writer),
        })
    }

    pub fn header(channels: usize) -> String {
        std::iter::once("time_utc".to_string())
            .chain((0..channels).map(|ch| format!("data_ch{ch}")))
            .collect::<Vec<_>>()
            .join(",")
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SampleSink for CsvSink {
    fn append(&mut self, row: &SampleRow) -> Result<()> {
        if row.values.len() != self.channels {
            return Err(DriverError::Storage(format!(
                "row has {} channels, table has {}",
                row.values.len(),
                self.channels
            )));
        }
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| DriverError::Storage("sink is closed".into()))?;

        write!(writer, "{:.6}", row.time_utc)?;
        for value in &row.values {
            write!(writer, ",{value}")?;
        }
        writeln!(writer)?;
        writer.flush()?;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush()?;
        }
        Ok(())
    }
}

/// Sink that keeps rows in memory, for dry runs and tests.
#[derive(Debug, Default)]
pub struct MemorySink {
    pub rows: Vec<SampleRow>,
    pub closed: bool,
}

impl SampleSink for MemorySink {
    fn append(&mut self, row: &SampleRow) -> Result<()> {
        if self.closed {
            return Err(DriverError::Storage("sink is closed".into()));
        }
        self.rows.push(row.clone());
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.closed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn row(t: f64, values: &[u32]) -> SampleRow {
        SampleRow {
            time_utc: t,
            values: values.to_vec(),
        }
    }

    #[test]
    fn creates_table_with_header() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("log.csv");

        let mut sink = CsvSink::open(&path, 2).unwrap();
        sink.append(&row(1.5, &[100, 200])).unwrap();
        sink.close().unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "time_utc,data_ch0,data_ch1\n1.500000,100,200\n");
    }

    #[test]
    fn rows_are_flushed_per_append() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("log.csv");

        let mut sink = CsvSink::open(&path, 4).unwrap();
        sink.append(&row(2.0, &[1, 2, 3, 4])).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.ends_with("2.000000,1,2,3,4\n"));
    }

    #[test]
    fn reopening_appends_to_same_shape() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("log.csv");

        let mut sink = CsvSink::open(&path, 2).unwrap();
        sink.append(&row(1.0, &[1, 2])).unwrap();
        sink.close().unwrap();

        let mut sink = CsvSink::open(&path, 2).unwrap();
        sink.append(&row(2.0, &[3, 4])).unwrap();
        sink.close().unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 3);
        assert_eq!(content.matches("time_utc").count(), 1);
    }

    #[test]
    fn refuses_table_of_other_shape() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("log.csv");
        CsvSink::open(&path, 2).unwrap().close().unwrap();

        let err = CsvSink::open(&path, 4).err().unwrap();
        assert!(matches!(err, DriverError::Storage(_)));
    }

    #[test]
    fn append_after_close_fails() {
        let dir = tempdir().unwrap();
        let mut sink = CsvSink::open(dir.path().join("log.csv"), 2).unwrap();
        sink.close().unwrap();
        assert!(sink.append(&row(1.0, &[1, 2])).is_err());
        assert!(sink.append(&row(1.0, &[1])).is_err());
    }

    #[test]
    fn header_lists_channels() {
        assert_eq!(CsvSink::header(1), "time_utc,data_ch0");
        assert_eq!(
            CsvSink::header(4),
            "time_utc,data_ch0,data_ch1,data_ch2,data_ch3"
        );
    }
}
