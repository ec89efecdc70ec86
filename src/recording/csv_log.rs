//! Append-only CSV logs with daily rotation.
//!
//! Each record type writes to `{PREFIX}_{YYYYMMDD}.csv` in its log directory.
//! A header row is written whenever a new file is created.

use crate::recording::events::LogRecord;
use crate::Result;
use chrono::Utc;
use std::fs::{self, File, OpenOptions};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

/// Rotating writer for one record type
pub struct EventLog<T: LogRecord> {
    base_dir: PathBuf,
    current_file: Option<csv::Writer<File>>,
    current_date: String,
    _record: PhantomData<T>,
}

impl<T: LogRecord> EventLog<T> {
    pub fn new<P: AsRef<Path>>(base_dir: P) -> Result<Self> {
        let base_dir = base_dir.as_ref().to_path_buf();
        fs::create_dir_all(&base_dir)?;

        Ok(Self {
            base_dir,
            current_file: None,
            current_date: String::new(),
            _record: PhantomData,
        })
    }

    fn date_string() -> String {
        Utc::now().format("%Y%m%d").to_string()
    }

    fn file_path(&self, date: &str) -> PathBuf {
        self.base_dir.join(format!("{}_{}.csv", T::PREFIX, date))
    }

    /// Path of the file currently appended to
    pub fn current_path(&self) -> PathBuf {
        self.file_path(&Self::date_string())
    }

    fn ensure_file_open(&mut self) -> Result<()> {
        let today = Self::date_string();

        if self.current_date != today || self.current_file.is_none() {
            if let Some(mut writer) = self.current_file.take() {
                writer.flush()?;
            }

            let file_path = self.file_path(&today);
            let needs_header = fs::metadata(&file_path).map_or(true, |m| m.len() == 0);

            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&file_path)?;

            let writer = csv::WriterBuilder::new()
                .has_headers(needs_header)
                .from_writer(file);

            self.current_file = Some(writer);
            self.current_date = today;
        }

        Ok(())
    }

    /// Append one row and flush
    pub fn append(&mut self, record: &T) -> Result<()> {
        self.append_all(std::slice::from_ref(record))
    }

    pub fn append_all(&mut self, records: &[T]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        self.ensure_file_open()?;

        if let Some(ref mut writer) = self.current_file {
            for record in records {
                writer.serialize(record)?;
            }
            writer.flush()?;
        }

        Ok(())
    }

    pub fn close(&mut self) -> Result<()> {
        if let Some(mut writer) = self.current_file.take() {
            writer.flush()?;
        }
        Ok(())
    }
}

impl<T: LogRecord> Drop for EventLog<T> {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

/// Read one log file; rows that fail to parse are skipped with a warning
pub fn read_events<T: LogRecord, P: AsRef<Path>>(path: P) -> Result<Vec<T>> {
    let path = path.as_ref();
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)?;

    let mut records = Vec::new();
    for (line, result) in reader.deserialize::<T>().enumerate() {
        match result {
            Ok(record) => records.push(record),
            Err(e) => log::warn!("⚠️ {}: skipping row {}: {}", path.display(), line + 2, e),
        }
    }

    Ok(records)
}

/// Every `{PREFIX}*.csv` file in `dir`, oldest first
pub fn log_files<T: LogRecord, P: AsRef<Path>>(dir: P) -> Result<Vec<PathBuf>> {
    let pattern = dir.as_ref().join(format!("{}*.csv", T::PREFIX));
    let pattern = pattern.to_string_lossy();
    let mut files: Vec<PathBuf> = glob::glob(&pattern)
        .map_err(|e| crate::LayoutRlError::Config(format!("bad log pattern {pattern}: {e}")))?
        .filter_map(|entry| entry.ok())
        .collect();
    files.sort();
    Ok(files)
}

/// All rows of a log directory, in file then row order
pub fn load_events<T: LogRecord, P: AsRef<Path>>(dir: P) -> Result<Vec<T>> {
    let files = log_files::<T, _>(&dir)?;
    if files.is_empty() {
        log::warn!("⚠️ No {} logs found in {}", T::PREFIX, dir.as_ref().display());
    }

    let mut records = Vec::new();
    for file in files {
        let mut rows = read_events::<T, _>(&file)?;
        log::debug!("📂 {} rows from {}", rows.len(), file.display());
        records.append(&mut rows);
    }
    Ok(records)
}
