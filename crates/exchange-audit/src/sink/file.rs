//! File-based sink (JSON Lines format)

use super::{AuditSink, EmitFuture, SinkError, SinkResult};
use crate::record::ExchangeRecord;
use chrono::Utc;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// Configuration for [`FileSink`].
#[derive(Debug, Clone)]
pub struct FileSinkConfig {
    /// Path to the record file.
    pub file_path: PathBuf,
    /// Size in bytes at which the file is rotated before the next write.
    pub max_file_size: Option<u64>,
}

impl FileSinkConfig {
    /// Create a new configuration for the given file path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            file_path: path.into(),
            max_file_size: Some(100 * 1024 * 1024), // 100MB default
        }
    }

    /// Set maximum file size before rotation.
    pub fn max_size(mut self, bytes: u64) -> Self {
        self.max_file_size = Some(bytes);
        self
    }

    /// Disable file size limit.
    pub fn no_size_limit(mut self) -> Self {
        self.max_file_size = None;
        self
    }
}

/// Appends one JSON object per line.
///
/// Writes are synchronous. Put the sink behind a [`ChannelSink`] to keep
/// disk latency off the request path.
///
/// [`ChannelSink`]: super::ChannelSink
pub struct FileSink {
    config: FileSinkConfig,
    writer: Mutex<Option<File>>,
    rotations: AtomicU64,
}

impl FileSink {
    /// Create a file sink, creating the file and its parent directories.
    pub fn new(config: FileSinkConfig) -> SinkResult<Self> {
        let file = Self::open_file(&config.file_path)?;
        Ok(Self {
            config,
            writer: Mutex::new(Some(file)),
            rotations: AtomicU64::new(0),
        })
    }

    /// Create a sink for the given file path with default configuration.
    pub fn open(path: impl Into<PathBuf>) -> SinkResult<Self> {
        Self::new(FileSinkConfig::new(path))
    }

    /// Path of the active file
    pub fn path(&self) -> &Path {
        &self.config.file_path
    }

    fn open_file(path: &Path) -> SinkResult<File> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }
        Ok(OpenOptions::new().create(true).append(true).open(path)?)
    }

    /// Rename the active file aside and start a new one if it is too big.
    fn rotate_if_needed(&self, writer: &mut Option<File>) -> SinkResult {
        let Some(max_size) = self.config.max_file_size else {
            return Ok(());
        };
        let size = match std::fs::metadata(&self.config.file_path) {
            Ok(metadata) => metadata.len(),
            Err(_) => return Ok(()),
        };
        if size < max_size {
            return Ok(());
        }

        // Close current file
        *writer = None;

        let seq = self.rotations.fetch_add(1, Ordering::Relaxed);
        let mut rotated = self.config.file_path.clone().into_os_string();
        rotated.push(format!(".{}-{}", Utc::now().format("%Y%m%dT%H%M%S%3f"), seq));
        std::fs::rename(&self.config.file_path, PathBuf::from(rotated))?;

        tracing::debug!(path = %self.config.file_path.display(), size, "rotated record file");
        *writer = Some(Self::open_file(&self.config.file_path)?);
        Ok(())
    }

    /// Append one record
    pub fn write(&self, record: &ExchangeRecord) -> SinkResult {
        let json = serde_json::to_string(record)?;

        let mut writer = self
            .writer
            .lock()
            .map_err(|e| SinkError::Write(format!("Failed to acquire lock: {}", e)))?;

        self.rotate_if_needed(&mut writer)?;

        let file = writer
            .as_mut()
            .ok_or_else(|| SinkError::Write("File not open".to_string()))?;
        writeln!(file, "{}", json)?;
        Ok(())
    }

    /// Read every record in the active file.
    ///
    /// Lines that do not parse are skipped with a warning.
    pub fn read_all(&self) -> SinkResult<Vec<ExchangeRecord>> {
        let path = &self.config.file_path;
        if !path.exists() {
            return Ok(Vec::new());
        }

        let reader = BufReader::new(File::open(path)?);
        let mut records = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<ExchangeRecord>(&line) {
                Ok(record) => records.push(record),
                Err(e) => tracing::warn!("Failed to parse exchange record: {}", e),
            }
        }
        Ok(records)
    }

    /// Flush buffered writes to disk
    pub fn flush(&self) -> SinkResult {
        let mut writer = self
            .writer
            .lock()
            .map_err(|e| SinkError::Write(format!("Failed to acquire lock: {}", e)))?;
        if let Some(file) = writer.as_mut() {
            file.flush()?;
        }
        Ok(())
    }
}

impl AuditSink for FileSink {
    fn emit(&self, record: ExchangeRecord) -> EmitFuture<'_> {
        Box::pin(async move { self.write(&record) })
    }
}
