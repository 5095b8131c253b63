//! JSON Lines event log.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;

use super::LogSink;
use crate::error::{CadenceError, CadenceResult};
use crate::events::LogRecord;

/// Appends log records to a file, one JSON object per line.
///
/// The file is opened lazily in append mode and created if absent. Each
/// record is flushed before `append` returns.
pub struct JsonlLogSink {
    path: PathBuf,
    file: Mutex<Option<File>>,
}

impl JsonlLogSink {
    /// Create a sink writing to `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            file: Mutex::new(None),
        }
    }

    /// The log file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn open(&self) -> CadenceResult<File> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                CadenceError::sink_write(format!("cannot create {}", parent.display()), e)
            })?;
        }

        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| CadenceError::sink_write(format!("cannot open {}", self.path.display()), e))
    }
}

#[async_trait]
impl LogSink for JsonlLogSink {
    async fn append(&self, record: &LogRecord) -> CadenceResult<()> {
        let line = encode_line(record)?;

        let mut guard = self.file.lock().await;
        if guard.is_none() {
            *guard = Some(self.open().await?);
        }
        let Some(file) = guard.as_mut() else {
            return Err(CadenceError::internal("log file handle missing"));
        };

        let written = async {
            file.write_all(line.as_bytes()).await?;
            file.flush().await
        }
        .await;

        if let Err(e) = written {
            // Reopen on the next append
            *guard = None;
            return Err(CadenceError::sink_write(
                format!("cannot append to {}", self.path.display()),
                e,
            ));
        }
        Ok(())
    }

    async fn close(&self) -> CadenceResult<()> {
        let mut guard = self.file.lock().await;
        if let Some(mut file) = guard.take() {
            file.flush().await.map_err(|e| {
                CadenceError::sink_write(format!("cannot flush {}", self.path.display()), e)
            })?;
        }
        Ok(())
    }
}

/// One log line, newline included.
fn encode_line(record: &LogRecord) -> CadenceResult<String> {
    let mut line = serde_json::to_string(record).map_err(encode_failure)?;
    line.push('\n');
    Ok(line)
}

fn encode_failure(e: serde_json::Error) -> CadenceError {
    CadenceError::sink_write("cannot encode log record", e.into())
}

/// Statistics from reading a log.
#[derive(Debug, Default, Clone)]
pub struct ReadStats {
    /// Non-blank lines seen.
    pub total: u64,
    /// Lines parsed into records.
    pub parsed: u64,
    /// Error messages for unparseable lines.
    pub errors: Vec<String>,
}

impl ReadStats {
    /// Whether every line parsed.
    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Read log records from JSON Lines input.
///
/// Blank lines are skipped. Malformed lines are reported in the stats and
/// do not abort the read.
pub async fn read_log_records<R>(reader: R) -> CadenceResult<(Vec<LogRecord>, ReadStats)>
where
    R: AsyncBufRead + Unpin,
{
    let mut stats = ReadStats::default();
    let mut records = Vec::new();
    let mut lines = reader.lines();
    let mut line_no = 0u64;

    while let Some(line) = lines.next_line().await? {
        line_no += 1;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        stats.total += 1;

        match serde_json::from_str::<LogRecord>(line) {
            Ok(record) => {
                stats.parsed += 1;
                records.push(record);
            }
            Err(e) => stats
                .errors
                .push(format!("Parse error at line {}: {}", line_no, e)),
        }
    }

    Ok((records, stats))
}

/// Read every record of a log file.
pub async fn read_log_file(path: impl AsRef<Path>) -> CadenceResult<(Vec<LogRecord>, ReadStats)> {
    let path = path.as_ref();
    let file = File::open(path).await?;
    read_log_records(BufReader::new(file)).await
}
