//! Event log persistence.
//!
//! Every accepted event is appended to the log as one JSON object per line.
//! The log is the input of offline habit mining.

mod jsonl;

pub use jsonl::{read_log_file, read_log_records, JsonlLogSink, ReadStats};

use async_trait::async_trait;

use crate::error::CadenceResult;
use crate::events::LogRecord;

/// Append-only destination for log records.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LogSink: Send + Sync {
    /// Append one record. Durable once this returns.
    async fn append(&self, record: &LogRecord) -> CadenceResult<()>;

    /// Release underlying resources. Later appends may reopen them.
    async fn close(&self) -> CadenceResult<()> {
        Ok(())
    }
}
