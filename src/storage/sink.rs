//! Sink trait and error types

use crate::catalog::ProductRecord;
use thiserror::Error;

/// Errors that can occur while persisting records
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Append-only destination for accepted records
///
/// A successful `write` means the record is durable as one unit: a crash after
/// it returns never leaves a partial row behind. Dedup happens before the sink
/// is called.
pub trait RecordSink: Send {
    /// Appends one record
    fn write(&mut self, record: &ProductRecord) -> StorageResult<()>;

    /// Flushes buffered output
    fn flush(&mut self) -> StorageResult<()>;
}

impl<S: RecordSink + ?Sized> RecordSink for Box<S> {
    fn write(&mut self, record: &ProductRecord) -> StorageResult<()> {
        (**self).write(record)
    }

    fn flush(&mut self) -> StorageResult<()> {
        (**self).flush()
    }
}
