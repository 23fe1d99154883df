//! Storage module for persisting extracted records
//!
//! - `RecordSink`: append-only destination for accepted records
//! - `CsvSink`: the tabular output file
//! - `SqliteSink`: run history, record store and resume point
//! - `FanoutSink`: writes each record to several sinks

mod csv_sink;
mod fanout;
#[cfg(test)]
pub(crate) mod memory;
mod schema;
mod sqlite;
mod sink;

pub use csv_sink::CsvSink;
pub use fanout::FanoutSink;
pub use sink::{RecordSink, StorageError, StorageResult};
pub use sqlite::{History, SqliteSink};

/// Represents a harvest run
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub id: i64,
    pub site: String,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub config_hash: String,
    pub status: RunStatus,
}

/// Status of a harvest run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Running,
    Completed,
    Interrupted,
    Failed,
}

impl RunStatus {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Interrupted => "interrupted",
            Self::Failed => "failed",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "interrupted" => Some(Self::Interrupted),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}
