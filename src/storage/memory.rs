//! In-memory sink for tests

use crate::catalog::ProductRecord;
use crate::storage::sink::{RecordSink, StorageError, StorageResult};
use std::sync::{Arc, Mutex};

/// Collects records into a shared vector
#[derive(Default)]
pub struct MemorySink {
    records: Arc<Mutex<Vec<ProductRecord>>>,
    fail_after: Option<usize>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// A sink that errors once it holds `n` records
    pub fn failing_after(n: usize) -> Self {
        Self {
            fail_after: Some(n),
            ..Self::default()
        }
    }

    /// Handle to the collected records, usable after the sink is moved
    pub fn records(&self) -> Arc<Mutex<Vec<ProductRecord>>> {
        Arc::clone(&self.records)
    }
}

impl RecordSink for MemorySink {
    fn write(&mut self, record: &ProductRecord) -> StorageResult<()> {
        let mut records = self.records.lock().unwrap();
        if self.fail_after.is_some_and(|n| records.len() >= n) {
            return Err(StorageError::Database("disk full".to_string()));
        }
        records.push(record.clone());
        Ok(())
    }

    fn flush(&mut self) -> StorageResult<()> {
        Ok(())
    }
}
