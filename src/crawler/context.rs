//! Shared per-run context for traversal tasks

use crate::adapter::{AdapterError, SiteAdapter};
use crate::catalog::{Category, ProductRecord, RawRecord};
use crate::crawler::RetryPolicy;
use crate::state::{Admission, RunState, Skip};
use crate::storage::{RecordSink, StorageError};
use std::future::Future;
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

/// What the engine did with one raw listing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Written,
    Duplicate,
    Excluded,
    Invalid,
    /// The category limit was reached before this listing could be written
    OverLimit,
    Failed,
}

/// Everything a partitioner, paginator or unit worker needs
///
/// Held behind an `Arc` so spawned unit workers can share it.
pub struct CrawlContext {
    pub adapter: Arc<dyn SiteAdapter>,
    pub retry: RetryPolicy,
    pub cancel: CancellationToken,
    pub state: Arc<RunState>,
    pub limit: u64,
    pub concurrency: usize,
    /// Bounds adapter calls in flight across the whole run
    calls: Semaphore,
    sink: Mutex<Box<dyn RecordSink>>,
    storage_failure: Mutex<Option<StorageError>>,
}

impl CrawlContext {
    pub fn new(
        adapter: Arc<dyn SiteAdapter>,
        sink: Box<dyn RecordSink>,
        state: Arc<RunState>,
        retry: RetryPolicy,
        limit: u64,
        concurrency: usize,
        cancel: CancellationToken,
    ) -> Self {
        let concurrency = concurrency.max(1);
        Self {
            adapter,
            retry,
            cancel,
            state,
            limit,
            concurrency,
            calls: Semaphore::new(concurrency),
            sink: Mutex::new(sink),
            storage_failure: Mutex::new(None),
        }
    }

    /// True once the category holds `limit` records
    pub fn limit_reached(&self, category: &str) -> bool {
        self.state.limit_reached(category, self.limit)
    }

    /// True when no more work should start for `category`
    pub fn should_stop(&self, category: &str) -> bool {
        self.cancel.is_cancelled() || self.limit_reached(category)
    }

    /// Runs one adapter call under the retry policy
    ///
    /// Each attempt holds a call permit; retry waits do not.
    pub async fn call<T, F, Fut>(&self, label: &str, mut op: F) -> Result<T, AdapterError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, AdapterError>>,
    {
        let calls = &self.calls;
        self.retry
            .call(label, &self.cancel, move || {
                let attempt = op();
                async move {
                    let _permit = calls.acquire().await.map_err(|_| AdapterError::Cancelled)?;
                    attempt.await
                }
            })
            .await
    }

    /// Like `call`, but degrades a failed call to `T::default()`
    ///
    /// The failure prunes only the branch or page it belonged to.
    pub async fn call_or_prune<T, F, Fut>(&self, category: &Category, label: &str, op: F) -> T
    where
        T: Default,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, AdapterError>>,
    {
        match self.call(label, op).await {
            Ok(value) => value,
            Err(AdapterError::Cancelled) => T::default(),
            Err(e) => {
                tracing::warn!(
                    category = %category.name,
                    "Pruning {} after retries were exhausted: {}",
                    label,
                    e
                );
                self.state.note_skip(&category.name, Skip::Pruned);
                T::default()
            }
        }
    }

    /// Extracts, validates, filters and writes one raw listing
    pub fn accept(&self, raw: &RawRecord, category: &Category) -> Disposition {
        let record = match self.adapter.extract(raw, category) {
            Ok(record) => record,
            Err(e) => {
                tracing::debug!(category = %category.name, "Skipping unparseable record: {}", e);
                self.state.note_skip(&category.name, Skip::Invalid);
                return Disposition::Invalid;
            }
        };

        if let Some(field) = record.missing_field() {
            tracing::debug!(
                category = %category.name,
                "Skipping record without {}: {:?}",
                field,
                record.description
            );
            self.state.note_skip(&category.name, Skip::Invalid);
            return Disposition::Invalid;
        }

        if self.adapter.excludes(&record) {
            tracing::debug!(
                category = %category.name,
                "Skipping record {} excluded by site policy",
                record.id
            );
            self.state.note_skip(&category.name, Skip::Excluded);
            return Disposition::Excluded;
        }

        match self.state.admit_within(&record, self.limit, |r| self.write(r)) {
            Ok(Admission::Written) => Disposition::Written,
            Ok(Admission::OverLimit) => Disposition::OverLimit,
            Ok(Admission::Duplicate) => {
                tracing::debug!(category = %category.name, "Skipping duplicate record {}", record.id);
                Disposition::Duplicate
            }
            Err(e) => {
                self.fail(e);
                Disposition::Failed
            }
        }
    }

    fn write(&self, record: &ProductRecord) -> Result<(), StorageError> {
        self.sink
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .write(record)
    }

    pub fn flush(&self) -> Result<(), StorageError> {
        self.sink
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .flush()
    }

    /// Records the first storage failure and stops the run
    fn fail(&self, error: StorageError) {
        tracing::error!("Record sink failed, stopping run: {}", error);
        let mut slot = self
            .storage_failure
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if slot.is_none() {
            *slot = Some(error);
        }
        self.cancel.cancel();
    }

    pub fn take_storage_failure(&self) -> Option<StorageError> {
        self.storage_failure
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
    }
}
