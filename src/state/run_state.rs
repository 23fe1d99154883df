//! Run-wide dedup and counters
//!
//! All mutation goes through one mutex, so the seen check, the sink write and
//! the seen insertion happen as one step even with concurrent workers.

use crate::catalog::ProductRecord;
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

/// Per-category counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CategoryTally {
    /// Records written during this run
    pub written: u64,

    /// Records already present from a previous run (resume)
    pub resumed: u64,

    /// Records dropped because their id was already seen
    pub duplicates: u64,

    /// Records dropped by the site's exclusion policy
    pub excluded: u64,

    /// Records that failed extraction or lacked an id/url
    pub invalid: u64,

    /// Adapter calls abandoned after exhausting retries
    pub pruned: u64,

    /// Query units paginated
    pub units: u64,

    /// Non-empty pages fetched
    pub pages: u64,
}

impl CategoryTally {
    /// Records counting toward the category limit
    pub fn total(&self) -> u64 {
        self.resumed + self.written
    }
}

/// Result of offering a record to the run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Written,
    Duplicate,
    /// The category had already reached its limit; nothing was written
    OverLimit,
}

/// Reasons a record or call was dropped, for tallying
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Skip {
    Excluded,
    Invalid,
    Pruned,
}

#[derive(Debug, Default)]
struct Inner {
    seen: HashSet<String>,
    tallies: HashMap<String, CategoryTally>,
}

/// Process-wide crawl state: seen ids and per-category tallies
#[derive(Debug, Default)]
pub struct RunState {
    inner: Mutex<Inner>,
}

impl RunState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds state from a previous run's output
    ///
    /// # Arguments
    ///
    /// * `seen` - ids already written
    /// * `counts` - records already written per category name
    pub fn with_history(
        seen: impl IntoIterator<Item = String>,
        counts: impl IntoIterator<Item = (String, u64)>,
    ) -> Self {
        let mut inner = Inner {
            seen: seen.into_iter().collect(),
            tallies: HashMap::new(),
        };
        for (category, count) in counts {
            inner.tallies.entry(category).or_default().resumed = count;
        }
        Self {
            inner: Mutex::new(inner),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Writes `record` unless its id has been seen
    ///
    /// `write` runs while the state lock is held; the id is marked seen and the
    /// category counter incremented only if it succeeds.
    pub fn admit<E>(
        &self,
        record: &ProductRecord,
        write: impl FnOnce(&ProductRecord) -> Result<(), E>,
    ) -> Result<Admission, E> {
        self.admit_within(record, 0, write)
    }

    /// Like `admit`, but refuses the record once its category holds `limit`
    /// records (0 = unlimited)
    ///
    /// The limit is checked under the same lock as the write, so concurrent
    /// workers can never push a category past it.
    pub fn admit_within<E>(
        &self,
        record: &ProductRecord,
        limit: u64,
        write: impl FnOnce(&ProductRecord) -> Result<(), E>,
    ) -> Result<Admission, E> {
        let mut inner = self.lock();

        if limit > 0 {
            let total = inner
                .tallies
                .get(&record.category)
                .map_or(0, CategoryTally::total);
            if total >= limit {
                return Ok(Admission::OverLimit);
            }
        }

        if inner.seen.contains(&record.id) {
            inner
                .tallies
                .entry(record.category.clone())
                .or_default()
                .duplicates += 1;
            return Ok(Admission::Duplicate);
        }

        write(record)?;

        inner.seen.insert(record.id.clone());
        inner
            .tallies
            .entry(record.category.clone())
            .or_default()
            .written += 1;
        Ok(Admission::Written)
    }

    pub fn note_skip(&self, category: &str, skip: Skip) {
        let mut inner = self.lock();
        let tally = inner.tallies.entry(category.to_string()).or_default();
        match skip {
            Skip::Excluded => tally.excluded += 1,
            Skip::Invalid => tally.invalid += 1,
            Skip::Pruned => tally.pruned += 1,
        }
    }

    pub fn note_unit(&self, category: &str) {
        self.lock()
            .tallies
            .entry(category.to_string())
            .or_default()
            .units += 1;
    }

    pub fn note_page(&self, category: &str) {
        self.lock()
            .tallies
            .entry(category.to_string())
            .or_default()
            .pages += 1;
    }

    pub fn is_seen(&self, id: &str) -> bool {
        self.lock().seen.contains(id)
    }

    pub fn seen_count(&self) -> usize {
        self.lock().seen.len()
    }

    /// Records counting toward `category`'s limit
    pub fn category_total(&self, category: &str) -> u64 {
        self.lock()
            .tallies
            .get(category)
            .map(CategoryTally::total)
            .unwrap_or(0)
    }

    /// True once `category` holds at least `limit` records (0 = unlimited)
    pub fn limit_reached(&self, category: &str, limit: u64) -> bool {
        limit > 0 && self.category_total(category) >= limit
    }

    pub fn tally(&self, category: &str) -> CategoryTally {
        self.lock().tallies.get(category).cloned().unwrap_or_default()
    }
}
