//! Run summary types

use crate::state::{CategoryOutcome, CategoryTally};
use chrono::{DateTime, Utc};
use std::time::Duration;

/// What happened to one category during a run
#[derive(Debug, Clone)]
pub struct CategoryReport {
    pub name: String,
    pub outcome: CategoryOutcome,
    /// Query units the partitioner emitted
    pub leaves: u64,
    pub tally: CategoryTally,
}

/// Result of a complete run
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub site: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration: Duration,
    pub categories: Vec<CategoryReport>,
    /// True if the run was cancelled before every category finished
    pub interrupted: bool,
}

impl RunSummary {
    /// Records written during this run, all categories
    pub fn total_written(&self) -> u64 {
        self.categories.iter().map(|c| c.tally.written).sum()
    }

    pub fn total_duplicates(&self) -> u64 {
        self.categories.iter().map(|c| c.tally.duplicates).sum()
    }

    pub fn total_pruned(&self) -> u64 {
        self.categories.iter().map(|c| c.tally.pruned).sum()
    }

    /// Categories whose traversal ran to the end or to the limit
    pub fn fully_processed(&self) -> Vec<&str> {
        self.categories
            .iter()
            .filter(|c| c.outcome != CategoryOutcome::Interrupted)
            .map(|c| c.name.as_str())
            .collect()
    }

    /// Categories cut short by cancellation
    pub fn partially_processed(&self) -> Vec<&str> {
        self.categories
            .iter()
            .filter(|c| c.outcome == CategoryOutcome::Interrupted)
            .map(|c| c.name.as_str())
            .collect()
    }

    pub fn category(&self, name: &str) -> Option<&CategoryReport> {
        self.categories.iter().find(|c| c.name == name)
    }
}

/// Prints a run summary to stdout
pub fn print_summary(summary: &RunSummary) {
    println!("=== Harvest Summary: {} ===\n", summary.site);
    println!(
        "Duration: {:.1}s{}",
        summary.duration.as_secs_f64(),
        if summary.interrupted {
            " (interrupted)"
        } else {
            ""
        }
    );
    println!("Records written: {}", summary.total_written());
    println!("Duplicates skipped: {}", summary.total_duplicates());
    println!("Pruned calls: {}", summary.total_pruned());
    println!();

    println!(
        "{:<28} {:>14} {:>7} {:>7} {:>9} {:>9} {:>9}",
        "Category", "Outcome", "Units", "Pages", "Written", "Excluded", "Invalid"
    );
    for report in &summary.categories {
        println!(
            "{:<28} {:>14} {:>7} {:>7} {:>9} {:>9} {:>9}",
            report.name,
            report.outcome.as_str(),
            report.tally.units,
            report.tally.pages,
            report.tally.written,
            report.tally.excluded,
            report.tally.invalid
        );
    }

    let partial = summary.partially_processed();
    if !partial.is_empty() {
        println!();
        println!("Partially processed: {}", partial.join(", "));
    }
}
