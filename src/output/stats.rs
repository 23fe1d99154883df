//! Statistics from the harvest database
//!
//! Used by `--stats` to report what earlier runs stored for a site.

use crate::storage::{RunRecord, SqliteSink, StorageResult};

/// Stored-record statistics for one site
#[derive(Debug, Clone)]
pub struct HarvestStatistics {
    pub site: String,

    /// Total records stored across all runs
    pub total_records: u64,

    /// Record counts per category, largest first
    pub records_by_category: Vec<(String, u64)>,

    /// Number of runs recorded
    pub total_runs: u64,

    /// Most recent run, if any
    pub latest_run: Option<RunRecord>,
}

/// Loads statistics from the database
///
/// # Arguments
///
/// * `store` - Database handle for the site
///
/// # Returns
///
/// * `Ok(HarvestStatistics)` - Successfully loaded statistics
/// * `Err(StorageError)` - Failed to query statistics
pub fn load_statistics(store: &SqliteSink) -> StorageResult<HarvestStatistics> {
    Ok(HarvestStatistics {
        site: store.site().to_string(),
        total_records: store.count_records()?,
        records_by_category: store.records_by_category()?,
        total_runs: store.count_runs()?,
        latest_run: store.get_latest_run()?,
    })
}

/// Prints statistics to stdout in a formatted manner
pub fn print_statistics(stats: &HarvestStatistics) {
    println!("=== Harvest Statistics: {} ===\n", stats.site);

    println!("Overview:");
    println!("  Total records: {}", stats.total_records);
    println!("  Runs: {}", stats.total_runs);
    println!();

    if let Some(run) = &stats.latest_run {
        println!("Latest Run:");
        println!("  ID: {}", run.id);
        println!("  Started: {}", run.started_at);
        if let Some(finished) = &run.finished_at {
            println!("  Finished: {}", finished);
        }
        println!("  Status: {}", run.status.to_db_string());
        println!("  Config hash: {}", run.config_hash);
        println!();
    }

    if !stats.records_by_category.is_empty() {
        println!("Records by Category:");
        for (category, count) in &stats.records_by_category {
            let percentage = if stats.total_records > 0 {
                (*count as f64 / stats.total_records as f64) * 100.0
            } else {
                0.0
            };
            println!("  {}: {} ({:.1}%)", category, count, percentage);
        }
    }
}
