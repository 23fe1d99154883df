//! Output module for run summaries and reports
//!
//! - `RunSummary` / `CategoryReport`: what a run did, per category
//! - Console and markdown renderings of a summary
//! - Database statistics for `--stats`

mod markdown;
pub mod stats;
mod summary;

pub use markdown::{format_markdown_summary, generate_markdown_summary};
pub use stats::{load_statistics, print_statistics, HarvestStatistics};
pub use summary::{print_summary, CategoryReport, RunSummary};
