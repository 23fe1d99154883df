//! State module for tracking crawl progress
//!
//! # Components
//!
//! - `RunState`: the process-wide seen-id set and per-category counters
//! - `CategoryTally`: what happened to one category's records so far
//! - `CategoryOutcome`: how a category's traversal ended

mod outcome;
mod run_state;

pub use outcome::CategoryOutcome;
pub use run_state::{Admission, CategoryTally, RunState, Skip};
