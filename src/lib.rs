//! Facet-Harvest: a faceted catalog crawler
//!
//! This crate extracts product records from e-commerce catalogs that cap the
//! number of results a single query may return. Oversized categories are split
//! into facet combinations until every slice is enumerable, then each slice is
//! paginated, extracted, deduplicated and persisted.

pub mod adapter;
pub mod catalog;
pub mod config;
pub mod crawler;
pub mod output;
pub mod state;
pub mod storage;

use thiserror::Error;

/// Main error type for Facet-Harvest operations
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unknown site '{name}' (configured: {available})")]
    UnknownSite { name: String, available: String },

    #[error("No categories configured for site '{0}'")]
    NoCategories(String),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// Result type alias for Facet-Harvest operations
pub type Result<T> = std::result::Result<T, HarvestError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use adapter::{AdapterError, JsonApiAdapter, SiteAdapter};
pub use catalog::{Category, FacetDimension, FacetSelection, ProductRecord, QueryUnit};
pub use config::Config;
pub use crawler::{CrawlEngine, RetryPolicy};
pub use output::RunSummary;
pub use state::{CategoryOutcome, RunState};
pub use storage::{CsvSink, RecordSink, SqliteSink};
