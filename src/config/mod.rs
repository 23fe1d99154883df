//! Configuration module for Facet-Harvest
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use facet_harvest::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("harvest.toml")).unwrap();
//! println!("Per-category limit: {}", config.crawler.limit_per_category);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    Backoff, Config, CrawlerConfig, DimensionConfig, DimensionKind, FieldMap, OutputConfig,
    SiteConfig, UserAgentConfig,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash};
pub use validation::validate;
