//! Site adapters
//!
//! The traversal engine never talks to a website directly. Everything that is
//! specific to one source (query construction, response decoding, field
//! extraction, exclusion policy) sits behind the `SiteAdapter` trait.
//!
//! - `JsonApiAdapter`: a configurable adapter for faceted JSON search endpoints
//! - `ExclusionRules`: declarative per-site record filters

mod exclusion;
mod json_api;
#[cfg(test)]
pub(crate) mod scripted;

pub use exclusion::ExclusionRules;
pub use json_api::JsonApiAdapter;

use crate::catalog::{
    Category, FacetDimension, FacetSelection, FacetValue, Page, ProductRecord, RawRecord,
};
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Errors returned by a single adapter call
#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("HTTP error for {url}: {source}")]
    Http { url: String, source: reqwest::Error },

    #[error("HTTP {code} from {url}")]
    Status { url: String, code: u16 },

    #[error("Rate limited by {url}")]
    RateLimited {
        url: String,
        retry_after: Option<Duration>,
    },

    #[error("Malformed response from {url}: {message}")]
    Malformed { url: String, message: String },

    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    #[error("Cancelled")]
    Cancelled,
}

impl AdapterError {
    /// Returns true if repeating the same call may succeed
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Unsupported(_) | Self::Cancelled)
    }

    /// Server-requested wait before the next attempt, if any
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

/// Errors raised while turning a raw listing into a `ProductRecord`
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("missing field '{0}'")]
    MissingField(&'static str),

    #[error("field '{field}' has unexpected value: {value}")]
    InvalidField { field: &'static str, value: String },
}

/// Capabilities a catalog source must provide
///
/// Every network-facing method is a single call: the engine wraps each one in
/// its retry policy and treats exhausted retries as an empty result.
#[async_trait]
pub trait SiteAdapter: Send + Sync {
    /// Short name used in logs and storage
    fn name(&self) -> &str;

    /// Largest result count a single query can paginate reliably
    fn per_query_cap(&self) -> u64;

    /// Index of the first page (sites differ on 0 vs 1)
    fn first_page_index(&self) -> u32 {
        1
    }

    /// Hard ceiling on pages fetched for one query unit
    fn max_pages_per_unit(&self) -> Option<u32> {
        None
    }

    /// Facet dimensions available for a category, coarsest first
    async fn category_dimensions(
        &self,
        category: &Category,
    ) -> Result<Vec<FacetDimension>, AdapterError>;

    /// Values of `dimension` under the current selection, with their counts
    async fn facet_values(
        &self,
        category: &Category,
        selection: &FacetSelection,
        dimension: &FacetDimension,
    ) -> Result<Vec<FacetValue>, AdapterError>;

    /// Total results for the current selection
    async fn result_count(
        &self,
        category: &Category,
        selection: &FacetSelection,
    ) -> Result<u64, AdapterError>;

    /// One page of raw listings
    async fn fetch_page(
        &self,
        category: &Category,
        selection: &FacetSelection,
        page: u32,
    ) -> Result<Page, AdapterError>;

    /// Extracts a product record from a raw listing
    fn extract(&self, raw: &RawRecord, category: &Category) -> Result<ProductRecord, ExtractError>;

    /// Returns true if the record must not be written
    fn excludes(&self, record: &ProductRecord) -> bool;
}
