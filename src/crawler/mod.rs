//! Crawler module: catalog traversal
//!
//! - `RetryPolicy`: bounded retry with backoff around single adapter calls
//! - `FacetPartitioner`: splits oversized categories into query units
//! - `Paginator`: walks the pages of one query unit
//! - `CrawlEngine`: drives the above for every category and feeds the sink

mod context;
mod engine;
mod paginator;
mod partitioner;
mod retry;

pub use context::{CrawlContext, Disposition};
pub use engine::{CrawlEngine, EngineSettings};
pub use paginator::Paginator;
pub use partitioner::{FacetPartitioner, Step};
pub use retry::RetryPolicy;
