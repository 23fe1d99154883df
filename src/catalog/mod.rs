//! Catalog data model
//!
//! Types shared by the traversal engine and site adapters:
//!
//! - `Category`: a named top-level slice of a catalog and its site-specific seed
//! - `FacetDimension` / `FacetValue`: filterable dimensions and their enumerated values
//! - `FacetSelection`: the accumulated filter choices along one traversal branch
//! - `QueryUnit`: a fully narrowed query ready for pagination
//! - `Page` / `RawRecord` / `ProductRecord`: what pagination and extraction produce

mod record;
mod selection;

pub use record::{Page, ProductRecord, RawRecord, RecordRow, CSV_HEADERS};
pub use selection::{FacetSelection, SelectedFacet};

use serde::Deserialize;
use std::fmt;

/// A top-level catalog category
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize)]
pub struct Category {
    /// Human-readable name, also written to the Category output column
    pub name: String,

    /// Opaque site-specific query seed (slug, taxonomy id, path...)
    pub reference: String,
}

impl Category {
    pub fn new(name: impl Into<String>, reference: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            reference: reference.into(),
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// A filterable catalog dimension (e.g. "Color" or "Price")
///
/// Dimensions are narrowed strictly in `rank` order: the coarsest
/// discriminator first.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FacetDimension {
    pub label: String,
    pub rank: usize,
}

impl FacetDimension {
    pub fn new(label: impl Into<String>, rank: usize) -> Self {
        Self {
            label: label.into(),
            rank,
        }
    }
}

/// One enumerated value of a facet dimension, with its reported result count
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FacetValue {
    /// Query parameter the adapter filters on
    pub param: String,

    /// Parameter value selecting this facet value
    pub value: String,

    /// Display label, used for logging
    pub label: String,

    /// Number of results the site reports for this value under the current selection
    pub count: u64,
}

impl FacetValue {
    pub fn new(
        param: impl Into<String>,
        value: impl Into<String>,
        label: impl Into<String>,
        count: u64,
    ) -> Self {
        Self {
            param: param.into(),
            value: value.into(),
            label: label.into(),
            count,
        }
    }
}

/// A leaf of the facet traversal: ready to paginate
#[derive(Debug, Clone, PartialEq)]
pub struct QueryUnit {
    pub category: Category,
    pub selection: FacetSelection,
    pub result_count: u64,
}

impl QueryUnit {
    /// True when the site reported more results than it will paginate
    ///
    /// Such units ran out of dimensions to narrow by and are paginated as-is.
    pub fn is_truncated(&self, cap: u64) -> bool {
        self.result_count > cap
    }
}
