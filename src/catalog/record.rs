//! Product record types
//!
//! `RawRecord` is whatever a site returns for one listing; adapters turn it
//! into a `ProductRecord`. `RecordRow` is the fixed tabular output shape.

use serde::Serialize;

/// An unparsed listing as returned by a site
pub type RawRecord = serde_json::Value;

/// Output column order
pub const CSV_HEADERS: [&str; 6] = ["Description", "URL", "Price", "Reviews", "Rating", "Category"];

/// One page of raw listings for a query unit
#[derive(Debug, Clone, Default)]
pub struct Page {
    /// Page index as requested
    pub index: u32,

    /// Listings on this page, in site order
    pub records: Vec<RawRecord>,

    /// Last page index declared by the site, if any
    pub last_page: Option<u32>,
}

impl Page {
    pub fn empty(index: u32) -> Self {
        Self {
            index,
            records: Vec::new(),
            last_page: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// True when the site declared this page (or an earlier one) as the last
    pub fn is_last(&self) -> bool {
        self.last_page.is_some_and(|last| self.index >= last)
    }
}

/// An extracted product listing
#[derive(Debug, Clone, PartialEq)]
pub struct ProductRecord {
    /// Stable dedup key, defined by the adapter
    pub id: String,
    pub description: String,
    pub url: String,
    pub price: String,
    pub reviews: u64,
    pub rating: Option<f64>,
    /// Name of the category this record was found under
    pub category: String,
}

impl ProductRecord {
    /// Returns the name of the first required field that is missing
    pub fn missing_field(&self) -> Option<&'static str> {
        if self.id.trim().is_empty() {
            Some("id")
        } else if self.url.trim().is_empty() {
            Some("url")
        } else {
            None
        }
    }

    pub fn to_row(&self) -> RecordRow<'_> {
        RecordRow {
            description: &self.description,
            url: &self.url,
            price: &self.price,
            reviews: self.reviews,
            rating: self.rating.map(format_rating).unwrap_or_default(),
            category: &self.category,
        }
    }
}

fn format_rating(rating: f64) -> String {
    // 4.0 -> "4", 4.25 -> "4.25"
    let s = format!("{:.2}", rating);
    s.trim_end_matches('0').trim_end_matches('.').to_string()
}

/// Tabular output row in `CSV_HEADERS` order
#[derive(Debug, Serialize)]
pub struct RecordRow<'a> {
    #[serde(rename = "Description")]
    pub description: &'a str,
    #[serde(rename = "URL")]
    pub url: &'a str,
    #[serde(rename = "Price")]
    pub price: &'a str,
    #[serde(rename = "Reviews")]
    pub reviews: u64,
    #[serde(rename = "Rating")]
    pub rating: String,
    #[serde(rename = "Category")]
    pub category: &'a str,
}
