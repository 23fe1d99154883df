//! Scripted in-memory adapter for engine tests
//!
//! Responses are keyed by the selection's display string ("(all)",
//! "Color=Red", "Color=Red, Price=0-100"). Every call is logged so tests can
//! assert which fetches happened.

use crate::adapter::{AdapterError, ExclusionRules, ExtractError, SiteAdapter};
use crate::catalog::{
    Category, FacetDimension, FacetSelection, FacetValue, Page, ProductRecord, RawRecord,
};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Default)]
pub struct ScriptedAdapter {
    cap: u64,
    dimensions: Vec<String>,
    counts: HashMap<String, u64>,
    values: HashMap<String, Vec<FacetValue>>,
    pages: HashMap<String, Page>,
    clamped: HashMap<String, u32>,
    failing: Vec<String>,
    flaky: Mutex<HashMap<String, u32>>,
    max_pages: Option<u32>,
    pub exclusion: ExclusionRules,
    calls: Mutex<Vec<String>>,
}

impl ScriptedAdapter {
    pub fn new(cap: u64, dimensions: &[&str]) -> Self {
        Self {
            cap,
            dimensions: dimensions.iter().map(|d| d.to_string()).collect(),
            ..Self::default()
        }
    }

    /// Result count for a selection
    pub fn count(mut self, selection: &str, count: u64) -> Self {
        self.counts.insert(selection.to_string(), count);
        self
    }

    /// Values of `dimension` under `selection`, as (label, count)
    pub fn values(mut self, selection: &str, dimension: &str, values: &[(&str, u64)]) -> Self {
        let param = dimension.to_lowercase();
        let values = values
            .iter()
            .map(|(label, count)| FacetValue::new(param.clone(), *label, *label, *count))
            .collect();
        self.values
            .insert(format!("{} {}", selection, dimension), values);
        self
    }

    /// A page of listings with the given ids
    pub fn page(self, selection: &str, index: u32, ids: &[&str]) -> Self {
        let records = ids.iter().map(|id| listing(id, 500)).collect();
        self.page_records(selection, index, records)
    }

    /// A page of arbitrary raw listings
    pub fn page_records(mut self, selection: &str, index: u32, records: Vec<RawRecord>) -> Self {
        self.pages.insert(
            format!("{} #{}", selection, index),
            Page {
                index,
                records,
                last_page: None,
            },
        );
        self
    }

    /// Declares `index` as the last page for every page of `selection`
    pub fn last_page(mut self, selection: &str, index: u32) -> Self {
        let prefix = format!("{} #", selection);
        for (key, page) in self.pages.iter_mut() {
            if key.starts_with(&prefix) {
                page.last_page = Some(index);
            }
        }
        self
    }

    /// Pages of `selection` past `last` answer with page `last` again
    pub fn clamp_pages(mut self, selection: &str, last: u32) -> Self {
        self.clamped.insert(selection.to_string(), last);
        self
    }

    pub fn max_pages(mut self, max: u32) -> Self {
        self.max_pages = Some(max);
        self
    }

    /// Makes the call with this key fail on every attempt
    pub fn failing(mut self, call: &str) -> Self {
        self.failing.push(call.to_string());
        self
    }

    /// Makes the call with this key fail `times` times before succeeding
    pub fn flaky(self, call: &str, times: u32) -> Self {
        self.flaky
            .lock()
            .unwrap()
            .insert(call.to_string(), times);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Number of logged calls whose key starts with `prefix`
    pub fn call_count(&self, prefix: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }

    fn record_call(&self, call: String) -> Result<(), AdapterError> {
        self.calls.lock().unwrap().push(call.clone());

        if self.failing.contains(&call) {
            return Err(AdapterError::Status { url: call, code: 503 });
        }

        let mut flaky = self.flaky.lock().unwrap();
        if let Some(remaining) = flaky.get_mut(&call) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(AdapterError::Status { url: call, code: 502 });
            }
        }
        Ok(())
    }
}

/// A raw listing shaped like the scripted adapter's `extract` expects
pub fn listing(id: &str, reviews: u64) -> RawRecord {
    json!({
        "id": id,
        "name": format!("Product {}", id),
        "url": format!("https://shop.example/pdp/{}", id),
        "price": "99.00",
        "reviews": reviews,
    })
}

#[async_trait]
impl SiteAdapter for ScriptedAdapter {
    fn name(&self) -> &str {
        "scripted"
    }

    fn per_query_cap(&self) -> u64 {
        self.cap
    }

    fn max_pages_per_unit(&self) -> Option<u32> {
        self.max_pages
    }

    async fn category_dimensions(
        &self,
        category: &Category,
    ) -> Result<Vec<FacetDimension>, AdapterError> {
        self.record_call(format!("dimensions {}", category.name))?;
        Ok(self
            .dimensions
            .iter()
            .enumerate()
            .map(|(rank, label)| FacetDimension::new(label.clone(), rank))
            .collect())
    }

    async fn facet_values(
        &self,
        _category: &Category,
        selection: &FacetSelection,
        dimension: &FacetDimension,
    ) -> Result<Vec<FacetValue>, AdapterError> {
        let key = format!("{} {}", selection, dimension.label);
        self.record_call(format!("values {}", key))?;
        Ok(self.values.get(&key).cloned().unwrap_or_default())
    }

    async fn result_count(
        &self,
        _category: &Category,
        selection: &FacetSelection,
    ) -> Result<u64, AdapterError> {
        let key = selection.to_string();
        self.record_call(format!("count {}", key))?;
        Ok(self.counts.get(&key).copied().unwrap_or(0))
    }

    async fn fetch_page(
        &self,
        _category: &Category,
        selection: &FacetSelection,
        page: u32,
    ) -> Result<Page, AdapterError> {
        let key = format!("{} #{}", selection, page);
        self.record_call(format!("page {}", key))?;
        let served = match self.clamped.get(&selection.to_string()) {
            Some(&last) if page > last => format!("{} #{}", selection, last),
            _ => key,
        };
        Ok(self
            .pages
            .get(&served)
            .map(|found| Page {
                index: page,
                ..found.clone()
            })
            .unwrap_or_else(|| Page::empty(page)))
    }

    fn extract(&self, raw: &RawRecord, category: &Category) -> Result<ProductRecord, ExtractError> {
        let text = |field: &str| {
            raw.get(field)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };
        let reviews = match raw.get("reviews") {
            None => 0,
            Some(value) => value.as_u64().ok_or_else(|| ExtractError::InvalidField {
                field: "reviews",
                value: value.to_string(),
            })?,
        };

        Ok(ProductRecord {
            id: text("id"),
            description: text("name"),
            url: text("url"),
            price: text("price"),
            reviews,
            rating: raw.get("rating").and_then(Value::as_f64),
            category: category.name.clone(),
        })
    }

    fn excludes(&self, record: &ProductRecord) -> bool {
        self.exclusion.excludes(record)
    }
}
