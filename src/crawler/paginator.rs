//! Sequential pagination of one query unit

use crate::catalog::{Page, QueryUnit, RawRecord};
use crate::crawler::context::CrawlContext;
use std::collections::HashSet;

/// Walks the pages of a query unit in order
///
/// Pagination ends at the first empty page, at a page the site declares as
/// the last one, at the adapter's page ceiling, or as soon as the run is
/// cancelled or the category limit is reached. A page fetch that still fails
/// after retries counts as empty.
///
/// Sites that answer an out-of-range page with an earlier page again are
/// caught two ways: a page holding no listing not already seen in this unit
/// ends the unit, and a unit never fetches more non-empty pages than the
/// listings its count reported.
pub struct Paginator<'a> {
    ctx: &'a CrawlContext,
    unit: &'a QueryUnit,
    next: Option<u32>,
    fetched: u32,
    filled: u64,
    listings: HashSet<String>,
}

impl<'a> Paginator<'a> {
    pub fn new(ctx: &'a CrawlContext, unit: &'a QueryUnit) -> Self {
        Self {
            ctx,
            unit,
            next: Some(ctx.adapter.first_page_index()),
            fetched: 0,
            filled: 0,
            listings: HashSet::new(),
        }
    }

    /// Pages fetched so far, including the final empty one
    pub fn pages_fetched(&self) -> u32 {
        self.fetched
    }

    /// Fetches the next page, or returns `None` when pagination is over
    pub async fn next_page(&mut self) -> Option<Page> {
        let index = self.next?;
        let unit = self.unit;
        let category = &unit.category;

        if self.ctx.should_stop(&category.name) {
            self.next = None;
            return None;
        }

        if self.filled >= unit.result_count.max(1) {
            tracing::debug!(
                category = %category.name,
                selection = %unit.selection,
                "{} pages already cover the reported {} results",
                self.filled,
                unit.result_count
            );
            self.next = None;
            return None;
        }

        if let Some(max) = self.ctx.adapter.max_pages_per_unit() {
            if self.fetched >= max {
                tracing::debug!(
                    category = %category.name,
                    selection = %unit.selection,
                    "Reached page ceiling of {}",
                    max
                );
                self.next = None;
                return None;
            }
        }

        let adapter = self.ctx.adapter.as_ref();
        let selection = &unit.selection;
        let label = format!("page {} [{} / {}]", index, category.name, selection);
        let page: Page = self
            .ctx
            .call_or_prune(category, &label, move || {
                adapter.fetch_page(category, selection, index)
            })
            .await;
        self.fetched += 1;

        if page.is_empty() {
            tracing::debug!(
                category = %category.name,
                selection = %selection,
                "Page {} is empty, unit finished",
                index
            );
            self.next = None;
            return None;
        }

        if !self.adds_listings(&page) {
            tracing::debug!(
                category = %category.name,
                selection = %selection,
                "Page {} repeats listings already seen, unit finished",
                index
            );
            self.next = None;
            return None;
        }

        self.filled += 1;
        self.ctx.state.note_page(&category.name);
        self.next = if page.is_last() {
            None
        } else {
            index.checked_add(1)
        };
        Some(page)
    }

    /// Records the page's listings, true if any of them is new to this unit
    fn adds_listings(&mut self, page: &Page) -> bool {
        let mut added = false;
        for raw in &page.records {
            let key = self.listing_key(raw);
            added |= self.listings.insert(key);
        }
        added
    }

    /// Product id when the listing extracts, otherwise the raw listing itself
    fn listing_key(&self, raw: &RawRecord) -> String {
        match self.ctx.adapter.extract(raw, &self.unit.category) {
            Ok(record) if !record.id.is_empty() => record.id,
            _ => raw.to_string(),
        }
    }
}
