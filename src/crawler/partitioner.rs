//! Facet partitioning
//!
//! A category whose result count exceeds the site's per-query cap is split by
//! its facet dimensions, coarsest first, until every slice fits under the cap
//! or the dimensions run out:
//!
//! ```text
//! Sofas (150)
//! ├── Color=Red (80)
//! │   ├── Price=0-100 (50)      leaf
//! │   └── Price=100-200 (30)    leaf
//! └── Color=Blue (70)
//!     └── Price=0-100 (70)      leaf, truncated
//! ```
//!
//! Leaves are sent to the unit workers as soon as they are found.

use crate::catalog::{Category, FacetDimension, FacetSelection, FacetValue, QueryUnit};
use crate::crawler::context::CrawlContext;
use futures::future::{join_all, BoxFuture, FutureExt};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Decision for one node of the facet tree
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step<'d> {
    /// Nothing under this selection
    Empty,

    /// Paginate this selection as-is
    Leaf,

    /// Split by `next`, then continue with `rest`
    Narrow {
        next: &'d FacetDimension,
        rest: &'d [FacetDimension],
    },
}

impl<'d> Step<'d> {
    /// A count equal to the cap is a leaf
    pub fn decide(count: u64, cap: u64, remaining: &'d [FacetDimension]) -> Self {
        if count == 0 {
            return Step::Empty;
        }
        if count <= cap {
            return Step::Leaf;
        }
        match remaining.split_first() {
            Some((next, rest)) => Step::Narrow { next, rest },
            None => Step::Leaf,
        }
    }
}

/// Splits a category into query units that fit under the per-query cap
pub struct FacetPartitioner {
    ctx: Arc<CrawlContext>,
}

impl FacetPartitioner {
    pub fn new(ctx: Arc<CrawlContext>) -> Self {
        Self { ctx }
    }

    /// Walks the facet tree of `category` and sends every leaf to `units`
    ///
    /// # Arguments
    ///
    /// * `category` - Category to partition
    /// * `dimensions` - Facet dimensions in rank order
    /// * `units` - Receives leaves in depth-first order (with concurrency 1)
    ///
    /// # Returns
    ///
    /// The number of leaves emitted. Stops early on cancellation, once the
    /// category limit is reached, or when the receiver goes away.
    pub async fn partition(
        &self,
        category: &Category,
        dimensions: &[FacetDimension],
        units: mpsc::Sender<QueryUnit>,
    ) -> u64 {
        let mut ordered = dimensions.to_vec();
        ordered.sort_by_key(|d| d.rank);

        self.descend(category, FacetSelection::root(), &ordered, &units)
            .await
    }

    fn descend<'a>(
        &'a self,
        category: &'a Category,
        selection: FacetSelection,
        remaining: &'a [FacetDimension],
        units: &'a mpsc::Sender<QueryUnit>,
    ) -> BoxFuture<'a, u64> {
        async move {
            if self.ctx.should_stop(&category.name) || units.is_closed() {
                return 0;
            }

            let adapter = self.ctx.adapter.as_ref();
            let label = format!("count [{} / {}]", category.name, selection);
            let count = {
                let selection = &selection;
                self.ctx
                    .call_or_prune(category, &label, move || {
                        adapter.result_count(category, selection)
                    })
                    .await
            };

            let cap = adapter.per_query_cap();
            match Step::decide(count, cap, remaining) {
                Step::Empty => {
                    tracing::debug!(
                        category = %category.name,
                        selection = %selection,
                        "No results, branch is empty"
                    );
                    0
                }
                Step::Leaf => {
                    let unit = QueryUnit {
                        category: category.clone(),
                        selection,
                        result_count: count,
                    };
                    if unit.is_truncated(cap) {
                        tracing::warn!(
                            category = %category.name,
                            selection = %unit.selection,
                            results = count,
                            cap,
                            "No dimensions left to narrow by, paginating truncated unit"
                        );
                    } else {
                        tracing::info!(
                            category = %category.name,
                            selection = %unit.selection,
                            results = count,
                            "Query unit ready"
                        );
                    }
                    match units.send(unit).await {
                        Ok(()) => 1,
                        Err(_) => 0,
                    }
                }
                Step::Narrow { next, rest } => {
                    tracing::debug!(
                        category = %category.name,
                        selection = %selection,
                        results = count,
                        cap,
                        "Narrowing by {}",
                        next.label
                    );
                    self.narrow(category, selection, next, rest, units).await
                }
            }
        }
        .boxed()
    }

    async fn narrow(
        &self,
        category: &Category,
        selection: FacetSelection,
        dimension: &FacetDimension,
        rest: &[FacetDimension],
        units: &mpsc::Sender<QueryUnit>,
    ) -> u64 {
        let adapter = self.ctx.adapter.as_ref();
        let label = format!("{} values [{} / {}]", dimension.label, category.name, selection);
        let values: Vec<FacetValue> = {
            let selection = &selection;
            self.ctx
                .call_or_prune(category, &label, move || {
                    adapter.facet_values(category, selection, dimension)
                })
                .await
        };

        let children: Vec<FacetSelection> = values
            .iter()
            .filter(|value| {
                if value.count == 0 {
                    tracing::debug!(
                        category = %category.name,
                        selection = %selection,
                        "Skipping {}={} with no results",
                        dimension.label,
                        value.label
                    );
                    return false;
                }
                true
            })
            .map(|value| selection.extended(dimension, value))
            .collect();

        if children.is_empty() {
            tracing::debug!(
                category = %category.name,
                selection = %selection,
                "No {} values with results",
                dimension.label
            );
            return 0;
        }

        if self.ctx.concurrency > 1 {
            let branches = children
                .into_iter()
                .map(|child| self.descend(category, child, rest, units));
            join_all(branches).await.into_iter().sum()
        } else {
            let mut leaves = 0;
            for child in children {
                leaves += self.descend(category, child, rest, units).await;
            }
            leaves
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::scripted::ScriptedAdapter;
    use crate::crawler::RetryPolicy;
    use crate::state::RunState;
    use crate::storage::memory::MemorySink;
    use tokio_util::sync::CancellationToken;

    fn dims(labels: &[&str]) -> Vec<FacetDimension> {
        labels
            .iter()
            .enumerate()
            .map(|(rank, label)| FacetDimension::new(*label, rank))
            .collect()
    }

    fn context(adapter: Arc<ScriptedAdapter>, concurrency: usize) -> Arc<CrawlContext> {
        Arc::new(CrawlContext::new(
            adapter,
            Box::new(MemorySink::new()),
            Arc::new(RunState::new()),
            RetryPolicy::none(),
            0,
            concurrency,
            CancellationToken::new(),
        ))
    }

    async fn leaves(adapter: Arc<ScriptedAdapter>, concurrency: usize) -> Vec<QueryUnit> {
        let ctx = context(Arc::clone(&adapter), concurrency);
        let category = Category::new("Sofas", "sofas");
        let dimensions = dims(&["Color", "Price"]);
        let (tx, mut rx) = mpsc::channel(64);

        let emitted = FacetPartitioner::new(ctx)
            .partition(&category, &dimensions, tx)
            .await;

        let mut units = Vec::new();
        while let Some(unit) = rx.recv().await {
            units.push(unit);
        }
        assert_eq!(emitted as usize, units.len());
        units
    }

    fn sofas() -> ScriptedAdapter {
        ScriptedAdapter::new(60, &["Color", "Price"])
            .count("(all)", 150)
            .values("(all)", "Color", &[("Red", 80), ("Blue", 70)])
            .count("Color=Red", 80)
            .values("Color=Red", "Price", &[("0-100", 50), ("100-200", 30)])
            .count("Color=Red, Price=0-100", 50)
            .count("Color=Red, Price=100-200", 30)
            .count("Color=Blue", 70)
            .values("Color=Blue", "Price", &[("0-100", 70)])
            .count("Color=Blue, Price=0-100", 70)
    }

    #[test]
    fn test_step_decisions() {
        let dimensions = dims(&["Color", "Price"]);

        assert_eq!(Step::decide(0, 60, &dimensions), Step::Empty);
        assert_eq!(Step::decide(59, 60, &dimensions), Step::Leaf);
        assert_eq!(Step::decide(60, 60, &dimensions), Step::Leaf);
        assert_eq!(
            Step::decide(61, 60, &dimensions),
            Step::Narrow {
                next: &dimensions[0],
                rest: &dimensions[1..]
            }
        );
        assert_eq!(Step::decide(61, 60, &[]), Step::Leaf);
    }

    #[tokio::test]
    async fn test_sofas_partition() {
        let units = leaves(Arc::new(sofas()), 1).await;

        let found: Vec<(String, u64)> = units
            .iter()
            .map(|u| (u.selection.to_string(), u.result_count))
            .collect();
        assert_eq!(
            found,
            vec![
                ("Color=Red, Price=0-100".to_string(), 50),
                ("Color=Red, Price=100-200".to_string(), 30),
                ("Color=Blue, Price=0-100".to_string(), 70),
            ]
        );
        assert!(units[2].is_truncated(60));
        assert!(units.iter().all(|u| u.category.name == "Sofas"));
    }

    #[tokio::test]
    async fn test_concurrent_siblings_find_same_leaves() {
        let mut found: Vec<String> = leaves(Arc::new(sofas()), 4)
            .await
            .iter()
            .map(|u| u.selection.to_string())
            .collect();
        found.sort();

        assert_eq!(
            found,
            vec![
                "Color=Blue, Price=0-100".to_string(),
                "Color=Red, Price=0-100".to_string(),
                "Color=Red, Price=100-200".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_root_under_cap_is_single_leaf() {
        let adapter = Arc::new(ScriptedAdapter::new(60, &["Color", "Price"]).count("(all)", 42));
        let units = leaves(Arc::clone(&adapter), 1).await;

        assert_eq!(units.len(), 1);
        assert!(units[0].selection.is_empty());
        assert_eq!(units[0].result_count, 42);
        assert_eq!(adapter.call_count("values"), 0);
    }

    #[tokio::test]
    async fn test_count_equal_to_cap_is_leaf() {
        let adapter = Arc::new(ScriptedAdapter::new(60, &["Color", "Price"]).count("(all)", 60));
        let units = leaves(Arc::clone(&adapter), 1).await;

        assert_eq!(units.len(), 1);
        assert_eq!(adapter.call_count("values"), 0);
    }

    #[tokio::test]
    async fn test_zero_count_values_are_not_visited() {
        let adapter = Arc::new(
            ScriptedAdapter::new(60, &["Color"])
                .count("(all)", 100)
                .values("(all)", "Color", &[("Red", 40), ("Green", 0), ("Blue", 60)])
                .count("Color=Red", 40)
                .count("Color=Blue", 60),
        );
        let units = leaves(Arc::clone(&adapter), 1).await;

        assert_eq!(units.len(), 2);
        assert_eq!(adapter.call_count("count Color=Green"), 0);
    }

    #[tokio::test]
    async fn test_all_zero_values_yield_nothing() {
        let adapter = Arc::new(
            ScriptedAdapter::new(60, &["Color"])
                .count("(all)", 100)
                .values("(all)", "Color", &[("Red", 0), ("Blue", 0)]),
        );
        let units = leaves(Arc::clone(&adapter), 1).await;

        assert!(units.is_empty());
        assert_eq!(adapter.call_count("count"), 1);
    }

    #[tokio::test]
    async fn test_empty_category_yields_nothing() {
        let adapter = Arc::new(ScriptedAdapter::new(60, &["Color"]));
        assert!(leaves(adapter, 1).await.is_empty());
    }

    #[tokio::test]
    async fn test_failed_count_prunes_branch() {
        let adapter = Arc::new(sofas().failing("count Color=Red"));
        let units = leaves(Arc::clone(&adapter), 1).await;

        let found: Vec<String> = units.iter().map(|u| u.selection.to_string()).collect();
        assert_eq!(found, vec!["Color=Blue, Price=0-100".to_string()]);
        assert_eq!(adapter.call_count("values Color=Red"), 0);
    }

    #[tokio::test]
    async fn test_cancelled_run_emits_nothing() {
        let adapter = Arc::new(sofas());
        let ctx = context(Arc::clone(&adapter), 1);
        ctx.cancel.cancel();
        let (tx, mut rx) = mpsc::channel(8);

        let emitted = FacetPartitioner::new(ctx)
            .partition(&Category::new("Sofas", "sofas"), &dims(&["Color", "Price"]), tx)
            .await;

        assert_eq!(emitted, 0);
        assert!(rx.recv().await.is_none());
        assert!(adapter.calls().is_empty());
    }
}
