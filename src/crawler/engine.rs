//! Crawl orchestration
//!
//! For each category the engine asks the adapter for its facet dimensions,
//! runs the partitioner and the unit workers side by side, and reports how
//! the category ended. Query units flow from the partitioner to the workers
//! over a bounded channel; at most `concurrency` units are paginated at once.

use crate::adapter::SiteAdapter;
use crate::catalog::{Category, FacetDimension, QueryUnit};
use crate::config::CrawlerConfig;
use crate::crawler::context::{CrawlContext, Disposition};
use crate::crawler::{FacetPartitioner, Paginator, RetryPolicy};
use crate::output::{CategoryReport, RunSummary};
use crate::state::{CategoryOutcome, RunState};
use crate::storage::RecordSink;
use crate::HarvestError;
use chrono::Utc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Engine knobs, usually taken from `[crawler]`
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Records per category before it stops (0 = unlimited)
    pub limit_per_category: u64,

    /// Units paginated in parallel and adapter calls in flight
    pub concurrency: usize,

    pub retry: RetryPolicy,

    /// Cancel the run after this long
    pub run_timeout: Option<Duration>,
}

impl EngineSettings {
    pub fn from_config(config: &CrawlerConfig) -> Self {
        Self {
            limit_per_category: config.limit_per_category,
            concurrency: config.concurrency.max(1) as usize,
            retry: RetryPolicy::from_config(config),
            run_timeout: (config.run_timeout_secs > 0)
                .then(|| Duration::from_secs(config.run_timeout_secs)),
        }
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self::from_config(&CrawlerConfig::default())
    }
}

/// Runs a harvest over a list of categories for one site
pub struct CrawlEngine {
    adapter: Arc<dyn SiteAdapter>,
    sink: Box<dyn RecordSink>,
    settings: EngineSettings,
    state: Arc<RunState>,
    cancel: CancellationToken,
}

impl CrawlEngine {
    pub fn new(
        adapter: Arc<dyn SiteAdapter>,
        sink: Box<dyn RecordSink>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            adapter,
            sink,
            settings,
            state: Arc::new(RunState::new()),
            cancel: CancellationToken::new(),
        }
    }

    /// Starts from existing state, e.g. history loaded for `--resume`
    pub fn with_state(mut self, state: RunState) -> Self {
        self.state = Arc::new(state);
        self
    }

    /// Token that stops the run gracefully when cancelled
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Shared run state, readable while the run is in progress
    pub fn state(&self) -> Arc<RunState> {
        Arc::clone(&self.state)
    }

    /// Harvests every category in order
    ///
    /// # Arguments
    ///
    /// * `categories` - Categories to traverse, in order
    ///
    /// # Returns
    ///
    /// * `Ok(RunSummary)` - The run finished or was stopped gracefully
    /// * `Err(HarvestError)` - No categories were given, or the sink failed
    pub async fn run(self, categories: &[Category]) -> Result<RunSummary, HarvestError> {
        let site = self.adapter.name().to_string();
        if categories.is_empty() {
            return Err(HarvestError::NoCategories(site));
        }

        let started_at = Utc::now();
        let start = Instant::now();

        let ctx = Arc::new(CrawlContext::new(
            self.adapter,
            self.sink,
            self.state,
            self.settings.retry,
            self.settings.limit_per_category,
            self.settings.concurrency,
            self.cancel.clone(),
        ));

        let timer = self.settings.run_timeout.map(|timeout| {
            let cancel = self.cancel.clone();
            tokio::spawn(async move {
                tokio::select! {
                    _ = tokio::time::sleep(timeout) => {
                        tracing::warn!("Run timeout of {:?} reached, stopping", timeout);
                        cancel.cancel();
                    }
                    _ = cancel.cancelled() => {}
                }
            })
        });

        tracing::info!(
            "Harvesting {} categories from {} (limit {}, concurrency {})",
            categories.len(),
            site,
            ctx.limit,
            ctx.concurrency
        );

        let mut reports = Vec::with_capacity(categories.len());
        for category in categories {
            let leaves = if ctx.cancel.is_cancelled() {
                0
            } else {
                crawl_category(&ctx, category).await
            };

            let outcome = if ctx.limit_reached(&category.name) {
                CategoryOutcome::LimitReached
            } else if ctx.cancel.is_cancelled() {
                CategoryOutcome::Interrupted
            } else {
                CategoryOutcome::Complete
            };

            let tally = ctx.state.tally(&category.name);
            tracing::info!(
                category = %category.name,
                outcome = %outcome,
                written = tally.written,
                total = tally.total(),
                "Category finished"
            );

            reports.push(CategoryReport {
                name: category.name.clone(),
                outcome,
                leaves,
                tally,
            });
        }

        if let Some(timer) = timer {
            timer.abort();
        }

        if let Err(e) = ctx.flush() {
            tracing::error!("Failed to flush record sink: {}", e);
            return Err(e.into());
        }
        if let Some(e) = ctx.take_storage_failure() {
            return Err(e.into());
        }

        let summary = RunSummary {
            site,
            started_at,
            finished_at: Utc::now(),
            duration: start.elapsed(),
            interrupted: ctx.cancel.is_cancelled(),
            categories: reports,
        };

        tracing::info!(
            "Harvest finished: {} records written in {:.1}s{}",
            summary.total_written(),
            summary.duration.as_secs_f64(),
            if summary.interrupted {
                " (interrupted)"
            } else {
                ""
            }
        );

        Ok(summary)
    }
}

/// Traverses one category; returns the number of query units found
async fn crawl_category(ctx: &Arc<CrawlContext>, category: &Category) -> u64 {
    if ctx.limit_reached(&category.name) {
        tracing::info!(
            category = %category.name,
            "Limit already reached by earlier runs, skipping"
        );
        return 0;
    }

    tracing::info!(category = %category.name, "Starting category");

    let adapter = ctx.adapter.as_ref();
    let label = format!("dimensions [{}]", category.name);
    let dimensions: Vec<FacetDimension> = ctx
        .call_or_prune(category, &label, move || adapter.category_dimensions(category))
        .await;

    let (units_tx, units_rx) = mpsc::channel(ctx.concurrency * 2);
    let partitioner = FacetPartitioner::new(Arc::clone(ctx));

    let (leaves, ()) = tokio::join!(
        partitioner.partition(category, &dimensions, units_tx),
        consume_units(ctx, units_rx)
    );
    leaves
}

/// Paginates units as they arrive, `concurrency` at a time
async fn consume_units(ctx: &Arc<CrawlContext>, mut units: mpsc::Receiver<QueryUnit>) {
    let workers = Arc::new(Semaphore::new(ctx.concurrency));
    let mut tasks = JoinSet::new();

    while let Some(unit) = units.recv().await {
        if ctx.should_stop(&unit.category.name) {
            continue;
        }

        let permit = match Arc::clone(&workers).acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => break,
        };
        let ctx = Arc::clone(ctx);
        tasks.spawn(async move {
            let _permit = permit;
            process_unit(&ctx, &unit).await;
        });
    }

    while let Some(result) = tasks.join_next().await {
        if let Err(e) = result {
            tracing::error!("Unit worker panicked: {}", e);
        }
    }
}

/// Paginates one unit and offers every listing to the sink
async fn process_unit(ctx: &CrawlContext, unit: &QueryUnit) {
    let category = &unit.category;
    if ctx.should_stop(&category.name) {
        return;
    }
    ctx.state.note_unit(&category.name);

    tracing::info!(
        category = %category.name,
        selection = %unit.selection,
        results = unit.result_count,
        "Paginating query unit"
    );

    let mut paginator = Paginator::new(ctx, unit);
    'pages: while let Some(page) = paginator.next_page().await {
        let mut written = 0;
        for raw in &page.records {
            if ctx.should_stop(&category.name) {
                break 'pages;
            }
            match ctx.accept(raw, category) {
                Disposition::Written => written += 1,
                Disposition::OverLimit | Disposition::Failed => break 'pages,
                _ => {}
            }
        }

        tracing::info!(
            category = %category.name,
            selection = %unit.selection,
            page = page.index,
            written,
            total = ctx.state.category_total(&category.name),
            "Page processed"
        );
    }
}
