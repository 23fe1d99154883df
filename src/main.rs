//! Facet-Harvest main entry point
//!
//! This is the command-line interface for the Facet-Harvest catalog crawler.

use anyhow::{bail, Context};
use clap::Parser;
use facet_harvest::config::{load_config_with_hash, validate, Config, SiteConfig};
use facet_harvest::crawler::{CrawlEngine, EngineSettings};
use facet_harvest::output::{
    generate_markdown_summary, load_statistics, print_statistics, print_summary,
};
use facet_harvest::storage::{CsvSink, FanoutSink, RecordSink, RunStatus, SqliteSink};
use facet_harvest::{HarvestError, JsonApiAdapter, RunState};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Facet-Harvest: a faceted catalog crawler
///
/// Facet-Harvest splits capped catalog searches into facet combinations small
/// enough to paginate completely, then writes every product it finds to CSV
/// exactly once.
#[derive(Parser, Debug)]
#[command(name = "facet-harvest")]
#[command(version = "1.0.0")]
#[command(about = "A faceted catalog crawler", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Site to harvest (required when several are configured)
    #[arg(long)]
    site: Option<String>,

    /// Records per category (0 = unlimited), overrides the config file
    #[arg(long)]
    limit: Option<u64>,

    /// Parallel query units and adapter calls, overrides the config file
    #[arg(long)]
    concurrency: Option<u32>,

    /// Stop gracefully after this many seconds, overrides the config file
    #[arg(long, value_name = "SECS")]
    timeout: Option<u64>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Continue from the records stored in the database, appending to the CSV
    #[arg(long, conflicts_with = "fresh")]
    resume: bool,

    /// Start over, truncating the CSV (default behavior)
    #[arg(long, conflicts_with = "resume")]
    fresh: bool,

    /// Validate config and show what would be harvested without fetching anything
    #[arg(long, conflicts_with = "stats")]
    dry_run: bool,

    /// Show statistics from the database and exit
    #[arg(long, conflicts_with = "dry_run")]
    stats: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (mut config, config_hash) = match load_config_with_hash(&cli.config) {
        Ok((cfg, hash)) => {
            tracing::info!("Configuration loaded successfully (hash: {})", hash);
            (cfg, hash)
        }
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    apply_overrides(&mut config, &cli)?;
    let site = select_site(&config, cli.site.as_deref())?.clone();

    if cli.dry_run {
        handle_dry_run(&config, &site);
    } else if cli.stats {
        handle_stats(&config, &site)?;
    } else {
        let resume = cli.resume && !cli.fresh;
        handle_harvest(&config, site, &config_hash, resume).await?;
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("facet_harvest=info,warn"),
            1 => EnvFilter::new("facet_harvest=debug,info"),
            2 => EnvFilter::new("facet_harvest=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Applies command-line overrides and re-validates the result
fn apply_overrides(config: &mut Config, cli: &Cli) -> Result<(), HarvestError> {
    if let Some(limit) = cli.limit {
        config.crawler.limit_per_category = limit;
    }
    if let Some(concurrency) = cli.concurrency {
        config.crawler.concurrency = concurrency;
    }
    if let Some(timeout) = cli.timeout {
        config.crawler.run_timeout_secs = timeout;
    }
    validate(config)?;
    Ok(())
}

/// Picks the site named on the command line, or the only configured one
fn select_site<'c>(config: &'c Config, name: Option<&str>) -> Result<&'c SiteConfig, HarvestError> {
    match name {
        Some(name) => config.site(name).ok_or_else(|| HarvestError::UnknownSite {
            name: name.to_string(),
            available: config.site_names(),
        }),
        None if config.sites.len() == 1 => Ok(&config.sites[0]),
        None => Err(HarvestError::UnknownSite {
            name: "(none given, use --site)".to_string(),
            available: config.site_names(),
        }),
    }
}

/// Handles the --dry-run mode: shows the validated plan
fn handle_dry_run(config: &Config, site: &SiteConfig) {
    println!("=== Facet-Harvest Dry Run ===\n");

    println!("Crawler Configuration:");
    println!("  Limit per category: {}", config.crawler.limit_per_category);
    println!("  Concurrency: {}", config.crawler.concurrency);
    println!(
        "  Retries: {} ({:?}, {}ms..{}ms)",
        config.crawler.max_retries,
        config.crawler.backoff,
        config.crawler.retry_delay_ms,
        config.crawler.max_retry_delay_ms
    );
    if config.crawler.run_timeout_secs > 0 {
        println!("  Run timeout: {}s", config.crawler.run_timeout_secs);
    }

    println!("\nUser Agent: {}", config.user_agent.header_value());

    println!("\nOutput:");
    println!("  CSV: {}", config.output.csv_path);
    if let Some(db) = &config.output.database_path {
        println!("  Database: {}", db);
    }
    if let Some(summary) = &config.output.summary_path {
        println!("  Summary: {}", summary);
    }

    println!("\nSite: {} ({})", site.name, site.base_url);
    println!("  Per-query cap: {}", site.per_query_cap);
    println!(
        "  Dimensions: {}",
        site.dimensions
            .iter()
            .map(|d| d.label.as_str())
            .collect::<Vec<_>>()
            .join(" > ")
    );

    println!("\nCategories ({}):", site.categories.len());
    for category in &site.categories {
        println!("  - {} ({})", category.name, category.reference);
    }

    println!("\n✓ Configuration is valid");
}

/// Handles the --stats mode: shows statistics from the database
fn handle_stats(config: &Config, site: &SiteConfig) -> anyhow::Result<()> {
    let Some(db_path) = &config.output.database_path else {
        bail!("--stats requires output.database-path in the configuration");
    };

    println!("Database: {}\n", db_path);

    let store = SqliteSink::new(Path::new(db_path), &site.name)
        .with_context(|| format!("Failed to open database {}", db_path))?;
    let stats = load_statistics(&store)?;
    print_statistics(&stats);

    Ok(())
}

/// Handles the main harvest operation
async fn handle_harvest(
    config: &Config,
    site: SiteConfig,
    config_hash: &str,
    resume: bool,
) -> anyhow::Result<()> {
    if site.categories.is_empty() {
        return Err(HarvestError::NoCategories(site.name.clone()).into());
    }

    let csv_path = Path::new(&config.output.csv_path);
    let csv = CsvSink::create(csv_path, resume)
        .with_context(|| format!("Failed to open {}", csv_path.display()))?;

    let mut ledger = match &config.output.database_path {
        Some(db_path) => Some(
            SqliteSink::new(Path::new(db_path), &site.name)
                .with_context(|| format!("Failed to open database {}", db_path))?,
        ),
        None if resume => bail!("--resume requires output.database-path in the configuration"),
        None => None,
    };

    let history = match ledger.as_mut() {
        Some(store) => Some(store.begin_run(config_hash, resume)?),
        None => None,
    };

    let state = match history {
        Some(history) if resume => {
            tracing::info!(
                "Resuming with {} previously written records",
                history.seen.len()
            );
            RunState::with_history(history.seen, history.counts)
        }
        _ => {
            tracing::info!("Starting fresh harvest");
            RunState::new()
        }
    };

    let sink: Box<dyn RecordSink> = match ledger.as_ref() {
        Some(store) => {
            if let Some(run_id) = store.run_id() {
                tracing::info!("Recording run {} in database", run_id);
            }
            Box::new(FanoutSink::new().with(csv).with(store.writer()?))
        }
        None => Box::new(csv),
    };

    let categories = site.categories.clone();
    let adapter = JsonApiAdapter::new(site, &config.user_agent)?;
    let engine = CrawlEngine::new(
        Arc::new(adapter),
        sink,
        EngineSettings::from_config(&config.crawler),
    )
    .with_state(state);

    let cancel = engine.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, stopping after in-flight records");
            cancel.cancel();
        }
    });

    let result = engine.run(&categories).await;

    if let Some(store) = ledger.as_mut() {
        let status = match &result {
            Ok(summary) if summary.interrupted => RunStatus::Interrupted,
            Ok(_) => RunStatus::Completed,
            Err(_) => RunStatus::Failed,
        };
        if let Err(e) = store.finish_run(status) {
            tracing::error!("Failed to record run status: {}", e);
        }
    }

    let summary = match result {
        Ok(summary) => summary,
        Err(e) => {
            tracing::error!("Harvest failed: {}", e);
            return Err(e.into());
        }
    };

    print_summary(&summary);

    if let Some(path) = &config.output.summary_path {
        generate_markdown_summary(&summary, Path::new(path))
            .with_context(|| format!("Failed to write summary {}", path))?;
        println!("\n✓ Summary written to: {}", path);
    }

    Ok(())
}
