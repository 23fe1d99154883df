//! Integration tests for the harvest pipeline
//!
//! These tests use wiremock to serve a small faceted catalog and run
//! `JsonApiAdapter` + `CrawlEngine` + the CSV/SQLite sinks end-to-end.

use facet_harvest::config::{load_config, Config};
use facet_harvest::crawler::{CrawlEngine, EngineSettings};
use facet_harvest::storage::{CsvSink, FanoutSink, RecordSink, RunStatus, SqliteSink};
use facet_harvest::{CategoryOutcome, JsonApiAdapter, RunState, RunSummary};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

/// A sofa catalog with 150 results and a per-query cap of 60
///
/// ```text
/// Sofas (150)
/// ├── Red (80)  -> price 0-100 (50), 100-200 (30)
/// ├── Blue (70) -> price 0-100 (70, still over the cap)
/// └── Green (0)
/// ```
struct SofaCatalog;

impl SofaCatalog {
    fn count(color: Option<&str>, price: Option<&str>) -> u64 {
        match (color, price) {
            (None, None) => 150,
            (Some("10"), None) => 80,
            (Some("10"), Some("0:100")) => 50,
            (Some("10"), Some("100:200")) => 30,
            (Some("11"), None) => 70,
            (Some("11"), Some("0:100")) => 70,
            _ => 0,
        }
    }

    fn facets(color: Option<&str>) -> Value {
        let colors = json!({
            "displayName": "Color",
            "attributeGroupId": 1,
            "values": [
                {"attributeId": 10, "displayName": "Red", "count": 80},
                {"attributeId": 11, "displayName": "Blue", "count": 70},
                {"attributeId": 12, "displayName": "Green", "count": 0}
            ]
        });
        let prices = match color {
            Some("10") => json!([
                {"min": 0, "max": 100, "count": 50},
                {"min": 100, "max": 200, "count": 30}
            ]),
            Some("11") => json!([{"min": 0, "max": 100, "count": 70}]),
            _ => json!([
                {"min": 0, "max": 100, "count": 120},
                {"min": 100, "max": 200, "count": 30}
            ]),
        };
        json!([colors, {"displayName": "Price", "values": prices}])
    }

    fn products(color: Option<&str>, price: Option<&str>, page: u32) -> Vec<Value> {
        let listing = |slug: &str, name: &str, reviews: u64| {
            json!({
                "name": name,
                "urls": {"productPage": format!("/pdp/{}", slug)},
                "pricing": {"base": {"price": "$199.99"}},
                "reviews": {"count": reviews, "rating": 4.5}
            })
        };

        match (color, price, page) {
            (Some("10"), Some("0:100"), 1) => vec![
                listing("red-sofa-R1", "Red Sofa, \"Classic\"", 120),
                listing("red-loveseat-R2", "Red Loveseat", 40),
            ],
            (Some("10"), Some("0:100"), 2) => vec![listing("red-futon-R3", "Red Futon", 7)],
            (Some("10"), Some("100:200"), 1) => vec![
                listing("red-sofa-R1", "Red Sofa, \"Classic\"", 120),
                listing("red-sectional-R4", "Red Sectional", 0),
                listing("shop-our-app-A1", "Our App", 500),
            ],
            (Some("11"), Some("0:100"), 1) => vec![
                listing("blue-sofa-B1", "Blue Sofa\nwith ottoman", 15),
                listing("blue-chaise-B2", "Blue Chaise", 3),
            ],
            _ => Vec::new(),
        }
    }
}

impl Respond for SofaCatalog {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let query: HashMap<String, String> = request.url.query_pairs().into_owned().collect();
        if query.get("category").map(String::as_str) != Some("sofas") {
            return ResponseTemplate::new(404);
        }

        let color = query.get("a1").map(String::as_str);
        let price = query.get("price").map(String::as_str);
        let page = query.get("page").and_then(|p| p.parse::<u32>().ok());

        let body = match page {
            Some(page) => json!({"pageData": {
                "products": SofaCatalog::products(color, price, page),
                "lastPage": 5
            }}),
            None => json!({"pageData": {
                "resultCount": SofaCatalog::count(color, price),
                "facets": SofaCatalog::facets(color)
            }}),
        };
        ResponseTemplate::new(200).set_body_json(body)
    }
}

/// Writes a configuration pointing at `base_url` and loads it
fn load_test_config(dir: &Path, base_url: &str) -> Config {
    let content = format!(
        r#"
[crawler]
limit-per-category = 0
concurrency = 1
max-retries = 2
retry-delay-ms = 1
max-retry-delay-ms = 5
backoff = "fixed"

[user-agent]
crawler-name = "TestBot"
crawler-version = "1.0.0"
contact-url = "https://example.com/contact"
contact-email = "test@example.com"

[output]
csv-path = "{csv}"
database-path = "{db}"

[[site]]
name = "furniture"
base-url = "{base_url}/search"
per-query-cap = 60
max-pages = 10
facets = "/pageData/facets"
result-count = "/pageData/resultCount"
products = "/pageData/products"
last-page = "/pageData/lastPage"

[[site.dimension]]
label = "Color"
kind = "attribute"

[[site.dimension]]
label = "Price"
kind = "range"
param = "price"

[site.fields]
id-from-url = true
description = "/name"
url = "/urls/productPage"
url-prefix = "{base_url}"
price = "/pricing/base/price"
reviews = "/reviews/count"
rating = "/reviews/rating"

[site.exclusion]
min-reviews = 1
excluded-descriptions = ["Our App"]
url-must-contain = "/pdp/"

[[site.category]]
name = "Sofas"
reference = "sofas"
"#,
        csv = dir.join("products.csv").display(),
        db = dir.join("harvest.db").display(),
    );

    let config_path = dir.join("harvest.toml");
    let mut file = std::fs::File::create(&config_path).unwrap();
    file.write_all(content.as_bytes()).unwrap();

    load_config(&config_path).unwrap()
}

async fn mount_catalog(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(SofaCatalog)
        .mount(server)
        .await;
}

async fn harvest(config: &Config, sink: Box<dyn RecordSink>, state: RunState) -> RunSummary {
    let site = config.sites[0].clone();
    let categories = site.categories.clone();
    let adapter = JsonApiAdapter::new(site, &config.user_agent).unwrap();

    CrawlEngine::new(
        Arc::new(adapter),
        sink,
        EngineSettings::from_config(&config.crawler),
    )
    .with_state(state)
    .run(&categories)
    .await
    .unwrap()
}

/// Harvests into CSV plus the database the way the CLI does; returns the
/// summary and the number of stored records
async fn harvest_with_ledger(
    config: &Config,
    csv_path: &Path,
    db_path: &Path,
    resume: bool,
) -> (RunSummary, u64) {
    let mut ledger = SqliteSink::new(db_path, "furniture").unwrap();
    let history = ledger.begin_run("hash", resume).unwrap();
    let sink = FanoutSink::new()
        .with(CsvSink::create(csv_path, resume).unwrap())
        .with(ledger.writer().unwrap());

    let summary = harvest(
        config,
        Box::new(sink),
        RunState::with_history(history.seen, history.counts),
    )
    .await;
    ledger.finish_run(RunStatus::Completed).unwrap();
    let stored = ledger.count_records().unwrap();
    (summary, stored)
}

fn read_csv(path: &Path) -> Vec<Vec<String>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .from_path(path)
        .unwrap();
    reader
        .records()
        .map(|r| r.unwrap().iter().map(String::from).collect())
        .collect()
}

#[tokio::test]
async fn test_full_harvest_to_csv() {
    let server = MockServer::start().await;
    mount_catalog(&server).await;
    let dir = TempDir::new().unwrap();
    let config = load_test_config(dir.path(), &server.uri());
    let csv_path = dir.path().join("products.csv");

    let sink = CsvSink::create(&csv_path, false).unwrap();
    let summary = harvest(&config, Box::new(sink), RunState::new()).await;

    let rows = read_csv(&csv_path);
    assert_eq!(
        rows[0],
        vec!["Description", "URL", "Price", "Reviews", "Rating", "Category"]
    );

    let descriptions: Vec<&str> = rows[1..].iter().map(|r| r[0].as_str()).collect();
    assert_eq!(
        descriptions,
        vec![
            "Red Sofa, \"Classic\"",
            "Red Loveseat",
            "Red Futon",
            "Blue Sofa\nwith ottoman",
            "Blue Chaise",
        ]
    );

    let first = &rows[1];
    assert_eq!(first[1], format!("{}/pdp/red-sofa-R1", server.uri()));
    assert_eq!(first[2], "199.99");
    assert_eq!(first[3], "120");
    assert_eq!(first[4], "4.5");
    assert_eq!(first[5], "Sofas");

    let report = summary.category("Sofas").unwrap();
    assert_eq!(report.outcome, CategoryOutcome::Complete);
    assert_eq!(report.leaves, 3);
    assert_eq!(report.tally.written, 5);
    assert_eq!(report.tally.duplicates, 1);
    assert_eq!(report.tally.excluded, 2);
    assert!(!summary.interrupted);
}

#[tokio::test]
async fn test_zero_count_facet_is_never_queried() {
    let server = MockServer::start().await;
    mount_catalog(&server).await;
    let dir = TempDir::new().unwrap();
    let config = load_test_config(dir.path(), &server.uri());

    let sink = CsvSink::create(&dir.path().join("products.csv"), false).unwrap();
    harvest(&config, Box::new(sink), RunState::new()).await;

    let requests = server.received_requests().await.unwrap();
    assert!(!requests.is_empty());
    assert!(requests
        .iter()
        .all(|r| !r.url.query_pairs().any(|(k, v)| k == "a1" && v == "12")));
}

#[tokio::test]
async fn test_limit_per_category() {
    let server = MockServer::start().await;
    mount_catalog(&server).await;
    let dir = TempDir::new().unwrap();
    let mut config = load_test_config(dir.path(), &server.uri());
    config.crawler.limit_per_category = 2;
    let csv_path = dir.path().join("products.csv");

    let sink = CsvSink::create(&csv_path, false).unwrap();
    let summary = harvest(&config, Box::new(sink), RunState::new()).await;

    assert_eq!(read_csv(&csv_path).len(), 3);
    assert_eq!(
        summary.category("Sofas").unwrap().outcome,
        CategoryOutcome::LimitReached
    );
}

#[tokio::test]
async fn test_rate_limited_call_is_retried() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/search"))
        .and(query_param("category", "sofas"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "1"))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    mount_catalog(&server).await;

    let dir = TempDir::new().unwrap();
    let config = load_test_config(dir.path(), &server.uri());
    let csv_path = dir.path().join("products.csv");

    let sink = CsvSink::create(&csv_path, false).unwrap();
    let summary = harvest(&config, Box::new(sink), RunState::new()).await;

    assert_eq!(summary.total_written(), 5);
    assert_eq!(summary.total_pruned(), 0);
}

#[tokio::test]
async fn test_failing_site_prunes_without_failing_run() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let config = load_test_config(dir.path(), &server.uri());
    let csv_path = dir.path().join("products.csv");

    let sink = CsvSink::create(&csv_path, false).unwrap();
    let summary = harvest(&config, Box::new(sink), RunState::new()).await;

    // max-retries = 2: three attempts at the root count, then the branch is pruned
    assert_eq!(server.received_requests().await.unwrap().len(), 3);
    assert_eq!(summary.total_written(), 0);
    assert_eq!(summary.total_pruned(), 1);
    assert_eq!(read_csv(&csv_path).len(), 1);
}

#[tokio::test]
async fn test_concurrent_harvest_matches_sequential() {
    let server = MockServer::start().await;
    mount_catalog(&server).await;
    let dir = TempDir::new().unwrap();
    let config = load_test_config(dir.path(), &server.uri());
    let mut concurrent = config.clone();
    concurrent.crawler.concurrency = 4;
    let csv_path = dir.path().join("products.csv");

    let sink = CsvSink::create(&csv_path, false).unwrap();
    let summary = harvest(&concurrent, Box::new(sink), RunState::new()).await;

    let mut descriptions: Vec<String> = read_csv(&csv_path)[1..]
        .iter()
        .map(|r| r[0].clone())
        .collect();
    descriptions.sort();
    assert_eq!(descriptions.len(), 5);
    assert_eq!(descriptions[0], "Blue Chaise");
    assert_eq!(summary.total_duplicates(), 1);
}

#[tokio::test]
async fn test_resume_from_database() {
    let server = MockServer::start().await;
    mount_catalog(&server).await;
    let dir = TempDir::new().unwrap();
    let mut config = load_test_config(dir.path(), &server.uri());
    let csv_path = dir.path().join("products.csv");
    let db_path = dir.path().join("harvest.db");

    // First run stops at the limit
    config.crawler.limit_per_category = 2;
    {
        let mut ledger = SqliteSink::new(&db_path, "furniture").unwrap();
        ledger.create_run("hash-1").unwrap();
        let sink = FanoutSink::new()
            .with(CsvSink::create(&csv_path, false).unwrap())
            .with(ledger.writer().unwrap());

        let summary = harvest(&config, Box::new(sink), RunState::new()).await;
        assert_eq!(summary.total_written(), 2);
        ledger.finish_run(RunStatus::Completed).unwrap();
    }

    // Second run resumes with the limit lifted
    config.crawler.limit_per_category = 0;
    let mut ledger = SqliteSink::new(&db_path, "furniture").unwrap();
    let history = ledger.load_history().unwrap();
    assert_eq!(history.seen.len(), 2);
    assert_eq!(history.counts.get("Sofas"), Some(&2));

    ledger.create_run("hash-2").unwrap();
    let sink = FanoutSink::new()
        .with(CsvSink::create(&csv_path, true).unwrap())
        .with(ledger.writer().unwrap());
    let summary = harvest(
        &config,
        Box::new(sink),
        RunState::with_history(history.seen, history.counts),
    )
    .await;
    ledger.finish_run(RunStatus::Completed).unwrap();

    let report = summary.category("Sofas").unwrap();
    assert_eq!(report.tally.resumed, 2);
    assert_eq!(report.tally.written, 3);

    let rows = read_csv(&csv_path);
    assert_eq!(rows.len(), 6);
    assert_eq!(rows.iter().filter(|r| r[0] == "Description").count(), 1);

    assert_eq!(ledger.count_records().unwrap(), 5);
    assert_eq!(ledger.count_runs().unwrap(), 2);
}

#[tokio::test]
async fn test_fresh_run_then_resume_keeps_csv_complete() {
    let server = MockServer::start().await;
    mount_catalog(&server).await;
    let dir = TempDir::new().unwrap();
    let mut config = load_test_config(dir.path(), &server.uri());
    let csv_path = dir.path().join("products.csv");
    let db_path = dir.path().join("harvest.db");

    // A complete run, then a fresh run that stops after two records
    let (summary, stored) = harvest_with_ledger(&config, &csv_path, &db_path, false).await;
    assert_eq!(summary.total_written(), 5);
    assert_eq!(stored, 5);

    config.crawler.limit_per_category = 2;
    let (summary, stored) = harvest_with_ledger(&config, &csv_path, &db_path, false).await;
    assert_eq!(summary.total_written(), 2);
    assert_eq!(stored, 2);
    assert_eq!(read_csv(&csv_path).len(), 3);

    // Resuming writes everything the fresh run had not reached
    config.crawler.limit_per_category = 0;
    let (summary, stored) = harvest_with_ledger(&config, &csv_path, &db_path, true).await;
    let report = summary.category("Sofas").unwrap();
    assert_eq!(report.tally.resumed, 2);
    assert_eq!(report.tally.written, 3);
    assert_eq!(stored, 5);

    let rows = read_csv(&csv_path);
    assert_eq!(rows.len(), 6);
    let mut urls: Vec<&str> = rows[1..].iter().map(|r| r[1].as_str()).collect();
    urls.sort();
    urls.dedup();
    assert_eq!(urls.len(), 5);
}
