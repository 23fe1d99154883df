use crate::adapter::ExclusionRules;
use crate::catalog::Category;
use serde::Deserialize;

/// Main configuration structure for Facet-Harvest
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub crawler: CrawlerConfig,
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    pub output: OutputConfig,
    #[serde(default, rename = "site")]
    pub sites: Vec<SiteConfig>,
}

impl Config {
    /// Looks up a site by name
    pub fn site(&self, name: &str) -> Option<&SiteConfig> {
        self.sites.iter().find(|s| s.name == name)
    }

    /// Comma-separated site names, for error messages
    pub fn site_names(&self) -> String {
        self.sites
            .iter()
            .map(|s| s.name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Crawl behavior configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CrawlerConfig {
    /// Records to write per category before moving on (0 = unlimited)
    #[serde(default = "default_limit")]
    pub limit_per_category: u64,

    /// Number of query units processed in parallel and adapter calls in flight
    #[serde(default = "default_concurrency")]
    pub concurrency: u32,

    /// Retries after the first attempt of a failing adapter call
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Delay before the first retry (milliseconds)
    #[serde(default = "default_retry_delay")]
    pub retry_delay_ms: u64,

    /// Upper bound for any single retry delay (milliseconds)
    #[serde(default = "default_max_retry_delay")]
    pub max_retry_delay_ms: u64,

    #[serde(default)]
    pub backoff: Backoff,

    /// Stop the run gracefully after this many seconds (0 = no timeout)
    #[serde(default)]
    pub run_timeout_secs: u64,
}

fn default_limit() -> u64 {
    10_000
}

fn default_concurrency() -> u32 {
    1
}

fn default_max_retries() -> u32 {
    5
}

fn default_retry_delay() -> u64 {
    500
}

fn default_max_retry_delay() -> u64 {
    30_000
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            limit_per_category: default_limit(),
            concurrency: default_concurrency(),
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay(),
            max_retry_delay_ms: default_max_retry_delay(),
            backoff: Backoff::default(),
            run_timeout_secs: 0,
        }
    }
}

/// Delay growth between retries
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backoff {
    Fixed,
    #[default]
    Exponential,
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct UserAgentConfig {
    /// Name of the crawler
    pub crawler_name: String,

    /// Version of the crawler
    pub crawler_version: String,

    /// URL with information about the crawler
    pub contact_url: String,

    /// Email address for crawler-related contact
    pub contact_email: String,
}

impl UserAgentConfig {
    /// Format: CrawlerName/Version (+ContactURL; ContactEmail)
    pub fn header_value(&self) -> String {
        format!(
            "{}/{} (+{}; {})",
            self.crawler_name, self.crawler_version, self.contact_url, self.contact_email
        )
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct OutputConfig {
    /// Path to the CSV file receiving accepted records
    pub csv_path: String,

    /// Optional SQLite database: run history, record store and resume point
    pub database_path: Option<String>,

    /// Optional markdown run summary
    pub summary_path: Option<String>,
}

/// One catalog source served by `JsonApiAdapter`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SiteConfig {
    pub name: String,

    /// Search endpoint all queries are issued against
    pub base_url: String,

    /// Query parameter carrying the category reference
    #[serde(default = "default_category_param")]
    pub category_param: String,

    /// Query parameter carrying the page index
    #[serde(default = "default_page_param")]
    pub page_param: String,

    #[serde(default = "default_first_page")]
    pub first_page: u32,

    /// Hard ceiling on pages per query unit
    pub max_pages: Option<u32>,

    /// Largest result count one query can paginate
    pub per_query_cap: u64,

    /// JSON pointer to the facet list
    #[serde(default = "default_facets_pointer")]
    pub facets: String,

    /// JSON pointer to the total result count
    #[serde(default = "default_result_count_pointer")]
    pub result_count: String,

    /// JSON pointer to the product list
    #[serde(default = "default_products_pointer")]
    pub products: String,

    /// JSON pointer to the declared last page index
    pub last_page: Option<String>,

    /// When set, responses are HTML and the JSON document is the text of the
    /// first element matching this CSS selector
    pub embedded_json_selector: Option<String>,

    /// Facet dimensions, coarsest first
    #[serde(default, rename = "dimension")]
    pub dimensions: Vec<DimensionConfig>,

    pub fields: FieldMap,

    #[serde(default)]
    pub exclusion: ExclusionRules,

    #[serde(default, rename = "category")]
    pub categories: Vec<Category>,
}

fn default_category_param() -> String {
    "category".to_string()
}

fn default_page_param() -> String {
    "page".to_string()
}

fn default_first_page() -> u32 {
    1
}

fn default_facets_pointer() -> String {
    "/facets".to_string()
}

fn default_result_count_pointer() -> String {
    "/resultCount".to_string()
}

fn default_products_pointer() -> String {
    "/products".to_string()
}

/// A facet dimension as the site exposes it
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct DimensionConfig {
    /// Facet display name in the response (e.g. "Color")
    pub label: String,

    #[serde(default)]
    pub kind: DimensionKind,

    /// Query parameter; attribute facets default to `a{attributeGroupId}`
    pub param: Option<String>,
}

/// How a facet value is turned into a query parameter
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DimensionKind {
    /// Discrete values selected by attribute id
    #[default]
    Attribute,

    /// Numeric buckets selected as `min:max`
    Range,
}

/// JSON pointers locating product fields inside one listing
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct FieldMap {
    pub id: Option<String>,

    /// Derive the id from the last `-`-separated token of the product URL
    #[serde(default)]
    pub id_from_url: bool,

    pub description: String,
    pub url: String,

    /// Prefix joined onto relative product URLs
    pub url_prefix: Option<String>,

    pub price: Option<String>,
    pub reviews: Option<String>,
    pub rating: Option<String>,
}
