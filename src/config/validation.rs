use crate::config::types::{Config, CrawlerConfig, OutputConfig, SiteConfig, UserAgentConfig};
use crate::ConfigError;
use std::collections::HashSet;
use url::Url;

/// Validates the entire configuration
///
/// Runs before any network activity; every failure is fatal to the run.
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawler_config(&config.crawler)?;
    validate_user_agent_config(&config.user_agent)?;
    validate_output_config(&config.output)?;
    validate_sites(&config.sites)?;
    Ok(())
}

/// Validates crawler configuration
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.concurrency < 1 || config.concurrency > 64 {
        return Err(ConfigError::Validation(format!(
            "concurrency must be between 1 and 64, got {}",
            config.concurrency
        )));
    }

    if config.retry_delay_ms > config.max_retry_delay_ms {
        return Err(ConfigError::Validation(format!(
            "retry_delay_ms ({}) must not exceed max_retry_delay_ms ({})",
            config.retry_delay_ms, config.max_retry_delay_ms
        )));
    }

    Ok(())
}

/// Validates user agent configuration
fn validate_user_agent_config(config: &UserAgentConfig) -> Result<(), ConfigError> {
    if config.crawler_name.is_empty() {
        return Err(ConfigError::Validation(
            "crawler_name cannot be empty".to_string(),
        ));
    }

    if !config
        .crawler_name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-')
    {
        return Err(ConfigError::Validation(format!(
            "crawler_name must contain only alphanumeric characters and hyphens, got '{}'",
            config.crawler_name
        )));
    }

    Url::parse(&config.contact_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid contact_url: {}", e)))?;

    validate_email(&config.contact_email)?;

    Ok(())
}

/// Validates output configuration
fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.csv_path.is_empty() {
        return Err(ConfigError::Validation("csv_path cannot be empty".to_string()));
    }

    if config.database_path.as_deref() == Some("") {
        return Err(ConfigError::Validation(
            "database_path cannot be empty when set".to_string(),
        ));
    }

    Ok(())
}

/// Validates site entries
fn validate_sites(sites: &[SiteConfig]) -> Result<(), ConfigError> {
    if sites.is_empty() {
        return Err(ConfigError::Validation(
            "at least one [[site]] must be configured".to_string(),
        ));
    }

    let mut names = HashSet::new();
    for site in sites {
        if !names.insert(site.name.as_str()) {
            return Err(ConfigError::Validation(format!(
                "duplicate site name '{}'",
                site.name
            )));
        }
        validate_site(site)?;
    }

    Ok(())
}

fn validate_site(site: &SiteConfig) -> Result<(), ConfigError> {
    if site.name.is_empty() {
        return Err(ConfigError::Validation("site name cannot be empty".to_string()));
    }

    let url = Url::parse(&site.base_url).map_err(|e| {
        ConfigError::InvalidUrl(format!("Invalid base-url '{}': {}", site.base_url, e))
    })?;
    if url.scheme() != "https" && url.scheme() != "http" {
        return Err(ConfigError::Validation(format!(
            "base-url '{}' must use http or https",
            site.base_url
        )));
    }

    if site.per_query_cap < 1 {
        return Err(ConfigError::Validation(format!(
            "site '{}': per-query-cap must be >= 1",
            site.name
        )));
    }

    if site.max_pages == Some(0) {
        return Err(ConfigError::Validation(format!(
            "site '{}': max-pages must be >= 1 when set",
            site.name
        )));
    }

    if site.categories.is_empty() {
        return Err(ConfigError::Validation(format!(
            "site '{}' must have at least one [[site.category]]",
            site.name
        )));
    }

    for category in &site.categories {
        if category.name.trim().is_empty() || category.reference.trim().is_empty() {
            return Err(ConfigError::Validation(format!(
                "site '{}': categories need a name and a reference",
                site.name
            )));
        }
    }

    let mut labels = HashSet::new();
    for dimension in &site.dimensions {
        if !labels.insert(dimension.label.as_str()) {
            return Err(ConfigError::Validation(format!(
                "site '{}': duplicate dimension '{}'",
                site.name, dimension.label
            )));
        }
    }

    for pointer in [&site.facets, &site.result_count, &site.products]
        .into_iter()
        .chain(site.last_page.as_ref())
    {
        validate_pointer(&site.name, pointer)?;
    }

    if site.fields.id.is_none() && !site.fields.id_from_url {
        return Err(ConfigError::Validation(format!(
            "site '{}': fields need an id pointer or id-from-url = true",
            site.name
        )));
    }

    if let Some(selector) = &site.embedded_json_selector {
        scraper::Selector::parse(selector).map_err(|e| {
            ConfigError::Validation(format!(
                "site '{}': invalid embedded-json-selector '{}': {:?}",
                site.name, selector, e
            ))
        })?;
    }

    if let (Some(min), Some(max)) = (site.exclusion.min_reviews, site.exclusion.max_reviews) {
        if min > max {
            return Err(ConfigError::Validation(format!(
                "site '{}': min-reviews ({}) exceeds max-reviews ({})",
                site.name, min, max
            )));
        }
    }

    Ok(())
}

/// JSON pointers are empty (whole document) or start with '/'
fn validate_pointer(site: &str, pointer: &str) -> Result<(), ConfigError> {
    if !pointer.is_empty() && !pointer.starts_with('/') {
        return Err(ConfigError::Validation(format!(
            "site '{}': '{}' is not a JSON pointer (must start with '/')",
            site, pointer
        )));
    }
    Ok(())
}

/// Basic email validation
fn validate_email(email: &str) -> Result<(), ConfigError> {
    if email.is_empty() {
        return Err(ConfigError::Validation(
            "contact_email cannot be empty".to_string(),
        ));
    }

    let parts: Vec<&str> = email.split('@').collect();
    if parts.len() != 2 {
        return Err(ConfigError::Validation(format!(
            "Invalid email format: '{}'",
            email
        )));
    }

    let local = parts[0];
    let domain = parts[1];

    if local.is_empty() || domain.is_empty() {
        return Err(ConfigError::Validation(format!(
            "Invalid email format: '{}'",
            email
        )));
    }

    if !domain.contains('.') {
        return Err(ConfigError::Validation(format!(
            "Invalid email domain: '{}'",
            email
        )));
    }

    Ok(())
}
