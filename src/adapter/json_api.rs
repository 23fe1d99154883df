//! Faceted JSON search adapter
//!
//! Many retail search endpoints answer a category query with a single JSON
//! document holding the facet list (display name, attribute group, values with
//! counts or price bounds), the total result count and one page of products.
//! `JsonApiAdapter` drives any such endpoint from a `SiteConfig`:
//!
//! - Queries are `base-url?{category-param}={reference}&{facet params}&{page-param}={n}`
//! - Response fields are located with JSON pointers
//! - Optionally the JSON document is embedded in an HTML page and located with
//!   a CSS selector
//!
//! HTTP 429 maps to `AdapterError::RateLimited`, other non-2xx statuses to
//! `AdapterError::Status`, undecodable bodies to `AdapterError::Malformed`.

use crate::adapter::{AdapterError, ExtractError, SiteAdapter};
use crate::catalog::{
    Category, FacetDimension, FacetSelection, FacetValue, Page, ProductRecord, RawRecord,
};
use crate::config::{DimensionConfig, DimensionKind, SiteConfig, UserAgentConfig};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use scraper::{Html, Selector};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use url::Url;

/// Count documents kept for reuse between `result_count` and `facet_values`
const DOCUMENT_CACHE_LIMIT: usize = 256;

/// `SiteAdapter` for faceted JSON search endpoints
pub struct JsonApiAdapter {
    site: SiteConfig,
    client: Client,
    documents: Mutex<HashMap<String, Arc<Value>>>,
}

impl JsonApiAdapter {
    /// Creates an adapter for `site`, identifying itself with `user_agent`
    pub fn new(site: SiteConfig, user_agent: &UserAgentConfig) -> crate::Result<Self> {
        let client = Client::builder()
            .user_agent(user_agent.header_value())
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .gzip(true)
            .brotli(true)
            .build()?;

        Ok(Self {
            site,
            client,
            documents: Mutex::new(HashMap::new()),
        })
    }

    pub fn site(&self) -> &SiteConfig {
        &self.site
    }

    fn dimension_config(&self, label: &str) -> Option<&DimensionConfig> {
        self.site.dimensions.iter().find(|d| d.label == label)
    }

    /// Builds the query URL for a selection, optionally for one page
    pub fn query_url(
        &self,
        category: &Category,
        selection: &FacetSelection,
        page: Option<u32>,
    ) -> Result<Url, AdapterError> {
        let mut url = Url::parse(&self.site.base_url).map_err(|e| AdapterError::Malformed {
            url: self.site.base_url.clone(),
            message: format!("invalid base url: {}", e),
        })?;

        {
            let mut query = url.query_pairs_mut();
            query.append_pair(&self.site.category_param, &category.reference);
            for (param, value) in selection.query_pairs() {
                query.append_pair(param, value);
            }
            if let Some(page) = page {
                query.append_pair(&self.site.page_param, &page.to_string());
            }
        }

        Ok(url)
    }

    /// Fetches and decodes one document
    async fn fetch_document(&self, url: &Url) -> Result<Value, AdapterError> {
        tracing::trace!("GET {}", url);

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|source| AdapterError::Http {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(Duration::from_secs);
            return Err(AdapterError::RateLimited {
                url: url.to_string(),
                retry_after,
            });
        }

        if !status.is_success() {
            return Err(AdapterError::Status {
                url: url.to_string(),
                code: status.as_u16(),
            });
        }

        let body = response.text().await.map_err(|source| AdapterError::Http {
            url: url.to_string(),
            source,
        })?;

        self.decode_document(url.as_str(), &body)
    }

    /// Turns a response body into the JSON document
    fn decode_document(&self, url: &str, body: &str) -> Result<Value, AdapterError> {
        let json = match &self.site.embedded_json_selector {
            Some(selector) => extract_embedded_json(url, body, selector)?,
            None => body.to_string(),
        };

        serde_json::from_str(&json).map_err(|e| AdapterError::Malformed {
            url: url.to_string(),
            message: e.to_string(),
        })
    }

    /// Fetches the selection's first document, reusing a recent copy
    async fn selection_document(
        &self,
        category: &Category,
        selection: &FacetSelection,
    ) -> Result<(String, Arc<Value>), AdapterError> {
        let url = self.query_url(category, selection, None)?;
        let key = url.to_string();

        if let Some(doc) = self.cached(&key) {
            return Ok((key, doc));
        }

        let doc = Arc::new(self.fetch_document(&url).await?);
        let mut documents = self
            .documents
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if documents.len() >= DOCUMENT_CACHE_LIMIT {
            documents.clear();
        }
        documents.insert(key.clone(), Arc::clone(&doc));
        Ok((key, doc))
    }

    fn cached(&self, key: &str) -> Option<Arc<Value>> {
        self.documents
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(key)
            .cloned()
    }

    fn string_field(&self, raw: &RawRecord, pointer: Option<&String>) -> Option<String> {
        pointer
            .and_then(|p| raw.pointer(p))
            .and_then(value_to_string)
    }

    fn product_url(&self, raw: &RawRecord) -> Option<String> {
        let url = self.string_field(raw, Some(&self.site.fields.url))?;
        match &self.site.fields.url_prefix {
            Some(prefix) if !url.starts_with("http://") && !url.starts_with("https://") => Some(
                format!("{}/{}", prefix.trim_end_matches('/'), url.trim_start_matches('/')),
            ),
            _ => Some(url),
        }
    }
}

#[async_trait]
impl SiteAdapter for JsonApiAdapter {
    fn name(&self) -> &str {
        &self.site.name
    }

    fn per_query_cap(&self) -> u64 {
        self.site.per_query_cap
    }

    fn first_page_index(&self) -> u32 {
        self.site.first_page
    }

    fn max_pages_per_unit(&self) -> Option<u32> {
        self.site.max_pages
    }

    async fn category_dimensions(
        &self,
        _category: &Category,
    ) -> Result<Vec<FacetDimension>, AdapterError> {
        Ok(self
            .site
            .dimensions
            .iter()
            .enumerate()
            .map(|(rank, d)| FacetDimension::new(d.label.clone(), rank))
            .collect())
    }

    async fn facet_values(
        &self,
        category: &Category,
        selection: &FacetSelection,
        dimension: &FacetDimension,
    ) -> Result<Vec<FacetValue>, AdapterError> {
        let config = self.dimension_config(&dimension.label).ok_or_else(|| {
            AdapterError::Unsupported(format!("dimension '{}' is not configured", dimension.label))
        })?;

        let (url, doc) = self.selection_document(category, selection).await?;

        let facets = match doc.pointer(&self.site.facets) {
            Some(Value::Array(facets)) => facets,
            Some(_) => {
                return Err(AdapterError::Malformed {
                    url,
                    message: format!("{} is not an array", self.site.facets),
                })
            }
            None => return Ok(Vec::new()),
        };

        let facet = facets
            .iter()
            .find(|f| f.get("displayName").and_then(Value::as_str) == Some(config.label.as_str()));

        let Some(facet) = facet else {
            tracing::debug!(
                "No '{}' facet for {} [{}]",
                config.label,
                category,
                selection
            );
            return Ok(Vec::new());
        };

        Ok(parse_facet_values(facet, config))
    }

    async fn result_count(
        &self,
        category: &Category,
        selection: &FacetSelection,
    ) -> Result<u64, AdapterError> {
        let (url, doc) = self.selection_document(category, selection).await?;
        match doc.pointer(&self.site.result_count) {
            None => Ok(0),
            Some(value) => value_to_u64(value).ok_or_else(|| AdapterError::Malformed {
                url,
                message: format!("result count is not a number: {}", value),
            }),
        }
    }

    async fn fetch_page(
        &self,
        category: &Category,
        selection: &FacetSelection,
        page: u32,
    ) -> Result<Page, AdapterError> {
        let url = self.query_url(category, selection, Some(page))?;
        let doc = self.fetch_document(&url).await?;

        let records = match doc.pointer(&self.site.products) {
            Some(Value::Array(products)) => products.clone(),
            Some(Value::Null) | None => Vec::new(),
            Some(_) => {
                return Err(AdapterError::Malformed {
                    url: url.to_string(),
                    message: format!("{} is not an array", self.site.products),
                })
            }
        };

        let last_page = self
            .site
            .last_page
            .as_ref()
            .and_then(|p| doc.pointer(p))
            .and_then(value_to_u64)
            .and_then(|n| u32::try_from(n).ok());

        Ok(Page {
            index: page,
            records,
            last_page,
        })
    }

    fn extract(&self, raw: &RawRecord, category: &Category) -> Result<ProductRecord, ExtractError> {
        let fields = &self.site.fields;

        let url = self
            .product_url(raw)
            .ok_or(ExtractError::MissingField("url"))?;

        let id = if fields.id_from_url {
            id_from_url(&url).ok_or(ExtractError::InvalidField {
                field: "url",
                value: url.clone(),
            })?
        } else {
            self.string_field(raw, fields.id.as_ref())
                .ok_or(ExtractError::MissingField("id"))?
        };

        let description = self
            .string_field(raw, Some(&fields.description))
            .unwrap_or_default();

        let price = self
            .string_field(raw, fields.price.as_ref())
            .map(|p| p.trim_start_matches('$').trim().to_string())
            .unwrap_or_default();

        let reviews = match fields.reviews.as_ref().and_then(|p| raw.pointer(p)) {
            None | Some(Value::Null) => 0,
            Some(value) => value_to_u64(value).ok_or_else(|| ExtractError::InvalidField {
                field: "reviews",
                value: value.to_string(),
            })?,
        };

        let rating = fields
            .rating
            .as_ref()
            .and_then(|p| raw.pointer(p))
            .and_then(value_to_f64);

        Ok(ProductRecord {
            id,
            description,
            url,
            price,
            reviews,
            rating,
            category: category.name.clone(),
        })
    }

    fn excludes(&self, record: &ProductRecord) -> bool {
        match self.site.exclusion.reason(record) {
            Some(reason) => {
                tracing::debug!("Excluding {}: {}", record.id, reason);
                true
            }
            None => false,
        }
    }
}

/// Reads the JSON text out of the first element matching `selector`
fn extract_embedded_json(url: &str, body: &str, selector: &str) -> Result<String, AdapterError> {
    let selector = Selector::parse(selector).map_err(|e| AdapterError::Malformed {
        url: url.to_string(),
        message: format!("invalid selector '{}': {:?}", selector, e),
    })?;

    let document = Html::parse_document(body);
    document
        .select(&selector)
        .next()
        .map(|element| element.text().collect::<String>())
        .ok_or_else(|| AdapterError::Malformed {
            url: url.to_string(),
            message: "embedded JSON element not found".to_string(),
        })
}

/// Parses the values of one facet object, skipping nothing: zero counts are
/// the traversal's business
fn parse_facet_values(facet: &Value, config: &DimensionConfig) -> Vec<FacetValue> {
    let group = facet.get("attributeGroupId").and_then(value_to_string);
    let values = facet
        .get("values")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();

    values
        .iter()
        .filter_map(|value| {
            let count = value.get("count").and_then(value_to_u64).unwrap_or(0);
            match config.kind {
                DimensionKind::Attribute => {
                    let id = value.get("attributeId").and_then(value_to_string)?;
                    let param = config
                        .param
                        .clone()
                        .or_else(|| group.as_ref().map(|g| format!("a{}", g)))?;
                    let label = value
                        .get("displayName")
                        .and_then(value_to_string)
                        .unwrap_or_else(|| id.clone());
                    Some(FacetValue::new(param, id, label, count))
                }
                DimensionKind::Range => {
                    let min = value.get("min").and_then(value_to_string)?;
                    let max = value.get("max").and_then(value_to_string).unwrap_or_default();
                    let param = config.param.clone().unwrap_or_else(|| "price".to_string());
                    let label = format!("{}-{}", min, max);
                    Some(FacetValue::new(param, format!("{}:{}", min, max), label, count))
                }
            }
        })
        .collect()
}

/// Last `-`-separated, non-empty token of a product URL path
fn id_from_url(url: &str) -> Option<String> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let last = path.trim_end_matches('/').rsplit('/').next()?;
    let last = last.strip_suffix(".html").unwrap_or(last);
    last.split('-')
        .filter(|t| !t.trim().is_empty())
        .last()
        .map(|t| t.trim().to_string())
}

fn value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let s = s.trim();
            (!s.is_empty()).then(|| s.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn value_to_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64)),
        Value::String(s) => s.trim().replace(',', "").parse().ok(),
        _ => None,
    }
}

fn value_to_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
