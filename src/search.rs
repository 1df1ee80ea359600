use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::{info, warn};

use crate::{config::Config, error::UpstreamError, models::SearchResult, util::preview};

/// Appended to every item description before it is sent to the shopping search.
pub const QUERY_SUFFIX: &str = " fashion clothing";
/// Nominal number of products shown per item.
pub const DISPLAY_COUNT: usize = 5;
/// Hard cap on candidates kept per item.
pub const MAX_RESULTS_PER_ITEM: usize = 10;

/// Known vendors and the search URL used when an entry has no product link.
const VENDOR_SEARCH_URLS: &[(&str, &str)] = &[
    ("amazon", "https://www.amazon.com/s?k={title}"),
    ("ebay", "https://www.ebay.com/sch/i.html?_nkw={title}"),
    ("etsy", "https://www.etsy.com/search?q={title}"),
    ("walmart", "https://www.walmart.com/search?q={title}"),
    ("target", "https://www.target.com/s?searchTerm={title}"),
];

pub fn shopping_query(description: &str) -> String {
    format!("{}{}", description.trim(), QUERY_SUFFIX)
}

#[async_trait]
pub trait ProductSearch: Send + Sync {
    /// Search for products matching `query` (sent as-is) and return normalized results.
    async fn search(&self, query: &str) -> Result<Vec<SearchResult>, UpstreamError>;
}

pub struct SerpApiClient {
    client: Client,
    api_key: Option<String>,
    base_url: String,
}

impl SerpApiClient {
    pub fn new(config: &Config, client: Client) -> Self {
        Self { client, api_key: config.serpapi_api_key.clone(), base_url: config.serpapi_base_url.clone() }
    }
}

#[async_trait]
impl ProductSearch for SerpApiClient {
    async fn search(&self, query: &str) -> Result<Vec<SearchResult>, UpstreamError> {
        let api_key = self.api_key.as_deref().ok_or(UpstreamError::MissingCredentials("SerpAPI"))?;
        info!("🔍 Sending SerpAPI request for query: '{}'", query);

        let num = (DISPLAY_COUNT * 2).to_string();
        let response = self.client
            .get(&self.base_url)
            .query(&[
                ("q", query),
                ("api_key", api_key),
                ("engine", "google"),
                ("google_domain", "google.com"),
                ("gl", "us"),
                ("hl", "en"),
                ("tbm", "shop"),
                ("num", num.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            warn!("⚠️ SerpAPI responded with status {}: {}", status, preview(&text));
            return Err(UpstreamError::Status { status: status.as_u16(), body: text });
        }

        let payload: Value = serde_json::from_str(&text)
            .map_err(|e| UpstreamError::Parse(format!("{}: {}", e, preview(&text))))?;
        let results = parse_shopping_payload(&payload)?;
        info!("✅ Found {} results for query: '{}'", results.len(), query);
        Ok(results)
    }
}

/// Turn a provider payload into at most [`MAX_RESULTS_PER_ITEM`] normalized results.
pub fn parse_shopping_payload(payload: &Value) -> Result<Vec<SearchResult>, UpstreamError> {
    if let Some(err) = payload.get("error") {
        let message = err.as_str().map(str::to_string).unwrap_or_else(|| err.to_string());
        return Err(UpstreamError::Provider(message));
    }
    let entries = shopping_entries(payload);
    if entries.is_empty() {
        warn!("⚠️ No shopping results in payload");
    }
    Ok(entries.iter().take(MAX_RESULTS_PER_ITEM).map(|e| normalize_entry(e)).collect())
}

/// The provider's `shopping_results` as a list, whatever shape it arrived in.
pub fn shopping_entries(payload: &Value) -> Vec<&Value> {
    match payload.get("shopping_results") {
        Some(Value::Array(entries)) => entries.iter().filter(|e| e.is_object()).collect(),
        Some(entry @ Value::Object(_)) => vec![entry],
        _ => Vec::new(),
    }
}

fn str_field<'a>(entry: &'a Value, key: &str) -> &'a str {
    entry.get(key).and_then(Value::as_str).map(str::trim).unwrap_or("")
}

fn rating(entry: &Value) -> Option<f64> {
    let value = match entry.get("rating")? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    value.filter(|r| r.is_finite() && *r > 0.0)
}

fn vendor_search_url(source: &str, title: &str) -> Option<String> {
    if source.is_empty() || title.is_empty() {
        return None;
    }
    let source = source.to_lowercase();
    VENDOR_SEARCH_URLS
        .iter()
        .find(|(vendor, _)| source.contains(vendor))
        .map(|(_, template)| template.replace("{title}", title))
}

/// Product link for an entry: `link`, then `product_link`, then a vendor search URL.
pub fn resolve_product_url(entry: &Value) -> Option<String> {
    let link = [str_field(entry, "link"), str_field(entry, "product_link")]
        .into_iter()
        .find(|l| !l.is_empty())
        .map(str::to_string)
        .or_else(|| vendor_search_url(str_field(entry, "source"), str_field(entry, "title")))?;

    let link = if link.starts_with("http://") || link.starts_with("https://") {
        link
    } else {
        format!("https://{link}")
    };
    Some(link.trim().replace(' ', "%20"))
}

pub fn normalize_entry(entry: &Value) -> SearchResult {
    let product_url = resolve_product_url(entry);
    if product_url.is_none() {
        warn!("⚠️ No product link found for item: {}", preview(str_field(entry, "title")));
    }
    SearchResult {
        description: str_field(entry, "title").to_string(),
        price: str_field(entry, "price").to_string(),
        thumbnail_url: str_field(entry, "thumbnail").to_string(),
        navigable: product_url.is_some(),
        product_url: product_url.unwrap_or_default(),
        rating: rating(entry),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn vendor_fallback_builds_encoded_search_url() {
        let entry = json!({ "source": "Amazon", "title": "Red Dress", "link": "" });
        let result = normalize_entry(&entry);
        assert_eq!(result.product_url, "https://www.amazon.com/s?k=Red%20Dress");
        assert!(result.navigable);
    }

    #[test]
    fn prefers_link_then_product_link_and_adds_scheme() {
        let entry = json!({ "link": "shop.example.com/p/1", "product_link": "https://other.example/2" });
        assert_eq!(resolve_product_url(&entry).as_deref(), Some("https://shop.example.com/p/1"));
        let entry = json!({ "product_link": "https://google.com/shopping/product/9 x" });
        assert_eq!(resolve_product_url(&entry).as_deref(), Some("https://google.com/shopping/product/9%20x"));
    }

    #[test]
    fn unknown_vendor_without_link_is_not_navigable() {
        let entry = json!({ "source": "Tiny Boutique", "title": "Linen Shirt", "price": "$40", "rating": "4.5" });
        let result = normalize_entry(&entry);
        assert_eq!(result.product_url, "");
        assert!(!result.navigable);
        assert_eq!(result.price, "$40");
        assert_eq!(result.rating, Some(4.5));
    }

    #[test]
    fn payload_shapes_normalize_to_lists() {
        assert!(shopping_entries(&json!({})).is_empty());
        assert!(shopping_entries(&json!({ "shopping_results": "nope" })).is_empty());
        assert_eq!(shopping_entries(&json!({ "shopping_results": { "title": "one" } })).len(), 1);
        assert_eq!(shopping_entries(&json!({ "shopping_results": [{ "title": "a" }, 3, { "title": "b" }] })).len(), 2);
    }

    #[test]
    fn provider_error_and_cap() {
        assert!(matches!(
            parse_shopping_payload(&json!({ "error": "Invalid API key" })),
            Err(UpstreamError::Provider(msg)) if msg == "Invalid API key"
        ));
        let many: Vec<Value> = (0..25).map(|i| json!({ "title": format!("t{i}"), "link": "https://x.example" })).collect();
        let results = parse_shopping_payload(&json!({ "shopping_results": many })).unwrap();
        assert_eq!(results.len(), MAX_RESULTS_PER_ITEM);
        assert_eq!(results[0].description, "t0");
    }

    #[test]
    fn query_gets_marketing_suffix() {
        assert_eq!(shopping_query("black linen trousers "), "black linen trousers fashion clothing");
    }
}
