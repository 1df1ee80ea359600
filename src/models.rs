use std::{collections::BTreeMap, fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use serde_with::{serde_as, formats::PreferMany, OneOrMany};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum Budget {
    Low,
    #[default]
    Medium,
    High,
}

impl Budget {
    pub fn label(self) -> &'static str {
        match self {
            Budget::Low => "low",
            Budget::Medium => "medium",
            Budget::High => "high",
        }
    }
}

impl FromStr for Budget {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Budget::Low),
            "medium" => Ok(Budget::Medium),
            "high" => Ok(Budget::High),
            other => Err(format!("unsupported budget '{other}' (expected low, medium or high)")),
        }
    }
}

impl TryFrom<String> for Budget {
    type Error = String;
    fn try_from(value: String) -> Result<Self, Self::Error> { value.parse() }
}

impl fmt::Display for Budget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.label()) }
}

/// Clothing category shared by the generator output and the product grouping.
///
/// The model is only told about five of these (no `Shoes`), while grouping
/// accepts all six. Declaration order is the display order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String")]
pub enum Category {
    Tops,
    Bottoms,
    Dresses,
    Outerwear,
    Shoes,
    Accessories,
}

impl Category {
    pub const ALL: [Category; 6] = [
        Category::Tops,
        Category::Bottoms,
        Category::Dresses,
        Category::Outerwear,
        Category::Shoes,
        Category::Accessories,
    ];

    /// Categories the generation prompt allows the model to use.
    pub const MODEL_FACING: [Category; 5] = [
        Category::Tops,
        Category::Bottoms,
        Category::Dresses,
        Category::Outerwear,
        Category::Accessories,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Category::Tops => "Tops",
            Category::Bottoms => "Bottoms",
            Category::Dresses => "Dresses",
            Category::Outerwear => "Outerwear",
            Category::Shoes => "Shoes",
            Category::Accessories => "Accessories",
        }
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Category::ALL
            .into_iter()
            .find(|c| c.name().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| format!("unknown category '{wanted}'"))
    }
}

impl TryFrom<String> for Category {
    type Error = String;
    fn try_from(value: String) -> Result<Self, Self::Error> { value.parse() }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.name()) }
}

/// Physical-attribute hints derived from a self-photo. Every field is optional;
/// an all-empty record means "no attributes".
#[serde_as]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserAttributes {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gender_presentation: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub apparent_age_range: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height_impression: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skin_tone: Option<String>,
    #[serde_as(as = "Option<OneOrMany<_, PreferMany>>")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub style_suggestions: Option<Vec<String>>,
    #[serde_as(as = "Option<OneOrMany<_, PreferMany>>")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub colors_to_complement: Option<Vec<String>>,
    #[serde_as(as = "Option<OneOrMany<_, PreferMany>>")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avoid_styles: Option<Vec<String>>,
}

impl UserAttributes {
    pub fn is_empty(&self) -> bool {
        self.gender_presentation.is_none()
            && self.apparent_age_range.is_none()
            && self.body_type.is_none()
            && self.height_impression.is_none()
            && self.skin_tone.is_none()
            && self.style_suggestions.as_ref().map_or(true, Vec::is_empty)
            && self.colors_to_complement.as_ref().map_or(true, Vec::is_empty)
            && self.avoid_styles.as_ref().map_or(true, Vec::is_empty)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StyleProfile {
    pub title: String,
    pub description: String,
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecommendedItem {
    pub description: String,
    pub category: Category,
}

/// A style profile together with its recommended items.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub style: StyleProfile,
    pub items: Vec<RecommendedItem>,
}

/// Distinct categories among the items, in display order.
pub fn categories_of(items: &[RecommendedItem]) -> Vec<Category> {
    Category::ALL
        .into_iter()
        .filter(|c| items.iter().any(|i| i.category == *c))
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub description: String,
    pub price: String,
    #[serde(rename = "thumbnailURL")]
    pub thumbnail_url: String,
    #[serde(rename = "productURL")]
    pub product_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<f64>,
    /// False when no product link could be resolved for this entry.
    pub navigable: bool,
}

/// Per-category results for a finished search, keyed only by categories that
/// have at least one item. An empty list means "searched, nothing found".
pub type CategorizedResults = BTreeMap<Category, Vec<SearchResult>>;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ImageState {
    Pending,
    Ready { image: String, placeholder: bool },
}

impl ImageState {
    pub fn image(&self) -> Option<&str> {
        match self {
            ImageState::Pending => None,
            ImageState::Ready { image, .. } => Some(image),
        }
    }
}

// --- Boundary payloads ---

#[derive(Debug, Serialize)]
pub struct RecommendationResponse {
    pub session_id: Uuid,
    pub style: StyleProfile,
    pub items: Vec<RecommendedItem>,
    pub categories: Vec<Category>,
}

/// Snapshot of a session. `results` has one key per present category; `None`
/// serializes as `null` and means the category has not been searched yet.
#[derive(Debug, Serialize)]
pub struct SessionSnapshot {
    pub session_id: Uuid,
    pub style: StyleProfile,
    pub items: Vec<RecommendedItem>,
    pub results: BTreeMap<Category, Option<Vec<SearchResult>>>,
}

#[derive(Debug, Serialize)]
pub struct CategoryResultsResponse {
    pub category: Category,
    pub results: Vec<SearchResult>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchRequest {
    #[serde(default)]
    pub query: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ImageQuery {
    /// Seconds to wait for the image before answering with the current state.
    #[serde(default)]
    pub wait_secs: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub results: Vec<SearchResult>,
}
