use std::{collections::HashMap, future::Future, sync::Arc};

use futures::future::join_all;
use parking_lot::Mutex;
use tokio::sync::OnceCell;
use tracing::{info, warn};

use crate::{
    error::UpstreamError,
    models::{categories_of, CategorizedResults, Category, RecommendedItem, SearchResult},
    search::{shopping_query, ProductSearch, MAX_RESULTS_PER_ITEM},
};

/// Resolves shoppable products for recommended items, one query per item.
pub struct ProductSearchAggregator {
    search: Arc<dyn ProductSearch>,
}

impl ProductSearchAggregator {
    pub fn new(search: Arc<dyn ProductSearch>) -> Self { Self { search } }

    /// Results for one item. Any failure degrades to an empty list.
    pub async fn search_item(&self, item: &RecommendedItem) -> Vec<SearchResult> {
        let query = shopping_query(&item.description);
        match self.search.search(&query).await {
            Ok(mut results) => {
                if results.is_empty() {
                    warn!("⚠️ No shopping results for '{}'", query);
                }
                results.truncate(MAX_RESULTS_PER_ITEM);
                results
            }
            Err(e) => {
                warn!("⚠️ Search failed for '{}' ({}): {}", query, item.category, e);
                Vec::new()
            }
        }
    }

    /// Free-text search; unlike item searches, provider failures are returned.
    pub async fn search_query(&self, query: &str) -> Result<Vec<SearchResult>, UpstreamError> {
        let mut results = self.search.search(&shopping_query(query)).await?;
        results.truncate(MAX_RESULTS_PER_ITEM);
        Ok(results)
    }

    /// One concurrent query per item; output is index-aligned with `items`.
    pub async fn search_items(&self, items: &[RecommendedItem]) -> Vec<Vec<SearchResult>> {
        join_all(items.iter().map(|item| self.search_item(item))).await
    }

    /// Search only the items of `category` and return their combined results.
    pub async fn search_category(&self, items: &[RecommendedItem], category: Category) -> Vec<SearchResult> {
        let subset: Vec<RecommendedItem> = items.iter().filter(|i| i.category == category).cloned().collect();
        info!("🛍️ Searching {} item(s) for category {}", subset.len(), category);
        let per_item = self.search_items(&subset).await;
        group_by_category(&subset, per_item).remove(&category).unwrap_or_default()
    }
}

/// Group per-item results under each originating item's category. Every
/// category present in `items` gets a key, even when its list is empty.
pub fn group_by_category(items: &[RecommendedItem], per_item: Vec<Vec<SearchResult>>) -> CategorizedResults {
    let mut grouped: CategorizedResults = categories_of(items).into_iter().map(|c| (c, Vec::new())).collect();
    for (item, results) in items.iter().zip(per_item) {
        grouped.entry(item.category).or_default().extend(results);
    }
    grouped
}

/// Per-session memo: each category is fetched at most once, even under
/// concurrent requests for it.
#[derive(Default)]
pub struct CategoryMemo {
    cells: Mutex<HashMap<Category, Arc<OnceCell<Vec<SearchResult>>>>>,
}

impl CategoryMemo {
    pub fn get(&self, category: Category) -> Option<Vec<SearchResult>> {
        self.cells.lock().get(&category).and_then(|cell| cell.get().cloned())
    }

    pub async fn get_or_fetch<F>(&self, category: Category, fetch: F) -> Vec<SearchResult>
    where
        F: Future<Output = Vec<SearchResult>>,
    {
        let cell = self.cells.lock().entry(category).or_default().clone();
        cell.get_or_init(|| fetch).await.clone()
    }
}
