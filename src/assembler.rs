use std::{sync::Arc, time::Duration};

use tokio::time::timeout;
use tracing::info;
use uuid::Uuid;

use crate::{
    aggregator::ProductSearchAggregator,
    analyzer::PhotoAttributeAnalyzer,
    error::ApiError,
    models::{Budget, Category, CategoryResultsResponse, ImageState, RecommendationResponse, SearchResult, SessionSnapshot},
    photos::PhotoSet,
    generator::StyleProfileGenerator,
    session::{Session, SessionStore},
    synthesizer::{ImageSlot, StyleImageSynthesizer},
};

/// Composes the pipeline behind the HTTP boundary: profile generation on the
/// request path, illustration in the background, product search on demand.
pub struct StyleAdvisor {
    analyzer: PhotoAttributeAnalyzer,
    generator: StyleProfileGenerator,
    synthesizer: Arc<StyleImageSynthesizer>,
    aggregator: ProductSearchAggregator,
    sessions: SessionStore,
}

impl StyleAdvisor {
    pub fn new(
        analyzer: PhotoAttributeAnalyzer,
        generator: StyleProfileGenerator,
        synthesizer: StyleImageSynthesizer,
        aggregator: ProductSearchAggregator,
        sessions: SessionStore,
    ) -> Self {
        Self { analyzer, generator, synthesizer: Arc::new(synthesizer), aggregator, sessions }
    }

    /// Produce the initial profile and items. Never fails: generation errors
    /// collapse into the fallback. The illustration is scheduled, not awaited.
    pub async fn recommend(&self, preferences: &str, budget: Budget, photos: Arc<PhotoSet>) -> RecommendationResponse {
        info!(
            "🚀 Recommendation request (budget={}, self_photo={}, aesthetic_photos={})",
            budget,
            photos.has_self_photo(),
            photos.aesthetic_count()
        );

        let attributes = self.analyzer.analyze(photos.self_photo.as_ref()).await;
        let recommendation = self.generator.generate(preferences, budget, &attributes, &photos).await;

        let (slot, image_rx) = ImageSlot::channel();
        let description = recommendation.style.description.clone();
        let session = Arc::new(Session::new(recommendation, image_rx));
        // The task owns the last photo handle; bytes are released when it ends.
        session.attach_image_task(self.synthesizer.spawn(description, photos, slot));
        self.sessions.insert(session.clone());

        info!("✅ Session {} created with categories {:?}", session.id, session.categories);
        RecommendationResponse {
            session_id: session.id,
            style: session.style.clone(),
            items: session.items.clone(),
            categories: session.categories.clone(),
        }
    }

    pub fn session(&self, id: Uuid) -> Result<Arc<Session>, ApiError> {
        self.sessions.get(&id).ok_or_else(|| ApiError::NotFound(format!("session {id}")))
    }

    pub fn snapshot(&self, id: Uuid) -> Result<SessionSnapshot, ApiError> {
        Ok(self.session(id)?.snapshot())
    }

    /// Current image state. With `wait`, blocks until the image is ready or
    /// the wait runs out, whichever comes first.
    pub async fn image(&self, id: Uuid, wait: Option<Duration>) -> Result<ImageState, ApiError> {
        let session = self.session(id)?;
        let Some(limit) = wait else {
            return Ok(session.image_state());
        };
        Ok(timeout(limit, session.wait_for_image()).await.unwrap_or_else(|_| session.image_state()))
    }

    /// Results for one category of a session, searched the first time the
    /// category is viewed and served from the session memo afterwards.
    pub async fn category_results(&self, id: Uuid, category: Category) -> Result<CategoryResultsResponse, ApiError> {
        let session = self.session(id)?;
        if !session.has_category(category) {
            return Err(ApiError::NotFound(format!("category {category} in session {id}")));
        }
        let results = session
            .results
            .get_or_fetch(category, self.aggregator.search_category(&session.items, category))
            .await;
        Ok(CategoryResultsResponse { category, results })
    }

    /// Free-text product search. Blank queries are rejected and an empty
    /// result set is reported as its own condition.
    pub async fn search(&self, query: Option<&str>) -> Result<Vec<SearchResult>, ApiError> {
        let query = query.map(str::trim).filter(|q| !q.is_empty())
            .ok_or_else(|| ApiError::Validation("Search query is required".into()))?;
        let results = self.aggregator.search_query(query).await?;
        if results.is_empty() {
            return Err(ApiError::NoResults);
        }
        Ok(results)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::{
        aggregator::tests::FakeSearch,
        analyzer::tests::{png_photo, ScriptedModel},
        error::UpstreamError,
        gemini::ModelVariant,
        synthesizer::tests::FakeImages,
    };
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Notify;

    pub(crate) const PROFILE: &str = r#"{
        "style": {"title": "Coastal Ease", "description": "Breezy linen and soft neutrals", "tags": ["linen", "relaxed"]},
        "items": [
            {"description": "Sand linen camp shirt", "category": "Tops"},
            {"description": "Ecru drawstring trousers", "category": "Bottoms"},
            {"description": "Woven straw tote", "category": "Accessories"},
            {"description": "Lightweight chore jacket", "category": "Outerwear"}
        ]
    }"#;

    pub(crate) fn advisor(
        model: Arc<ScriptedModel>,
        images: Arc<FakeImages>,
        search: Arc<FakeSearch>,
    ) -> StyleAdvisor {
        StyleAdvisor::new(
            PhotoAttributeAnalyzer::new(model.clone()),
            StyleProfileGenerator::new(model),
            StyleImageSynthesizer::new(images),
            ProductSearchAggregator::new(search),
            SessionStore::new(chrono::Duration::minutes(60)),
        )
    }

    #[tokio::test]
    async fn photos_are_released_once_after_generation_and_synthesis() {
        let model = ScriptedModel::replying(vec![Ok(r#"{"body_type":"slim"}"#.into()), Ok(PROFILE.into())]);
        let gate = Arc::new(Notify::new());
        let advisor = advisor(model.clone(), FakeImages::gated(gate.clone()), Arc::default());

        let releases = Arc::new(AtomicUsize::new(0));
        let counter = releases.clone();
        let photos = PhotoSet::with_release_hook(Some(png_photo()), vec![png_photo()], move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let response = advisor.recommend("", Budget::Medium, photos).await;
        assert_eq!(model.calls(), 2);
        assert_eq!(model.requests.lock()[1].variant, ModelVariant::Vision);
        assert_eq!(response.style.image, None);
        assert_eq!(advisor.image(response.session_id, None).await.unwrap(), ImageState::Pending);
        let waited = advisor.image(response.session_id, Some(Duration::from_millis(20))).await.unwrap();
        assert_eq!(waited, ImageState::Pending);
        assert_eq!(releases.load(Ordering::SeqCst), 0);

        gate.notify_one();
        let session = advisor.session(response.session_id).unwrap();
        let state = session.wait_for_image().await;
        assert!(state.image().is_some_and(|i| i.starts_with("data:image/png;base64,")));
        assert_eq!(releases.load(Ordering::SeqCst), 1);
        assert_eq!(advisor.snapshot(response.session_id).unwrap().style.image.as_deref(), state.image());
    }

    #[tokio::test]
    async fn category_fetch_is_demand_driven_and_memoised() {
        let search = Arc::new(FakeSearch::default());
        let advisor = advisor(ScriptedModel::replying(vec![Ok(PROFILE.into())]), FakeImages::ok(), search.clone());
        let response = advisor.recommend("linen", Budget::Low, PhotoSet::new(None, Vec::new())).await;
        assert_eq!(
            response.categories,
            vec![Category::Tops, Category::Bottoms, Category::Outerwear, Category::Accessories]
        );
        assert_eq!(search.calls(), 0);

        let first = advisor.category_results(response.session_id, Category::Tops).await.unwrap();
        assert_eq!(first.results.len(), 1);
        let again = advisor.category_results(response.session_id, Category::Tops).await.unwrap();
        assert_eq!(again.results, first.results);
        assert_eq!(search.calls(), 1);

        let snapshot = advisor.snapshot(response.session_id).unwrap();
        assert_eq!(snapshot.results.len(), 4);
        assert!(snapshot.results[&Category::Tops].is_some());
        assert!(snapshot.results[&Category::Bottoms].is_none());
    }

    #[tokio::test]
    async fn absent_category_and_unknown_session_are_not_found() {
        let advisor = advisor(ScriptedModel::replying(vec![Ok(PROFILE.into())]), FakeImages::ok(), Arc::default());
        let response = advisor.recommend("", Budget::High, PhotoSet::new(None, Vec::new())).await;

        let err = advisor.category_results(response.session_id, Category::Shoes).await.unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
        assert!(matches!(advisor.snapshot(Uuid::new_v4()), Err(ApiError::NotFound(_))));
    }

    #[tokio::test]
    async fn generation_failure_still_yields_a_session() {
        let model = ScriptedModel::replying(vec![Ok("not json at all".into())]);
        let advisor = advisor(model.clone(), FakeImages::failing(), Arc::default());
        let response = advisor.recommend("minimalist streetwear", Budget::High, PhotoSet::new(None, Vec::new())).await;

        assert_eq!(model.requests.lock()[0].variant, ModelVariant::Text);
        assert_eq!(response.style.title, "Casual");
        assert_eq!(response.items.len(), 2);
        assert_eq!(response.categories, vec![Category::Tops, Category::Bottoms]);

        let state = advisor.session(response.session_id).unwrap().wait_for_image().await;
        assert!(matches!(state, ImageState::Ready { placeholder: true, .. }));
    }

    #[tokio::test]
    async fn free_text_search_distinguishes_blank_empty_and_failure() {
        let search = Arc::new(FakeSearch {
            fail_on: Some("broken".into()),
            empty_on: Some("nothing".into()),
            ..Default::default()
        });
        let advisor = advisor(ScriptedModel::replying(Vec::new()), FakeImages::ok(), search.clone());

        assert!(matches!(advisor.search(None).await, Err(ApiError::Validation(_))));
        assert!(matches!(advisor.search(Some("   ")).await, Err(ApiError::Validation(_))));
        assert_eq!(search.calls(), 0);

        assert!(matches!(advisor.search(Some("nothing")).await, Err(ApiError::NoResults)));
        assert!(matches!(
            advisor.search(Some("broken")).await,
            Err(ApiError::Upstream(UpstreamError::Timeout))
        ));

        let results = advisor.search(Some("red dress")).await.unwrap();
        assert_eq!(results[0].description, "red dress fashion clothing");
    }
}
