use std::{sync::Arc, time::Duration};

use axum::{
    extract::{multipart::MultipartRejection, DefaultBodyLimit, FromRequest, FromRequestParts, Multipart, State},
    routing::{get, post},
    Json, Router,
};
use tower_http::cors::{Any, CorsLayer};
use uuid::Uuid;

use crate::{
    assembler::StyleAdvisor,
    error::ApiError,
    models::{
        Budget, Category, CategoryResultsResponse, ImageQuery, ImageState, RecommendationResponse, SearchRequest, SearchResponse,
        SessionSnapshot,
    },
    photos::{Photo, PhotoSet},
};

/// Upper bound on a whole recommendation form, photos included.
pub const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;
/// Longest an image poll may block.
pub const MAX_IMAGE_WAIT: Duration = Duration::from_secs(30);

#[derive(Clone)]
pub struct AppState {
    pub advisor: Arc<StyleAdvisor>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/recommendations", post(create_recommendation))
        .route("/api/recommendations/:id", get(get_recommendation))
        .route("/api/recommendations/:id/image", get(get_image))
        .route("/api/recommendations/:id/categories/:category", get(get_category_results))
        .route("/api/search", post(search_products))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        )
        .with_state(state)
}

/// Fields extracted from the recommendation form.
#[derive(Debug, Default)]
struct RecommendationForm {
    preferences: String,
    budget: Budget,
    self_photo: Option<Photo>,
    aesthetic: Vec<Photo>,
}

fn is_aesthetic_field(name: &str) -> bool {
    ["inspiration_images", "aesthetic_photos"].iter().any(|prefix| name.starts_with(prefix))
}

/// `Path` whose rejections render as [`ApiError`].
#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(ApiError))]
pub struct Path<T>(pub T);

/// `Query` whose rejections render as [`ApiError`].
#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(ApiError))]
pub struct Query<T>(pub T);

/// `Json` request body whose rejections render as [`ApiError`].
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct JsonBody<T>(pub T);

async fn read_form(multipart: &mut Multipart) -> Result<RecommendationForm, ApiError> {
    let mut form = RecommendationForm::default();
    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "additional_info" => {
                form.preferences = field.text().await?;
            }
            "budget" => {
                let raw = field.text().await?;
                if !raw.trim().is_empty() {
                    form.budget = raw.parse().map_err(ApiError::Validation)?;
                }
            }
            "profile_photo" => {
                let bytes = field.bytes().await?;
                // Browsers send an empty part when no file was chosen.
                if !bytes.is_empty() {
                    let photo = Photo::from_upload(bytes)
                        .ok_or_else(|| ApiError::Validation("profile_photo is not a supported image".into()))?;
                    form.self_photo = Some(photo);
                }
            }
            other if is_aesthetic_field(other) => {
                let bytes = field.bytes().await?;
                if !bytes.is_empty() {
                    let photo = Photo::from_upload(bytes)
                        .ok_or_else(|| ApiError::Validation(format!("{other} is not a supported image")))?;
                    form.aesthetic.push(photo);
                }
            }
            other => tracing::debug!("Ignoring unknown form field '{}'", other),
        }
    }
    Ok(form)
}

pub async fn create_recommendation(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<RecommendationResponse>, ApiError> {
    let form = read_form(&mut multipart?).await?;
    let photos = PhotoSet::with_release_hook(form.self_photo, form.aesthetic, |released| {
        tracing::info!("🧹 Released uploaded photos ({} bytes)", released);
    });
    tracing::info!("📥 Received recommendation form ({} photo bytes)", photos.total_bytes());
    Ok(Json(state.advisor.recommend(&form.preferences, form.budget, photos).await))
}

pub async fn get_recommendation(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<Json<SessionSnapshot>, ApiError> {
    state.advisor.snapshot(id).map(Json)
}

pub async fn get_image(
    Path(id): Path<Uuid>,
    Query(query): Query<ImageQuery>,
    State(state): State<AppState>,
) -> Result<Json<ImageState>, ApiError> {
    let wait = query.wait_secs.map(|secs| Duration::from_secs(secs).min(MAX_IMAGE_WAIT));
    state.advisor.image(id, wait).await.map(Json)
}

pub async fn get_category_results(
    Path((id, category)): Path<(Uuid, String)>,
    State(state): State<AppState>,
) -> Result<Json<CategoryResultsResponse>, ApiError> {
    let category: Category = category.parse().map_err(ApiError::NotFound)?;
    state.advisor.category_results(id, category).await.map(Json)
}

pub async fn search_products(
    State(state): State<AppState>,
    JsonBody(body): JsonBody<SearchRequest>,
) -> Result<Json<SearchResponse>, ApiError> {
    let results = state.advisor.search(body.query.as_deref()).await?;
    tracing::info!("✅ Search returned {} results", results.len());
    Ok(Json(SearchResponse { results }))
}
