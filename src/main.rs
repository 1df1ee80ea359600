mod aggregator;
mod analyzer;
mod assembler;
mod config;
mod error;
mod gemini;
mod generator;
mod image_gen;
mod models;
mod photos;
mod routes;
mod search;
mod session;
mod synthesizer;
mod util;

use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use tracing_subscriber::{fmt, EnvFilter};

use crate::{
    aggregator::ProductSearchAggregator,
    analyzer::PhotoAttributeAnalyzer,
    assembler::StyleAdvisor,
    config::{mask, Config},
    gemini::GeminiClient,
    generator::StyleProfileGenerator,
    image_gen::HuggingFaceClient,
    routes::{router, AppState},
    search::SerpApiClient,
    session::SessionStore,
    synthesizer::StyleImageSynthesizer,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    // Init tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).init();

    let config = Config::from_env();
    match &config.gemini_api_key {
        Some(key) => tracing::info!("Using Gemini API key: {}", mask(key)),
        None => tracing::warn!("⚠️ GEMINI_API_KEY not set, every profile will use the fallback"),
    }
    if config.huggingface_api_key.is_none() {
        tracing::warn!("⚠️ HUGGINGFACE_API_KEY not set, style images will be placeholders");
    }
    if config.serpapi_api_key.is_none() {
        tracing::warn!("⚠️ SERPAPI_API_KEY not set, product searches will return nothing");
    }

    let http = config.http_client();
    let model = Arc::new(GeminiClient::new(&config, http.clone()));
    let advisor = StyleAdvisor::new(
        PhotoAttributeAnalyzer::new(model.clone()),
        StyleProfileGenerator::new(model),
        StyleImageSynthesizer::new(Arc::new(HuggingFaceClient::new(&config, http.clone()))),
        ProductSearchAggregator::new(Arc::new(SerpApiClient::new(&config, http))),
        SessionStore::new(config.session_ttl),
    );
    let app = router(AppState { advisor: Arc::new(advisor) });

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!(%addr, "Starting server");
    let listener = tokio::net::TcpListener::bind(addr).await.with_context(|| format!("failed to bind {addr}"))?;
    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}
