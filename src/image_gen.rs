use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{header::CONTENT_TYPE, Client};
use serde::Serialize;
use tracing::{error, info};

use crate::{config::Config, error::UpstreamError, util::preview};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageParameters {
    pub negative_prompt: String,
    pub num_inference_steps: u32,
    pub guidance_scale: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageRequest {
    pub inputs: String,
    pub parameters: ImageParameters,
}

#[derive(Debug, Clone)]
pub struct GeneratedImage {
    pub mime_type: String,
    pub bytes: Bytes,
}

#[async_trait]
pub trait ImageGenerator: Send + Sync {
    async fn text_to_image(&self, request: &ImageRequest) -> Result<GeneratedImage, UpstreamError>;
}

/// Text-to-image over the Hugging Face inference API.
pub struct HuggingFaceClient {
    client: Client,
    api_key: Option<String>,
    base_url: String,
    model: String,
}

impl HuggingFaceClient {
    pub fn new(config: &Config, client: Client) -> Self {
        Self {
            client,
            api_key: config.huggingface_api_key.clone(),
            base_url: config.huggingface_api_base.trim_end_matches('/').to_string(),
            model: config.huggingface_image_model.clone(),
        }
    }
}

#[async_trait]
impl ImageGenerator for HuggingFaceClient {
    async fn text_to_image(&self, request: &ImageRequest) -> Result<GeneratedImage, UpstreamError> {
        let api_key = self.api_key.as_deref().ok_or(UpstreamError::MissingCredentials("Hugging Face"))?;
        let url = format!("{}/{}", self.base_url, self.model);
        info!("🎨 Requesting image from {} with prompt: {}", url, preview(&request.inputs));

        let response = self.client
            .post(&url)
            .bearer_auth(api_key)
            .header("Accept", "image/png")
            .json(request)
            .send()
            .await?;

        let status = response.status();
        let mime_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("image/png")
            .to_string();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("❌ Hugging Face API error: status={} body={}", status, preview(&body));
            return Err(UpstreamError::Status { status: status.as_u16(), body });
        }
        if !mime_type.starts_with("image/") {
            let body = response.text().await.unwrap_or_default();
            return Err(UpstreamError::Provider(format!("unexpected content type {mime_type}: {}", preview(&body))));
        }

        let bytes = response.bytes().await?;
        if bytes.is_empty() {
            return Err(UpstreamError::Empty);
        }
        info!("✅ Received {} image ({} bytes)", mime_type, bytes.len());
        Ok(GeneratedImage { mime_type, bytes })
    }
}
