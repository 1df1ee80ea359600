use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, error, info};

use crate::{config::{mask, Config}, error::UpstreamError, util::{base64_encode, preview, truncate_base64_in_json}};

/// Which model tier a request should run on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelVariant {
    /// Heavier tier, used whenever the request carries photos.
    Vision,
    /// Lighter, cheaper tier for text-only requests.
    Text,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PromptPart {
    Text(String),
    Image { mime_type: String, data: Bytes },
}

#[derive(Debug, Clone)]
pub struct ModelRequest {
    pub variant: ModelVariant,
    pub system: String,
    pub parts: Vec<PromptPart>,
    pub temperature: f32,
    pub max_output_tokens: u32,
    /// Ask the provider for a bare JSON reply.
    pub json_output: bool,
}

impl ModelRequest {
    pub fn image_count(&self) -> usize {
        self.parts.iter().filter(|p| matches!(p, PromptPart::Image { .. })).count()
    }
}

#[async_trait]
pub trait GenerativeModel: Send + Sync {
    /// Run one generation and return the model's raw text reply.
    async fn generate(&self, request: &ModelRequest) -> Result<String, UpstreamError>;
}

pub struct GeminiClient {
    client: Client,
    api_key: Option<String>,
    base_url: String,
    vision_model: String,
    text_model: String,
}

impl GeminiClient {
    pub fn new(config: &Config, client: Client) -> Self {
        Self {
            client,
            api_key: config.gemini_api_key.clone(),
            base_url: config.gemini_api_base.trim_end_matches('/').to_string(),
            vision_model: config.gemini_vision_model.clone(),
            text_model: config.gemini_text_model.clone(),
        }
    }

    fn model_name(&self, variant: ModelVariant) -> &str {
        match variant {
            ModelVariant::Vision => &self.vision_model,
            ModelVariant::Text => &self.text_model,
        }
    }

    fn request_body(request: &ModelRequest) -> serde_json::Value {
        let parts: Vec<serde_json::Value> = request
            .parts
            .iter()
            .map(|p| match p {
                PromptPart::Text(text) => json!({ "text": text }),
                PromptPart::Image { mime_type, data } => json!({
                    "inlineData": { "mimeType": mime_type, "data": base64_encode(data) }
                }),
            })
            .collect();

        let mut generation_config = json!({
            "temperature": request.temperature,
            "maxOutputTokens": request.max_output_tokens,
            "candidateCount": 1,
            // 2.5 models think by default and that budget shares maxOutputTokens.
            "thinkingConfig": { "thinkingBudget": 0 }
        });
        if request.json_output {
            generation_config["responseMimeType"] = json!("application/json");
        }

        json!({
            "systemInstruction": { "parts": [{ "text": request.system }] },
            "contents": [{ "role": "user", "parts": parts }],
            "generationConfig": generation_config
        })
    }
}

#[async_trait]
impl GenerativeModel for GeminiClient {
    async fn generate(&self, request: &ModelRequest) -> Result<String, UpstreamError> {
        let Some(api_key) = self.api_key.as_deref() else {
            info!("Using demo mode - GEMINI_API_KEY not set, skipping model call");
            return Err(UpstreamError::MissingCredentials("Gemini"));
        };

        let model = self.model_name(request.variant);
        let url = format!("{}/models/{}:generateContent?key={}", self.base_url, model, api_key);
        info!("🔗 Making request to: {} ({} images)", url.replace(api_key, &mask(api_key)), request.image_count());

        let body = Self::request_body(request);
        if tracing::enabled!(tracing::Level::DEBUG) {
            let mut logged = body.clone();
            truncate_base64_in_json(&mut logged);
            debug!("📤 Request body: {}", serde_json::to_string_pretty(&logged).unwrap_or_default());
        }

        let response = self.client.post(&url).json(&body).send().await?;
        let status = response.status();
        info!("📥 Response status: {}", status);

        let response_text = response.text().await?;
        if !status.is_success() {
            error!("❌ Gemini API error response: {}", preview(&response_text));
            return Err(UpstreamError::Status { status: status.as_u16(), body: response_text });
        }

        let parsed: GeminiResponse = serde_json::from_str(&response_text)
            .map_err(|e| UpstreamError::Parse(format!("{}: {}", e, preview(&response_text))))?;

        let text = reply_text(parsed)?;
        debug!("📥 Model reply: {}", preview(&text));
        Ok(text)
    }
}

// --- Response Parsing Helpers ---

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback { #[serde(default)] block_reason: Option<String> }

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Content,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct Content { #[serde(default)] parts: Vec<Part> }

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Part {
    Text { text: String },
    Other(serde_json::Value),
}

/// Text of a finished reply. Blocked prompts and replies cut off by the
/// token limit are provider errors, not truncated JSON.
fn reply_text(parsed: GeminiResponse) -> Result<String, UpstreamError> {
    if let Some(reason) = parsed.prompt_feedback.and_then(|f| f.block_reason) {
        return Err(UpstreamError::Provider(format!("prompt blocked: {reason}")));
    }
    if let Some(reason) = parsed.candidates.first().and_then(|c| c.finish_reason.as_deref()) {
        if reason == "MAX_TOKENS" {
            return Err(UpstreamError::Provider("reply truncated at maxOutputTokens (finishReason=MAX_TOKENS)".into()));
        }
    }
    let text = extract_text(&parsed.candidates);
    if text.trim().is_empty() {
        return Err(UpstreamError::Empty);
    }
    Ok(text.trim().to_string())
}

fn extract_text(candidates: &[Candidate]) -> String {
    candidates
        .first()
        .map(|c| {
            c.content
                .parts
                .iter()
                .filter_map(|p| match p {
                    Part::Text { text } => Some(text.as_str()),
                    Part::Other(_) => None,
                })
                .collect::<Vec<_>>()
                .join("")
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn request(json_output: bool) -> ModelRequest {
        ModelRequest {
            variant: ModelVariant::Vision,
            system: "You are a fashion expert.".into(),
            parts: vec![
                PromptPart::Text("hello".into()),
                PromptPart::Image { mime_type: "image/png".into(), data: Bytes::from_static(b"abc") },
            ],
            temperature: 0.5,
            max_output_tokens: 800,
            json_output,
        }
    }

    #[test]
    fn request_body_carries_inline_images_and_json_mode() {
        let body = GeminiClient::request_body(&request(true));
        assert_eq!(body["contents"][0]["parts"][0]["text"], "hello");
        assert_eq!(body["contents"][0]["parts"][1]["inlineData"]["mimeType"], "image/png");
        assert_eq!(body["contents"][0]["parts"][1]["inlineData"]["data"], "YWJj");
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 800);
        assert_eq!(body["generationConfig"]["responseMimeType"], "application/json");

        let plain = GeminiClient::request_body(&request(false));
        assert!(plain["generationConfig"].get("responseMimeType").is_none());
    }

    #[test]
    fn thinking_is_disabled_so_the_token_cap_covers_the_reply() {
        for json_output in [true, false] {
            let body = GeminiClient::request_body(&request(json_output));
            assert_eq!(body["generationConfig"]["thinkingConfig"]["thinkingBudget"], 0);
        }
    }

    #[test]
    fn truncated_reply_is_a_provider_error() {
        let parsed: GeminiResponse = serde_json::from_str(
            r#"{"candidates":[{"content":{"parts":[{"text":"{\"style\": {\"title\""}]},"finishReason":"MAX_TOKENS"}]}"#,
        )
        .unwrap();
        let err = reply_text(parsed).unwrap_err();
        assert!(matches!(err, UpstreamError::Provider(msg) if msg.contains("MAX_TOKENS")));

        let finished: GeminiResponse = serde_json::from_str(
            r#"{"candidates":[{"content":{"parts":[{"text":" {\"a\":1} "}]},"finishReason":"STOP"}]}"#,
        )
        .unwrap();
        assert_eq!(reply_text(finished).unwrap(), "{\"a\":1}");

        let blocked: GeminiResponse = serde_json::from_str(r#"{"promptFeedback":{"blockReason":"SAFETY"}}"#).unwrap();
        assert!(matches!(reply_text(blocked), Err(UpstreamError::Provider(_))));
    }

    #[test]
    fn extracts_joined_text_parts_from_first_candidate() {
        let parsed: GeminiResponse = serde_json::from_str(
            r#"{"candidates":[{"content":{"parts":[{"text":"{\"a\":"},{"inlineData":{"data":"x","mimeType":"image/png"}},{"text":"1}"}]}}]}"#,
        )
        .unwrap();
        assert_eq!(extract_text(&parsed.candidates), "{\"a\":1}");
    }

    #[tokio::test]
    async fn demo_mode_fails_without_network() {
        let client = GeminiClient::new(&Config::default(), Client::new());
        let err = client.generate(&request(false)).await.unwrap_err();
        assert!(matches!(err, UpstreamError::MissingCredentials("Gemini")));
    }
}
