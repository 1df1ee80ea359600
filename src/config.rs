use std::{env, time::Duration};

/// Process configuration, read once from the environment at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub gemini_api_key: Option<String>,
    pub gemini_api_base: String,
    pub gemini_vision_model: String,
    pub gemini_text_model: String,
    pub huggingface_api_key: Option<String>,
    pub huggingface_api_base: String,
    pub huggingface_image_model: String,
    pub serpapi_api_key: Option<String>,
    pub serpapi_base_url: String,
    pub upstream_timeout: Duration,
    pub session_ttl: chrono::Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8080,
            gemini_api_key: None,
            gemini_api_base: "https://generativelanguage.googleapis.com/v1beta".into(),
            gemini_vision_model: "gemini-2.5-flash".into(),
            gemini_text_model: "gemini-2.5-flash-lite".into(),
            huggingface_api_key: None,
            huggingface_api_base: "https://api-inference.huggingface.co/models".into(),
            huggingface_image_model: "stabilityai/stable-diffusion-xl-base-1.0".into(),
            serpapi_api_key: None,
            serpapi_base_url: "https://serpapi.com/search".into(),
            upstream_timeout: Duration::from_secs(60),
            session_ttl: chrono::Duration::minutes(60),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            port: parsed("PORT").unwrap_or(defaults.port),
            gemini_api_key: secret("GEMINI_API_KEY"),
            gemini_api_base: env::var("GEMINI_API_BASE").unwrap_or(defaults.gemini_api_base),
            gemini_vision_model: env::var("GEMINI_VISION_MODEL").unwrap_or(defaults.gemini_vision_model),
            gemini_text_model: env::var("GEMINI_TEXT_MODEL").unwrap_or(defaults.gemini_text_model),
            huggingface_api_key: secret("HUGGINGFACE_API_KEY"),
            huggingface_api_base: env::var("HUGGINGFACE_API_BASE").unwrap_or(defaults.huggingface_api_base),
            huggingface_image_model: env::var("HUGGINGFACE_IMAGE_MODEL").unwrap_or(defaults.huggingface_image_model),
            serpapi_api_key: secret("SERPAPI_API_KEY"),
            serpapi_base_url: env::var("SERPAPI_BASE_URL").unwrap_or(defaults.serpapi_base_url),
            upstream_timeout: parsed("UPSTREAM_TIMEOUT_SECS").map(Duration::from_secs).unwrap_or(defaults.upstream_timeout),
            session_ttl: session_ttl(parsed("SESSION_TTL_MINUTES")).unwrap_or(defaults.session_ttl),
        }
    }

    /// Shared HTTP client for every outbound provider, with a bounded timeout.
    pub fn http_client(&self) -> reqwest::Client {
        reqwest::Client::builder()
            .timeout(self.upstream_timeout)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!("⚠️ Failed to build HTTP client with timeout ({}), using defaults", e);
                reqwest::Client::new()
            })
    }
}

/// Longest accepted session TTL: one year.
const MAX_SESSION_TTL_MINUTES: i64 = 365 * 24 * 60;

// Out-of-range values fall back to the default instead of overflowing later.
fn session_ttl(minutes: Option<i64>) -> Option<chrono::Duration> {
    let minutes = minutes?;
    if !(1..=MAX_SESSION_TTL_MINUTES).contains(&minutes) {
        tracing::warn!("⚠️ SESSION_TTL_MINUTES={} is out of range (1..={}), using default", minutes, MAX_SESSION_TTL_MINUTES);
        return None;
    }
    chrono::Duration::try_minutes(minutes)
}

fn parsed<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

// Unset and blank keys both mean "no credential".
fn secret(key: &str) -> Option<String> {
    env::var(key).ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// Mask a key for logging, keeping only a short prefix.
pub fn mask(key: &str) -> String {
    format!("{}...", key.chars().take(6).collect::<String>())
}
