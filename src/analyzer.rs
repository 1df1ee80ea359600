use std::sync::Arc;

use tracing::{info, warn};

use crate::{
    gemini::{GenerativeModel, ModelRequest, ModelVariant, PromptPart},
    models::UserAttributes,
    photos::Photo,
    util::{json_object_span, preview},
};

const ANALYSIS_INSTRUCTION: &str = "You are a fashion expert and personal stylist. Analyze the provided photo of a person to extract \
physical attributes relevant for fashion recommendations. Be respectful, inclusive, and focus only on attributes \
that would help with clothing recommendations. Provide your analysis in JSON format with the following fields:\n\
- gender_presentation: The apparent gender presentation (masculine, feminine, androgynous, etc.)\n\
- apparent_age_range: Estimated age range (e.g., \"18-25\", \"25-35\", \"35-50\", etc.)\n\
- body_type: Body shape and proportions (e.g., rectangle, hourglass, athletic, pear, apple, etc.)\n\
- height_impression: Impression of height (tall, average, petite)\n\
- skin_tone: General skin tone category (very fair, fair, medium, olive, tan, deep, etc.)\n\
- style_suggestions: 3-5 specific style suggestions based on the person's physical attributes\n\
- colors_to_complement: 3-5 color recommendations that would complement their skin tone and features\n\
- avoid_styles: 1-2 styles or cuts that might be less flattering for their body type";

const ANALYSIS_REQUEST: &str = "Please analyze this photo and provide the attributes in JSON format as specified.";

/// Extracts physical-attribute hints from a self-photo. Never fails: any
/// problem yields empty attributes.
pub struct PhotoAttributeAnalyzer {
    model: Arc<dyn GenerativeModel>,
}

impl PhotoAttributeAnalyzer {
    pub fn new(model: Arc<dyn GenerativeModel>) -> Self { Self { model } }

    pub fn request_for(photo: &Photo) -> ModelRequest {
        ModelRequest {
            variant: ModelVariant::Vision,
            system: ANALYSIS_INSTRUCTION.to_string(),
            parts: vec![
                PromptPart::Image { mime_type: photo.mime_type.clone(), data: photo.bytes.clone() },
                PromptPart::Text(ANALYSIS_REQUEST.to_string()),
            ],
            temperature: 0.5,
            max_output_tokens: 800,
            json_output: false,
        }
    }

    pub async fn analyze(&self, self_photo: Option<&Photo>) -> UserAttributes {
        let Some(photo) = self_photo else {
            return UserAttributes::default();
        };

        info!("🧍 Analyzing profile photo ({} bytes)...", photo.bytes.len());
        match self.model.generate(&Self::request_for(photo)).await {
            Ok(text) => parse_attributes(&text),
            Err(e) => {
                warn!("⚠️ Error analyzing user photo: {}", e);
                UserAttributes::default()
            }
        }
    }
}

pub fn parse_attributes(text: &str) -> UserAttributes {
    let Some(span) = json_object_span(text) else {
        warn!("⚠️ Could not find JSON in user photo analysis response");
        return UserAttributes::default();
    };
    match serde_json::from_str::<UserAttributes>(span) {
        Ok(attributes) => {
            info!("✅ Extracted user attributes (empty={})", attributes.is_empty());
            attributes
        }
        Err(e) => {
            warn!("⚠️ Error parsing user photo analysis: {} ({})", e, preview(text));
            UserAttributes::default()
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::error::UpstreamError;
    use async_trait::async_trait;
    use bytes::Bytes;
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;
    use std::collections::VecDeque;

    /// Scripted model: replays queued replies and records every request.
    #[derive(Default)]
    pub(crate) struct ScriptedModel {
        pub replies: Mutex<VecDeque<Result<String, UpstreamError>>>,
        pub requests: Mutex<Vec<ModelRequest>>,
    }

    impl ScriptedModel {
        pub fn replying(replies: Vec<Result<String, UpstreamError>>) -> Arc<Self> {
            Arc::new(Self { replies: Mutex::new(replies.into()), requests: Mutex::default() })
        }

        pub fn calls(&self) -> usize { self.requests.lock().len() }
    }

    #[async_trait]
    impl GenerativeModel for ScriptedModel {
        async fn generate(&self, request: &ModelRequest) -> Result<String, UpstreamError> {
            self.requests.lock().push(request.clone());
            self.replies.lock().pop_front().unwrap_or(Err(UpstreamError::Empty))
        }
    }

    pub(crate) fn png_photo() -> Photo {
        Photo::from_upload(Bytes::from_static(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 1, 2, 3])).unwrap()
    }

    #[tokio::test]
    async fn no_photo_means_no_call_and_empty_attributes() {
        let model = ScriptedModel::replying(vec![Ok("{\"body_type\":\"athletic\"}".into())]);
        let analyzer = PhotoAttributeAnalyzer::new(model.clone());
        assert!(analyzer.analyze(None).await.is_empty());
        assert_eq!(model.calls(), 0);
    }

    #[tokio::test]
    async fn parses_json_wrapped_in_prose() {
        let model = ScriptedModel::replying(vec![Ok(
            "Sure! Here you go:\n{\"skin_tone\":\"olive\",\"colors_to_complement\":[\"navy\",\"rust\"]}\nHope it helps.".into(),
        )]);
        let analyzer = PhotoAttributeAnalyzer::new(model.clone());
        let attrs = analyzer.analyze(Some(&png_photo())).await;
        assert_eq!(attrs.skin_tone.as_deref(), Some("olive"));
        assert_eq!(attrs.colors_to_complement, Some(vec!["navy".to_string(), "rust".to_string()]));

        let requests = model.requests.lock();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].variant, ModelVariant::Vision);
        assert_eq!(requests[0].temperature, 0.5);
        assert_eq!(requests[0].image_count(), 1);
        for field in ["gender_presentation", "apparent_age_range", "body_type", "height_impression", "skin_tone",
                      "style_suggestions", "colors_to_complement", "avoid_styles"] {
            assert!(requests[0].system.contains(field), "instruction should mention {field}");
        }
    }

    #[tokio::test]
    async fn fails_open_on_bad_output_or_call_failure() {
        let model = ScriptedModel::replying(vec![
            Ok("I cannot help with that.".into()),
            Ok("{\"body_type\": }".into()),
            Err(UpstreamError::Timeout),
        ]);
        let analyzer = PhotoAttributeAnalyzer::new(model.clone());
        let photo = png_photo();
        for _ in 0..3 {
            assert_eq!(analyzer.analyze(Some(&photo)).await, UserAttributes::default());
        }
        assert_eq!(model.calls(), 3);
    }
}
