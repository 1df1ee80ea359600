use std::{ops::RangeInclusive, sync::Arc};

use tracing::{info, warn};

use crate::{
    gemini::{GenerativeModel, ModelRequest, ModelVariant, PromptPart},
    models::{Budget, Category, Recommendation, RecommendedItem, StyleProfile, UserAttributes},
    photos::PhotoSet,
    util::{json_object_span, preview},
};

/// Item count a generated recommendation must have to be accepted.
pub const ITEM_COUNT: RangeInclusive<usize> = 4..=6;

const SYSTEM_PROMPT: &str = "You are a fashion expert who provides specific and detailed clothing recommendations.";

const SELF_PHOTO_NOTE: &str = "I'm providing a photo of myself. Please analyze my body type, proportions, and overall \
appearance to recommend clothing that would be flattering for my physique.";

/// Model tier for a request: photos of any kind go to the vision tier.
pub fn select_variant(has_self_photo: bool, aesthetic_count: usize) -> ModelVariant {
    let has_images = has_self_photo || aesthetic_count > 0;
    if has_images { ModelVariant::Vision } else { ModelVariant::Text }
}

pub fn build_prompt(preferences: &str, budget: Budget, attributes: &UserAttributes, aesthetic_count: usize) -> String {
    let categories = Category::MODEL_FACING.map(Category::name);
    let mut prompt = format!(
        r#"As a fashion expert, analyze the provided information and generate fashion recommendations.

Please return your response in the following JSON format EXACTLY:
{{
    "style": {{
        "title": "Style category name",
        "description": "Description of the style",
        "tags": ["tag1", "tag2", ...]
    }},
    "items": [
        {{
            "description": "Detailed description of the recommended item",
            "category": "Category (must be one of: {})"
        }},
        ...
    ]
}}

Make sure to:
1. Include 4-6 items
2. Use the exact category names: {}
3. Make descriptions specific and detailed
4. Consider the provided budget level and style preferences
5. Return ONLY the JSON, no additional text

User preferences:
"#,
        categories.join(", "),
        categories.join(", "),
    );

    let preferences = preferences.trim();
    if !preferences.is_empty() {
        prompt.push_str(&format!("Style preferences: {preferences}\n"));
    }
    prompt.push_str(&format!("Budget level: {}\n", budget.label()));
    if !attributes.is_empty() {
        let serialized = serde_json::to_string_pretty(attributes).unwrap_or_default();
        prompt.push_str(&format!("User attributes: {serialized}\n"));
    }
    if aesthetic_count > 0 {
        prompt.push_str(&format!("Number of inspiration photos provided: {aesthetic_count}\n"));
    }
    prompt
}

/// Fixed recommendation used whenever generation fails or is unusable.
pub fn fallback(preferences: &str, budget: Budget) -> Recommendation {
    Recommendation {
        style: StyleProfile {
            title: "Casual".into(),
            description: "Casual style".into(),
            tags: vec!["casual".into(), "comfortable".into(), "everyday".into()],
            image: None,
        },
        items: vec![
            RecommendedItem { description: format!("Fashion item matching {}", preferences.trim()), category: Category::Tops },
            RecommendedItem { description: format!("Fashion item for {} budget", budget.label()), category: Category::Bottoms },
        ],
    }
}

/// Parse a model reply into a recommendation, or explain why it was rejected.
pub fn parse_recommendation(text: &str) -> Result<Recommendation, String> {
    let span = json_object_span(text).ok_or("no JSON object in reply")?;
    let mut recommendation: Recommendation = serde_json::from_str(span).map_err(|e| e.to_string())?;

    if recommendation.style.tags.is_empty() {
        return Err("style.tags is empty".into());
    }
    if !ITEM_COUNT.contains(&recommendation.items.len()) {
        return Err(format!("expected 4-6 items, got {}", recommendation.items.len()));
    }
    // The illustration is attached later, never by the model.
    recommendation.style.image = None;
    Ok(recommendation)
}

pub struct StyleProfileGenerator {
    model: Arc<dyn GenerativeModel>,
}

impl StyleProfileGenerator {
    pub fn new(model: Arc<dyn GenerativeModel>) -> Self { Self { model } }

    pub fn request_for(preferences: &str, budget: Budget, attributes: &UserAttributes, photos: &PhotoSet) -> ModelRequest {
        let aesthetic_count = photos.aesthetic_count();
        let mut parts = vec![PromptPart::Text(build_prompt(preferences, budget, attributes, aesthetic_count))];

        if let Some(photo) = &photos.self_photo {
            parts.push(PromptPart::Text(SELF_PHOTO_NOTE.to_string()));
            parts.push(PromptPart::Image { mime_type: photo.mime_type.clone(), data: photo.bytes.clone() });
        }
        if aesthetic_count > 0 {
            parts.push(PromptPart::Text(format!(
                "I'm also providing {aesthetic_count} photo(s) of fashion styles I like. Please analyze these images carefully \
                 and consider their colors, patterns, textures, silhouettes, and overall aesthetic when generating your recommendations."
            )));
            for photo in &photos.aesthetic {
                parts.push(PromptPart::Image { mime_type: photo.mime_type.clone(), data: photo.bytes.clone() });
            }
        }

        ModelRequest {
            variant: select_variant(photos.has_self_photo(), aesthetic_count),
            system: SYSTEM_PROMPT.to_string(),
            parts,
            temperature: 0.7,
            max_output_tokens: 800,
            json_output: true,
        }
    }

    /// Always returns a well-formed recommendation; failures collapse into [`fallback`].
    pub async fn generate(
        &self,
        preferences: &str,
        budget: Budget,
        attributes: &UserAttributes,
        photos: &PhotoSet,
    ) -> Recommendation {
        let request = Self::request_for(preferences, budget, attributes, photos);
        info!("🎯 Generating style profile with {:?} model ({} images)", request.variant, request.image_count());

        let text = match self.model.generate(&request).await {
            Ok(text) => text,
            Err(e) => {
                warn!("⚠️ Style generation call failed, using fallback: {}", e);
                return fallback(preferences, budget);
            }
        };

        match parse_recommendation(&text) {
            Ok(recommendation) => {
                info!("✅ Style profile '{}' with {} items", recommendation.style.title, recommendation.items.len());
                recommendation
            }
            Err(reason) => {
                warn!("⚠️ Invalid style response ({}), using fallback: {}", reason, preview(&text));
                fallback(preferences, budget)
            }
        }
    }
}
