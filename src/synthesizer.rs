use std::sync::Arc;

use tokio::{sync::watch, task::JoinHandle};
use tracing::{error, info};

use crate::{
    image_gen::{ImageGenerator, ImageParameters, ImageRequest},
    models::ImageState,
    photos::PhotoSet,
    util::{base64_encode, data_url},
};

pub const NEGATIVE_PROMPT: &str = "low quality, blurry, distorted";
pub const INFERENCE_STEPS: u32 = 50;
pub const GUIDANCE_SCALE: f32 = 7.5;

pub fn image_prompt(description: &str) -> String {
    format!("Generate a fashion style image based on: {}", description.trim())
}

/// Static illustration used when synthesis fails.
pub fn placeholder_image() -> String {
    let svg = r##"<svg width="512" height="512" xmlns="http://www.w3.org/2000/svg">
    <defs>
        <linearGradient id="grad" x1="0%" y1="0%" x2="100%" y2="100%">
            <stop offset="0%" style="stop-color:#8B5CF6;stop-opacity:1" />
            <stop offset="100%" style="stop-color:#EC4899;stop-opacity:0.6" />
        </linearGradient>
    </defs>
    <rect width="512" height="512" fill="url(#grad)" />
    <text x="256" y="256" font-family="Arial, sans-serif" font-size="28" font-weight="bold"
          text-anchor="middle" fill="white">Your Style</text>
    <text x="256" y="300" font-family="Arial, sans-serif" font-size="14"
          text-anchor="middle" fill="white" opacity="0.8">Illustration unavailable</text>
</svg>"##;
    format!("data:image/svg+xml;base64,{}", base64_encode(svg.as_bytes()))
}

/// Write side of a session's image state. Only the first fill takes effect.
#[derive(Debug)]
pub struct ImageSlot(watch::Sender<ImageState>);

impl ImageSlot {
    pub fn channel() -> (Self, watch::Receiver<ImageState>) {
        let (tx, rx) = watch::channel(ImageState::Pending);
        (Self(tx), rx)
    }

    pub fn fill(&self, state: ImageState) -> bool {
        self.0.send_if_modified(|current| {
            if matches!(current, ImageState::Pending) {
                *current = state;
                true
            } else {
                false
            }
        })
    }
}

pub struct StyleImageSynthesizer {
    generator: Arc<dyn ImageGenerator>,
}

impl StyleImageSynthesizer {
    pub fn new(generator: Arc<dyn ImageGenerator>) -> Self { Self { generator } }

    pub fn request_for(description: &str) -> ImageRequest {
        ImageRequest {
            inputs: image_prompt(description),
            parameters: ImageParameters {
                negative_prompt: NEGATIVE_PROMPT.to_string(),
                num_inference_steps: INFERENCE_STEPS,
                guidance_scale: GUIDANCE_SCALE,
            },
        }
    }

    /// One synthesis attempt; failures become the placeholder.
    pub async fn synthesize(&self, description: &str) -> ImageState {
        match self.generator.text_to_image(&Self::request_for(description)).await {
            Ok(image) => ImageState::Ready { image: data_url(&image.mime_type, &image.bytes), placeholder: false },
            Err(e) => {
                error!("❌ Style image generation failed, using placeholder: {}", e);
                ImageState::Ready { image: placeholder_image(), placeholder: true }
            }
        }
    }

    /// Run synthesis off the request path. `photos` is held until the attempt
    /// finishes so the request's photo bytes outlive every reader.
    pub fn spawn(self: &Arc<Self>, description: String, photos: Arc<PhotoSet>, slot: ImageSlot) -> JoinHandle<()> {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let state = this.synthesize(&description).await;
            let placeholder = matches!(state, ImageState::Ready { placeholder: true, .. });
            if slot.fill(state) {
                info!("🖼️ Style image attached (placeholder={})", placeholder);
            }
            drop(photos);
        })
    }
}
