// src/models/generation.rs
use serde::{Deserialize, Serialize};

use super::chat::{GroundingUrl, Message};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum AspectRatio {
    #[serde(rename = "1:1")]
    Square,
    #[serde(rename = "2:3")]
    Portrait2x3,
    #[serde(rename = "3:2")]
    Landscape3x2,
    #[serde(rename = "3:4")]
    Portrait3x4,
    #[serde(rename = "4:3")]
    Landscape4x3,
    #[serde(rename = "9:16")]
    Portrait9x16,
    #[default]
    #[serde(rename = "16:9")]
    Landscape16x9,
    #[serde(rename = "21:9")]
    Cinematic21x9,
}

impl AspectRatio {
    pub fn as_str(&self) -> &'static str {
        match self {
            AspectRatio::Square => "1:1",
            AspectRatio::Portrait2x3 => "2:3",
            AspectRatio::Landscape3x2 => "3:2",
            AspectRatio::Portrait3x4 => "3:4",
            AspectRatio::Landscape4x3 => "4:3",
            AspectRatio::Portrait9x16 => "9:16",
            AspectRatio::Landscape16x9 => "16:9",
            AspectRatio::Cinematic21x9 => "21:9",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ImageSize {
    #[default]
    #[serde(rename = "1K")]
    Size1K,
    #[serde(rename = "2K")]
    Size2K,
    #[serde(rename = "4K")]
    Size4K,
}

impl ImageSize {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageSize::Size1K => "1K",
            ImageSize::Size2K => "2K",
            ImageSize::Size4K => "4K",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ModelTier {
    #[default]
    #[serde(rename = "Gemini 2.5 Flash")]
    Flash25,
    #[serde(rename = "Gemini 3 Pro")]
    Pro3,
    #[serde(rename = "Gemini 3")]
    Gemini3,
    #[serde(rename = "Nano Banana")]
    NanoBanana,
}

impl ModelTier {
    pub fn text_model(&self) -> &'static str {
        match self {
            ModelTier::Flash25 => "gemini-2.5-flash",
            ModelTier::Pro3 => "gemini-3-pro-preview",
            ModelTier::Gemini3 => "gemini-3-preview",
            ModelTier::NanoBanana => "nano-banana",
        }
    }

    pub fn image_model(&self) -> &'static str {
        match self {
            ModelTier::Flash25 => "gemini-2.5-flash-image",
            ModelTier::Pro3 => "gemini-3-pro-image-preview",
            ModelTier::Gemini3 => "gemini-3-image-preview",
            ModelTier::NanoBanana => "nano-banana",
        }
    }

    /// Only the Gemini 3 image models accept an explicit output resolution.
    pub fn supports_image_size(&self) -> bool {
        matches!(self, ModelTier::Pro3 | ModelTier::Gemini3)
    }
}

/// Structured prompt-builder form, stored per chat session as a JSON blob.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BuilderData {
    pub task: String,
    pub reference: String,
    pub building_type: String,
    pub arch_style: Vec<String>,
    pub arch_style_custom: String,
    pub roof_mat: String,
    pub wall_mat: String,
    pub ground_mat: String,
    pub context: String,
    pub mood: Vec<String>,
    pub camera: String,
    pub view: String,
    pub focal: String,
    pub lens: String,
    pub dof: String,
}

impl Default for BuilderData {
    fn default() -> Self {
        Self {
            task: "Text to Image".to_string(),
            reference: "Photo Real".to_string(),
            building_type: String::new(),
            arch_style: vec!["Modern".to_string()],
            arch_style_custom: String::new(),
            roof_mat: String::new(),
            wall_mat: String::new(),
            ground_mat: String::new(),
            context: String::new(),
            mood: vec!["Sunny bright day".to_string()],
            camera: "Sony A7R V".to_string(),
            view: "Eye level".to_string(),
            focal: "35mm".to_string(),
            lens: "Normal lens".to_string(),
            dof: "No".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageInput {
    /// Base64 payload without the `data:` prefix
    pub data: String,
    pub mime_type: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct UserLocation {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatGenerationRequest {
    #[serde(default)]
    pub message: String,
    pub builder: Option<BuilderData>,
    #[serde(default)]
    pub history: Vec<Message>,
    #[serde(default)]
    pub images: Vec<ImageInput>,
    #[serde(default)]
    pub use_search: bool,
    #[serde(default)]
    pub use_maps: bool,
    #[serde(default)]
    pub model_tier: ModelTier,
    pub user_location: Option<UserLocation>,
    pub session_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatGenerationResponse {
    pub text: String,
    pub grounding_urls: Vec<GroundingUrl>,
    /// Id of the persisted model message when a session was given
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisualizeRequest {
    #[serde(default)]
    pub prompt: String,
    #[serde(default)]
    pub aspect_ratio: AspectRatio,
    #[serde(default)]
    pub image_size: ImageSize,
    #[serde(default = "default_visualizer_tier")]
    pub model_tier: ModelTier,
    pub session_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestyleRequest {
    pub base_image: Option<ImageInput>,
    #[serde(default)]
    pub prompt: String,
    #[serde(default)]
    pub aspect_ratio: AspectRatio,
    #[serde(default)]
    pub image_size: ImageSize,
    #[serde(default)]
    pub model_tier: ModelTier,
    pub session_id: Option<String>,
}

fn default_visualizer_tier() -> ModelTier {
    ModelTier::Pro3
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaAssetKind {
    Visualizer,
    Restyler,
}

/// A generated image handed back to the browser, which keeps its own media library.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaAsset {
    pub id: String,
    pub data: String,
    pub mime_type: String,
    pub prompt: String,
    /// Milliseconds since the Unix epoch
    pub timestamp: i64,
    pub model: ModelTier,
    pub aspect_ratio: AspectRatio,
    pub image_size: ImageSize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(rename = "type")]
    pub kind: MediaAssetKind,
}
