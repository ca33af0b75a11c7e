use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

use crate::models::chat::{GroundingUrl, Message};
use crate::models::generation::{AspectRatio, ImageInput, ImageSize, ModelTier, UserLocation};
use crate::services::prompt_builder::enhance_visualizer_prompt;

/// Maps grounding is only served by this model, whatever tier was picked.
const MAPS_MODEL: &str = "gemini-2.5-flash";
const API_KEY_HEADER: &str = "x-goog-api-key";
const HISTORY_IMAGE_MIME: &str = "image/jpeg";
const DEFAULT_IMAGE_MIME: &str = "image/png";
pub const NO_RESPONSE_TEXT: &str = "I couldn't generate a response.";

const SYSTEM_INSTRUCTION: &str = r#"You are an expert AI Assistant for Architects, Interior Designers, and 3D Artists named ArchiGen.

CORE RESPONSIBILITY:
Generate high-quality, photorealistic rendering prompts based on user inputs.

PROMPT GENERATION INSTRUCTION:
When asked to generate a prompt, do NOT use numbered lists or headers like "1. PERINTAH...".
Instead, combine the following elements into a single, cohesive, highly detailed, and professional paragraph suitable for a text-to-image generator:
- Object & Architecture
- Materials & Textures
- Context, Activity & Environment
- Mood, Lighting, & Technical Camera Settings (e.g., Focal length, Camera model)

BEHAVIOR FOR IMAGE ANALYSIS (Image-to-Image):
If the user provides an image AND specific parameters (from the Prompt Builder):
1. Analyze the uploaded image for geometry, composition, and existing elements.
2. MERGE the visual analysis with the user's specific text constraints.
3. If a user specifies a parameter (e.g., "Mood: Sunset" or "Material: Concrete"), that text parameter OVERRIDES the image content.
4. Output the final merged result as a single detailed prompt paragraph.

GENERAL ADVICE:
- If asked for technical advice (not a prompt), be concise and professional.
- Assume "Photo Realistic" style unless told otherwise.
- For cameras, mention specific sensors like 'Phase One' or 'Sony A7R' if relevant to the requested quality.
"#;

#[derive(Error, Debug)]
pub enum GeminiError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Gemini API error ({status}): {body}")]
    Api { status: u16, body: String },
    #[error("error decoding response body: {0}")]
    Decode(#[from] serde_json::Error),
}

#[derive(Debug, Clone)]
pub struct GeminiClient {
    client: Client,
    api_key: String,
    base_url: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentRequest {
    pub contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<Tool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_config: Option<ToolConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generation_config: Option<GenerationConfig>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Content {
    #[serde(default)]
    pub parts: Vec<Part>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(untagged)]
pub enum Part {
    Text {
        text: String,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: InlineData,
    },
    // function calls, thoughts, anything this service does not use
    Other(Value),
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct InlineData {
    #[serde(rename = "mimeType", default)]
    pub mime_type: Option<String>,
    pub data: String, // base64 encoded data
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub enum Tool {
    #[serde(rename = "googleSearch")]
    GoogleSearch {},
    #[serde(rename = "googleMaps")]
    GoogleMaps {},
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolConfig {
    pub retrieval_config: RetrievalConfig,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrievalConfig {
    pub lat_lng: LatLng,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LatLng {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_config: Option<ImageConfig>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageConfig {
    pub aspect_ratio: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_size: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
    pub usage_metadata: Option<UsageMetadata>,
    pub prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    pub content: Option<Content>,
    pub finish_reason: Option<String>,
    pub grounding_metadata: Option<GroundingMetadata>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroundingMetadata {
    #[serde(default)]
    pub grounding_chunks: Vec<GroundingChunk>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GroundingChunk {
    pub web: Option<GroundingSource>,
    pub maps: Option<GroundingSource>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GroundingSource {
    pub uri: Option<String>,
    pub title: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptFeedback {
    pub block_reason: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageMetadata {
    #[serde(default)]
    pub prompt_token_count: u32,
    #[serde(default)]
    pub candidates_token_count: u32,
    #[serde(default)]
    pub total_token_count: u32,
}

/// One assistant turn: the new user message plus the context it is sent with.
#[derive(Debug)]
pub struct ChatTurn<'a> {
    pub message: &'a str,
    pub history: &'a [Message],
    pub images: &'a [ImageInput],
    pub use_search: bool,
    pub use_maps: bool,
    pub model_tier: ModelTier,
    pub location: Option<UserLocation>,
}

impl GenerateContentResponse {
    fn first_parts(&self) -> &[Part] {
        self.candidates
            .first()
            .and_then(|candidate| candidate.content.as_ref())
            .map(|content| content.parts.as_slice())
            .unwrap_or(&[])
    }

    /// Text of the first text part of the first candidate.
    pub fn text(&self) -> Option<&str> {
        self.first_parts().iter().find_map(|part| match part {
            Part::Text { text } if !text.is_empty() => Some(text.as_str()),
            _ => None,
        })
    }

    pub fn grounding_urls(&self) -> Vec<GroundingUrl> {
        let chunks = self
            .candidates
            .first()
            .and_then(|candidate| candidate.grounding_metadata.as_ref())
            .map(|metadata| metadata.grounding_chunks.as_slice())
            .unwrap_or(&[]);

        let mut urls = Vec::new();
        for chunk in chunks {
            if let Some(uri) = chunk.web.as_ref().and_then(|web| web.uri.clone()) {
                let title = chunk
                    .web
                    .as_ref()
                    .and_then(|web| web.title.clone())
                    .unwrap_or_else(|| uri.clone());
                urls.push(GroundingUrl { uri, title });
            }
            if let Some(uri) = chunk.maps.as_ref().and_then(|maps| maps.uri.clone()) {
                let title = chunk
                    .maps
                    .as_ref()
                    .and_then(|maps| maps.title.clone())
                    .unwrap_or_else(|| "View on Google Maps".to_string());
                urls.push(GroundingUrl { uri, title });
            }
        }
        urls
    }

    /// First inline image as (mime type, base64 data).
    pub fn image(&self) -> Option<(String, String)> {
        self.first_parts().iter().find_map(|part| match part {
            Part::InlineData { inline_data } => Some((
                inline_data
                    .mime_type
                    .clone()
                    .unwrap_or_else(|| DEFAULT_IMAGE_MIME.to_string()),
                inline_data.data.clone(),
            )),
            _ => None,
        })
    }

    pub fn block_reason(&self) -> Option<&str> {
        self.prompt_feedback
            .as_ref()
            .and_then(|feedback| feedback.block_reason.as_deref())
    }
}

fn inline_part(mime_type: &str, data: &str) -> Part {
    Part::InlineData {
        inline_data: InlineData {
            mime_type: Some(mime_type.to_string()),
            data: data.to_string(),
        },
    }
}

fn image_generation_config(
    aspect_ratio: AspectRatio,
    image_size: ImageSize,
    model_tier: ModelTier,
) -> GenerationConfig {
    GenerationConfig {
        image_config: Some(ImageConfig {
            aspect_ratio: aspect_ratio.as_str().to_string(),
            image_size: model_tier
                .supports_image_size()
                .then(|| image_size.as_str().to_string()),
        }),
    }
}

/// Builds the assistant request and picks the model for it.
pub fn build_chat_request(turn: &ChatTurn<'_>) -> (String, GenerateContentRequest) {
    let (model, tools, tool_config) = if turn.use_maps {
        let tool_config = turn.location.map(|location| ToolConfig {
            retrieval_config: RetrievalConfig {
                lat_lng: LatLng {
                    latitude: location.lat,
                    longitude: location.lng,
                },
            },
        });
        (MAPS_MODEL.to_string(), vec![Tool::GoogleMaps {}], tool_config)
    } else {
        let tools = if turn.use_search {
            vec![Tool::GoogleSearch {}]
        } else {
            Vec::new()
        };
        (turn.model_tier.text_model().to_string(), tools, None)
    };

    let mut contents: Vec<Content> = turn
        .history
        .iter()
        .map(|message| {
            let mut parts = Vec::new();
            if !message.text.is_empty() {
                parts.push(Part::Text {
                    text: message.text.clone(),
                });
            }
            // Stored messages do not record their mime type
            for image in &message.images {
                parts.push(inline_part(HISTORY_IMAGE_MIME, image));
            }
            Content {
                parts,
                role: Some(message.role.as_str().to_string()),
            }
        })
        .collect();

    let mut user_parts: Vec<Part> = turn
        .images
        .iter()
        .map(|image| inline_part(&image.mime_type, &image.data))
        .collect();
    if !turn.message.is_empty() || user_parts.is_empty() {
        user_parts.push(Part::Text {
            text: turn.message.to_string(),
        });
    }
    contents.push(Content {
        parts: user_parts,
        role: Some("user".to_string()),
    });

    let request = GenerateContentRequest {
        contents,
        system_instruction: Some(Content {
            parts: vec![Part::Text {
                text: SYSTEM_INSTRUCTION.to_string(),
            }],
            role: None,
        }),
        tools: (!tools.is_empty()).then_some(tools),
        tool_config,
        generation_config: None,
    };

    (model, request)
}

pub fn build_image_request(
    prompt: &str,
    aspect_ratio: AspectRatio,
    image_size: ImageSize,
    model_tier: ModelTier,
) -> (String, GenerateContentRequest) {
    let request = GenerateContentRequest {
        contents: vec![Content {
            parts: vec![Part::Text {
                text: enhance_visualizer_prompt(prompt),
            }],
            role: Some("user".to_string()),
        }],
        system_instruction: None,
        tools: None,
        tool_config: None,
        generation_config: Some(image_generation_config(aspect_ratio, image_size, model_tier)),
    };
    (model_tier.image_model().to_string(), request)
}

pub fn build_edit_request(
    base_image: &ImageInput,
    prompt: &str,
    aspect_ratio: AspectRatio,
    image_size: ImageSize,
    model_tier: ModelTier,
) -> (String, GenerateContentRequest) {
    let request = GenerateContentRequest {
        contents: vec![Content {
            parts: vec![
                inline_part(&base_image.mime_type, &base_image.data),
                Part::Text {
                    text: prompt.to_string(),
                },
            ],
            role: Some("user".to_string()),
        }],
        system_instruction: None,
        tools: None,
        tool_config: None,
        generation_config: Some(image_generation_config(aspect_ratio, image_size, model_tier)),
    };
    (model_tier.image_model().to_string(), request)
}

impl GeminiClient {
    pub fn new(client: Client, api_key: String) -> Self {
        Self {
            client,
            api_key,
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub async fn generate_content(
        &self,
        model: &str,
        request: &GenerateContentRequest,
    ) -> Result<GenerateContentResponse, GeminiError> {
        let url = format!(
            "{}/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            model
        );

        tracing::debug!(
            model = %model,
            contents = request.contents.len(),
            "Gemini generateContent request"
        );

        // Key goes in a header; transport errors are stripped of the URL before logging
        let response = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .header(API_KEY_HEADER, &self.api_key)
            .timeout(Duration::from_secs(180))
            .json(request)
            .send()
            .await
            .map_err(|e| GeminiError::Http(e.without_url()))?;

        let status = response.status();
        let response_text = response
            .text()
            .await
            .map_err(|e| GeminiError::Http(e.without_url()))?;

        if !status.is_success() {
            return Err(GeminiError::Api {
                status: status.as_u16(),
                body: response_text,
            });
        }

        tracing::debug!(
            "Gemini API response (truncated): {}...",
            response_text.chars().take(500).collect::<String>()
        );

        let parsed: GenerateContentResponse = serde_json::from_str(&response_text)?;
        if let Some(usage) = &parsed.usage_metadata {
            tracing::info!(
                model = %model,
                prompt_tokens = usage.prompt_token_count,
                candidate_tokens = usage.candidates_token_count,
                total_tokens = usage.total_token_count,
                "Gemini usage"
            );
        }
        Ok(parsed)
    }

    /// Chat with the architect assistant; routes to the maps model when maps grounding is on.
    pub async fn chat_with_architect(
        &self,
        turn: &ChatTurn<'_>,
    ) -> Result<GenerateContentResponse, GeminiError> {
        let (model, request) = build_chat_request(turn);
        self.generate_content(&model, &request).await
    }

    /// Text-to-image.
    pub async fn generate_architectural_image(
        &self,
        prompt: &str,
        aspect_ratio: AspectRatio,
        image_size: ImageSize,
        model_tier: ModelTier,
    ) -> Result<GenerateContentResponse, GeminiError> {
        let (model, request) = build_image_request(prompt, aspect_ratio, image_size, model_tier);
        self.generate_content(&model, &request).await
    }

    /// Image-to-image restyling of an uploaded base image.
    pub async fn edit_architectural_image(
        &self,
        base_image: &ImageInput,
        prompt: &str,
        aspect_ratio: AspectRatio,
        image_size: ImageSize,
        model_tier: ModelTier,
    ) -> Result<GenerateContentResponse, GeminiError> {
        let (model, request) =
            build_edit_request(base_image, prompt, aspect_ratio, image_size, model_tier);
        self.generate_content(&model, &request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::chat::MessageRole;

    fn turn<'a>(history: &'a [Message], images: &'a [ImageInput]) -> ChatTurn<'a> {
        ChatTurn {
            message: "Design a pavilion",
            history,
            images,
            use_search: false,
            use_maps: false,
            model_tier: ModelTier::Pro3,
            location: None,
        }
    }

    #[test]
    fn test_chat_request_uses_tier_model_and_search() {
        let mut t = turn(&[], &[]);
        t.use_search = true;
        let (model, request) = build_chat_request(&t);
        assert_eq!(model, "gemini-3-pro-preview");

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["tools"][0], serde_json::json!({"googleSearch": {}}));
        assert!(json.get("toolConfig").is_none());
        assert!(json["systemInstruction"]["parts"][0]["text"]
            .as_str()
            .unwrap()
            .contains("ArchiGen"));
    }

    #[test]
    fn test_maps_forces_flash_and_location() {
        let mut t = turn(&[], &[]);
        t.use_maps = true;
        t.use_search = true;
        t.location = Some(UserLocation { lat: -6.2, lng: 106.8 });
        let (model, request) = build_chat_request(&t);
        assert_eq!(model, MAPS_MODEL);

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["tools"], serde_json::json!([{"googleMaps": {}}]));
        assert_eq!(json["toolConfig"]["retrievalConfig"]["latLng"]["latitude"], -6.2);
    }

    #[test]
    fn test_history_and_user_turn_layout() {
        let history = vec![
            Message {
                id: "1".to_string(),
                role: MessageRole::User,
                text: "Here is my site".to_string(),
                images: vec!["aW1n".to_string()],
                grounding_urls: vec![],
            },
            Message {
                id: "2".to_string(),
                role: MessageRole::Model,
                text: "Nice site".to_string(),
                images: vec![],
                grounding_urls: vec![],
            },
        ];
        let images = vec![ImageInput {
            data: "bmV3".to_string(),
            mime_type: "image/webp".to_string(),
        }];
        let (_, request) = build_chat_request(&turn(&history, &images));
        let json = serde_json::to_value(&request).unwrap();

        let contents = json["contents"].as_array().unwrap();
        assert_eq!(contents.len(), 3);
        assert_eq!(contents[0]["role"], "user");
        assert_eq!(contents[0]["parts"][1]["inlineData"]["mimeType"], "image/jpeg");
        assert_eq!(contents[1]["role"], "model");
        assert_eq!(contents[2]["parts"][0]["inlineData"]["mimeType"], "image/webp");
        assert_eq!(contents[2]["parts"][1]["text"], "Design a pavilion");
        assert!(json.get("tools").is_none());
    }

    #[test]
    fn test_image_size_only_for_gemini_3_tiers() {
        let (model, request) =
            build_image_request("A villa", AspectRatio::Square, ImageSize::Size4K, ModelTier::Flash25);
        assert_eq!(model, "gemini-2.5-flash-image");
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["generationConfig"]["imageConfig"]["aspectRatio"], "1:1");
        assert!(json["generationConfig"]["imageConfig"].get("imageSize").is_none());
        assert!(json["contents"][0]["parts"][0]["text"]
            .as_str()
            .unwrap()
            .starts_with("Photorealistic rendering"));

        let (_, request) =
            build_image_request("A villa", AspectRatio::Square, ImageSize::Size4K, ModelTier::Pro3);
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["generationConfig"]["imageConfig"]["imageSize"], "4K");
    }

    #[test]
    fn test_edit_request_puts_image_first() {
        let base = ImageInput {
            data: "YmFzZQ==".to_string(),
            mime_type: "image/png".to_string(),
        };
        let (_, request) = build_edit_request(
            &base,
            "Make it brick",
            AspectRatio::Landscape16x9,
            ImageSize::Size2K,
            ModelTier::Gemini3,
        );
        let json = serde_json::to_value(&request).unwrap();
        let parts = &json["contents"][0]["parts"];
        assert_eq!(parts[0]["inlineData"]["data"], "YmFzZQ==");
        assert_eq!(parts[1]["text"], "Make it brick");
        assert_eq!(json["generationConfig"]["imageConfig"]["imageSize"], "2K");
    }

    #[test]
    fn test_response_helpers() {
        let raw = serde_json::json!({
            "candidates": [{
                "content": {
                    "role": "model",
                    "parts": [
                        {"thought": true, "thoughtSignature": "abc"},
                        {"text": "A concrete pavilion..."},
                        {"inlineData": {"data": "cG5n"}}
                    ]
                },
                "groundingMetadata": {
                    "groundingChunks": [
                        {"web": {"uri": "https://arch.example", "title": "Arch"}},
                        {"web": {"uri": "https://untitled.example"}},
                        {"maps": {"uri": "https://maps.example/place"}}
                    ]
                }
            }]
        });
        let response: GenerateContentResponse = serde_json::from_value(raw).unwrap();

        assert_eq!(response.text(), Some("A concrete pavilion..."));
        assert_eq!(
            response.image(),
            Some(("image/png".to_string(), "cG5n".to_string()))
        );

        let urls = response.grounding_urls();
        assert_eq!(urls.len(), 3);
        assert_eq!(urls[0].title, "Arch");
        assert_eq!(urls[1].title, "https://untitled.example");
        assert_eq!(urls[2].title, "View on Google Maps");
    }

    #[test]
    fn test_empty_response() {
        let response: GenerateContentResponse =
            serde_json::from_str(r#"{"promptFeedback":{"blockReason":"SAFETY"}}"#).unwrap();
        assert!(response.text().is_none());
        assert!(response.image().is_none());
        assert!(response.grounding_urls().is_empty());
        assert_eq!(response.block_reason(), Some("SAFETY"));
    }

    #[tokio::test]
    async fn test_transport_error_does_not_reveal_api_key() {
        let client = GeminiClient::new(Client::new(), "SUPER_SECRET_KEY".to_string())
            .with_base_url("http://127.0.0.1:1/v1beta");
        let request = GenerateContentRequest {
            contents: vec![Content {
                parts: vec![Part::Text {
                    text: "hello".to_string(),
                }],
                role: Some("user".to_string()),
            }],
            system_instruction: None,
            tools: None,
            tool_config: None,
            generation_config: None,
        };

        let err = client
            .generate_content("gemini-2.5-flash", &request)
            .await
            .unwrap_err();
        assert!(matches!(err, GeminiError::Http(_)));
        assert!(!err.to_string().contains("SUPER_SECRET_KEY"));
        assert!(!format!("{:?}", err).contains("SUPER_SECRET_KEY"));
    }
}
