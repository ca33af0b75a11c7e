// src/handlers/generate.rs
use crate::error::{AppError, AppResult};
use crate::extract::AppJson;
use crate::gemini_client::{ChatTurn, GeminiClient, NO_RESPONSE_TEXT};
use crate::handlers::chat::{append_message, ensure_session_owner};
use crate::middleware::auth::auth_middleware;
use crate::middleware::rate_limit::generation_rate_limit_middleware;
use crate::models::auth::Claims;
use crate::models::chat::{Message, MessageRole, NewMessage};
use crate::models::generation::*;
use crate::services::prompt_builder::{
    construct_prompt, image_to_image_directive, BUILDER_PLACEHOLDER_TEXT, IMAGE_TO_IMAGE_TASK,
};
use crate::AppState;
use axum::{
    extract::{DefaultBodyLimit, Extension},
    response::Json,
    routing::post,
    Router,
};
use std::sync::Arc;

pub const HISTORY_LIMIT: usize = 10;
/// Base64 images travel inline in JSON; matches Gemini's inline request cap.
pub const MAX_IMAGE_BODY_BYTES: usize = 20 * 1024 * 1024;

const CHAT_FAILED: &str = "I encountered an error processing your request. Please try again.";
const IMAGE_FAILED: &str = "Failed to generate image. Please try again.";
const EDIT_FAILED: &str =
    "Failed to edit image. The request might have been blocked or the service is busy.";

pub fn generate_routes() -> Router {
    // Layers run bottom-up: auth first, then the per-IP limit
    Router::new()
        .route("/api/generate/chat", post(generate_chat))
        .route("/api/generate/image", post(generate_image))
        .route("/api/generate/restyle", post(restyle_image))
        .layer(DefaultBodyLimit::max(MAX_IMAGE_BODY_BYTES))
        .layer(axum::middleware::from_fn(generation_rate_limit_middleware))
        .layer(axum::middleware::from_fn(auth_middleware))
}

fn gemini(state: &AppState) -> AppResult<&GeminiClient> {
    state
        .gemini_client
        .as_ref()
        .ok_or_else(|| AppError::ServiceUnavailable("Image generation is not configured".to_string()))
}

/// What gets sent to the model and what gets shown in the transcript.
#[derive(Debug, PartialEq)]
pub struct ResolvedPrompt {
    pub prompt: String,
    pub display_text: String,
}

pub fn resolve_chat_prompt(request: &ChatGenerationRequest) -> AppResult<ResolvedPrompt> {
    if let Some(builder) = &request.builder {
        let mut prompt = construct_prompt(builder);
        if !request.images.is_empty() && builder.task == IMAGE_TO_IMAGE_TASK {
            prompt = image_to_image_directive(&prompt);
        }
        return Ok(ResolvedPrompt {
            prompt,
            display_text: BUILDER_PLACEHOLDER_TEXT.to_string(),
        });
    }

    let message = request.message.trim();
    if message.is_empty() && request.images.is_empty() {
        return Err(AppError::BadRequest("Message or image is required".to_string()));
    }

    Ok(ResolvedPrompt {
        prompt: message.to_string(),
        display_text: message.to_string(),
    })
}

/// The newest `HISTORY_LIMIT` messages, oldest first.
pub fn recent_history(history: &[Message]) -> &[Message] {
    &history[history.len().saturating_sub(HISTORY_LIMIT)..]
}

async fn owned_session(
    state: &AppState,
    claims: &Claims,
    session_id: Option<&str>,
) -> AppResult<Option<String>> {
    match session_id.filter(|id| !id.is_empty()) {
        Some(id) => {
            ensure_session_owner(&state.db_pool, id, &claims.sub).await?;
            Ok(Some(id.to_string()))
        }
        None => Ok(None),
    }
}

async fn generate_chat(
    Extension(state): Extension<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    AppJson(payload): AppJson<ChatGenerationRequest>,
) -> AppResult<Json<ChatGenerationResponse>> {
    let client = gemini(&state)?;
    let resolved = resolve_chat_prompt(&payload)?;
    let session_id = owned_session(&state, &claims, payload.session_id.as_deref()).await?;

    if let Some(session_id) = &session_id {
        let user_message = NewMessage {
            role: MessageRole::User,
            text: resolved.display_text.clone(),
            images: payload.images.iter().map(|image| image.data.clone()).collect(),
            grounding_urls: Vec::new(),
        };
        append_message(&state.db_pool, session_id, &user_message).await?;
    }

    let turn = ChatTurn {
        message: &resolved.prompt,
        history: recent_history(&payload.history),
        images: &payload.images,
        use_search: payload.use_search,
        use_maps: payload.use_maps,
        model_tier: payload.model_tier,
        location: payload.user_location,
    };

    let response = client.chat_with_architect(&turn).await.map_err(|e| {
        tracing::error!("Gemini chat failed for user {}: {}", claims.sub, e);
        AppError::Upstream(CHAT_FAILED.to_string())
    })?;

    let text = response.text().unwrap_or(NO_RESPONSE_TEXT).to_string();
    let grounding_urls = response.grounding_urls();

    let message_id = match &session_id {
        Some(session_id) => {
            let reply = NewMessage {
                role: MessageRole::Model,
                text: text.clone(),
                images: Vec::new(),
                grounding_urls: grounding_urls.clone(),
            };
            Some(append_message(&state.db_pool, session_id, &reply).await?)
        }
        None => None,
    };

    Ok(Json(ChatGenerationResponse {
        text,
        grounding_urls,
        message_id,
    }))
}

fn media_asset(
    data: (String, String),
    prompt: &str,
    model: ModelTier,
    aspect_ratio: AspectRatio,
    image_size: ImageSize,
    session_id: Option<String>,
    kind: MediaAssetKind,
) -> MediaAsset {
    let (mime_type, data) = data;
    MediaAsset {
        id: uuid::Uuid::new_v4().to_string(),
        data,
        mime_type,
        prompt: prompt.to_string(),
        timestamp: chrono::Utc::now().timestamp_millis(),
        model,
        aspect_ratio,
        image_size,
        session_id,
        kind,
    }
}

async fn generate_image(
    Extension(state): Extension<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    AppJson(payload): AppJson<VisualizeRequest>,
) -> AppResult<Json<MediaAsset>> {
    let client = gemini(&state)?;
    let prompt = payload.prompt.trim();
    if prompt.is_empty() {
        return Err(AppError::BadRequest("Prompt is required".to_string()));
    }
    let session_id = owned_session(&state, &claims, payload.session_id.as_deref()).await?;

    let response = client
        .generate_architectural_image(prompt, payload.aspect_ratio, payload.image_size, payload.model_tier)
        .await
        .map_err(|e| {
            tracing::error!("Gemini image generation failed: {}", e);
            AppError::Upstream(IMAGE_FAILED.to_string())
        })?;

    let image = response.image().ok_or_else(|| {
        tracing::warn!(
            block_reason = response.block_reason().unwrap_or("none"),
            "Gemini returned no image"
        );
        AppError::Upstream(IMAGE_FAILED.to_string())
    })?;

    tracing::info!("🖼️ Generated image for user {} ({})", claims.sub, payload.model_tier.image_model());

    Ok(Json(media_asset(
        image,
        prompt,
        payload.model_tier,
        payload.aspect_ratio,
        payload.image_size,
        session_id,
        MediaAssetKind::Visualizer,
    )))
}

async fn restyle_image(
    Extension(state): Extension<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    AppJson(payload): AppJson<RestyleRequest>,
) -> AppResult<Json<MediaAsset>> {
    let client = gemini(&state)?;
    let base_image = payload
        .base_image
        .as_ref()
        .filter(|image| !image.data.is_empty())
        .ok_or_else(|| AppError::BadRequest("Base image is required".to_string()))?;
    let prompt = payload.prompt.trim();
    if prompt.is_empty() {
        return Err(AppError::BadRequest("Prompt is required".to_string()));
    }
    let session_id = owned_session(&state, &claims, payload.session_id.as_deref()).await?;

    let response = client
        .edit_architectural_image(
            base_image,
            prompt,
            payload.aspect_ratio,
            payload.image_size,
            payload.model_tier,
        )
        .await
        .map_err(|e| {
            tracing::error!("Gemini image edit failed: {}", e);
            AppError::Upstream(EDIT_FAILED.to_string())
        })?;

    let image = response.image().ok_or_else(|| {
        tracing::warn!(
            block_reason = response.block_reason().unwrap_or("none"),
            "Gemini returned no edited image"
        );
        AppError::Upstream(EDIT_FAILED.to_string())
    })?;

    Ok(Json(media_asset(
        image,
        prompt,
        payload.model_tier,
        payload.aspect_ratio,
        payload.image_size,
        session_id,
        MediaAssetKind::Restyler,
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(body: serde_json::Value) -> ChatGenerationRequest {
        serde_json::from_value(body).unwrap()
    }

    #[test]
    fn test_plain_message_is_sent_as_is() {
        let resolved = resolve_chat_prompt(&request(serde_json::json!({
            "message": "  A timber pavilion  "
        })))
        .unwrap();
        assert_eq!(resolved.prompt, "A timber pavilion");
        assert_eq!(resolved.display_text, "A timber pavilion");
    }

    #[test]
    fn test_empty_message_without_image_is_rejected() {
        let err = resolve_chat_prompt(&request(serde_json::json!({ "message": " " }))).unwrap_err();
        assert_eq!(err.status(), axum::http::StatusCode::BAD_REQUEST);

        let with_image = request(serde_json::json!({
            "images": [{ "data": "aGVsbG8=", "mimeType": "image/jpeg" }]
        }));
        assert!(resolve_chat_prompt(&with_image).is_ok());
    }

    #[test]
    fn test_builder_prompt_gets_image_directive_only_with_image() {
        let builder = serde_json::json!({ "task": "Image to Image", "buildingType": "Villa" });

        let without_image = resolve_chat_prompt(&request(serde_json::json!({ "builder": builder })))
            .unwrap();
        assert_eq!(without_image.display_text, BUILDER_PLACEHOLDER_TEXT);

        let with_image = resolve_chat_prompt(&request(serde_json::json!({
            "builder": builder,
            "images": [{ "data": "aGVsbG8=", "mimeType": "image/png" }]
        })))
        .unwrap();
        assert!(with_image.prompt.starts_with(&without_image.prompt));
        assert!(with_image.prompt.len() > without_image.prompt.len());
    }

    #[test]
    fn test_history_is_capped() {
        let history: Vec<Message> = (0..15)
            .map(|i| Message {
                id: format!("m{}", i),
                role: MessageRole::User,
                text: i.to_string(),
                images: Vec::new(),
                grounding_urls: Vec::new(),
            })
            .collect();
        let recent = recent_history(&history);
        assert_eq!(recent.len(), HISTORY_LIMIT);
        assert_eq!(recent[0].text, "5");
        assert_eq!(recent_history(&history[..3]).len(), 3);
    }
}
