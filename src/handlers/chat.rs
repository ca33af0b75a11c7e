// src/handlers/chat.rs
use crate::error::{AppError, AppResult};
use crate::extract::AppJson;
use crate::handlers::generate::MAX_IMAGE_BODY_BYTES;
use crate::middleware::auth::auth_middleware;
use crate::models::auth::Claims;
use crate::models::chat::*;
use crate::models::generation::BuilderData;
use crate::services::prompt_builder::{derive_title, WELCOME_MESSAGE};
use crate::AppState;
use axum::{
    extract::{DefaultBodyLimit, Extension, Path},
    http::StatusCode,
    response::Json,
    routing::{delete, get, patch, post, put},
    Router,
};
use serde_json::{json, Value};
use sqlx::{types::Json as SqlJson, PgPool};
use std::collections::HashMap;
use std::sync::Arc;

pub fn chat_routes() -> Router {
    Router::new()
        .route("/api/chat/sessions", get(list_sessions).post(create_session))
        .route("/api/chat/sessions/:id", delete(delete_session))
        .route("/api/chat/sessions/:id/messages", post(add_message))
        .route("/api/chat/sessions/:id/title", patch(update_title))
        .route("/api/chat/sessions/:id/builder", put(update_builder))
        .layer(DefaultBodyLimit::max(MAX_IMAGE_BODY_BYTES))
        .layer(axum::middleware::from_fn(auth_middleware))
}

fn session_not_found() -> AppError {
    AppError::NotFound("Chat session not found".to_string())
}

/// Sessions of other users are reported as missing.
pub(crate) async fn ensure_session_owner(
    pool: &PgPool,
    session_id: &str,
    user_id: &str,
) -> AppResult<()> {
    let owned: Option<(String,)> =
        sqlx::query_as("SELECT id FROM chat_sessions WHERE id = $1 AND user_id = $2")
            .bind(session_id)
            .bind(user_id)
            .fetch_optional(pool)
            .await?;

    owned.map(|_| ()).ok_or_else(session_not_found)
}

/// Appends a message to an owned session and bumps its timestamp.
/// The first user message of a fresh session also names it.
pub(crate) async fn append_message(
    pool: &PgPool,
    session_id: &str,
    message: &NewMessage,
) -> AppResult<String> {
    let message_id = uuid::Uuid::new_v4().to_string();
    let mut tx = pool.begin().await?;

    let (message_count, user_messages): (i64, i64) = sqlx::query_as(
        "SELECT COUNT(*), COUNT(*) FILTER (WHERE role = 'user')
         FROM messages WHERE session_id = $1",
    )
    .bind(session_id)
    .fetch_one(&mut *tx)
    .await?;

    sqlx::query(
        "INSERT INTO messages (id, session_id, role, text, images, grounding_urls)
         VALUES ($1, $2, $3, $4, $5, $6)",
    )
    .bind(&message_id)
    .bind(session_id)
    .bind(message.role.as_str())
    .bind(&message.text)
    .bind(&message.images)
    .bind(SqlJson(&message.grounding_urls))
    .execute(&mut *tx)
    .await?;

    let names_session = message.role == MessageRole::User
        && message_count <= 1
        && user_messages == 0
        && !message.text.trim().is_empty();

    if names_session {
        sqlx::query("UPDATE chat_sessions SET title = $1, updated_at = NOW() WHERE id = $2")
            .bind(derive_title(&message.text))
            .bind(session_id)
            .execute(&mut *tx)
            .await?;
    } else {
        sqlx::query("UPDATE chat_sessions SET updated_at = NOW() WHERE id = $1")
            .bind(session_id)
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;
    Ok(message_id)
}

async fn list_sessions(
    Extension(state): Extension<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
) -> AppResult<Json<Vec<ChatSession>>> {
    let sessions = sqlx::query_as::<_, ChatSessionRow>(
        "SELECT id, user_id, title, updated_at, builder_data
         FROM chat_sessions
         WHERE user_id = $1
         ORDER BY updated_at DESC",
    )
    .bind(&claims.sub)
    .fetch_all(&state.db_pool)
    .await?;

    let session_ids: Vec<String> = sessions.iter().map(|s| s.id.clone()).collect();

    let rows = sqlx::query_as::<_, MessageRow>(
        "SELECT id, session_id, role, text, images, grounding_urls
         FROM messages
         WHERE session_id = ANY($1)
         ORDER BY seq ASC",
    )
    .bind(&session_ids)
    .fetch_all(&state.db_pool)
    .await?;

    let mut by_session: HashMap<String, Vec<Message>> = HashMap::new();
    for row in rows {
        let session_id = row.session_id.clone();
        match Message::try_from(row) {
            Ok(message) => by_session.entry(session_id).or_default().push(message),
            Err(e) => tracing::warn!("Skipping unreadable message: {}", e),
        }
    }

    let sessions = sessions
        .into_iter()
        .map(|row| {
            let messages = by_session.remove(&row.id).unwrap_or_default();
            ChatSession::from_row(row, messages)
        })
        .collect();

    Ok(Json(sessions))
}

async fn create_session(
    Extension(state): Extension<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    AppJson(payload): AppJson<CreateSessionRequest>,
) -> AppResult<(StatusCode, Json<Value>)> {
    let session_id = uuid::Uuid::new_v4().to_string();
    let title = match payload.title.trim() {
        "" => format!("Chat {}", chrono::Utc::now().format("%H:%M:%S")),
        title => title.to_string(),
    };
    let builder_data = payload.builder_data.unwrap_or_default();

    sqlx::query(
        "INSERT INTO chat_sessions (id, user_id, title, updated_at, builder_data)
         VALUES ($1, $2, $3, NOW(), $4)",
    )
    .bind(&session_id)
    .bind(&claims.sub)
    .bind(&title)
    .bind(SqlJson(&builder_data))
    .execute(&state.db_pool)
    .await?;

    if payload.welcome {
        let welcome = NewMessage {
            role: MessageRole::Model,
            text: WELCOME_MESSAGE.to_string(),
            images: Vec::new(),
            grounding_urls: Vec::new(),
        };
        append_message(&state.db_pool, &session_id, &welcome).await?;
    }

    tracing::info!("💬 Created chat session {} for user {}", session_id, claims.sub);

    Ok((StatusCode::CREATED, Json(json!({ "id": session_id }))))
}

async fn add_message(
    Extension(state): Extension<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    Path(session_id): Path<String>,
    AppJson(payload): AppJson<NewMessage>,
) -> AppResult<(StatusCode, Json<Value>)> {
    ensure_session_owner(&state.db_pool, &session_id, &claims.sub).await?;

    if payload.text.trim().is_empty() && payload.images.is_empty() {
        return Err(AppError::BadRequest("Message must have text or images".to_string()));
    }

    let message_id = append_message(&state.db_pool, &session_id, &payload).await?;

    Ok((StatusCode::CREATED, Json(json!({ "id": message_id }))))
}

async fn update_title(
    Extension(state): Extension<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    Path(session_id): Path<String>,
    AppJson(payload): AppJson<UpdateTitleRequest>,
) -> AppResult<Json<Value>> {
    let title = payload.title.trim();
    if title.is_empty() {
        return Err(AppError::BadRequest("Title is required".to_string()));
    }

    let result = sqlx::query(
        "UPDATE chat_sessions SET title = $1 WHERE id = $2 AND user_id = $3",
    )
    .bind(title)
    .bind(&session_id)
    .bind(&claims.sub)
    .execute(&state.db_pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(session_not_found());
    }

    Ok(Json(json!({ "success": true })))
}

async fn update_builder(
    Extension(state): Extension<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    Path(session_id): Path<String>,
    AppJson(payload): AppJson<UpdateBuilderRequest>,
) -> AppResult<Json<Value>> {
    let builder_data: BuilderData = payload.builder_data;

    let result = sqlx::query(
        "UPDATE chat_sessions SET builder_data = $1 WHERE id = $2 AND user_id = $3",
    )
    .bind(SqlJson(&builder_data))
    .bind(&session_id)
    .bind(&claims.sub)
    .execute(&state.db_pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(session_not_found());
    }

    Ok(Json(json!({ "success": true })))
}

async fn delete_session(
    Extension(state): Extension<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    Path(session_id): Path<String>,
) -> AppResult<Json<Value>> {
    let result = sqlx::query("DELETE FROM chat_sessions WHERE id = $1 AND user_id = $2")
        .bind(&session_id)
        .bind(&claims.sub)
        .execute(&state.db_pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(session_not_found());
    }

    tracing::info!("🗑️ Deleted chat session {}", session_id);

    Ok(Json(json!({ "success": true })))
}
