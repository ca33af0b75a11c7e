use crate::error::{AppError, AppResult};
use crate::extract::AppJson;
use crate::handlers::auth::{find_user_by_email, normalize_email};
use crate::middleware::rate_limit::auth_rate_limit_middleware;
use crate::models::auth::{ForgotPasswordRequest, ResetPasswordRequest};
use crate::services::password;
use crate::services::tokens::{self, ResetToken};
use crate::AppState;
use axum::{
    extract::{Extension, Path},
    response::Json,
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use std::sync::Arc;

pub fn password_reset_routes() -> Router {
    Router::new()
        .route("/api/auth/password/forgot", post(forgot_password))
        .route("/api/auth/password/reset/:token", get(validate_reset_token))
        .route("/api/auth/password/reset", post(reset_password))
        .layer(axum::middleware::from_fn(auth_rate_limit_middleware))
}

async fn forgot_password(
    Extension(state): Extension<Arc<AppState>>,
    AppJson(payload): AppJson<ForgotPasswordRequest>,
) -> AppResult<Json<Value>> {
    let email = normalize_email(&payload.email);
    if email.is_empty() {
        return Err(AppError::BadRequest("Email is required".to_string()));
    }

    let failed = |e: &dyn std::fmt::Display| AppError::internal("Failed to process request", e);

    // Unknown addresses get the same answer as known ones
    let user = find_user_by_email(&state.db_pool, &email)
        .await
        .map_err(|e| failed(&e))?;
    if user.is_none() {
        tracing::info!("Password reset requested for unknown email");
        return Ok(Json(json!({ "success": true })));
    }

    let now = Utc::now();
    let reset_token = ResetToken::issue(now);

    sqlx::query("DELETE FROM password_reset_tokens WHERE email = $1 AND expires < $2")
        .bind(&email)
        .bind(now)
        .execute(&state.db_pool)
        .await
        .map_err(|e| failed(&e))?;

    sqlx::query(
        "INSERT INTO password_reset_tokens (email, token_hash, expires)
         VALUES ($1, $2, $3)
         ON CONFLICT (email, token_hash) DO UPDATE SET expires = EXCLUDED.expires",
    )
    .bind(&email)
    .bind(&reset_token.token_hash)
    .bind(reset_token.expires)
    .execute(&state.db_pool)
    .await
    .map_err(|e| failed(&e))?;

    let link = tokens::reset_link(&state.config.app_url, &reset_token.token);
    state
        .mailer
        .send_password_reset(&email, &link)
        .await
        .map_err(|e| failed(&e))?;

    tracing::info!("📧 Password reset link issued for {}", email);

    Ok(Json(json!({ "success": true })))
}

async fn find_live_token(
    pool: &sqlx::PgPool,
    token: &str,
) -> Result<Option<String>, sqlx::Error> {
    let row: Option<(String, DateTime<Utc>)> = sqlx::query_as(
        "SELECT email, expires FROM password_reset_tokens WHERE token_hash = $1",
    )
    .bind(tokens::hash_reset_token(token))
    .fetch_optional(pool)
    .await?;

    Ok(row
        .filter(|(_, expires)| !tokens::is_expired(*expires, Utc::now()))
        .map(|(email, _)| email))
}

async fn validate_reset_token(
    Extension(state): Extension<Arc<AppState>>,
    Path(token): Path<String>,
) -> AppResult<Json<Value>> {
    let valid = find_live_token(&state.db_pool, &token).await?.is_some();
    Ok(Json(json!({ "success": true, "valid": valid })))
}

async fn reset_password(
    Extension(state): Extension<Arc<AppState>>,
    AppJson(payload): AppJson<ResetPasswordRequest>,
) -> AppResult<Json<Value>> {
    if payload.token.trim().is_empty() || payload.password.is_empty() {
        return Err(AppError::BadRequest("Missing required data".to_string()));
    }

    if password::check_policy(&payload.password).is_err() {
        return Err(AppError::BadRequest(
            "Password does not meet complexity requirements".to_string(),
        ));
    }

    let failed = |e: &dyn std::fmt::Display| AppError::internal("Failed to reset password", e);

    let token = payload.token.trim();
    let email = find_live_token(&state.db_pool, token)
        .await
        .map_err(|e| failed(&e))?
        .ok_or_else(|| AppError::BadRequest("Token is invalid or has expired".to_string()))?;

    let password_hash = password::hash_password(&payload.password).map_err(|e| failed(&e))?;

    let mut tx = state.db_pool.begin().await.map_err(|e| failed(&e))?;

    sqlx::query("UPDATE users SET password_hash = $1, updated_at = NOW() WHERE email = $2")
        .bind(&password_hash)
        .bind(&email)
        .execute(&mut *tx)
        .await
        .map_err(|e| failed(&e))?;

    // The row count guards against two resets racing on the same token
    let deleted = sqlx::query("DELETE FROM password_reset_tokens WHERE token_hash = $1")
        .bind(tokens::hash_reset_token(token))
        .execute(&mut *tx)
        .await
        .map_err(|e| failed(&e))?;

    if deleted.rows_affected() == 0 {
        tx.rollback().await.map_err(|e| failed(&e))?;
        return Err(AppError::BadRequest("Token is invalid or has expired".to_string()));
    }

    tx.commit().await.map_err(|e| failed(&e))?;

    tracing::info!("🔑 Password reset completed for {}", email);

    Ok(Json(json!({ "success": true })))
}
