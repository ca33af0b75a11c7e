// lib.rs - shared state, router and modules used by the server and the operations binaries
use axum::{extract::Extension, response::Json, routing::get, Router};
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

pub mod config;
pub mod db;
pub mod error;
pub mod extract;
pub mod gemini_client;
pub mod google_oauth;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;

use config::AppConfig;
use gemini_client::GeminiClient;
use services::Mailer;

// AppState holds the database pool, runtime configuration and the outbound clients
pub struct AppState {
    pub db_pool: sqlx::PgPool,
    pub config: AppConfig,
    pub gemini_client: Option<GeminiClient>, // None disables /api/generate/*
    pub mailer: Arc<dyn Mailer>,
    pub http_client: reqwest::Client,
}

#[cfg(test)]
impl AppState {
    /// Offline clients and a logging mailer around the given pool.
    pub(crate) fn for_tests(db_pool: sqlx::PgPool) -> Self {
        AppState {
            db_pool,
            config: AppConfig::for_tests(),
            gemini_client: None,
            mailer: Arc::new(services::LogMailer),
            http_client: reqwest::Client::new(),
        }
    }
}

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(handlers::auth::auth_routes())
        .merge(handlers::password_reset::password_reset_routes())
        .merge(handlers::chat::chat_routes())
        .merge(handlers::generate::generate_routes())
        .merge(handlers::webhooks::webhook_routes())
        .route("/api/status", get(api_status))
        .layer(axum::middleware::from_fn(middleware::logging::request_logging_middleware))
        .layer(CorsLayer::permissive())
        .layer(Extension(state))
}

async fn api_status(Extension(state): Extension<Arc<AppState>>) -> Json<Value> {
    let db_status = match sqlx::query("SELECT 1").fetch_one(&state.db_pool).await {
        Ok(_) => "healthy",
        Err(e) => {
            tracing::error!("Database health check failed: {}", e);
            "unhealthy"
        }
    };

    let configured = |on: bool| if on { "configured" } else { "not_configured" };

    Json(json!({
        "status": "operational",
        "version": env!("CARGO_PKG_VERSION"),
        "services": {
            "database": db_status,
            "gemini_ai": configured(state.gemini_client.is_some()),
            "resend_mail": configured(state.config.resend_api_key.is_some()),
            "google_oauth": configured(state.config.google_oauth.is_some()),
            "pabbly_webhook": configured(state.config.pabbly_webhook_secret.is_some())
        },
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}
