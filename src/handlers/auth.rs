use crate::error::{AppError, AppResult};
use crate::extract::AppJson;
use crate::google_oauth::{self, GoogleUserInfo, OAuthState};
use crate::middleware::auth::auth_middleware;
use crate::middleware::rate_limit::auth_rate_limit_middleware;
use crate::models::auth::*;
use crate::services::password::{self, PasswordStrength};
use crate::services::tokens::generate_jwt_token;
use crate::AppState;
use axum::{
    extract::{Extension, Query},
    http::StatusCode,
    response::{Html, Json, Redirect},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::json;
use sqlx::PgPool;
use std::sync::Arc;

pub(crate) const USER_COLUMNS: &str =
    "id, email, name, password_hash, google_id, image, created_at, updated_at";

pub fn auth_routes() -> Router {
    let public_routes = Router::new()
        .route("/api/auth/register", post(register))
        .route("/api/auth/login", post(login))
        .route("/api/auth/google", get(initiate_google_oauth))
        .route("/api/auth/google/callback", get(google_oauth_callback))
        .layer(axum::middleware::from_fn(auth_rate_limit_middleware))
        .route("/api/auth/password-strength", post(check_password_strength));

    let protected_routes = Router::new()
        .route("/api/auth/me", get(current_user))
        .layer(axum::middleware::from_fn(auth_middleware));

    public_routes.merge(protected_routes)
}

/// Emails are compared case-insensitively and stored lowercase.
pub(crate) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub(crate) async fn find_user_by_email(pool: &PgPool, email: &str) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as::<_, User>(&format!("SELECT {} FROM users WHERE email = $1", USER_COLUMNS))
        .bind(email)
        .fetch_optional(pool)
        .await
}

/// Inserts a user; `Ok(None)` when the email is already taken.
pub(crate) async fn insert_user(
    pool: &PgPool,
    email: &str,
    name: Option<&str>,
    password_hash: Option<&str>,
) -> Result<Option<User>, sqlx::Error> {
    let result = sqlx::query_as::<_, User>(&format!(
        "INSERT INTO users (id, email, name, password_hash, created_at, updated_at)
         VALUES ($1, $2, $3, $4, NOW(), NOW())
         RETURNING {}",
        USER_COLUMNS
    ))
    .bind(uuid::Uuid::new_v4().to_string())
    .bind(email)
    .bind(name)
    .bind(password_hash)
    .fetch_one(pool)
    .await;

    match result {
        Ok(user) => Ok(Some(user)),
        Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => Ok(None),
        Err(e) => Err(e),
    }
}

async fn register(
    Extension(state): Extension<Arc<AppState>>,
    AppJson(payload): AppJson<RegisterRequest>,
) -> AppResult<(StatusCode, Json<AuthResponse>)> {
    let name = payload.name.trim();
    let email = normalize_email(&payload.email);

    if name.is_empty() || email.is_empty() || payload.password.is_empty() {
        return Err(AppError::BadRequest("Missing required fields".to_string()));
    }

    password::check_policy(&payload.password)
        .map_err(|violation| AppError::BadRequest(violation.message().to_string()))?;

    if find_user_by_email(&state.db_pool, &email).await?.is_some() {
        return Err(AppError::Conflict("User already exists".to_string()));
    }

    let password_hash = password::hash_password(&payload.password)?;

    // A concurrent signup can still win the race; the unique index decides
    let user = insert_user(&state.db_pool, &email, Some(name), Some(&password_hash))
        .await
        .map_err(|e| AppError::internal("Registration failed", e))?
        .ok_or_else(|| AppError::Conflict("User already exists".to_string()))?;

    tracing::info!("New user registered: {}", user.email);

    let token = generate_jwt_token(&user, &state.config.jwt_secret)?;

    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            success: true,
            message: "User registered successfully".to_string(),
            user: UserResponse::from(user),
            token,
        }),
    ))
}

async fn login(
    Extension(state): Extension<Arc<AppState>>,
    AppJson(payload): AppJson<LoginRequest>,
) -> AppResult<Json<AuthResponse>> {
    let email = normalize_email(&payload.email);
    if email.is_empty() || payload.password.is_empty() {
        return Err(AppError::BadRequest("Email and password are required".to_string()));
    }

    let invalid = || AppError::Unauthorized("Invalid email or password".to_string());

    let user = find_user_by_email(&state.db_pool, &email)
        .await?
        .ok_or_else(invalid)?;

    // Provisioned accounts have no password until the first reset
    let password_hash = user.password_hash.as_deref().ok_or_else(invalid)?;
    if !password::verify_password(&payload.password, password_hash)? {
        return Err(invalid());
    }

    let token = generate_jwt_token(&user, &state.config.jwt_secret)?;

    Ok(Json(AuthResponse {
        success: true,
        message: "Login successful".to_string(),
        user: UserResponse::from(user),
        token,
    }))
}

async fn current_user(
    Extension(state): Extension<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
) -> AppResult<Json<serde_json::Value>> {
    let user = sqlx::query_as::<_, User>(&format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS))
        .bind(&claims.sub)
        .fetch_optional(&state.db_pool)
        .await?
        .ok_or_else(|| AppError::Unauthorized("User not found".to_string()))?;

    Ok(Json(json!({
        "success": true,
        "user": UserResponse::from(user)
    })))
}

async fn check_password_strength(AppJson(payload): AppJson<PasswordStrengthRequest>) -> Json<PasswordStrength> {
    Json(password::strength(&payload.password))
}

// ============================================================================
// Google OAuth sign-in
// ============================================================================

#[derive(Deserialize)]
pub struct GoogleOAuthQuery {
    pub redirect_to: Option<String>,
}

#[derive(Deserialize)]
pub struct GoogleCallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

async fn initiate_google_oauth(
    Query(params): Query<GoogleOAuthQuery>,
    Extension(state): Extension<Arc<AppState>>,
) -> AppResult<Redirect> {
    let oauth = state
        .config
        .google_oauth
        .as_ref()
        .ok_or_else(|| AppError::ServiceUnavailable("Google OAuth not configured".to_string()))?;

    let state_param = OAuthState::new(params.redirect_to).encode();
    let auth_url =
        google_oauth::build_google_oauth_url(&oauth.client_id, &oauth.redirect_uri, &state_param);

    tracing::info!("🔐 Initiating Google OAuth sign-in");

    Ok(Redirect::to(&auth_url))
}

fn oauth_failure_page(message: &str) -> Html<String> {
    Html(format!(
        r#"<!DOCTYPE html><html><head><title>Sign-in Failed</title>
<style>body {{ font-family: Arial; max-width: 600px; margin: 100px auto; text-align: center; }}</style>
</head><body>
<h1>Sign-in Failed</h1><p>{}</p>
<a href="/auth/signin">Try Again</a>
</body></html>"#,
        message
    ))
}

/// JSON-encode a value for embedding in an inline script.
fn js_literal<T: serde::Serialize>(value: &T) -> String {
    serde_json::to_string(value)
        .unwrap_or_else(|_| "null".to_string())
        .replace('<', "\\u003c")
}

async fn google_oauth_callback(
    Query(params): Query<GoogleCallbackQuery>,
    Extension(state): Extension<Arc<AppState>>,
) -> Result<Html<String>, (StatusCode, Html<String>)> {
    if let Some(error) = params.error {
        tracing::warn!("Google OAuth error: {}", error);
        return Err((
            StatusCode::BAD_REQUEST,
            oauth_failure_page("Google sign-in was cancelled or refused."),
        ));
    }

    let bad_request = |message: &str| (StatusCode::BAD_REQUEST, oauth_failure_page(message));
    let server_error = |message: &str| (StatusCode::INTERNAL_SERVER_ERROR, oauth_failure_page(message));

    let oauth = state
        .config
        .google_oauth
        .as_ref()
        .ok_or_else(|| (StatusCode::SERVICE_UNAVAILABLE, oauth_failure_page("Google OAuth not configured.")))?;
    let code = params.code.ok_or_else(|| bad_request("Missing authorization code."))?;
    let oauth_state = params
        .state
        .as_deref()
        .and_then(OAuthState::decode)
        .ok_or_else(|| bad_request("Invalid state."))?;
    if !oauth_state.is_fresh(chrono::Utc::now().timestamp()) {
        tracing::warn!("Rejected stale Google OAuth state");
        return Err(bad_request("Sign-in link expired. Please try again."));
    }

    let token_response = google_oauth::exchange_code_for_token(
        &state.http_client,
        &code,
        &oauth.client_id,
        &oauth.client_secret,
        &oauth.redirect_uri,
    )
    .await
    .map_err(|e| {
        tracing::error!("Failed to exchange Google code: {}", e);
        server_error("Could not complete Google sign-in.")
    })?;

    let user_info = google_oauth::get_google_user_info(&state.http_client, &token_response.access_token)
        .await
        .map_err(|e| {
            tracing::error!("Failed to get Google user info: {}", e);
            server_error("Could not read your Google profile.")
        })?;

    if !user_info.verified_email {
        return Err(bad_request("Your Google email address is not verified."));
    }

    let user = upsert_google_user(&state.db_pool, &user_info).await.map_err(|e| {
        tracing::error!("Failed to store Google user: {}", e);
        server_error("Could not complete Google sign-in.")
    })?;

    let token = generate_jwt_token(&user, &state.config.jwt_secret).map_err(|e| {
        tracing::error!("Failed to generate token: {}", e);
        server_error("Could not complete Google sign-in.")
    })?;

    Ok(Html(format!(
        r#"<!DOCTYPE html><html><head><title>Signed in</title>
<style>body {{ font-family: Arial; max-width: 600px; margin: 100px auto; text-align: center; }}</style>
</head><body>
<h1>Signed in with Google</h1>
<p>Redirecting...</p>
<script>
    localStorage.setItem('authToken', {token});
    localStorage.setItem('user', JSON.stringify({user}));
    window.location.href = {redirect};
</script>
</body></html>"#,
        token = js_literal(&token),
        user = js_literal(&UserResponse::from(user)),
        redirect = js_literal(&oauth_state.redirect_to),
    )))
}

/// Find by Google id, else link to the account with the same email, else create.
async fn upsert_google_user(pool: &PgPool, info: &GoogleUserInfo) -> Result<User, sqlx::Error> {
    let existing = sqlx::query_as::<_, User>(&format!(
        "SELECT {} FROM users WHERE google_id = $1",
        USER_COLUMNS
    ))
    .bind(&info.id)
    .fetch_optional(pool)
    .await?;

    if let Some(user) = existing {
        tracing::info!("👤 Existing user signed in via Google: {}", user.email);
        return Ok(user);
    }

    let email = normalize_email(&info.email);
    let linked = sqlx::query_as::<_, User>(&format!(
        "UPDATE users
         SET google_id = $1, image = COALESCE(image, $2), name = COALESCE(name, $3), updated_at = NOW()
         WHERE email = $4
         RETURNING {}",
        USER_COLUMNS
    ))
    .bind(&info.id)
    .bind(&info.picture)
    .bind(&info.name)
    .bind(&email)
    .fetch_optional(pool)
    .await?;

    if let Some(user) = linked {
        tracing::info!("🔗 Linked Google account to existing user: {}", user.email);
        return Ok(user);
    }

    let user = sqlx::query_as::<_, User>(&format!(
        "INSERT INTO users (id, email, name, google_id, image, created_at, updated_at)
         VALUES ($1, $2, $3, $4, $5, NOW(), NOW())
         RETURNING {}",
        USER_COLUMNS
    ))
    .bind(uuid::Uuid::new_v4().to_string())
    .bind(&email)
    .bind(&info.name)
    .bind(&info.id)
    .bind(&info.picture)
    .fetch_one(pool)
    .await?;

    tracing::info!("✨ Created new user via Google OAuth: {}", user.email);
    Ok(user)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_email() {
        assert_eq!(normalize_email("  Architect@Example.COM "), "architect@example.com");
    }

    #[sqlx::test]
    async fn test_duplicate_registration_conflicts(pool: PgPool) {
        let state = Arc::new(AppState::for_tests(pool));
        let payload = || {
            AppJson(
                serde_json::from_value::<RegisterRequest>(serde_json::json!({
                    "name": "Architect",
                    "email": "architect@example.com",
                    "password": "Sturdy9Frame"
                }))
                .unwrap(),
            )
        };

        let (status, Json(registered)) = register(Extension(state.clone()), payload()).await.unwrap();
        assert_eq!(status, StatusCode::CREATED);
        assert!(registered.user.has_password);

        let err = register(Extension(state.clone()), payload()).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::CONFLICT);
        assert_eq!(err.public_message(), "User already exists");

        // Case and whitespace do not make a new account
        let err = register(
            Extension(state),
            AppJson(
                serde_json::from_value::<RegisterRequest>(serde_json::json!({
                    "name": "Architect",
                    "email": "  ARCHITECT@example.com ",
                    "password": "Sturdy9Frame"
                }))
                .unwrap(),
            ),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_stale_oauth_state_is_refused() {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .connect_lazy("postgres://localhost/gravis_test")
            .unwrap();
        let mut state = AppState::for_tests(pool);
        state.config.google_oauth = Some(crate::config::GoogleOAuthConfig {
            client_id: "client-1".to_string(),
            client_secret: "secret".to_string(),
            redirect_uri: "http://localhost:3000/cb".to_string(),
        });

        let stale = OAuthState {
            redirect_to: "/app".to_string(),
            timestamp: chrono::Utc::now().timestamp() - google_oauth::STATE_MAX_AGE_SECS - 5,
        };
        let query = GoogleCallbackQuery {
            code: Some("code-1".to_string()),
            state: Some(stale.encode()),
            error: None,
        };

        let (status, Html(page)) = google_oauth_callback(Query(query), Extension(Arc::new(state)))
            .await
            .unwrap_err();
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(page.contains("Sign-in link expired"));
    }

    #[test]
    fn test_js_literal_escapes_script_breaks() {
        let literal = js_literal(&"</script><script>alert(1)</script>");
        assert!(!literal.contains("</script>"));
        assert!(literal.starts_with('"'));
    }
}
