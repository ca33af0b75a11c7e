// src/config.rs
use std::env;
use thiserror::Error;

const DEFAULT_APP_URL: &str = "http://localhost:3000";
const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
}

#[derive(Debug, Clone)]
pub struct GoogleOAuthConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
}

/// Runtime configuration, read once from the environment (after `.env` is loaded).
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub jwt_secret: String,
    pub gemini_api_key: Option<String>,
    pub resend_api_key: Option<String>,
    pub email_from: Option<String>,
    /// Public base URL of the web app, used to build password-reset links
    pub app_url: String,
    pub pabbly_webhook_secret: Option<String>,
    pub google_oauth: Option<GoogleOAuthConfig>,
    pub bind_addr: String,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url = non_empty("DATABASE_URL").ok_or(ConfigError::Missing("DATABASE_URL"))?;

        let jwt_secret = match non_empty("JWT_SECRET") {
            Some(secret) => secret,
            None if cfg!(debug_assertions) => {
                tracing::warn!("JWT_SECRET not set, using an insecure development secret");
                "development_secret".to_string()
            }
            None => return Err(ConfigError::Missing("JWT_SECRET")),
        };

        let app_url = non_empty("APP_URL")
            .or_else(|| non_empty("NEXTAUTH_URL"))
            .unwrap_or_else(|| DEFAULT_APP_URL.to_string());

        let google_oauth = match (
            non_empty("GOOGLE_OAUTH_CLIENT_ID"),
            non_empty("GOOGLE_OAUTH_CLIENT_SECRET"),
        ) {
            (Some(client_id), Some(client_secret)) => Some(GoogleOAuthConfig {
                client_id,
                client_secret,
                redirect_uri: non_empty("GOOGLE_OAUTH_REDIRECT_URI").unwrap_or_else(|| {
                    format!("{}/api/auth/google/callback", app_url.trim_end_matches('/'))
                }),
            }),
            _ => None,
        };

        Ok(Self {
            database_url,
            jwt_secret,
            gemini_api_key: non_empty("GEMINI_API_KEY"),
            resend_api_key: non_empty("RESEND_API_KEY"),
            email_from: non_empty("EMAIL_FROM"),
            app_url,
            pabbly_webhook_secret: non_empty("PABBLY_WEBHOOK_SECRET"),
            google_oauth,
            bind_addr: non_empty("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()),
        })
    }

    /// Log which optional integrations are enabled.
    pub fn log_summary(&self) {
        let flag = |on: bool| if on { "✅" } else { "❌" };
        tracing::info!(
            "Configuration - Gemini AI: {}, Resend mail: {}, Google OAuth: {}, Pabbly webhook: {}",
            flag(self.gemini_api_key.is_some()),
            flag(self.resend_api_key.is_some()),
            flag(self.google_oauth.is_some()),
            flag(self.pabbly_webhook_secret.is_some()),
        );
        tracing::info!("Public app URL: {}", self.app_url);
    }
}

fn non_empty(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

#[cfg(test)]
impl AppConfig {
    pub fn for_tests() -> Self {
        Self {
            database_url: "postgres://localhost/gravis_test".to_string(),
            jwt_secret: "test_secret".to_string(),
            gemini_api_key: None,
            resend_api_key: None,
            email_from: None,
            app_url: DEFAULT_APP_URL.to_string(),
            pabbly_webhook_secret: Some("pabbly_secret".to_string()),
            google_oauth: None,
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
        }
    }
}
