// src/google_oauth.rs
use base64::prelude::*;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;

const AUTH_ENDPOINT: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const TOKEN_ENDPOINT: &str = "https://oauth2.googleapis.com/token";
const USERINFO_ENDPOINT: &str = "https://www.googleapis.com/oauth2/v2/userinfo";
pub const DEFAULT_REDIRECT: &str = "/app";
/// A sign-in round trip older than this is refused.
pub const STATE_MAX_AGE_SECS: i64 = 600;

pub const SIGN_IN_SCOPES: [&str; 3] = [
    "https://www.googleapis.com/auth/userinfo.email",
    "https://www.googleapis.com/auth/userinfo.profile",
    "openid",
];

#[derive(Debug, Deserialize)]
pub struct GoogleTokenResponse {
    pub access_token: String,
}

#[derive(Debug, Deserialize)]
pub struct GoogleUserInfo {
    pub id: String,
    pub email: String,
    pub name: Option<String>,
    pub picture: Option<String>,
    #[serde(default)]
    pub verified_email: bool,
}

/// Round-tripped through Google in the `state` parameter.
#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct OAuthState {
    pub redirect_to: String,
    pub timestamp: i64,
}

impl OAuthState {
    pub fn new(redirect_to: Option<String>) -> Self {
        Self {
            redirect_to: sanitize_redirect(redirect_to.as_deref()),
            timestamp: chrono::Utc::now().timestamp(),
        }
    }

    pub fn encode(&self) -> String {
        BASE64_URL_SAFE_NO_PAD.encode(serde_json::to_string(self).unwrap_or_default())
    }

    pub fn decode(raw: &str) -> Option<Self> {
        let bytes = BASE64_URL_SAFE_NO_PAD.decode(raw).ok()?;
        let mut state: OAuthState = serde_json::from_slice(&bytes).ok()?;
        state.redirect_to = sanitize_redirect(Some(&state.redirect_to));
        Some(state)
    }

    /// Small clock skew into the future is tolerated.
    pub fn is_fresh(&self, now: i64) -> bool {
        let age = now - self.timestamp;
        (-60..=STATE_MAX_AGE_SECS).contains(&age)
    }
}

/// Only same-site relative paths are allowed as post-login destinations.
pub fn sanitize_redirect(redirect_to: Option<&str>) -> String {
    match redirect_to {
        Some(path) if path.starts_with('/') && !path.starts_with("//") && !path.contains('\\') => {
            path.to_string()
        }
        _ => DEFAULT_REDIRECT.to_string(),
    }
}

pub fn build_google_oauth_url(client_id: &str, redirect_uri: &str, state: &str) -> String {
    let scope_string = SIGN_IN_SCOPES.join(" ");

    format!(
        "{}?client_id={}&redirect_uri={}&response_type=code&scope={}&state={}&prompt=select_account",
        AUTH_ENDPOINT,
        urlencoding::encode(client_id),
        urlencoding::encode(redirect_uri),
        urlencoding::encode(&scope_string),
        urlencoding::encode(state)
    )
}

pub async fn exchange_code_for_token(
    client: &Client,
    code: &str,
    client_id: &str,
    client_secret: &str,
    redirect_uri: &str,
) -> Result<GoogleTokenResponse, Box<dyn std::error::Error + Send + Sync>> {
    let params = json!({
        "code": code,
        "client_id": client_id,
        "client_secret": client_secret,
        "redirect_uri": redirect_uri,
        "grant_type": "authorization_code"
    });

    let response = client.post(TOKEN_ENDPOINT).json(&params).send().await?;

    if !response.status().is_success() {
        let error_text = response.text().await?;
        return Err(format!("Failed to exchange code: {}", error_text).into());
    }

    Ok(response.json().await?)
}

pub async fn get_google_user_info(
    client: &Client,
    access_token: &str,
) -> Result<GoogleUserInfo, Box<dyn std::error::Error + Send + Sync>> {
    let response = client
        .get(USERINFO_ENDPOINT)
        .bearer_auth(access_token)
        .send()
        .await?;

    if !response.status().is_success() {
        let error_text = response.text().await?;
        return Err(format!("Failed to get user info: {}", error_text).into());
    }

    Ok(response.json().await?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_round_trip() {
        let state = OAuthState::new(Some("/app?mode=visualizer".to_string()));
        let decoded = OAuthState::decode(&state.encode()).unwrap();
        assert_eq!(decoded, state);
        assert!(OAuthState::decode("not-base64!!").is_none());
    }

    #[test]
    fn test_redirects_stay_on_site() {
        assert_eq!(sanitize_redirect(Some("/app")), "/app");
        assert_eq!(sanitize_redirect(Some("https://evil.example")), DEFAULT_REDIRECT);
        assert_eq!(sanitize_redirect(Some("//evil.example")), DEFAULT_REDIRECT);
        assert_eq!(sanitize_redirect(None), DEFAULT_REDIRECT);
    }

    #[test]
    fn test_decoded_state_is_sanitized() {
        let raw = BASE64_URL_SAFE_NO_PAD
            .encode(r#"{"redirect_to":"https://evil.example","timestamp":1}"#);
        assert_eq!(OAuthState::decode(&raw).unwrap().redirect_to, DEFAULT_REDIRECT);
    }

    #[test]
    fn test_state_expires() {
        let state = OAuthState::new(None);
        assert!(state.is_fresh(state.timestamp));
        assert!(state.is_fresh(state.timestamp + STATE_MAX_AGE_SECS));
        assert!(!state.is_fresh(state.timestamp + STATE_MAX_AGE_SECS + 1));
        assert!(!state.is_fresh(state.timestamp - 3600));
    }

    #[test]
    fn test_auth_url() {
        let url = build_google_oauth_url("client-1", "http://localhost:3000/cb", "xyz");
        assert!(url.starts_with(AUTH_ENDPOINT));
        assert!(url.contains("client_id=client-1"));
        assert!(url.contains("redirect_uri=http%3A%2F%2Flocalhost%3A3000%2Fcb"));
        assert!(url.contains("scope=https%3A%2F%2Fwww.googleapis.com%2Fauth%2Fuserinfo.email%20"));
        assert!(url.contains("state=xyz"));
    }
}
