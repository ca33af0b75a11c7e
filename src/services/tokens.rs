// src/services/tokens.rs
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::models::auth::{Claims, User};

pub const SESSION_TTL_HOURS: i64 = 24;
pub const RESET_TOKEN_TTL_MINUTES: i64 = 60;

pub fn generate_jwt_token(user: &User, secret: &str) -> Result<String, jsonwebtoken::errors::Error> {
    let now = Utc::now();
    let claims = Claims {
        sub: user.id.clone(),
        email: user.email.clone(),
        name: user.name.clone(),
        exp: (now + Duration::hours(SESSION_TTL_HOURS)).timestamp() as usize,
        iat: now.timestamp() as usize,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
}

pub fn verify_jwt_token(token: &str, secret: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )?;

    Ok(token_data.claims)
}

/// A freshly issued password-reset token. Only `token_hash` is persisted.
#[derive(Debug, Clone)]
pub struct ResetToken {
    pub token: String,
    pub token_hash: String,
    pub expires: DateTime<Utc>,
}

impl ResetToken {
    pub fn issue(now: DateTime<Utc>) -> Self {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        let token = hex::encode(bytes);

        ResetToken {
            token_hash: hash_reset_token(&token),
            token,
            expires: now + Duration::minutes(RESET_TOKEN_TTL_MINUTES),
        }
    }
}

pub fn hash_reset_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

pub fn is_expired(expires: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    expires < now
}

pub fn reset_link(app_url: &str, token: &str) -> String {
    format!(
        "{}/auth/reset-password/{}",
        app_url.trim_end_matches('/'),
        urlencoding::encode(token)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> User {
        let now = Utc::now();
        User {
            id: "user-1".to_string(),
            email: "architect@example.com".to_string(),
            name: Some("Architect".to_string()),
            password_hash: None,
            google_id: None,
            image: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_jwt_round_trip() {
        let token = generate_jwt_token(&user(), "secret").unwrap();
        let claims = verify_jwt_token(&token, "secret").unwrap();
        assert_eq!(claims.sub, "user-1");
        assert_eq!(claims.email, "architect@example.com");
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn test_jwt_rejects_wrong_secret() {
        let token = generate_jwt_token(&user(), "secret").unwrap();
        assert!(verify_jwt_token(&token, "other").is_err());
    }

    #[test]
    fn test_jwt_rejects_expired_token() {
        let past = Utc::now() - Duration::hours(3);
        let claims = Claims {
            sub: "user-1".to_string(),
            email: "architect@example.com".to_string(),
            name: None,
            exp: (past + Duration::hours(1)).timestamp() as usize,
            iat: past.timestamp() as usize,
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(b"secret"),
        )
        .unwrap();
        assert!(verify_jwt_token(&token, "secret").is_err());
    }

    #[test]
    fn test_reset_token_issue() {
        let now = Utc::now();
        let issued = ResetToken::issue(now);
        assert_eq!(issued.token.len(), 64);
        assert!(issued.token.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(issued.token_hash, hash_reset_token(&issued.token));
        assert_ne!(issued.token_hash, issued.token);
        assert_eq!(issued.expires - now, Duration::hours(1));

        let other = ResetToken::issue(now);
        assert_ne!(issued.token, other.token);
    }

    #[test]
    fn test_expiry() {
        let now = Utc::now();
        assert!(is_expired(now - Duration::seconds(1), now));
        assert!(!is_expired(now + Duration::minutes(59), now));
    }

    #[test]
    fn test_reset_link() {
        assert_eq!(
            reset_link("https://gravis.example/", "abc123"),
            "https://gravis.example/auth/reset-password/abc123"
        );
    }
}
