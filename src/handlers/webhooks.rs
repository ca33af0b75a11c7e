use crate::handlers::auth::{find_user_by_email, insert_user, normalize_email};
use crate::AppState;
use axum::{
    body::Bytes,
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::Json,
    routing::post,
    Router,
};
use serde_json::{json, Value};
use std::sync::Arc;

pub const SECRET_HEADER: &str = "x-pabbly-secret";

pub fn webhook_routes() -> Router {
    Router::new().route("/api/webhooks/pabbly", post(pabbly_webhook))
}

/// Compares the presented secret without short-circuiting on the first mismatch.
pub fn secret_matches(presented: Option<&str>, configured: Option<&str>) -> bool {
    let (Some(presented), Some(configured)) = (presented, configured) else {
        return false;
    };
    if presented.len() != configured.len() {
        return false;
    }
    presented
        .bytes()
        .zip(configured.bytes())
        .fold(0u8, |acc, (a, b)| acc | (a ^ b))
        == 0
}

/// A student enrolment as sent by the checkout automation.
#[derive(Debug, PartialEq)]
pub struct Enrolment {
    pub email: String,
    pub name: String,
}

fn field<'a>(body: &'a Value, key: &str) -> Option<&'a str> {
    body.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// `None` when the payload carries no email.
pub fn parse_enrolment(body: &Value) -> Option<Enrolment> {
    let email = field(body, "student_email").or_else(|| field(body, "email"))?;
    let email = normalize_email(email);

    let full_name = field(body, "student_first_name").map(|first| {
        format!("{} {}", first, field(body, "student_last_name").unwrap_or(""))
            .trim()
            .to_string()
    });

    let name = field(body, "student_name")
        .map(str::to_string)
        .or(full_name)
        .or_else(|| field(body, "name").map(str::to_string))
        .unwrap_or_else(|| email.split('@').next().unwrap_or_default().to_string());

    Some(Enrolment { email, name })
}

fn webhook_error(status: StatusCode, message: &str) -> (StatusCode, Json<Value>) {
    (status, Json(json!({ "error": message })))
}

async fn pabbly_webhook(
    Extension(state): Extension<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, Json<Value>) {
    let presented = headers.get(SECRET_HEADER).and_then(|v| v.to_str().ok());
    if !secret_matches(presented, state.config.pabbly_webhook_secret.as_deref()) {
        tracing::warn!("Rejected webhook call with missing or wrong secret");
        return webhook_error(StatusCode::UNAUTHORIZED, "Unauthorized");
    }

    let internal = |e: &dyn std::fmt::Display| {
        tracing::error!("Webhook error: {}", e);
        webhook_error(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
    };

    let body: Value = match serde_json::from_slice(&body) {
        Ok(body) => body,
        Err(e) => return internal(&e),
    };

    let Some(enrolment) = parse_enrolment(&body) else {
        return webhook_error(StatusCode::BAD_REQUEST, "student_email is required");
    };

    match find_user_by_email(&state.db_pool, &enrolment.email).await {
        Ok(Some(existing)) => {
            return (
                StatusCode::OK,
                Json(json!({ "message": "User already exists", "userId": existing.id })),
            );
        }
        Ok(None) => {}
        Err(e) => return internal(&e),
    }

    match insert_user(&state.db_pool, &enrolment.email, Some(&enrolment.name), None).await {
        Ok(Some(user)) => {
            tracing::info!("🎓 Provisioned user {} from webhook", user.email);
            (
                StatusCode::CREATED,
                Json(json!({
                    "success": true,
                    "userId": user.id,
                    "message": "User created. They should now use the 'Forgot Password' feature to set their password."
                })),
            )
        }
        // Lost a race with a concurrent delivery of the same enrolment
        Ok(None) => match find_user_by_email(&state.db_pool, &enrolment.email).await {
            Ok(Some(existing)) => (
                StatusCode::OK,
                Json(json!({ "message": "User already exists", "userId": existing.id })),
            ),
            Ok(None) => internal(&"user vanished after unique violation"),
            Err(e) => internal(&e),
        },
        Err(e) => internal(&e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secret_matching() {
        assert!(secret_matches(Some("s3cret"), Some("s3cret")));
        assert!(!secret_matches(Some("s3cret"), Some("s3creT")));
        assert!(!secret_matches(Some("short"), Some("s3cret")));
        assert!(!secret_matches(None, Some("s3cret")));
        // An unset secret never authorizes anything
        assert!(!secret_matches(Some(""), None));
    }

    #[test]
    fn test_enrolment_prefers_student_fields() {
        let body = json!({
            "student_email": "Student@Example.com",
            "email": "other@example.com",
            "student_name": "Ada Lovelace",
            "name": "Ignored"
        });
        assert_eq!(
            parse_enrolment(&body),
            Some(Enrolment {
                email: "student@example.com".to_string(),
                name: "Ada Lovelace".to_string(),
            })
        );
    }

    #[test]
    fn test_enrolment_name_fallbacks() {
        let split = json!({ "email": "a@x.io", "student_first_name": "Ada", "student_last_name": "" });
        assert_eq!(parse_enrolment(&split).unwrap().name, "Ada");

        let full = json!({ "email": "a@x.io", "student_first_name": "Ada", "student_last_name": "Byron" });
        assert_eq!(parse_enrolment(&full).unwrap().name, "Ada Byron");

        let plain = json!({ "email": "a@x.io", "name": "A. B." });
        assert_eq!(parse_enrolment(&plain).unwrap().name, "A. B.");

        let bare = json!({ "email": "ada.byron@x.io", "student_name": "" });
        assert_eq!(parse_enrolment(&bare).unwrap().name, "ada.byron");
    }

    #[test]
    fn test_enrolment_requires_email() {
        assert!(parse_enrolment(&json!({ "student_name": "Ada" })).is_none());
        assert!(parse_enrolment(&json!({ "student_email": "  " })).is_none());
    }
}
