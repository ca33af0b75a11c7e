// src/services/mail.rs
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

const RESEND_API_URL: &str = "https://api.resend.com/emails";
const FALLBACK_SENDER: &str = "onboarding@resend.dev";
const RESET_SUBJECT: &str = "Reset your password for Gravis EDU";

#[derive(Error, Debug)]
pub enum MailError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Mail API error ({status}): {body}")]
    Api { status: u16, body: String },
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_password_reset(&self, email: &str, reset_link: &str) -> Result<(), MailError>;
}

/// Transactional mail through the Resend REST API.
pub struct ResendMailer {
    client: Client,
    api_key: String,
    from: String,
}

#[derive(Debug, Serialize)]
struct SendEmailRequest<'a> {
    from: &'a str,
    to: Vec<&'a str>,
    subject: &'a str,
    html: String,
}

impl ResendMailer {
    pub fn new(client: Client, api_key: String, email_from: Option<&str>) -> Self {
        Self {
            client,
            api_key,
            from: sender_address(email_from),
        }
    }
}

#[async_trait]
impl Mailer for ResendMailer {
    async fn send_password_reset(&self, email: &str, reset_link: &str) -> Result<(), MailError> {
        tracing::info!("Sending password reset email to {} from {}", email, self.from);

        let request = SendEmailRequest {
            from: &self.from,
            to: vec![email],
            subject: RESET_SUBJECT,
            html: reset_email_html(reset_link),
        };

        let response = self
            .client
            .post(RESEND_API_URL)
            .bearer_auth(&self.api_key)
            .timeout(Duration::from_secs(30))
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(MailError::Api {
                status: status.as_u16(),
                body,
            });
        }

        tracing::debug!("Resend accepted password reset email for {}", email);
        Ok(())
    }
}

/// Development fallback when no mail provider is configured: the link goes to the log.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send_password_reset(&self, email: &str, reset_link: &str) -> Result<(), MailError> {
        tracing::warn!("[PASSWORD RESET] Link for {}: {}", email, reset_link);
        Ok(())
    }
}

pub fn sender_address(email_from: Option<&str>) -> String {
    match email_from {
        Some(address) if !address.is_empty() => format!("Gravis Edu AI <{}>", address),
        _ => FALLBACK_SENDER.to_string(),
    }
}

fn reset_email_html(reset_link: &str) -> String {
    format!(
        r#"<div style="font-family: 'Inter', sans-serif; max-width: 500px; margin: 0 auto; background-color: #4338ca; border-radius: 20px; color: white; overflow: hidden;">
    <div style="padding: 40px 30px; text-align: center;">
        <div style="margin-bottom: 20px;">
            <span style="font-size: 24px; font-weight: 800; letter-spacing: 2px;">GRAVIS</span>
        </div>
        <h1 style="font-size: 24px; font-weight: 700; margin-bottom: 20px; color: white;">Hi there,</h1>
        <p style="font-size: 16px; line-height: 1.6; margin-bottom: 30px; color: rgba(255,255,255,0.9);">
            As part of your enrollment, we've created an account for you on Gravis EDU. Please set your password to get started.
        </p>
        <div style="margin-bottom: 30px;">
            <a href="{link}" style="display: inline-block; padding: 16px 36px; background-color: #ff6022; color: white; text-decoration: none; border-radius: 12px; font-weight: 800; font-size: 16px;">
                Set Up Your Password
            </a>
        </div>
        <p style="font-size: 14px; color: rgba(255,255,255,0.7); margin-top: 40px; text-align: left;">
            Best regards,<br>
            <span style="font-weight: 700; color: white;">Gravis EDU</span>
        </p>
    </div>
</div>"#,
        link = reset_link
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sender_address() {
        assert_eq!(
            sender_address(Some("noreply@gravis.example")),
            "Gravis Edu AI <noreply@gravis.example>"
        );
        assert_eq!(sender_address(Some("")), FALLBACK_SENDER);
        assert_eq!(sender_address(None), FALLBACK_SENDER);
    }

    #[test]
    fn test_reset_email_contains_link() {
        let html = reset_email_html("https://gravis.example/auth/reset-password/abc");
        assert!(html.contains(r#"href="https://gravis.example/auth/reset-password/abc""#));
        assert!(html.contains("Set Up Your Password"));
    }

    #[test]
    fn test_request_body_shape() {
        let request = SendEmailRequest {
            from: "Gravis Edu AI <a@b.co>",
            to: vec!["student@example.com"],
            subject: RESET_SUBJECT,
            html: "<p>hi</p>".to_string(),
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["to"][0], "student@example.com");
        assert_eq!(json["subject"], RESET_SUBJECT);
    }

    #[tokio::test]
    async fn test_log_mailer_always_succeeds() {
        let mailer: Box<dyn Mailer> = Box::new(LogMailer);
        assert!(mailer
            .send_password_reset("student@example.com", "http://localhost:3000/x")
            .await
            .is_ok());
    }
}
