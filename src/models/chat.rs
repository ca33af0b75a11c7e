// src/models/chat.rs
use serde::{Deserialize, Serialize};
use sqlx::{types::Json, FromRow};

use super::generation::BuilderData;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Model,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::User => "user",
            MessageRole::Model => "model",
        }
    }

    pub fn parse(role: &str) -> Option<Self> {
        match role {
            "user" => Some(MessageRole::User),
            "model" => Some(MessageRole::Model),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroundingUrl {
    pub uri: String,
    pub title: String,
}

#[derive(Debug, FromRow)]
pub struct ChatSessionRow {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub updated_at: chrono::DateTime<chrono::Utc>,
    pub builder_data: Json<BuilderData>,
}

#[derive(Debug, FromRow)]
pub struct MessageRow {
    pub id: String,
    pub session_id: String,
    pub role: String,
    pub text: String,
    pub images: Vec<String>,
    pub grounding_urls: Json<Vec<GroundingUrl>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    #[serde(default)]
    pub id: String,
    pub role: MessageRole,
    #[serde(default)]
    pub text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub grounding_urls: Vec<GroundingUrl>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSession {
    pub id: String,
    pub title: String,
    /// Milliseconds since the Unix epoch
    pub timestamp: i64,
    pub messages: Vec<Message>,
    pub builder_data: BuilderData,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionRequest {
    #[serde(default)]
    pub title: String,
    pub builder_data: Option<BuilderData>,
    #[serde(default)]
    pub welcome: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewMessage {
    pub role: MessageRole,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub grounding_urls: Vec<GroundingUrl>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateTitleRequest {
    #[serde(default)]
    pub title: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateBuilderRequest {
    pub builder_data: BuilderData,
}

impl TryFrom<MessageRow> for Message {
    type Error = String;

    fn try_from(row: MessageRow) -> Result<Self, Self::Error> {
        let role = MessageRole::parse(&row.role)
            .ok_or_else(|| format!("unknown message role '{}' on message {}", row.role, row.id))?;
        Ok(Message {
            id: row.id,
            role,
            text: row.text,
            images: row.images,
            grounding_urls: row.grounding_urls.0,
        })
    }
}

impl ChatSession {
    pub fn from_row(row: ChatSessionRow, messages: Vec<Message>) -> Self {
        ChatSession {
            id: row.id,
            title: row.title,
            timestamp: row.updated_at.timestamp_millis(),
            messages,
            builder_data: row.builder_data.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(role: &str) -> MessageRow {
        MessageRow {
            id: "m1".to_string(),
            session_id: "s1".to_string(),
            role: role.to_string(),
            text: "hello".to_string(),
            images: vec![],
            grounding_urls: Json(vec![GroundingUrl {
                uri: "https://example.com".to_string(),
                title: "Example".to_string(),
            }]),
        }
    }

    #[test]
    fn test_message_from_row() {
        let message = Message::try_from(row("model")).unwrap();
        assert_eq!(message.role, MessageRole::Model);
        assert_eq!(message.grounding_urls.len(), 1);

        assert!(Message::try_from(row("assistant")).is_err());
    }

    #[test]
    fn test_message_json_uses_camel_case() {
        let message = Message::try_from(row("user")).unwrap();
        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(json["role"], "user");
        assert_eq!(json["groundingUrls"][0]["title"], "Example");
        assert!(json.get("images").is_none());
    }

    #[test]
    fn test_session_timestamp_is_millis() {
        let updated_at = chrono::DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let session = ChatSession::from_row(
            ChatSessionRow {
                id: "s1".to_string(),
                user_id: "u1".to_string(),
                title: "Chat".to_string(),
                updated_at,
                builder_data: Json(BuilderData::default()),
            },
            vec![],
        );
        assert_eq!(session.timestamp, 1_700_000_000_000);
    }
}
