//! Conversation service REST helpers: avatars, message history and feedback

use crate::config::{BootstrapConfig, PATH_SEGMENT};
use crate::error::{LinkError, Result};
use crate::http;
use crate::session::SessionId;
use chrono::{DateTime, NaiveDateTime, Utc};
use percent_encoding::utf8_percent_encode;
use reqwest::Client;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::{debug, info};
use url::Url;

const MAX_FEEDBACK_TEXT_LEN: usize = 10_000;

/// Who authored a stored message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PersonaType {
    Agent,
    Human,
}

/// One stored message of a conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageRecord {
    #[serde(default)]
    pub id: Option<i64>,
    pub persona_type: PersonaType,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub media_url: Option<String>,
    #[serde(default)]
    pub visemes_url: Option<String>,
    #[serde(default)]
    pub word_timestamps_url: Option<String>,
    #[serde(default)]
    pub metadata: Option<Value>,
    #[serde(default)]
    pub media_type: Option<String>,
    #[serde(default, deserialize_with = "deserialize_timestamp")]
    pub created_at: Option<DateTime<Utc>>,
}

/// One avatar as listed by the service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvatarSummary {
    pub name: String,
    pub slug: String,
    pub provider: String,
}

/// Thumbs up/down plus free text on one message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Feedback {
    pub feedback_thumb: bool,
    pub feedback_text: String,
}

impl Feedback {
    pub fn new(thumb_up: bool, text: impl Into<String>) -> Self {
        Self {
            feedback_thumb: thumb_up,
            feedback_text: text.into(),
        }
    }
}

/// Client for the conversation service's REST endpoints
pub struct ConversationApi {
    client: Client,
    origin: Url,
}

impl ConversationApi {
    pub fn new(config: &BootstrapConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            client: http::build_client(config.request_timeout())?,
            origin: Url::parse(&config.origin)?,
        })
    }

    /// `GET /avatars/`
    pub async fn list_avatars(&self) -> Result<Vec<AvatarSummary>> {
        let url = self.origin.join("/avatars/")?;
        debug!("Listing avatars: {}", url);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| LinkError::Network(format!("Failed to list avatars: {}", e)))?;
        let response = http::check_status(response).await?;
        let avatars: Vec<AvatarSummary> = http::read_json(response).await?;

        info!("Service offers {} avatars", avatars.len());
        Ok(avatars)
    }

    /// `GET /conversation/{id}/messages/`. Unknown conversations yield an empty list.
    pub async fn list_messages(&self, session_id: &SessionId) -> Result<Vec<MessageRecord>> {
        let encoded = utf8_percent_encode(session_id.as_str(), PATH_SEGMENT);
        let url = self.origin.join(&format!("/conversation/{}/messages/", encoded))?;
        debug!("Listing messages: {}", url);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| LinkError::Network(format!("Failed to list messages: {}", e)))?;
        let response = http::check_status(response).await?;
        let messages: Vec<MessageRecord> = http::read_json(response).await?;

        info!("Conversation {} has {} messages", session_id, messages.len());
        Ok(messages)
    }

    /// `POST /feedback/{message_id}`. Returns the stored feedback as sent back by the service.
    pub async fn send_feedback(&self, message_id: i64, feedback: &Feedback) -> Result<Value> {
        if message_id < 0 {
            return Err(LinkError::Config(format!("Invalid message id: {}", message_id)));
        }
        if feedback.feedback_text.len() > MAX_FEEDBACK_TEXT_LEN {
            return Err(LinkError::Config(format!(
                "Feedback text too long (max {} bytes)",
                MAX_FEEDBACK_TEXT_LEN
            )));
        }

        let url = self.origin.join(&format!("/feedback/{}", message_id))?;
        debug!("Sending feedback for message {}", message_id);

        let response = self
            .client
            .post(url)
            .json(feedback)
            .send()
            .await
            .map_err(|e| LinkError::Network(format!("Failed to send feedback: {}", e)))?;
        let response = http::check_status(response).await?;
        let stored = http::read_json(response).await?;

        info!("Feedback recorded for message {}", message_id);
        Ok(stored)
    }
}

/// RFC 3339, or a naive timestamp taken as UTC
fn deserialize_timestamp<'de, D>(deserializer: D) -> std::result::Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    let Some(raw) = raw else {
        return Ok(None);
    };

    if let Ok(timestamp) = DateTime::parse_from_rfc3339(&raw) {
        return Ok(Some(timestamp.with_timezone(&Utc)));
    }
    NaiveDateTime::parse_from_str(&raw, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| Some(naive.and_utc()))
        .map_err(serde::de::Error::custom)
}
