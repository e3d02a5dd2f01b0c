//! Inbound media references

use crate::error::{LinkError, Result};
use serde::Serialize;
use serde_json::{Map, Value};

/// Most recently received playable artifact
///
/// Only `mediaUrl` is interpreted. Everything else the service sends stays in
/// `rest` untouched.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InboundMediaReference {
    #[serde(rename = "mediaUrl")]
    media_url: String,

    #[serde(flatten)]
    rest: Map<String, Value>,
}

impl InboundMediaReference {
    pub fn new(media_url: impl Into<String>) -> Result<Self> {
        Self::with_rest(media_url, Map::new())
    }

    pub fn with_rest(media_url: impl Into<String>, rest: Map<String, Value>) -> Result<Self> {
        let reference = Self {
            media_url: media_url.into(),
            rest,
        };
        reference.check()?;
        Ok(reference)
    }

    /// Build from a decoded frame. `mediaUrl` is preferred over `media_url`.
    pub fn from_value(value: Value) -> Result<Self> {
        let mut object = match value {
            Value::Object(object) => object,
            other => {
                return Err(LinkError::MalformedFrame(format!(
                    "expected a JSON object, got {}",
                    json_kind(&other)
                )))
            }
        };

        let url = match object.remove("mediaUrl") {
            Some(url) => url,
            None => object
                .remove("media_url")
                .ok_or_else(|| LinkError::MalformedFrame("missing mediaUrl".to_string()))?,
        };

        match url {
            Value::String(media_url) => Self::with_rest(media_url, object),
            other => Err(LinkError::MalformedFrame(format!(
                "mediaUrl must be a string, got {}",
                json_kind(&other)
            ))),
        }
    }

    fn check(&self) -> Result<()> {
        if self.media_url.trim().is_empty() {
            return Err(LinkError::MalformedFrame("mediaUrl is empty".to_string()));
        }
        Ok(())
    }

    pub fn media_url(&self) -> &str {
        &self.media_url
    }

    /// Remaining payload fields
    pub fn rest(&self) -> &Map<String, Value> {
        &self.rest
    }

    /// Text the avatar spoke
    pub fn text(&self) -> Option<&str> {
        self.rest_str("text")
    }

    pub fn visemes_url(&self) -> Option<&str> {
        self.rest_str("visemes_url")
    }

    pub fn word_timestamps_url(&self) -> Option<&str> {
        self.rest_str("word_timestamps_url")
    }

    /// Kind of media (audio, video, sprite, ...) as reported by the service
    pub fn media_type(&self) -> Option<&str> {
        self.rest_str("media_type")
    }

    /// Stored message id, usable for feedback
    pub fn message_id(&self) -> Option<i64> {
        self.rest.get("id").and_then(Value::as_i64)
    }

    fn rest_str(&self, key: &str) -> Option<&str> {
        self.rest.get(key).and_then(Value::as_str)
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
