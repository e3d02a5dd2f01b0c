//! Conversation bootstrap: obtains the session identifier

use crate::config::{BootstrapConfig, BootstrapMethod};
use crate::error::{LinkError, Result};
use crate::http;
use crate::session::SessionId;
use async_trait::async_trait;
use reqwest::{Client, Method};
use serde_json::Value;
use tracing::{debug, info, warn};
use url::Url;

/// Fields that may carry the identifier, in order of preference
pub const SESSION_ID_FIELDS: [&str; 4] = ["sessionId", "session_id", "conversationId", "conversation_id"];

/// One-shot session identifier exchange
#[async_trait]
pub trait Bootstrap: Send + Sync {
    async fn create_conversation(&self) -> Result<SessionId>;
}

/// Bootstraps against the conversation service over HTTP
pub struct ConversationBootstrapper {
    client: Client,
    method: Method,
    url: Url,
}

impl ConversationBootstrapper {
    pub fn new(config: &BootstrapConfig) -> Result<Self> {
        config.validate()?;
        let method = match config.method {
            BootstrapMethod::Get => Method::GET,
            BootstrapMethod::Put => Method::PUT,
            BootstrapMethod::Post => Method::POST,
        };
        Ok(Self {
            client: http::build_client(config.request_timeout())?,
            method,
            url: config.bootstrap_url()?,
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl Bootstrap for ConversationBootstrapper {
    async fn create_conversation(&self) -> Result<SessionId> {
        info!("Requesting conversation: {} {}", self.method, self.url);

        let response = self
            .client
            .request(self.method.clone(), self.url.clone())
            .send()
            .await
            .map_err(|e| LinkError::Network(format!("Bootstrap request failed: {}", e)))?;
        let response = http::check_status(response).await?;
        let body: Value = http::read_json(response).await?;

        let session_id = extract_session_id(&body)?;
        info!("Conversation created: {}", session_id);
        Ok(session_id)
    }
}

/// Pull the identifier out of a bootstrap response body
pub fn extract_session_id(body: &Value) -> Result<SessionId> {
    let object = body
        .as_object()
        .ok_or_else(|| LinkError::Bootstrap("Response is not a JSON object".to_string()))?;

    for field in SESSION_ID_FIELDS {
        match object.get(field) {
            Some(Value::String(id)) => {
                debug!("Session id found in '{}'", field);
                return SessionId::new(id.clone()).map_err(|e| {
                    warn!("Bootstrap returned an unusable id: {}", e);
                    LinkError::Bootstrap(format!("Invalid session id in '{}': {}", field, e))
                });
            }
            Some(other) => debug!("Ignoring non-string '{}': {}", field, other),
            None => {}
        }
    }

    Err(LinkError::Bootstrap("Missing session identifier in response".to_string()))
}
