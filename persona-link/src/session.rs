//! Session identity and lifecycle

use crate::error::{LinkError, Result};
use crate::media::InboundMediaReference;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

const MAX_SESSION_ID_LEN: usize = 256;

/// Opaque conversation token. Never empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        if id.is_empty() {
            return Err(LinkError::InvalidSessionId("session id cannot be empty".to_string()));
        }
        if id.len() > MAX_SESSION_ID_LEN {
            return Err(LinkError::InvalidSessionId(format!(
                "session id too long (max {} chars)",
                MAX_SESSION_ID_LEN
            )));
        }
        if id.chars().any(|c| c.is_control()) {
            return Err(LinkError::InvalidSessionId(
                "session id contains control characters".to_string(),
            ));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for SessionId {
    type Error = LinkError;

    fn try_from(value: String) -> Result<Self> {
        SessionId::new(value)
    }
}

impl From<SessionId> for String {
    fn from(id: SessionId) -> Self {
        id.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle of a session
///
/// ```text
/// Unbootstrapped --assign_id--> Bootstrapped --mark_connected--> Connected
///                                    |                               |
///                                    +--------mark_closed------------+--> Closed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionPhase {
    Unbootstrapped,
    Bootstrapped,
    Connected,
    Closed,
}

/// One logical conversation
#[derive(Debug, Clone)]
pub struct Session {
    id: Option<SessionId>,
    endpoint_address: String,
    phase: SessionPhase,
    media: Option<InboundMediaReference>,
}

impl Session {
    pub fn new(endpoint_address: impl Into<String>) -> Self {
        Self {
            id: None,
            endpoint_address: endpoint_address.into(),
            phase: SessionPhase::Unbootstrapped,
            media: None,
        }
    }

    /// Session whose id is already known
    pub fn with_id(endpoint_address: impl Into<String>, id: SessionId) -> Self {
        let mut session = Self::new(endpoint_address);
        session.id = Some(id);
        session.phase = SessionPhase::Bootstrapped;
        session
    }

    pub fn id(&self) -> Option<&SessionId> {
        self.id.as_ref()
    }

    pub fn endpoint_address(&self) -> &str {
        &self.endpoint_address
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn media(&self) -> Option<&InboundMediaReference> {
        self.media.as_ref()
    }

    /// A connection may be opened only once an id exists and none was opened yet
    pub fn can_connect(&self) -> bool {
        self.id.is_some() && self.phase == SessionPhase::Bootstrapped
    }

    /// Assign the id. Allowed exactly once.
    pub fn assign_id(&mut self, id: SessionId) -> Result<()> {
        if let Some(ref existing) = self.id {
            return Err(LinkError::Session(format!(
                "session id already assigned ({})",
                existing
            )));
        }
        info!("Session bootstrapped: {}", id);
        self.id = Some(id);
        self.phase = SessionPhase::Bootstrapped;
        Ok(())
    }

    pub fn mark_connected(&mut self) -> Result<()> {
        if self.phase != SessionPhase::Bootstrapped {
            return Err(LinkError::Session(format!(
                "cannot connect from {:?}",
                self.phase
            )));
        }
        self.phase = SessionPhase::Connected;
        Ok(())
    }

    pub fn mark_closed(&mut self) -> Result<()> {
        match self.phase {
            SessionPhase::Bootstrapped | SessionPhase::Connected => {
                self.phase = SessionPhase::Closed;
                Ok(())
            }
            SessionPhase::Closed => Ok(()),
            SessionPhase::Unbootstrapped => Err(LinkError::Session(
                "cannot close a session that was never bootstrapped".to_string(),
            )),
        }
    }

    /// Replace the media reference (last-write-wins). Returns the new reference.
    pub fn replace_media(&mut self, media: InboundMediaReference) -> &InboundMediaReference {
        if let Some(ref previous) = self.media {
            debug!("Replacing media {} with {}", previous.media_url(), media.media_url());
        }
        self.media.insert(media)
    }
}
