//! Inbound frame routing

use crate::error::{LinkError, Result};
use crate::media::InboundMediaReference;
use crate::session::Session;
use tracing::debug;

/// Counters kept by the router
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RouterStats {
    pub accepted: u64,
    pub ignored: u64,
}

/// Decodes inbound frames and keeps the session's media reference current
#[derive(Debug, Default)]
pub struct MessageRouter {
    stats: RouterStats,
}

impl MessageRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode a frame without touching any session
    pub fn decode(frame: &str) -> Result<InboundMediaReference> {
        let value: serde_json::Value = serde_json::from_str(frame)
            .map_err(|e| LinkError::MalformedFrame(format!("not JSON: {}", e)))?;
        InboundMediaReference::from_value(value)
    }

    /// Decode `frame` and make it the session's current media reference.
    ///
    /// A frame that fails to decode leaves the session untouched.
    pub fn handle(&mut self, frame: &str, session: &mut Session) -> Result<InboundMediaReference> {
        match Self::decode(frame) {
            Ok(media) => {
                self.stats.accepted += 1;
                debug!("Frame accepted: {}", media.media_url());
                Ok(session.replace_media(media).clone())
            }
            Err(e) => {
                self.stats.ignored += 1;
                Err(e)
            }
        }
    }

    pub fn stats(&self) -> RouterStats {
        self.stats
    }
}
