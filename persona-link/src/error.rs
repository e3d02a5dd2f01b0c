//! Error types for persona-link

use crate::socket::ConnectionState;
use thiserror::Error;

/// Errors raised by the session protocol
#[derive(Error, Debug)]
pub enum LinkError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Bootstrap error: {0}")]
    Bootstrap(String),

    #[error("API error: {status} - {body}")]
    Api { status: u16, body: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Connection is not open (state: {0:?})")]
    NotOpen(ConnectionState),

    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    #[error("Invalid session id: {0}")]
    InvalidSessionId(String),

    #[error("Session error: {0}")]
    Session(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("URL parsing error: {0}")]
    Url(#[from] url::ParseError),
}

pub type Result<T> = std::result::Result<T, LinkError>;
