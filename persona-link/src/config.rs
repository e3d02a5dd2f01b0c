//! Configuration for the session protocol

use crate::error::{LinkError, Result};
use crate::session::SessionId;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use url::Url;

/// Characters escaped when a value is placed into a single path segment
pub(crate) const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

const MAX_ADDRESS_LEN: usize = 2048;
const LOG_LEVELS: [&str; 5] = ["error", "warn", "info", "debug", "trace"];

/// Top-level client configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LinkConfig {
    /// Conversation bootstrap exchange
    pub bootstrap: BootstrapConfig,

    /// Streaming endpoint
    pub socket: SocketConfig,

    /// Externally supplied session id; skips the bootstrap exchange when set
    pub session_id: Option<String>,

    /// Log level for the console (error, warn, info, debug, trace)
    pub log_level: String,
}

/// Bootstrap request settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BootstrapConfig {
    /// Origin of the conversation service (scheme://host:port)
    pub origin: String,

    /// Fixed path of the bootstrap request. `{avatar_slug}` is substituted.
    pub path: String,

    /// HTTP method used for the bootstrap request
    pub method: BootstrapMethod,

    /// Avatar the conversation is created for
    pub avatar_slug: Option<String>,

    /// Optional timeout for HTTP exchanges; none by default
    pub request_timeout_secs: Option<u64>,
}

/// HTTP method of the bootstrap request
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BootstrapMethod {
    Get,
    Put,
    Post,
}

/// Streaming endpoint settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SocketConfig {
    /// host:port of the streaming endpoint
    pub endpoint_address: String,

    /// Transport scheme
    pub scheme: SocketScheme,
}

/// WebSocket scheme
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SocketScheme {
    Ws,
    Wss,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            bootstrap: BootstrapConfig::default(),
            socket: SocketConfig::default(),
            session_id: None,
            log_level: "info".to_string(),
        }
    }
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            origin: "http://localhost:8000".to_string(),
            path: "/create_conversation/".to_string(),
            method: BootstrapMethod::Get,
            avatar_slug: None,
            request_timeout_secs: None,
        }
    }
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self {
            endpoint_address: "localhost:9000".to_string(),
            scheme: SocketScheme::Ws,
        }
    }
}

impl std::fmt::Display for SocketScheme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SocketScheme::Ws => write!(f, "ws"),
            SocketScheme::Wss => write!(f, "wss"),
        }
    }
}

impl FromStr for SocketScheme {
    type Err = LinkError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ws" => Ok(SocketScheme::Ws),
            "wss" => Ok(SocketScheme::Wss),
            other => Err(LinkError::Config(format!(
                "Unsupported socket scheme '{}' (expected ws or wss)",
                other
            ))),
        }
    }
}

impl FromStr for BootstrapMethod {
    type Err = LinkError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "get" => Ok(BootstrapMethod::Get),
            "put" => Ok(BootstrapMethod::Put),
            "post" => Ok(BootstrapMethod::Post),
            other => Err(LinkError::Config(format!("Unsupported bootstrap method '{}'", other))),
        }
    }
}

/// Load configuration from JSON, TOML or YAML text
impl FromStr for LinkConfig {
    type Err = LinkError;

    fn from_str(content: &str) -> Result<Self> {
        if let Ok(config) = serde_json::from_str::<LinkConfig>(content) {
            return Ok(config);
        }

        if let Ok(config) = toml::from_str::<LinkConfig>(content) {
            return Ok(config);
        }

        if let Ok(config) = serde_yaml::from_str::<LinkConfig>(content) {
            return Ok(config);
        }

        Err(LinkError::Config("Unknown configuration format".to_string()))
    }
}

impl LinkConfig {
    /// Load configuration from file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            LinkError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        content.parse()
    }

    /// Overlay `PERSONA_LINK_*` environment variables
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    /// Overlay variables resolved through `lookup`
    pub fn apply_env_from<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(origin) = lookup("PERSONA_LINK_ORIGIN") {
            self.bootstrap.origin = origin;
        }
        if let Some(path) = lookup("PERSONA_LINK_BOOTSTRAP_PATH") {
            self.bootstrap.path = path;
        }
        if let Some(method) = lookup("PERSONA_LINK_BOOTSTRAP_METHOD") {
            self.bootstrap.method = method.parse()?;
        }
        if let Some(slug) = lookup("PERSONA_LINK_AVATAR") {
            self.bootstrap.avatar_slug = Some(slug);
        }
        if let Some(timeout) = lookup("PERSONA_LINK_TIMEOUT_SECS") {
            let secs = timeout.parse::<u64>().map_err(|_| {
                LinkError::Config(format!("PERSONA_LINK_TIMEOUT_SECS is not a number: {}", timeout))
            })?;
            self.bootstrap.request_timeout_secs = Some(secs);
        }
        if let Some(endpoint) = lookup("PERSONA_LINK_ENDPOINT") {
            self.socket.endpoint_address = endpoint;
        }
        if let Some(scheme) = lookup("PERSONA_LINK_SCHEME") {
            self.socket.scheme = scheme.parse()?;
        }
        if let Some(session_id) = lookup("PERSONA_LINK_SESSION_ID") {
            self.session_id = Some(session_id);
        }
        if let Some(log_level) = lookup("PERSONA_LINK_LOG_LEVEL") {
            self.log_level = log_level;
        }
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        self.bootstrap.validate()?;
        self.socket.validate()?;

        if let Some(ref session_id) = self.session_id {
            SessionId::new(session_id.clone())?;
        }

        if !LOG_LEVELS.contains(&self.log_level.to_ascii_lowercase().as_str()) {
            return Err(LinkError::Config(format!("Unknown log level '{}'", self.log_level)));
        }

        Ok(())
    }

    /// Externally supplied session id, if any
    pub fn preset_session_id(&self) -> Result<Option<SessionId>> {
        self.session_id.clone().map(SessionId::new).transpose()
    }
}

impl BootstrapConfig {
    pub fn validate(&self) -> Result<()> {
        let origin = Url::parse(&self.origin)
            .map_err(|e| LinkError::Config(format!("Invalid origin '{}': {}", self.origin, e)))?;
        if origin.scheme() != "http" && origin.scheme() != "https" {
            return Err(LinkError::Config("Origin must use http or https".to_string()));
        }
        // Request paths are joined onto the origin root
        if origin.path() != "/" || origin.query().is_some() || origin.fragment().is_some() {
            return Err(LinkError::Config(format!(
                "Origin '{}' must be scheme://host[:port] without a path",
                self.origin
            )));
        }

        if !self.path.starts_with('/') {
            return Err(LinkError::Config("Bootstrap path must start with '/'".to_string()));
        }
        if self.path.contains("{avatar_slug}") && self.avatar_slug.is_none() {
            return Err(LinkError::Config(
                "Bootstrap path needs an avatar slug but none is configured".to_string(),
            ));
        }

        if let Some(ref slug) = self.avatar_slug {
            if slug.is_empty() || slug.len() > 256 {
                return Err(LinkError::Config("Invalid avatar slug length".to_string()));
            }
            if slug.chars().any(|c| !c.is_alphanumeric() && c != '-' && c != '_') {
                return Err(LinkError::Config("Avatar slug contains invalid characters".to_string()));
            }
        }

        if self.request_timeout_secs == Some(0) {
            return Err(LinkError::Config("Request timeout cannot be 0".to_string()));
        }

        Ok(())
    }

    /// Full URL of the bootstrap request
    pub fn bootstrap_url(&self) -> Result<Url> {
        let path = match self.avatar_slug {
            Some(ref slug) => self
                .path
                .replace("{avatar_slug}", &utf8_percent_encode(slug, PATH_SEGMENT).to_string()),
            None => self.path.clone(),
        };
        Ok(Url::parse(&self.origin)?.join(&path)?)
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }
}

impl SocketConfig {
    pub fn validate(&self) -> Result<()> {
        let address = self.endpoint_address.trim();
        if address.is_empty() {
            return Err(LinkError::Config("Endpoint address cannot be empty".to_string()));
        }
        if address.len() > MAX_ADDRESS_LEN {
            return Err(LinkError::Config("Endpoint address too long".to_string()));
        }
        if address.contains("://") {
            return Err(LinkError::Config(
                "Endpoint address must be host:port without a scheme".to_string(),
            ));
        }
        if address.contains('/') || address.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(LinkError::Config("Endpoint address contains invalid characters".to_string()));
        }
        Ok(())
    }

    /// Connection target: `<scheme>://<endpoint>/ws/<session_id>/`
    pub fn target(&self, session_id: &SessionId) -> Result<Url> {
        let encoded = utf8_percent_encode(session_id.as_str(), PATH_SEGMENT);
        let target = format!("{}://{}/ws/{}/", self.scheme, self.endpoint_address.trim(), encoded);
        Ok(Url::parse(&target)?)
    }
}
