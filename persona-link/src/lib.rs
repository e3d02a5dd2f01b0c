//! persona-link: real-time session client for an avatar generation service
//!
//! Provides:
//! - Conversation bootstrap over HTTP (one request per widget lifetime)
//! - One persistent WebSocket connection per session
//! - Inbound media routing with last-write-wins semantics
//! - Gesture-gated playback
//! - A headless widget composing the above, plus message history and feedback helpers

pub mod error;
pub mod config;
pub mod session;
pub mod media;
pub mod bootstrap;
pub mod socket;
pub mod router;
pub mod playback;
pub mod diagnostics;
pub mod widget;
pub mod api;
mod http;

pub use error::{LinkError, Result};
pub use config::{BootstrapConfig, BootstrapMethod, LinkConfig, SocketConfig, SocketScheme};
pub use session::{Session, SessionId, SessionPhase};
pub use media::InboundMediaReference;
pub use bootstrap::{Bootstrap, ConversationBootstrapper};
pub use socket::{
    CloseReason, Connection, ConnectionId, ConnectionState, Connector, SessionSocket, SocketEvent,
    WsConnector,
};
pub use router::{MessageRouter, RouterStats};
pub use playback::{PlaybackController, PlaybackCue, PlaybackState};
pub use diagnostics::{Diagnostic, DiagnosticSink, MemorySink, TracingSink};
pub use widget::{SessionWidget, WidgetUpdate, WidgetView};
pub use api::{AvatarSummary, ConversationApi, Feedback, MessageRecord, PersonaType};
