//! Local diagnostics
//!
//! Protocol failures are never retried and never surfaced through the protocol
//! itself. They are reported here instead.

use crate::session::SessionId;
use crate::socket::{ConnectionId, ConnectionState};
use parking_lot::Mutex;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq)]
pub enum Diagnostic {
    /// The bootstrap exchange failed; the session stays unbootstrapped
    BootstrapFailed { reason: String },
    /// Outbound text dropped because the connection was not open
    SendWhileNotOpen { state: ConnectionState, dropped_len: usize },
    /// An inbound frame was ignored
    MalformedFrame { reason: String, frame_len: usize },
    /// A session id was assigned but no connection could be started for it
    ConnectionUnavailable { session_id: SessionId, reason: String },
    /// Connection establishment failed
    ConnectionFailed { connection: ConnectionId, reason: String },
    /// Connection closed; there is no reconnect
    ConnectionClosed { connection: ConnectionId },
}

pub trait DiagnosticSink: Send + Sync {
    fn report(&self, diagnostic: &Diagnostic);
}

/// Writes diagnostics to the tracing subscriber
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn report(&self, diagnostic: &Diagnostic) {
        match diagnostic {
            Diagnostic::BootstrapFailed { reason } => {
                warn!("Bootstrap failed, session will not connect: {}", reason)
            }
            Diagnostic::SendWhileNotOpen { state, dropped_len } => {
                warn!("Cannot send message: connection is {:?} ({} bytes dropped)", state, dropped_len)
            }
            Diagnostic::MalformedFrame { reason, frame_len } => {
                warn!("Ignoring inbound frame ({} bytes): {}", frame_len, reason)
            }
            Diagnostic::ConnectionUnavailable { session_id, reason } => {
                warn!("Could not open connection for {}: {}", session_id, reason)
            }
            Diagnostic::ConnectionFailed { connection, reason } => {
                warn!("Connection {} failed: {}", connection, reason)
            }
            Diagnostic::ConnectionClosed { connection } => {
                info!("Connection {} closed", connection)
            }
        }
    }
}

/// Keeps every diagnostic in memory, and forwards to tracing
#[derive(Debug, Default)]
pub struct MemorySink {
    entries: Mutex<Vec<Diagnostic>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<Diagnostic> {
        self.entries.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl DiagnosticSink for MemorySink {
    fn report(&self, diagnostic: &Diagnostic) {
        TracingSink.report(diagnostic);
        self.entries.lock().push(diagnostic.clone());
    }
}
