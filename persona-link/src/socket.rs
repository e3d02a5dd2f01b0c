//! Session socket: one persistent connection per session

use crate::config::SocketConfig;
use crate::error::{LinkError, Result};
use crate::session::SessionId;
use async_trait::async_trait;
use futures_util::future;
use futures_util::sink::Sink;
use futures_util::stream::Stream;
use futures_util::{SinkExt, StreamExt};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

/// Outbound half of a transport
pub type FrameSink = Pin<Box<dyn Sink<String, Error = LinkError> + Send>>;

/// Inbound half of a transport
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// Receives connection events on the connection's task
pub type EventHandler = Arc<dyn Fn(SocketEvent) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    Unopened,
    Open,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Why a connection ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// Released by its owner
    Local,
    /// Peer closed the stream
    Remote,
    /// Transport error while open
    Transport(String),
    /// Establishment failed
    ConnectFailed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketEvent {
    Opened { connection: ConnectionId },
    Frame { connection: ConnectionId, text: String },
    Closed { connection: ConnectionId, reason: CloseReason },
}

impl SocketEvent {
    pub fn connection(&self) -> ConnectionId {
        match self {
            SocketEvent::Opened { connection }
            | SocketEvent::Frame { connection, .. }
            | SocketEvent::Closed { connection, .. } => *connection,
        }
    }
}

/// Establishes the transport for a connection target
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, target: &Url) -> Result<(FrameSink, FrameStream)>;
}

/// WebSocket transport
#[derive(Debug, Default, Clone, Copy)]
pub struct WsConnector;

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, target: &Url) -> Result<(FrameSink, FrameStream)> {
        let (ws_stream, _) = connect_async(target.as_str())
            .await
            .map_err(|e| LinkError::Network(format!("Failed to connect WebSocket: {}", e)))?;

        let (sink, stream) = ws_stream.split();

        let sink = sink
            .sink_map_err(|e| LinkError::Transport(e.to_string()))
            .with(|text: String| future::ready(Ok::<_, LinkError>(Message::Text(text))));

        let stream = stream.filter_map(|message| {
            future::ready(match message {
                Ok(Message::Text(text)) => Some(Ok(text)),
                Ok(Message::Binary(data)) => Some(Ok(String::from_utf8_lossy(&data).into_owned())),
                Ok(Message::Close(frame)) => {
                    debug!("Close frame received: {:?}", frame);
                    None
                }
                Ok(_) => None,
                Err(e) => Some(Err(LinkError::Transport(e.to_string()))),
            })
        });

        Ok((Box::pin(sink), Box::pin(stream)))
    }
}

/// Opens connections scoped to a session id under the configured endpoint
pub struct SessionSocket {
    config: SocketConfig,
    connector: Arc<dyn Connector>,
}

impl SessionSocket {
    pub fn new(config: SocketConfig, connector: Arc<dyn Connector>) -> Self {
        Self { config, connector }
    }

    pub fn target(&self, session_id: &SessionId) -> Result<Url> {
        self.config.target(session_id)
    }

    /// Start a connection to `<scheme>://<endpoint>/ws/<session_id>/`.
    ///
    /// Returns immediately in `Unopened`; `on_event` observes the rest.
    /// Must be called within a tokio runtime.
    pub fn open(&self, session_id: &SessionId, on_event: EventHandler) -> Result<Connection> {
        let target = self.target(session_id)?;
        let id = ConnectionId::new();
        let state = Arc::new(RwLock::new(ConnectionState::Unopened));
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

        info!("Opening connection {} to {}", id, target);
        let task = tokio::spawn(run_connection(
            id,
            target.clone(),
            Arc::clone(&self.connector),
            Arc::clone(&state),
            outbound_rx,
            on_event,
        ));

        Ok(Connection {
            id,
            target,
            state,
            outbound: outbound_tx,
            task,
        })
    }
}

enum Outbound {
    Text(String),
    Close,
}

/// A live connection. Dropping it releases the transport.
pub struct Connection {
    id: ConnectionId,
    target: Url,
    state: Arc<RwLock<ConnectionState>>,
    outbound: mpsc::UnboundedSender<Outbound>,
    task: JoinHandle<()>,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("target", &self.target.as_str())
            .field("state", &self.state())
            .finish()
    }
}

impl Connection {
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn target(&self) -> &Url {
        &self.target
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    /// Queue one text frame. Fails without queueing unless the connection is open.
    pub fn send(&self, text: impl Into<String>) -> Result<()> {
        let state = self.state();
        if state != ConnectionState::Open {
            return Err(LinkError::NotOpen(state));
        }
        self.outbound
            .send(Outbound::Text(text.into()))
            .map_err(|_| LinkError::NotOpen(ConnectionState::Closed))
    }

    /// Request release. Further sends fail immediately.
    pub fn close(&self) {
        {
            let mut state = self.state.write();
            if *state == ConnectionState::Closed {
                return;
            }
            *state = ConnectionState::Closed;
        }
        debug!("Closing connection {}", self.id);
        let _ = self.outbound.send(Outbound::Close);
    }

    /// Release and wait until the transport is gone
    pub async fn shutdown(self) {
        self.close();
        if let Err(e) = self.task.await {
            warn!("Connection {} task ended abnormally: {}", self.id, e);
        }
    }
}

async fn run_connection(
    id: ConnectionId,
    target: Url,
    connector: Arc<dyn Connector>,
    state: Arc<RwLock<ConnectionState>>,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
    on_event: EventHandler,
) {
    // A transport that finished establishing is closed through its sink, not dropped
    let connected = tokio::select! {
        biased;
        result = connector.connect(&target) => result,
        _ = outbound.recv() => {
            debug!("Connection {} released before it opened", id);
            finish(id, &state, &on_event, CloseReason::Local);
            return;
        }
    };

    let (mut sink, mut stream) = match connected {
        Ok(halves) => halves,
        Err(e) => {
            warn!("Connection {} to {} failed: {}", id, target, e);
            finish(id, &state, &on_event, CloseReason::ConnectFailed(e.to_string()));
            return;
        }
    };

    // Released while establishing; the guard must not live across an await
    let released = {
        let mut current = state.write();
        if *current != ConnectionState::Unopened {
            true
        } else {
            *current = ConnectionState::Open;
            false
        }
    };
    if released {
        if let Err(e) = sink.close().await {
            debug!("Connection {} close error: {}", id, e);
        }
        finish(id, &state, &on_event, CloseReason::Local);
        return;
    }
    info!("Connection {} open", id);
    on_event(SocketEvent::Opened { connection: id });

    let reason = loop {
        tokio::select! {
            command = outbound.recv() => match command {
                Some(Outbound::Text(text)) => {
                    debug!("Connection {} sending {} bytes", id, text.len());
                    if let Err(e) = sink.send(text).await {
                        break CloseReason::Transport(e.to_string());
                    }
                }
                Some(Outbound::Close) | None => {
                    if let Err(e) = sink.close().await {
                        debug!("Connection {} close error: {}", id, e);
                    }
                    break CloseReason::Local;
                }
            },
            frame = stream.next() => match frame {
                Some(Ok(text)) => {
                    debug!("Connection {} received {} bytes", id, text.len());
                    on_event(SocketEvent::Frame { connection: id, text });
                }
                Some(Err(e)) => break CloseReason::Transport(e.to_string()),
                None => break CloseReason::Remote,
            },
        }
    };

    finish(id, &state, &on_event, reason);
}

fn finish(
    id: ConnectionId,
    state: &RwLock<ConnectionState>,
    on_event: &EventHandler,
    reason: CloseReason,
) {
    *state.write() = ConnectionState::Closed;
    info!("Connection {} closed ({:?})", id, reason);
    on_event(SocketEvent::Closed { connection: id, reason });
}
