//! Headless session widget
//!
//! Owns one [`Session`], at most one [`Connection`], the router and the playback
//! controller. Background work (the bootstrap request, the connection task)
//! only posts events; every state change happens in [`SessionWidget::next_update`]
//! or in the action methods, on the task that owns the widget.

use crate::bootstrap::{Bootstrap, ConversationBootstrapper};
use crate::config::LinkConfig;
use crate::diagnostics::{Diagnostic, DiagnosticSink, TracingSink};
use crate::error::{LinkError, Result};
use crate::playback::{PlaybackController, PlaybackCue, PlaybackState};
use crate::router::{MessageRouter, RouterStats};
use crate::session::{Session, SessionId, SessionPhase};
use crate::socket::{
    CloseReason, Connection, ConnectionState, Connector, EventHandler, SessionSocket, SocketEvent,
    WsConnector,
};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

enum WidgetEvent {
    Bootstrapped(Result<SessionId>),
    Socket(SocketEvent),
}

/// What changed after one processed event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WidgetUpdate {
    SessionAssigned(SessionId),
    BootstrapFailed(String),
    ConnectionOpened,
    ConnectionClosed(CloseReason),
    MediaReceived {
        media_url: String,
        /// Transcript carried with the media, if any
        text: Option<String>,
        cue: Option<PlaybackCue>,
    },
    FrameIgnored(String),
}

/// Render snapshot for the presentation layer
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WidgetView {
    pub phase: SessionPhase,
    pub session_id: Option<SessionId>,
    pub connection: Option<ConnectionState>,
    pub playback: PlaybackState,
    /// The "start" affordance
    pub start_visible: bool,
    /// Media surface contents; `None` while the surface is hidden
    pub media_url: Option<String>,
}

pub struct SessionWidget {
    config: LinkConfig,
    bootstrap: Arc<dyn Bootstrap>,
    socket: SessionSocket,
    diagnostics: Arc<dyn DiagnosticSink>,
    session: Session,
    connection: Option<Connection>,
    router: MessageRouter,
    playback: PlaybackController,
    mounted: bool,
    awaiting_bootstrap: bool,
    events_tx: mpsc::UnboundedSender<WidgetEvent>,
    events_rx: mpsc::UnboundedReceiver<WidgetEvent>,
}

impl SessionWidget {
    pub fn new(
        config: LinkConfig,
        bootstrap: Arc<dyn Bootstrap>,
        connector: Arc<dyn Connector>,
        diagnostics: Arc<dyn DiagnosticSink>,
    ) -> Result<Self> {
        config.validate()?;
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        Ok(Self {
            socket: SessionSocket::new(config.socket.clone(), connector),
            session: Session::new(config.socket.endpoint_address.clone()),
            config,
            bootstrap,
            diagnostics,
            connection: None,
            router: MessageRouter::new(),
            playback: PlaybackController::new(),
            mounted: false,
            awaiting_bootstrap: false,
            events_tx,
            events_rx,
        })
    }

    /// Widget talking HTTP and WebSocket, reporting diagnostics through tracing
    pub fn from_config(config: LinkConfig) -> Result<Self> {
        let bootstrap = Arc::new(ConversationBootstrapper::new(&config.bootstrap)?);
        Self::new(config, bootstrap, Arc::new(WsConnector), Arc::new(TracingSink))
    }

    /// Start the session. Uses the configured id when present, otherwise
    /// issues the bootstrap request. Only the first call has an effect.
    pub fn mount(&mut self) -> Result<()> {
        if self.mounted {
            warn!("Widget already mounted");
            return Ok(());
        }
        self.mounted = true;

        match self.config.preset_session_id()? {
            Some(id) => {
                info!("Using supplied session id {}", id);
                self.session.assign_id(id)?;
                self.connect()
            }
            None => {
                self.awaiting_bootstrap = true;
                let bootstrap = Arc::clone(&self.bootstrap);
                let events = self.events_tx.clone();
                tokio::spawn(async move {
                    let result = bootstrap.create_conversation().await;
                    let _ = events.send(WidgetEvent::Bootstrapped(result));
                });
                Ok(())
            }
        }
    }

    /// Wait for the next background event and apply it.
    ///
    /// Events of replaced connections and late bootstrap results are consumed
    /// silently. Stays pending while nothing is in flight, so callers race it
    /// against their own input or a timeout.
    pub async fn next_update(&mut self) -> WidgetUpdate {
        loop {
            // The widget keeps a sender, so the channel never closes
            let Some(event) = self.events_rx.recv().await else {
                return std::future::pending().await;
            };
            if let Some(update) = self.apply(event) {
                return update;
            }
        }
    }

    fn apply(&mut self, event: WidgetEvent) -> Option<WidgetUpdate> {
        match event {
            WidgetEvent::Bootstrapped(result) => self.apply_bootstrap(result),
            WidgetEvent::Socket(event) => self.apply_socket(event),
        }
    }

    fn apply_bootstrap(&mut self, result: Result<SessionId>) -> Option<WidgetUpdate> {
        if !self.awaiting_bootstrap {
            debug!("Discarding bootstrap result for a replaced session");
            return None;
        }
        self.awaiting_bootstrap = false;

        match result {
            Ok(id) => {
                if let Err(e) = self.session.assign_id(id.clone()) {
                    warn!("Bootstrap result not applied: {}", e);
                    return None;
                }
                if let Err(e) = self.connect() {
                    self.diagnostics.report(&Diagnostic::ConnectionUnavailable {
                        session_id: id.clone(),
                        reason: e.to_string(),
                    });
                }
                Some(WidgetUpdate::SessionAssigned(id))
            }
            Err(e) => {
                let reason = e.to_string();
                self.diagnostics.report(&Diagnostic::BootstrapFailed {
                    reason: reason.clone(),
                });
                Some(WidgetUpdate::BootstrapFailed(reason))
            }
        }
    }

    fn apply_socket(&mut self, event: SocketEvent) -> Option<WidgetUpdate> {
        let current = self.connection.as_ref().map(Connection::id);
        if current != Some(event.connection()) {
            debug!("Ignoring event of replaced connection {}", event.connection());
            return None;
        }

        match event {
            SocketEvent::Opened { .. } => Some(WidgetUpdate::ConnectionOpened),
            SocketEvent::Frame { text, .. } => match self.router.handle(&text, &mut self.session) {
                Ok(media) => {
                    let cue = self.playback.media_available(&media);
                    Some(WidgetUpdate::MediaReceived {
                        media_url: media.media_url().to_string(),
                        text: media.text().map(str::to_string),
                        cue,
                    })
                }
                Err(e) => {
                    let reason = e.to_string();
                    self.diagnostics.report(&Diagnostic::MalformedFrame {
                        reason: reason.clone(),
                        frame_len: text.len(),
                    });
                    Some(WidgetUpdate::FrameIgnored(reason))
                }
            },
            SocketEvent::Closed { connection, reason } => {
                if let Err(e) = self.session.mark_closed() {
                    debug!("Session not closed: {}", e);
                }
                let diagnostic = match reason {
                    CloseReason::ConnectFailed(ref cause) => Diagnostic::ConnectionFailed {
                        connection,
                        reason: cause.clone(),
                    },
                    _ => Diagnostic::ConnectionClosed { connection },
                };
                self.diagnostics.report(&diagnostic);
                Some(WidgetUpdate::ConnectionClosed(reason))
            }
        }
    }

    fn connect(&mut self) -> Result<()> {
        if !self.session.can_connect() {
            return Err(LinkError::Session(format!(
                "cannot open a connection in {:?}",
                self.session.phase()
            )));
        }
        let id = match self.session.id() {
            Some(id) => id.clone(),
            None => return Err(LinkError::Session("no session id".to_string())),
        };

        let events = self.events_tx.clone();
        let handler: EventHandler = Arc::new(move |event| {
            let _ = events.send(WidgetEvent::Socket(event));
        });
        let connection = self.socket.open(&id, handler)?;
        self.session.mark_connected()?;
        self.connection = Some(connection);
        Ok(())
    }

    /// The "start" gesture
    pub fn gesture(&mut self) -> Option<PlaybackCue> {
        self.playback.gesture(self.session.media())
    }

    /// Send text over the connection. Dropped with a diagnostic unless it is open.
    pub fn send_text(&mut self, text: impl Into<String>) -> Result<()> {
        let text = text.into();
        let dropped_len = text.len();

        let result = match self.connection {
            Some(ref connection) => connection.send(text),
            None => Err(LinkError::NotOpen(ConnectionState::Unopened)),
        };

        if let Err(LinkError::NotOpen(state)) = result {
            self.diagnostics
                .report(&Diagnostic::SendWhileNotOpen { state, dropped_len });
        }
        result
    }

    /// Switch to another session id. The old connection is closed and a new
    /// session starts with no media; the playback state carries over.
    pub fn reidentify(&mut self, id: SessionId) -> Result<()> {
        if self.session.id() == Some(&id) {
            debug!("Session id unchanged: {}", id);
            return Ok(());
        }

        if let Some(previous) = self.connection.take() {
            info!("Replacing connection {} for new session {}", previous.id(), id);
            previous.close();
        }

        self.mounted = true;
        self.awaiting_bootstrap = false;
        self.session = Session::with_id(self.config.socket.endpoint_address.clone(), id);
        self.connect()
    }

    pub fn view(&self) -> WidgetView {
        WidgetView {
            phase: self.session.phase(),
            session_id: self.session.id().cloned(),
            connection: self.connection.as_ref().map(Connection::state),
            playback: self.playback.state(),
            start_visible: self.playback.start_visible(),
            media_url: self
                .playback
                .visible_media(self.session.media())
                .map(|media| media.media_url().to_string()),
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn connection(&self) -> Option<&Connection> {
        self.connection.as_ref()
    }

    pub fn router_stats(&self) -> RouterStats {
        self.router.stats()
    }

    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    /// Close the connection and wait for its release
    pub async fn unmount(mut self) {
        if let Some(connection) = self.connection.take() {
            connection.shutdown().await;
        }
        if let Err(e) = self.session.mark_closed() {
            debug!("Session not closed: {}", e);
        }
        info!("Widget unmounted");
    }
}
