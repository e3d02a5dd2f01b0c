//! Test doubles shared by the persona-link integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use futures_util::{sink, stream};
use persona_link::error::{LinkError, Result};
use persona_link::socket::{Connector, FrameSink, FrameStream};
use persona_link::{Bootstrap, SessionId, SessionWidget, WidgetUpdate};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use url::Url;

pub const WAIT: Duration = Duration::from_secs(5);

/// Server side of one connection made through `ChannelConnector`
pub struct Peer {
    pub target: Url,
    /// Frames pushed to the client
    pub to_client: mpsc::UnboundedSender<Result<String>>,
    /// Frames the client sent
    pub from_client: mpsc::UnboundedReceiver<String>,
}

impl Peer {
    pub fn push(&self, frame: &str) {
        self.to_client.send(Ok(frame.to_string())).unwrap();
    }

    pub async fn next_sent(&mut self) -> Option<String> {
        tokio::time::timeout(WAIT, self.from_client.recv()).await.ok().flatten()
    }
}

/// Connector whose connections are in-memory channels handed to the test
pub struct ChannelConnector {
    peers: mpsc::UnboundedSender<Peer>,
    connects: AtomicUsize,
}

impl ChannelConnector {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<Peer>) {
        let (peers, peers_rx) = mpsc::unbounded_channel();
        let connector = Arc::new(Self {
            peers,
            connects: AtomicUsize::new(0),
        });
        (connector, peers_rx)
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for ChannelConnector {
    async fn connect(&self, target: &Url) -> Result<(FrameSink, FrameStream)> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let (to_client, client_rx) = mpsc::unbounded_channel::<Result<String>>();
        let (client_tx, from_client) = mpsc::unbounded_channel::<String>();

        self.peers
            .send(Peer {
                target: target.clone(),
                to_client,
                from_client,
            })
            .map_err(|_| LinkError::Network("test harness gone".to_string()))?;

        let outbound = sink::unfold(client_tx, |tx, text: String| async move {
            tx.send(text)
                .map_err(|_| LinkError::Transport("peer gone".to_string()))?;
            Ok::<_, LinkError>(tx)
        });
        let inbound = stream::unfold(client_rx, |mut rx| async move {
            rx.recv().await.map(|frame| (frame, rx))
        });

        Ok((Box::pin(outbound), Box::pin(inbound)))
    }
}

/// Connector that never finishes connecting
pub struct PendingConnector {
    connects: AtomicUsize,
}

impl PendingConnector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            connects: AtomicUsize::new(0),
        })
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for PendingConnector {
    async fn connect(&self, _target: &Url) -> Result<(FrameSink, FrameStream)> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        futures_util::future::pending().await
    }
}

/// Bootstrap returning a fixed id
pub struct StaticBootstrap {
    id: String,
    calls: AtomicUsize,
}

impl StaticBootstrap {
    pub fn new(id: &str) -> Arc<Self> {
        Arc::new(Self {
            id: id.to_string(),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Bootstrap for StaticBootstrap {
    async fn create_conversation(&self) -> Result<SessionId> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        SessionId::new(self.id.clone())
    }
}

/// Bootstrap simulating a network failure
pub struct FailingBootstrap {
    calls: AtomicUsize,
}

impl FailingBootstrap {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Bootstrap for FailingBootstrap {
    async fn create_conversation(&self) -> Result<SessionId> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(LinkError::Network("connection refused".to_string()))
    }
}

pub async fn next_update(widget: &mut SessionWidget) -> WidgetUpdate {
    tokio::time::timeout(WAIT, widget.next_update())
        .await
        .expect("timed out waiting for widget update")
}

/// True when no update arrives within a short grace period
pub async fn no_update(widget: &mut SessionWidget) -> bool {
    tokio::time::timeout(Duration::from_millis(100), widget.next_update())
        .await
        .is_err()
}

pub async fn next_peer(peers: &mut mpsc::UnboundedReceiver<Peer>) -> Peer {
    tokio::time::timeout(WAIT, peers.recv())
        .await
        .expect("timed out waiting for connection")
        .expect("connector dropped")
}

/// Serve `app` on an ephemeral loopback port
pub async fn spawn_server(app: axum::Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}
