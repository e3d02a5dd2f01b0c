//! WebSocket transport against a loopback axum server

mod common;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::Path;
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use common::{spawn_server, WAIT};
use parking_lot::Mutex;
use persona_link::socket::EventHandler;
use persona_link::{
    CloseReason, ConnectionState, SessionId, SessionSocket, SocketConfig, SocketEvent, WsConnector,
};
use std::sync::Arc;
use tokio::sync::mpsc;

async fn ws_route(ws: WebSocketUpgrade, Path(session_id): Path<String>) -> Response {
    ws.on_upgrade(move |socket| serve(socket, session_id))
}

/// Greets with the session id, echoes each text as a media frame, and closes on "bye"
async fn serve(mut socket: WebSocket, session_id: String) {
    let greeting = format!(r#"{{"mediaUrl":"https://cdn.example/{}/hello.mp4"}}"#, session_id);
    if socket.send(Message::Text(greeting)).await.is_err() {
        return;
    }
    if socket
        .send(Message::Binary(br#"{"media_url":"https://cdn.example/binary.mp4"}"#.to_vec()))
        .await
        .is_err()
    {
        return;
    }

    while let Some(Ok(message)) = socket.recv().await {
        match message {
            Message::Text(text) if text == "bye" => {
                let _ = socket.send(Message::Close(None)).await;
                return;
            }
            Message::Text(text) => {
                let reply = format!(r#"{{"mediaUrl":"https://cdn.example/echo/{}.mp4"}}"#, text);
                if socket.send(Message::Text(reply)).await.is_err() {
                    return;
                }
            }
            Message::Close(_) => return,
            _ => {}
        }
    }
}

fn channel_handler() -> (EventHandler, mpsc::UnboundedReceiver<SocketEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        Arc::new(move |event| {
            let _ = tx.send(event);
        }),
        rx,
    )
}

async fn next_event(events: &mut mpsc::UnboundedReceiver<SocketEvent>) -> SocketEvent {
    tokio::time::timeout(WAIT, events.recv())
        .await
        .expect("timed out waiting for socket event")
        .expect("event channel closed")
}

async fn socket_for_server() -> SessionSocket {
    let app = Router::new().route("/ws/:session_id/", get(ws_route));
    let addr = spawn_server(app).await;
    let config = SocketConfig {
        endpoint_address: addr.to_string(),
        ..Default::default()
    };
    SessionSocket::new(config, Arc::new(WsConnector))
}

#[tokio::test]
async fn test_frames_flow_both_ways() {
    let socket = socket_for_server().await;
    let (handler, mut events) = channel_handler();
    let connection = socket.open(&SessionId::new("abc123").unwrap(), handler).unwrap();
    let id = connection.id();

    assert_eq!(next_event(&mut events).await, SocketEvent::Opened { connection: id });
    assert_eq!(connection.state(), ConnectionState::Open);

    assert_eq!(
        next_event(&mut events).await,
        SocketEvent::Frame {
            connection: id,
            text: r#"{"mediaUrl":"https://cdn.example/abc123/hello.mp4"}"#.to_string()
        }
    );
    // Binary frames arrive as text
    assert_eq!(
        next_event(&mut events).await,
        SocketEvent::Frame {
            connection: id,
            text: r#"{"media_url":"https://cdn.example/binary.mp4"}"#.to_string()
        }
    );

    connection.send("one").unwrap();
    connection.send("two").unwrap();
    for expected in ["one", "two"] {
        match next_event(&mut events).await {
            SocketEvent::Frame { text, .. } => {
                assert_eq!(text, format!(r#"{{"mediaUrl":"https://cdn.example/echo/{}.mp4"}}"#, expected))
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    connection.shutdown().await;
    assert_eq!(
        next_event(&mut events).await,
        SocketEvent::Closed {
            connection: id,
            reason: CloseReason::Local
        }
    );
}

#[tokio::test]
async fn test_session_id_is_path_encoded() {
    let socket = socket_for_server().await;
    let (handler, mut events) = channel_handler();
    let connection = socket.open(&SessionId::new("a b").unwrap(), handler).unwrap();
    assert!(connection.target().as_str().ends_with("/ws/a%20b/"));

    next_event(&mut events).await;
    match next_event(&mut events).await {
        SocketEvent::Frame { text, .. } => assert!(text.contains("/a b/hello.mp4")),
        other => panic!("unexpected event: {:?}", other),
    }
    connection.shutdown().await;
}

#[tokio::test]
async fn test_peer_close_ends_connection() {
    let socket = socket_for_server().await;
    let (handler, mut events) = channel_handler();
    let connection = socket.open(&SessionId::new("abc123").unwrap(), handler).unwrap();

    // Opened, greeting, binary greeting
    for _ in 0..3 {
        next_event(&mut events).await;
    }
    connection.send("bye").unwrap();

    match next_event(&mut events).await {
        SocketEvent::Closed { reason, .. } => {
            assert!(matches!(reason, CloseReason::Remote | CloseReason::Transport(_)))
        }
        other => panic!("unexpected event: {:?}", other),
    }
    assert_eq!(connection.state(), ConnectionState::Closed);
    assert!(connection.send("hello?").is_err());
}

#[tokio::test]
async fn test_connect_failure_reports_closed() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let config = SocketConfig {
        endpoint_address: addr.to_string(),
        ..Default::default()
    };
    let socket = SessionSocket::new(config, Arc::new(WsConnector));
    let (handler, mut events) = channel_handler();
    let connection = socket.open(&SessionId::new("abc123").unwrap(), handler).unwrap();

    match next_event(&mut events).await {
        SocketEvent::Closed {
            reason: CloseReason::ConnectFailed(_),
            ..
        } => {}
        other => panic!("unexpected event: {:?}", other),
    }
    assert_eq!(connection.state(), ConnectionState::Closed);
}

#[tokio::test]
async fn test_drop_releases_transport() {
    let closed = Arc::new(Mutex::new(false));
    let flag = Arc::clone(&closed);
    let app = Router::new().route(
        "/ws/:session_id/",
        get(move |ws: WebSocketUpgrade| {
            let flag = Arc::clone(&flag);
            async move {
                ws.on_upgrade(move |mut socket| async move {
                    while let Some(Ok(message)) = socket.recv().await {
                        if matches!(message, Message::Close(_)) {
                            break;
                        }
                    }
                    *flag.lock() = true;
                })
            }
        }),
    );
    let addr = spawn_server(app).await;
    let config = SocketConfig {
        endpoint_address: addr.to_string(),
        ..Default::default()
    };
    let socket = SessionSocket::new(config, Arc::new(WsConnector));
    let (handler, mut events) = channel_handler();
    let connection = socket.open(&SessionId::new("abc123").unwrap(), handler).unwrap();
    next_event(&mut events).await;

    drop(connection);
    assert!(matches!(next_event(&mut events).await, SocketEvent::Closed { .. }));

    for _ in 0..100 {
        if *closed.lock() {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    assert!(*closed.lock());
}
