//! Real-time hub over a live listener.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio_tungstenite::tungstenite::Message;

mod common;

type Client = tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

async fn connect(addr: std::net::SocketAddr) -> Client {
    let (ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/chat"))
        .await
        .unwrap();
    ws
}

async fn next_json(ws: &mut Client) -> Value {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for a frame")
            .unwrap()
            .unwrap();
        if let Message::Text(text) = frame {
            return serde_json::from_str(text.as_str()).unwrap();
        }
    }
}

#[tokio::test]
async fn test_messages_reach_every_client() {
    let running = common::spawn_host(common::test_config()).await;

    let mut alice = connect(running.addr).await;
    let mut bob = connect(running.addr).await;
    assert_eq!(next_json(&mut alice).await["type"], "connected");
    assert_eq!(next_json(&mut bob).await["type"], "connected");

    alice
        .send(Message::Text(
            r#"{"type":"sendMessage","user":"alice","message":"hello"}"#.into(),
        ))
        .await
        .unwrap();

    for ws in [&mut alice, &mut bob] {
        let frame = next_json(ws).await;
        assert_eq!(frame["type"], "receiveMessage");
        assert_eq!(frame["user"], "alice");
        assert_eq!(frame["message"], "hello");
    }

    running.stop().await;
}

#[tokio::test]
async fn test_bad_frame_keeps_connection_open() {
    let running = common::spawn_host(common::test_config()).await;
    let mut ws = connect(running.addr).await;
    next_json(&mut ws).await;

    ws.send(Message::Text("not json".into())).await.unwrap();
    assert_eq!(next_json(&mut ws).await["type"], "error");

    ws.send(Message::Text(
        r#"{"type":"sendMessage","user":"carol","message":"still here"}"#.into(),
    ))
    .await
    .unwrap();
    let frame = next_json(&mut ws).await;
    assert_eq!(frame["type"], "receiveMessage");
    assert_eq!(frame["message"], "still here");

    running.stop().await;
}
