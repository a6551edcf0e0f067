//! End-to-end tests over a real WebSocket
//!
//! Run with: cargo test -p integration-tests --test websocket_tests

use std::sync::Arc;
use std::time::Duration;

use circle_common::RealtimeConfig;
use circle_realtime::connection::{ConnectionState, RealtimeClient, WebSocketTransport};
use circle_realtime::dispatch::HandlerResult;
use circle_realtime::protocol::InboundMessage;
use circle_realtime::time::TokioClock;
use integration_tests::*;
use tokio::sync::mpsc;

fn client_for(server: &TestServer) -> RealtimeClient {
    let config = RealtimeConfig {
        url: server.url(),
        ..test_realtime_config()
    };
    RealtimeClient::builder(config)
        .transport(Arc::new(WebSocketTransport::new()))
        .clock(Arc::new(TokioClock::new()))
        .authenticated(true)
        .build()
        .expect("valid config")
}

#[tokio::test]
async fn test_handshake_resubscribe_and_heartbeat() {
    let mut server = TestServer::start().await.expect("Failed to start server");
    let client = client_for(&server);
    client.subscribe("circle:1");

    let mut states = client.watch_state();
    client.connect();
    tokio::time::timeout(Duration::from_secs(5), states.wait_for(|s| s.is_connected()))
        .await
        .expect("timed out connecting")
        .expect("state channel closed");

    assert_eq!(server.next_frame().await.unwrap(), subscribe_frame("circle:1"));

    server.send(&ping_frame());
    assert_eq!(server.next_frame().await.unwrap(), pong_frame());

    client.disconnect();
    assert_eq!(client.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_pushed_frames_reach_handlers() {
    let server = TestServer::start().await.expect("Failed to start server");
    let client = client_for(&server);

    let (tx, mut rx) = mpsc::unbounded_channel();
    let _guard = client.register_handler(move |m: &InboundMessage| -> HandlerResult<()> {
        let _ = tx.send(m.kind().to_string());
        Ok(())
    });

    let mut states = client.watch_state();
    client.connect();
    tokio::time::timeout(Duration::from_secs(5), states.wait_for(|s| s.is_connected()))
        .await
        .expect("timed out connecting")
        .expect("state channel closed");

    server.send(&typing_frame("c1", "u1", true));
    server.send(&read_horizon_frame("c1", at(1)));

    let mut kinds = Vec::new();
    for _ in 0..2 {
        let kind = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for frame")
            .expect("handler channel closed");
        kinds.push(kind);
    }
    assert_eq!(kinds, vec!["circle:typing", "circle:read_horizon"]);

    client.disconnect();
}

#[tokio::test]
async fn test_unreachable_server_schedules_reconnect() {
    // Bind and drop to get a port nobody listens on
    let port = {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    };
    let config = RealtimeConfig {
        url: format!("ws://127.0.0.1:{port}/ws"),
        ..test_realtime_config()
    };
    let client = RealtimeClient::builder(config)
        .authenticated(true)
        .build()
        .expect("valid config");

    client.connect();
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !client.reconnect_pending() {
        assert!(tokio::time::Instant::now() < deadline, "no reconnect scheduled");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(client.state(), ConnectionState::Disconnected);
    assert_eq!(client.retry_attempt(), 1);

    client.disconnect();
    assert!(!client.reconnect_pending());
}
