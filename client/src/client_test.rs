//! Tests for the signaling client against a local WebSocket acceptor.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use beacon_proto::{MessageType, PeerInfo, SignalingMessage};
use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

use crate::client::{ClientConfig, ConnectionStatus, SignalingClient};
use crate::error::ClientError;

type ServerSide = WebSocketStream<TcpStream>;

/// Accept loop yielding each upgraded connection. Aborting the handle
/// drops the listener, so later dials are refused.
async fn ws_server() -> (SocketAddr, mpsc::Receiver<ServerSide>, tokio::task::JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = mpsc::channel(8);
    let handle = tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let Ok(ws) = tokio_tungstenite::accept_async(stream).await else {
                continue;
            };
            if tx.send(ws).await.is_err() {
                break;
            }
        }
    });
    (addr, rx, handle)
}

fn test_config() -> ClientConfig {
    ClientConfig {
        reconnect_enabled: false,
        reconnect_interval: Duration::from_millis(100),
        max_reconnect_attempts: 3,
        auth_token: None,
        handshake_timeout: Duration::from_secs(2),
    }
}

async fn recv_json(server: &mut ServerSide) -> SignalingMessage {
    let frame = tokio::time::timeout(Duration::from_secs(2), server.next())
        .await
        .expect("timed out waiting for a frame")
        .unwrap()
        .unwrap();
    SignalingMessage::decode(frame.to_text().unwrap()).unwrap()
}

#[tokio::test]
async fn typed_senders_stamp_the_envelope_type() {
    let (addr, mut conns, _accept) = ws_server().await;
    let mut client = SignalingClient::new(test_config());
    client.connect(&format!("ws://{addr}/ws")).await.unwrap();
    let mut server = conns.recv().await.unwrap();

    client.send_offer("bob", "SDP-A").await.unwrap();
    let offer = recv_json(&mut server).await;
    assert_eq!(offer.kind, MessageType::Offer);
    assert_eq!(offer.to.as_deref(), Some("bob"));
    assert_eq!(offer.session_description().unwrap().sdp, "SDP-A");

    client.join_room("r1", &PeerInfo::new("alice")).await.unwrap();
    let join = recv_json(&mut server).await;
    assert_eq!(join.kind, MessageType::JoinRoom);
    assert_eq!(join.room.as_deref(), Some("r1"));
    assert_eq!(join.peer_info().unwrap().id, "alice");

    client.send_bye("bob").await.unwrap();
    assert_eq!(recv_json(&mut server).await.kind, MessageType::Bye);

    client.leave_room("r1").await.unwrap();
    assert_eq!(recv_json(&mut server).await.kind, MessageType::LeaveRoom);

    client.close().await;
}

#[tokio::test]
async fn typed_hooks_receive_inbound_events_in_order() {
    let (addr, mut conns, _accept) = ws_server().await;
    let mut client = SignalingClient::new(test_config());

    let (events_tx, mut events_rx) = mpsc::channel::<String>(16);
    let tx = events_tx.clone();
    client.on_offer(move |from, desc| {
        let _ = tx.try_send(format!("offer:{from}:{}", desc.sdp));
    });
    let tx = events_tx.clone();
    client.on_ice_candidate(move |from, candidate| {
        let _ = tx.try_send(format!("ice:{from}:{}", candidate.candidate));
    });
    let tx = events_tx.clone();
    client.on_peer_joined(move |room, info| {
        let _ = tx.try_send(format!("joined:{room}:{}", info.id));
    });
    let tx = events_tx.clone();
    client.on_peer_left(move |room, peer| {
        let _ = tx.try_send(format!("left:{room}:{peer}"));
    });
    let tx = events_tx;
    client.on_error(move |error| {
        if let ClientError::Server { code, .. } = error {
            let _ = tx.try_send(format!("error:{code}"));
        }
    });

    client.connect(&format!("ws://{addr}/ws")).await.unwrap();
    let mut server = conns.recv().await.unwrap();

    for frame in [
        r#"{"type":"offer","from":"bob","to":"alice","data":{"type":"offer","sdp":"SDP-B"}}"#,
        r#"{"type":"ice-candidate","from":"bob","to":"alice","data":{"candidate":"cand-1","sdpMid":"0","sdpMLineIndex":0}}"#,
        r#"{"type":"peer-joined","from":"carol","room":"r1","data":{"id":"carol"}}"#,
        r#"{"type":"peer-left","from":"carol","room":"r1"}"#,
        r#"{"type":"error","data":{"code":"room_full","message":"full"}}"#,
    ] {
        server.send(Message::text(frame.to_string())).await.unwrap();
    }

    let mut seen = Vec::new();
    for _ in 0..5 {
        let event = tokio::time::timeout(Duration::from_secs(2), events_rx.recv())
            .await
            .expect("timed out waiting for a hook")
            .unwrap();
        seen.push(event);
    }
    assert_eq!(
        seen,
        vec![
            "offer:bob:SDP-B",
            "ice:bob:cand-1",
            "joined:r1:carol",
            "left:r1:carol",
            "error:room_full",
        ]
    );

    client.close().await;
}

#[tokio::test]
async fn reconnect_redials_and_resets_the_attempt_counter() {
    let (addr, mut conns, _accept) = ws_server().await;
    let mut config = test_config();
    config.reconnect_enabled = true;
    let mut client = SignalingClient::new(config);

    client.connect(&format!("ws://{addr}/ws")).await.unwrap();
    let server = conns.recv().await.unwrap();
    assert_eq!(client.reconnect_attempts(), 0);

    // Kill the transport; the supervisor should redial.
    drop(server);

    let second = tokio::time::timeout(Duration::from_secs(2), conns.recv())
        .await
        .expect("client did not reconnect")
        .unwrap();

    // Counter resets to zero once the reconnect handshake completes.
    let mut connected = false;
    for _ in 0..50 {
        if client.status().await == ConnectionStatus::Connected {
            connected = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(connected);
    assert_eq!(client.reconnect_attempts(), 0);

    drop(second);
    client.close().await;
}

#[tokio::test]
async fn explicit_close_disables_reconnection() {
    let (addr, mut conns, _accept) = ws_server().await;
    let mut config = test_config();
    config.reconnect_enabled = true;
    let mut client = SignalingClient::new(config);

    client.connect(&format!("ws://{addr}/ws")).await.unwrap();
    let _server = conns.recv().await.unwrap();

    client.close().await;

    // No redial after an explicit close.
    assert!(
        tokio::time::timeout(Duration::from_millis(500), conns.recv())
            .await
            .is_err()
    );
    assert_eq!(client.status().await, ConnectionStatus::Disconnected);
}

#[tokio::test]
async fn exhausted_reconnect_budget_surfaces_an_error() {
    let (addr, mut conns, accept) = ws_server().await;
    let mut config = test_config();
    config.reconnect_enabled = true;
    config.reconnect_interval = Duration::from_millis(50);
    let mut client = SignalingClient::new(config);

    let exhausted = Arc::new(AtomicU32::new(0));
    let counter = exhausted.clone();
    client.on_error(move |error| {
        if matches!(error, ClientError::ReconnectExhausted(_)) {
            counter.fetch_add(1, Ordering::SeqCst);
        }
    });

    client.connect(&format!("ws://{addr}/ws")).await.unwrap();
    let server = conns.recv().await.unwrap();

    // Take the listener down entirely, then drop the transport.
    accept.abort();
    drop(server);

    let mut gave_up = false;
    for _ in 0..100 {
        if exhausted.load(Ordering::SeqCst) == 1 {
            gave_up = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(gave_up);
    assert_eq!(client.status().await, ConnectionStatus::Disconnected);
}

#[tokio::test]
async fn bearer_token_rides_the_upgrade_request() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (header_tx, mut header_rx) = mpsc::channel::<Option<String>>(1);

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let callback = {
            let header_tx = header_tx.clone();
            move |request: &tokio_tungstenite::tungstenite::handshake::server::Request,
                  response: tokio_tungstenite::tungstenite::handshake::server::Response| {
                let auth = request
                    .headers()
                    .get("authorization")
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_owned);
                let _ = header_tx.try_send(auth);
                Ok(response)
            }
        };
        let _ws = tokio_tungstenite::accept_hdr_async(stream, callback).await.unwrap();
        // Keep the connection open until the test finishes.
        tokio::time::sleep(Duration::from_secs(2)).await;
    });

    let mut client = SignalingClient::new(test_config());
    client
        .connect_with_token(&format!("ws://{addr}/ws"), "tok123")
        .await
        .unwrap();

    let header = tokio::time::timeout(Duration::from_secs(2), header_rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(header.as_deref(), Some("Bearer tok123"));
    client.close().await;
}

#[tokio::test]
async fn send_without_connect_reports_not_connected() {
    let client = SignalingClient::new(test_config());
    assert!(matches!(
        client.send_bye("bob").await,
        Err(ClientError::NotConnected)
    ));
}
