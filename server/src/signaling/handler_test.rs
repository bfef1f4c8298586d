//! Tests for signaling message dispatch.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use beacon_proto::{MessageType, PeerInfo, RoomInfo, SignalingMessage};
use tokio::sync::mpsc;

use crate::config::Config;
use crate::signaling::session::{Session, SessionState};
use crate::signaling::SignalingServer;

async fn connect(
    server: &Arc<SignalingServer>,
    id: &str,
) -> (Arc<Session>, mpsc::Receiver<String>) {
    server.bind_session(PeerInfo::new(id)).await.unwrap()
}

fn drain(rx: &mut mpsc::Receiver<String>) -> Vec<SignalingMessage> {
    let mut messages = Vec::new();
    while let Ok(frame) = rx.try_recv() {
        messages.push(SignalingMessage::decode(&frame).unwrap());
    }
    messages
}

fn next(rx: &mut mpsc::Receiver<String>) -> SignalingMessage {
    SignalingMessage::decode(&rx.try_recv().expect("expected a frame")).unwrap()
}

#[tokio::test]
async fn two_peers_exchange_an_offer() {
    let server = SignalingServer::new(Config::default_for_test());

    let (alice, mut alice_rx) = connect(&server, "alice").await;
    server
        .handle_frame(&alice, r#"{"type":"join-room","room":"r1","data":{"id":"alice"}}"#)
        .await;

    let update = next(&mut alice_rx);
    assert_eq!(update.kind, MessageType::RoomUpdate);
    assert_eq!(update.room_info().unwrap().peers, vec!["alice".to_string()]);
    assert!(update.timestamp.is_some());

    let (bob, mut bob_rx) = connect(&server, "bob").await;
    server
        .handle_frame(&bob, r#"{"type":"join-room","room":"r1","data":{"id":"bob"}}"#)
        .await;

    let joined = next(&mut alice_rx);
    assert_eq!(joined.kind, MessageType::PeerJoined);
    assert_eq!(joined.peer_info().unwrap().id, "bob");

    let update = next(&mut bob_rx);
    assert_eq!(update.kind, MessageType::RoomUpdate);
    assert_eq!(
        update.room_info().unwrap().peers,
        vec!["alice".to_string(), "bob".to_string()]
    );

    server
        .handle_frame(
            &alice,
            r#"{"type":"offer","to":"bob","data":{"type":"offer","sdp":"SDP-A"}}"#,
        )
        .await;

    let offer = next(&mut bob_rx);
    assert_eq!(offer.kind, MessageType::Offer);
    assert_eq!(offer.from, "alice");
    assert_eq!(offer.to.as_deref(), Some("bob"));
    assert_eq!(offer.session_description().unwrap().sdp, "SDP-A");

    // Alice receives nothing back.
    assert!(alice_rx.try_recv().is_err());
}

#[tokio::test]
async fn full_room_rejects_the_third_peer_without_disconnecting_it() {
    let server = SignalingServer::new(Config::default_for_test());
    server
        .create_room(RoomInfo::new("r2").with_max_peers(2))
        .await
        .unwrap();

    let (p1, mut p1_rx) = connect(&server, "p1").await;
    let (p2, mut p2_rx) = connect(&server, "p2").await;
    let (p3, mut p3_rx) = connect(&server, "p3").await;

    server
        .handle_frame(&p1, r#"{"type":"join-room","room":"r2","data":{"id":"p1"}}"#)
        .await;
    server
        .handle_frame(&p2, r#"{"type":"join-room","room":"r2","data":{"id":"p2"}}"#)
        .await;
    server
        .handle_frame(&p3, r#"{"type":"join-room","room":"r2","data":{"id":"p3"}}"#)
        .await;

    let error = next(&mut p3_rx);
    assert_eq!(error.kind, MessageType::Error);
    assert_eq!(error.error_info().unwrap().code, "room_full");
    assert_eq!(p3.state(), SessionState::Open);

    // p1 and p2 never observed a join for p3.
    assert!(drain(&mut p1_rx)
        .iter()
        .all(|m| m.peer_info().map(|p| p.id != "p3").unwrap_or(true)));
    assert!(drain(&mut p2_rx)
        .iter()
        .all(|m| m.kind != MessageType::PeerJoined || m.peer_info().unwrap().id != "p3"));
}

#[tokio::test]
async fn forged_from_is_overwritten_with_the_session_identity() {
    let server = SignalingServer::new(Config::default_for_test());
    let (_alice, mut alice_rx) = connect(&server, "alice").await;
    let (_bob, mut bob_rx) = connect(&server, "bob").await;
    let (mallory, _mallory_rx) = connect(&server, "mallory").await;

    server
        .handle_frame(
            &mallory,
            r#"{"type":"offer","from":"alice","to":"bob","data":{"type":"offer","sdp":"x"}}"#,
        )
        .await;

    let offer = next(&mut bob_rx);
    assert_eq!(offer.from, "mallory");
    assert!(alice_rx.try_recv().is_err());
}

#[tokio::test]
async fn disconnect_cascades_one_peer_left_per_room() {
    let server = SignalingServer::new(Config::default_for_test());
    let (carol, _carol_rx) = connect(&server, "carol").await;
    let (dave, mut dave_rx) = connect(&server, "dave").await;

    for room in ["rX", "rY"] {
        let frame = format!(r#"{{"type":"join-room","room":"{room}","data":{{"id":"d"}}}}"#);
        server.handle_frame(&dave, &frame).await;
        let frame = format!(r#"{{"type":"join-room","room":"{room}","data":{{"id":"c"}}}}"#);
        server.handle_frame(&carol, &frame).await;
    }
    drain(&mut dave_rx);

    server.disconnect_peer("carol").await.unwrap();

    let events = drain(&mut dave_rx);
    let left: Vec<_> = events
        .iter()
        .filter(|m| m.kind == MessageType::PeerLeft && m.from == "carol")
        .collect();
    assert_eq!(left.len(), 2);
    assert_eq!(carol.state(), SessionState::Closed);
    assert!(carol.cancel_token().is_cancelled());
    assert!(server.get_peer("carol").await.is_err());
}

#[tokio::test]
async fn leave_without_membership_returns_an_error_frame_only() {
    let server = SignalingServer::new(Config::default_for_test());
    server.create_room(RoomInfo::new("r1")).await.unwrap();

    let (peer, mut rx) = connect(&server, "p1").await;
    server
        .handle_frame(&peer, r#"{"type":"leave-room","room":"r1"}"#)
        .await;

    let error = next(&mut rx);
    assert_eq!(error.error_info().unwrap().code, "peer_not_in_room");
    assert_eq!(peer.state(), SessionState::Open);
}

#[tokio::test]
async fn malformed_frames_are_dropped_and_the_session_survives() {
    let server = SignalingServer::new(Config::default_for_test());
    let (peer, mut rx) = connect(&server, "p1").await;

    server.handle_frame(&peer, "{ not json").await;
    let error = next(&mut rx);
    assert_eq!(error.error_info().unwrap().code, "codec_invalid");

    server.handle_frame(&peer, r#"{"from":"p1"}"#).await;
    let error = next(&mut rx);
    assert_eq!(error.error_info().unwrap().code, "codec_invalid");

    // The session keeps working after both bad frames.
    server
        .handle_frame(&peer, r#"{"type":"join-room","room":"r1","data":{"id":"p1"}}"#)
        .await;
    assert_eq!(next(&mut rx).kind, MessageType::RoomUpdate);
}

#[tokio::test]
async fn directed_messages_require_a_recipient() {
    let server = SignalingServer::new(Config::default_for_test());
    let (peer, mut rx) = connect(&server, "p1").await;

    server
        .handle_frame(&peer, r#"{"type":"offer","data":{"type":"offer","sdp":"x"}}"#)
        .await;
    let error = next(&mut rx);
    assert_eq!(error.error_info().unwrap().code, "missing_recipient");

    server
        .handle_frame(
            &peer,
            r#"{"type":"ice-candidate","to":"ghost","data":{"candidate":"c","sdpMid":"0","sdpMLineIndex":0}}"#,
        )
        .await;
    let error = next(&mut rx);
    assert_eq!(error.error_info().unwrap().code, "peer_not_found");
}

#[tokio::test]
async fn bye_suppresses_the_origin_destination_pair() {
    let server = SignalingServer::new(Config::default_for_test());
    let (alice, mut alice_rx) = connect(&server, "alice").await;
    let (bob, mut bob_rx) = connect(&server, "bob").await;

    server.handle_frame(&alice, r#"{"type":"bye","to":"bob"}"#).await;
    assert_eq!(next(&mut bob_rx).kind, MessageType::Bye);

    // Further alice-to-bob routing is dropped without an error.
    server
        .handle_frame(
            &alice,
            r#"{"type":"offer","to":"bob","data":{"type":"offer","sdp":"x"}}"#,
        )
        .await;
    assert!(bob_rx.try_recv().is_err());
    assert!(alice_rx.try_recv().is_err());

    // The reverse direction is unaffected.
    server
        .handle_frame(
            &bob,
            r#"{"type":"answer","to":"alice","data":{"type":"answer","sdp":"y"}}"#,
        )
        .await;
    assert_eq!(next(&mut alice_rx).kind, MessageType::Answer);

    // Disconnecting an endpoint clears the hint for a fresh negotiation.
    server.disconnect_peer("bob").await.unwrap();
    let (_bob2, mut bob2_rx) = connect(&server, "bob").await;
    server
        .handle_frame(
            &alice,
            r#"{"type":"offer","to":"bob","data":{"type":"offer","sdp":"z"}}"#,
        )
        .await;
    assert_eq!(next(&mut bob2_rx).kind, MessageType::Offer);
}

#[tokio::test]
async fn extension_messages_reach_the_observer_and_forward_when_directed() {
    let server = SignalingServer::new(Config::default_for_test());
    let seen = Arc::new(AtomicUsize::new(0));
    let counter = seen.clone();
    server.observers().on_message(move |_msg| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    let (alice, _alice_rx) = connect(&server, "alice").await;
    let (_bob, mut bob_rx) = connect(&server, "bob").await;

    server
        .handle_frame(&alice, r#"{"type":"chat","to":"bob","data":{"text":"hi"}}"#)
        .await;
    let chat = next(&mut bob_rx);
    assert_eq!(chat.kind, MessageType::Extension("chat".into()));
    assert_eq!(chat.from, "alice");
    assert_eq!(chat.data.as_ref().unwrap()["text"], "hi");

    // Undirected extensions are observed but not forwarded.
    server
        .handle_frame(&alice, r#"{"type":"telemetry","data":{"fps":30}}"#)
        .await;
    assert!(bob_rx.try_recv().is_err());
    assert_eq!(seen.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn saturated_outbound_queue_reports_backpressure_to_the_sender() {
    let server = SignalingServer::new(Config::default_for_test());
    let (alice, mut alice_rx) = connect(&server, "alice").await;
    let (_bob, _bob_rx_kept) = connect(&server, "bob").await;

    // Bob's queue (capacity 100) is never drained here.
    for _ in 0..100 {
        server.handle_frame(&alice, r#"{"type":"chat","to":"bob"}"#).await;
    }
    assert!(alice_rx.try_recv().is_err());

    server.handle_frame(&alice, r#"{"type":"chat","to":"bob"}"#).await;
    let error = next(&mut alice_rx);
    assert_eq!(error.error_info().unwrap().code, "backpressure");
    assert_eq!(alice.state(), SessionState::Open);
}

#[tokio::test]
async fn join_merges_the_client_self_description() {
    let server = SignalingServer::new(Config::default_for_test());
    let (peer, mut rx) = connect(&server, "p1").await;

    server
        .handle_frame(
            &peer,
            r#"{"type":"join-room","room":"r1","data":{"id":"ignored","display_name":"Pat","media":{"audio":true,"video":false,"screen":false}}}"#,
        )
        .await;
    assert_eq!(next(&mut rx).kind, MessageType::RoomUpdate);

    let info = server.get_peer("p1").await.unwrap();
    assert_eq!(info.id, "p1");
    assert_eq!(info.display_name.as_deref(), Some("Pat"));
    assert!(info.media.audio);
}

#[tokio::test]
async fn stats_count_sessions_rooms_and_frames() {
    let server = SignalingServer::new(Config::default_for_test());
    let (peer, _rx) = connect(&server, "p1").await;
    let (_p2, _rx2) = connect(&server, "p2").await;

    server
        .handle_frame(&peer, r#"{"type":"join-room","room":"r1","data":{"id":"p1"}}"#)
        .await;

    let stats = server.stats();
    assert_eq!(stats.active_sessions, 2);
    assert_eq!(stats.total_peers, 2);
    assert_eq!(stats.total_rooms, 1);
    assert_eq!(server.stats_collector().frames_total(), 1);

    server.disconnect_peer("p1").await.unwrap();
    let stats = server.stats();
    assert_eq!(stats.active_sessions, 1);
    // p1 was the only member, so the room collapsed with it.
    assert_eq!(stats.total_rooms, 0);
}
