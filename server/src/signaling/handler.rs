//! Message Dispatch
//!
//! Routes stamped inbound messages to the room and peer registries.
//! Every error returned here goes back to the sender as an `error`
//! frame; none of them disconnect the session.

use std::sync::Arc;

use beacon_proto::{MessageType, SignalingMessage};
use chrono::Utc;
use serde_json::Value;
use tracing::{debug, warn};

use super::error::SignalError;
use super::server::SignalingServer;
use super::session::Session;

/// Dispatch one stamped message for the given session.
pub(crate) async fn dispatch(
    server: &Arc<SignalingServer>,
    session: &Arc<Session>,
    message: SignalingMessage,
) -> Result<(), SignalError> {
    match message.kind {
        MessageType::JoinRoom => handle_join(server, session, message).await,
        MessageType::LeaveRoom => handle_leave(server, session, message).await,
        MessageType::Offer
        | MessageType::Answer
        | MessageType::Pranswer
        | MessageType::Rollback
        | MessageType::IceCandidate => forward_directed(server, session, &message),
        MessageType::Bye => handle_bye(server, session, &message),
        _ => handle_other(server, &message),
    }
}

/// Resolve or create the room, verify access, insert the peer, and ack
/// with a `room-update` carrying the current member list.
async fn handle_join(
    server: &Arc<SignalingServer>,
    session: &Arc<Session>,
    message: SignalingMessage,
) -> Result<(), SignalError> {
    let room_id = required_room(&message)?;
    let password = message
        .extra
        .get("password")
        .and_then(Value::as_str)
        .map(str::to_owned);

    // Merge the client's self-description into the authenticated record.
    // Identity and role stay server-assigned.
    if let Ok(client_info) = message.peer_info() {
        session
            .update_info(|info| {
                if client_info.display_name.is_some() {
                    info.display_name = client_info.display_name.clone();
                }
                info.media = client_info.media;
            })
            .await;
    }
    let peer = session.info().await;
    let peer_id = peer.id.clone();

    let (room, _created) = server.rooms().get_or_create(&room_id).await?;
    room.verify_access(&peer, password.as_deref()).await?;
    room.add_peer(peer).await?;

    debug!(peer_id = %peer_id, room = %room_id, "Peer joined room");

    let mut ack = SignalingMessage::room_update(&room.snapshot().await);
    ack.timestamp = Some(Utc::now());
    session.enqueue(&ack)
}

/// Remove the peer from the room. A non-member gets an error frame but
/// stays connected.
async fn handle_leave(
    server: &Arc<SignalingServer>,
    session: &Arc<Session>,
    message: SignalingMessage,
) -> Result<(), SignalError> {
    let room_id = required_room(&message)?;
    let room = server
        .rooms()
        .get_room(&room_id)
        .await
        .ok_or_else(|| SignalError::RoomNotFound(room_id.clone()))?;

    match room.remove_peer(session.peer_id()).await {
        Ok(_removed) => {
            debug!(peer_id = %session.peer_id(), room = %room_id, "Peer left room");
            Ok(())
        }
        Err(SignalError::PeerNotFound(_)) => Err(SignalError::PeerNotInRoom {
            peer: session.peer_id().to_owned(),
            room: room_id,
        }),
        Err(e) => Err(e),
    }
}

/// Forward a directed frame via the peer registry. The payload is never
/// inspected; `from` was already stamped on ingest.
fn forward_directed(
    server: &Arc<SignalingServer>,
    session: &Arc<Session>,
    message: &SignalingMessage,
) -> Result<(), SignalError> {
    let to = required_recipient(message)?;

    if server.is_suppressed(session.peer_id(), &to) {
        warn!(
            from = %session.peer_id(),
            to = %to,
            kind = %message.kind,
            "Dropping frame for a pair closed by bye"
        );
        return Ok(());
    }

    server.peers().send_to_peer(&to, message)
}

/// Forward the `bye` and stop routing for the origin-to-destination pair
/// until either endpoint disconnects.
fn handle_bye(
    server: &Arc<SignalingServer>,
    session: &Arc<Session>,
    message: &SignalingMessage,
) -> Result<(), SignalError> {
    let to = required_recipient(message)?;
    let result = if server.is_suppressed(session.peer_id(), &to) {
        Ok(())
    } else {
        server.peers().send_to_peer(&to, message)
    };
    server.suppress_pair(session.peer_id(), &to);
    result
}

/// Unrecognized types reach the message observer; directed ones are
/// forwarded verbatim, undirected ones are dropped.
fn handle_other(
    server: &Arc<SignalingServer>,
    message: &SignalingMessage,
) -> Result<(), SignalError> {
    server.observers().fire_message(message);

    match message.to.as_deref() {
        Some(to) if !to.is_empty() => server.peers().send_to_peer(to, message),
        _ => {
            warn!(kind = %message.kind, from = %message.from, "Dropping undirected message");
            Ok(())
        }
    }
}

fn required_room(message: &SignalingMessage) -> Result<String, SignalError> {
    message
        .room
        .clone()
        .filter(|room| !room.is_empty())
        .ok_or_else(|| SignalError::InvalidRoomId("<none>".into()))
}

fn required_recipient(message: &SignalingMessage) -> Result<String, SignalError> {
    message
        .to
        .clone()
        .filter(|to| !to.is_empty())
        .ok_or(SignalError::MissingRecipient)
}

#[cfg(test)]
#[path = "handler_test.rs"]
mod handler_test;
