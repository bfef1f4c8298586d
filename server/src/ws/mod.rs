//! WebSocket Transport
//!
//! Upgrade handling and the per-session read/write pumps. One reader
//! task and one writer task per session; the outbound queue is the sole
//! writer path to the transport and the write pump its sole consumer.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::{header, HeaderMap};
use axum::response::{IntoResponse, Response};
use beacon_proto::PeerInfo;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::api::AppState;
use crate::signaling::auth::strip_bearer;
use crate::signaling::error::SignalError;
use crate::signaling::{error_frame, Session, SignalingServer};

/// Transport ping cadence. Keeps idle connections inside the 60 s read
/// deadline on both ends.
const PING_PERIOD: Duration = Duration::from_secs(54);

/// Per-frame write deadline.
const WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// WebSocket upgrade query params.
#[derive(Debug, Deserialize)]
pub struct WsQuery {
    /// Credential fallback for browser clients, which cannot set an
    /// `Authorization` header on the upgrade request.
    #[serde(default)]
    pub token: Option<String>,
}

/// Upgrade handler for `GET /ws`. Authenticates before upgrading; a
/// failed credential closes the handshake with 401 and no session is
/// created.
pub async fn handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<WsQuery>,
) -> Response {
    let credential = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(strip_bearer)
        .map(str::to_owned)
        .or(query.token);

    let info = match state.server.authenticate(credential.as_deref()) {
        Ok(info) => info,
        Err(e) => {
            warn!(error = %e, "Rejecting upgrade");
            return e.into_response();
        }
    };

    let server = state.server.clone();
    ws.on_upgrade(move |socket| handle_socket(socket, server, info))
}

/// Run one connection: bind the session, spawn the write pump, and read
/// frames until an error, a deadline, or cancellation.
async fn handle_socket(socket: WebSocket, server: Arc<SignalingServer>, info: PeerInfo) {
    let peer_id = info.id.clone();
    let (session, outbound_rx) = match server.bind_session(info).await {
        Ok(pair) => pair,
        Err(e) => {
            warn!(peer_id = %peer_id, error = %e, "Rejecting connection");
            let mut socket = socket;
            let _ = socket.send(Message::Close(None)).await;
            return;
        }
    };

    let (ws_sender, ws_receiver) = socket.split();
    let cancel = session.cancel_token();
    let sender_handle = tokio::spawn(write_pump(ws_sender, outbound_rx, cancel.clone()));

    read_pump(&server, &session, ws_receiver, cancel).await;

    server.teardown_session(&session).await;
    sender_handle.abort();
    info!(peer_id = %peer_id, "WebSocket disconnected");
}

/// Read frames one at a time under the read deadline, stamp and
/// dispatch each on its own task so a slow handler never blocks intake.
async fn read_pump(
    server: &Arc<SignalingServer>,
    session: &Arc<Session>,
    mut receiver: futures::stream::SplitStream<WebSocket>,
    cancel: CancellationToken,
) {
    let read_deadline = server.config().peer_timeout;
    let max_frame = server.config().max_frame_bytes;

    loop {
        let frame = tokio::select! {
            () = cancel.cancelled() => break,
            frame = tokio::time::timeout(read_deadline, receiver.next()) => frame,
        };

        match frame {
            Err(_elapsed) => {
                warn!(peer_id = %session.peer_id(), "Read deadline expired");
                break;
            }
            Ok(None) => break,
            Ok(Some(Err(e))) => {
                warn!(peer_id = %session.peer_id(), error = %e, "WebSocket error");
                break;
            }
            Ok(Some(Ok(Message::Text(text)))) => {
                if text.len() > max_frame {
                    let err = SignalError::FrameTooLarge { limit: max_frame };
                    warn!(peer_id = %session.peer_id(), size = text.len(), "Dropping oversized frame");
                    let _ = session.enqueue(&error_frame(&err));
                    continue;
                }
                let server = server.clone();
                let session = session.clone();
                tokio::spawn(async move {
                    server.handle_frame(&session, text.as_str()).await;
                });
            }
            // Pongs refresh the deadline by arriving; axum answers pings.
            Ok(Some(Ok(Message::Ping(_) | Message::Pong(_)))) => {}
            Ok(Some(Ok(Message::Close(_)))) => {
                debug!(peer_id = %session.peer_id(), "Peer closed the connection");
                break;
            }
            Ok(Some(Ok(Message::Binary(_)))) => {
                debug!(peer_id = %session.peer_id(), "Ignoring binary frame on the control channel");
            }
        }
    }
}

/// Drain the outbound queue into the transport, pinging every
/// [`PING_PERIOD`] and applying the per-frame write deadline.
async fn write_pump(
    mut sender: SplitSink<WebSocket, Message>,
    mut outbound: mpsc::Receiver<String>,
    cancel: CancellationToken,
) {
    let start = tokio::time::Instant::now() + PING_PERIOD;
    let mut ping = tokio::time::interval_at(start, PING_PERIOD);
    ping.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            () = cancel.cancelled() => {
                let _ = tokio::time::timeout(WRITE_TIMEOUT, sender.send(Message::Close(None))).await;
                break;
            }
            frame = outbound.recv() => {
                let Some(frame) = frame else { break };
                match tokio::time::timeout(WRITE_TIMEOUT, sender.send(Message::Text(frame.into()))).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        warn!(error = %e, "WebSocket send failed");
                        break;
                    }
                    Err(_elapsed) => {
                        warn!("Write deadline expired");
                        break;
                    }
                }
            }
            _ = ping.tick() => {
                match tokio::time::timeout(WRITE_TIMEOUT, sender.send(Message::Ping(Bytes::new()))).await {
                    Ok(Ok(())) => {}
                    _ => break,
                }
            }
        }
    }
}
