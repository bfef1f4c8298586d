//! Signaling Client
//!
//! Public client surface: typed senders, typed observer hooks, and the
//! connect/close lifecycle. The reconnect supervisor lives in
//! `connection`.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, PoisonError, RwLock as StdRwLock};
use std::time::Duration;

use beacon_proto::{
    IceCandidate, MessageType, PeerInfo, RoomInfo, SessionDescription, SignalingMessage,
};
use serde::Serialize;
use tokio::sync::{mpsc, RwLock};
use tracing::warn;

use crate::connection::{self, connect_ws};
use crate::error::ClientError;

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Redial after an unexpected disconnect.
    pub reconnect_enabled: bool,
    /// Pause between reconnect attempts. Pacing is linear: every
    /// attempt waits this long.
    pub reconnect_interval: Duration,
    /// Give up after this many consecutive failed attempts.
    pub max_reconnect_attempts: u32,
    /// Bearer token attached to the upgrade request.
    pub auth_token: Option<String>,
    /// Deadline for the transport upgrade.
    pub handshake_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            reconnect_enabled: true,
            reconnect_interval: Duration::from_secs(5),
            max_reconnect_attempts: 10,
            auth_token: None,
            handshake_timeout: Duration::from_secs(10),
        }
    }
}

/// Connection status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    /// No transport.
    Disconnected,
    /// Initial dial in progress.
    Connecting,
    /// Transport live and handshake complete.
    Connected,
    /// Waiting out the reconnect interval.
    Reconnecting {
        /// Consecutive failed attempts so far.
        attempt: u32,
    },
}

type MessageHook = Arc<dyn Fn(&SignalingMessage) + Send + Sync>;
type SdpHook = Arc<dyn Fn(&str, &SessionDescription) + Send + Sync>;
type IceHook = Arc<dyn Fn(&str, &IceCandidate) + Send + Sync>;
type PeerEventHook = Arc<dyn Fn(&str, &PeerInfo) + Send + Sync>;
type PeerLeftHook = Arc<dyn Fn(&str, &str) + Send + Sync>;
type RoomHook = Arc<dyn Fn(&RoomInfo) + Send + Sync>;
type ErrorHook = Arc<dyn Fn(&ClientError) + Send + Sync>;
type StatusHook = Arc<dyn Fn() + Send + Sync>;

/// Typed observer hooks. Dispatch happens on a dedicated task in frame
/// order, so per-remote-peer offer/answer/ICE ordering is preserved.
#[derive(Default)]
pub(crate) struct Handlers {
    message: StdRwLock<Option<MessageHook>>,
    offer: StdRwLock<Option<SdpHook>>,
    answer: StdRwLock<Option<SdpHook>>,
    ice_candidate: StdRwLock<Option<IceHook>>,
    peer_joined: StdRwLock<Option<PeerEventHook>>,
    peer_left: StdRwLock<Option<PeerLeftHook>>,
    room_update: StdRwLock<Option<RoomHook>>,
    error: StdRwLock<Option<ErrorHook>>,
    connected: StdRwLock<Option<StatusHook>>,
    disconnected: StdRwLock<Option<StatusHook>>,
}

fn get<T: Clone>(slot: &StdRwLock<Option<T>>) -> Option<T> {
    slot.read().unwrap_or_else(PoisonError::into_inner).clone()
}

fn set<T>(slot: &StdRwLock<Option<T>>, hook: T) {
    *slot.write().unwrap_or_else(PoisonError::into_inner) = Some(hook);
}

impl Handlers {
    /// Route one inbound message to the matching typed hooks.
    pub(crate) fn dispatch(&self, message: &SignalingMessage) {
        if let Some(hook) = get(&self.message) {
            hook(message);
        }

        let room = message.room.as_deref().unwrap_or("");
        match &message.kind {
            MessageType::Offer => {
                if let (Ok(desc), Some(hook)) = (message.session_description(), get(&self.offer)) {
                    hook(&message.from, &desc);
                }
            }
            MessageType::Answer => {
                if let (Ok(desc), Some(hook)) = (message.session_description(), get(&self.answer)) {
                    hook(&message.from, &desc);
                }
            }
            MessageType::IceCandidate => {
                if let (Ok(candidate), Some(hook)) =
                    (message.ice_candidate(), get(&self.ice_candidate))
                {
                    hook(&message.from, &candidate);
                }
            }
            MessageType::PeerJoined => {
                if let (Ok(info), Some(hook)) = (message.peer_info(), get(&self.peer_joined)) {
                    hook(room, &info);
                }
            }
            MessageType::PeerLeft => {
                if let Some(hook) = get(&self.peer_left) {
                    hook(room, &message.from);
                }
            }
            MessageType::RoomUpdate => {
                if let (Ok(info), Some(hook)) = (message.room_info(), get(&self.room_update)) {
                    hook(&info);
                }
            }
            MessageType::Error => {
                if let Ok(info) = message.error_info() {
                    self.fire_error(&ClientError::Server {
                        code: info.code,
                        message: info.message,
                    });
                }
            }
            _ => {}
        }
    }

    pub(crate) fn fire_error(&self, error: &ClientError) {
        if let Some(hook) = get(&self.error) {
            hook(error);
        }
    }

    pub(crate) fn fire_connected(&self) {
        if let Some(hook) = get(&self.connected) {
            hook();
        }
    }

    pub(crate) fn fire_disconnected(&self) {
        if let Some(hook) = get(&self.disconnected) {
            hook();
        }
    }
}

/// A signaling client. Create with [`SignalingClient::new`], register
/// hooks, then [`connect`](SignalingClient::connect).
pub struct SignalingClient {
    config: ClientConfig,
    handlers: Arc<Handlers>,
    status: Arc<RwLock<ConnectionStatus>>,
    reconnect_attempts: Arc<AtomicU32>,
    outbound_tx: Option<mpsc::Sender<SignalingMessage>>,
    shutdown_tx: Option<mpsc::Sender<()>>,
}

impl SignalingClient {
    /// Client with the given configuration. Not yet connected.
    #[must_use]
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            handlers: Arc::new(Handlers::default()),
            status: Arc::new(RwLock::new(ConnectionStatus::Disconnected)),
            reconnect_attempts: Arc::new(AtomicU32::new(0)),
            outbound_tx: None,
            shutdown_tx: None,
        }
    }

    /// Dial the server and run the upgrade handshake, attaching the
    /// stored credential. Blocks until the handshake completes or
    /// fails; on success the pumps and the reconnect supervisor take
    /// over in the background.
    pub async fn connect(&mut self, url: &str) -> Result<(), ClientError> {
        if self.shutdown_tx.is_some() {
            return Err(ClientError::Connect("already connected".into()));
        }

        *self.status.write().await = ConnectionStatus::Connecting;
        let stream = match connect_ws(
            url,
            self.config.auth_token.as_deref(),
            self.config.handshake_timeout,
        )
        .await
        {
            Ok(stream) => stream,
            Err(e) => {
                *self.status.write().await = ConnectionStatus::Disconnected;
                return Err(e);
            }
        };

        let (outbound_tx, outbound_rx) = mpsc::channel::<SignalingMessage>(100);
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>(1);
        self.outbound_tx = Some(outbound_tx);
        self.shutdown_tx = Some(shutdown_tx);
        self.reconnect_attempts.store(0, Ordering::SeqCst);

        tokio::spawn(connection::connection_loop(
            url.to_owned(),
            self.config.clone(),
            self.handlers.clone(),
            self.status.clone(),
            self.reconnect_attempts.clone(),
            outbound_rx,
            shutdown_rx,
            stream,
        ));
        Ok(())
    }

    /// Set the credential, then [`connect`](SignalingClient::connect).
    pub async fn connect_with_token(&mut self, url: &str, token: &str) -> Result<(), ClientError> {
        self.config.auth_token = Some(token.to_owned());
        self.connect(url).await
    }

    /// Close the connection. The supervisor does not reconnect after an
    /// explicit close.
    pub async fn close(&mut self) {
        self.outbound_tx = None;
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(()).await;
        }
    }

    /// Current connection status.
    pub async fn status(&self) -> ConnectionStatus {
        self.status.read().await.clone()
    }

    /// Consecutive failed reconnect attempts. Resets to zero on every
    /// successful connect.
    #[must_use]
    pub fn reconnect_attempts(&self) -> u32 {
        self.reconnect_attempts.load(Ordering::SeqCst)
    }

    /// Queue one message for the server.
    pub async fn send_message(&self, message: SignalingMessage) -> Result<(), ClientError> {
        let tx = self.outbound_tx.as_ref().ok_or(ClientError::NotConnected)?;
        tx.send(message).await.map_err(|_| ClientError::Closed)
    }

    /// Send an SDP offer to one peer.
    pub async fn send_offer(&self, to: &str, sdp: impl Into<String>) -> Result<(), ClientError> {
        let desc = SessionDescription::offer(sdp);
        self.send_message(SignalingMessage::session_description_to(to, &desc))
            .await
    }

    /// Send an SDP answer to one peer.
    pub async fn send_answer(&self, to: &str, sdp: impl Into<String>) -> Result<(), ClientError> {
        let desc = SessionDescription::answer(sdp);
        self.send_message(SignalingMessage::session_description_to(to, &desc))
            .await
    }

    /// Relay one ICE candidate to one peer.
    pub async fn send_ice_candidate(
        &self,
        to: &str,
        candidate: IceCandidate,
    ) -> Result<(), ClientError> {
        self.send_message(SignalingMessage::ice_candidate_to(to, &candidate))
            .await
    }

    /// Tell one peer the negotiation is over.
    pub async fn send_bye(&self, to: &str) -> Result<(), ClientError> {
        self.send_message(SignalingMessage::bye_to(to)).await
    }

    /// Join a room, announcing the given self-description.
    pub async fn join_room(&self, room_id: &str, info: &PeerInfo) -> Result<(), ClientError> {
        self.send_message(SignalingMessage::join_room(room_id, info))
            .await
    }

    /// Leave a room.
    pub async fn leave_room(&self, room_id: &str) -> Result<(), ClientError> {
        self.send_message(SignalingMessage::leave_room(room_id))
            .await
    }

    /// Observe every inbound message.
    pub fn on_message(&self, hook: impl Fn(&SignalingMessage) + Send + Sync + 'static) {
        set(&self.handlers.message, Arc::new(hook));
    }

    /// Observe offers: `(from, description)`.
    pub fn on_offer(&self, hook: impl Fn(&str, &SessionDescription) + Send + Sync + 'static) {
        set(&self.handlers.offer, Arc::new(hook));
    }

    /// Observe answers: `(from, description)`.
    pub fn on_answer(&self, hook: impl Fn(&str, &SessionDescription) + Send + Sync + 'static) {
        set(&self.handlers.answer, Arc::new(hook));
    }

    /// Observe ICE candidates: `(from, candidate)`.
    pub fn on_ice_candidate(&self, hook: impl Fn(&str, &IceCandidate) + Send + Sync + 'static) {
        set(&self.handlers.ice_candidate, Arc::new(hook));
    }

    /// Observe peers joining a room: `(room, info)`.
    pub fn on_peer_joined(&self, hook: impl Fn(&str, &PeerInfo) + Send + Sync + 'static) {
        set(&self.handlers.peer_joined, Arc::new(hook));
    }

    /// Observe peers leaving a room: `(room, peer_id)`.
    pub fn on_peer_left(&self, hook: impl Fn(&str, &str) + Send + Sync + 'static) {
        set(&self.handlers.peer_left, Arc::new(hook));
    }

    /// Observe room snapshots.
    pub fn on_room_update(&self, hook: impl Fn(&RoomInfo) + Send + Sync + 'static) {
        set(&self.handlers.room_update, Arc::new(hook));
    }

    /// Observe client-side and server-reported errors.
    pub fn on_error(&self, hook: impl Fn(&ClientError) + Send + Sync + 'static) {
        set(&self.handlers.error, Arc::new(hook));
    }

    /// Observe successful connects, including reconnects.
    pub fn on_connected(&self, hook: impl Fn() + Send + Sync + 'static) {
        set(&self.handlers.connected, Arc::new(hook));
    }

    /// Observe disconnects.
    pub fn on_disconnected(&self, hook: impl Fn() + Send + Sync + 'static) {
        set(&self.handlers.disconnected, Arc::new(hook));
    }
}

impl Drop for SignalingClient {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            if tx.try_send(()).is_err() {
                warn!("Supervisor already gone at drop");
            }
        }
    }
}

#[cfg(test)]
#[path = "client_test.rs"]
mod client_test;
