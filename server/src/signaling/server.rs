//! Signaling Server
//!
//! Composition root binding the peer registry, room registry,
//! middleware chain, authenticator, and stats collector together, and
//! exposing the administrative surface the REST layer maps onto.

use std::sync::{Arc, PoisonError, RwLock, Weak};
use std::time::Duration;

use beacon_proto::{PeerInfo, RoomInfo, SignalingMessage};
use chrono::Utc;
use dashmap::DashSet;
use futures::FutureExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::Config;

use super::auth::{AnonymousAuthenticator, Authenticator, JwtAuthenticator};
use super::error::SignalError;
use super::handler;
use super::middleware::{Middleware, MiddlewareChain, Next};
use super::observers::Observers;
use super::peers::PeerRegistry;
use super::rooms::RoomRegistry;
use super::session::{Session, OUTBOUND_QUEUE_CAPACITY};
use super::stats::{ServerStats, StatsCollector};

/// The signaling core. One instance per server process.
pub struct SignalingServer {
    config: Arc<Config>,
    peers: Arc<PeerRegistry>,
    rooms: Arc<RoomRegistry>,
    authenticator: Arc<dyn Authenticator>,
    chain: RwLock<MiddlewareChain>,
    observers: Arc<Observers>,
    stats: Arc<StatsCollector>,
    /// `bye` origin-to-destination pairs; routing between them is dropped
    /// until either endpoint disconnects.
    suppressed: DashSet<(String, String)>,
    cancel: CancellationToken,
    weak_self: Weak<Self>,
}

impl SignalingServer {
    /// Build a server from configuration. The authenticator follows
    /// `enable_auth`: JWT validation when a secret is configured,
    /// anonymous identities otherwise.
    #[must_use]
    pub fn new(config: Config) -> Arc<Self> {
        let authenticator: Arc<dyn Authenticator> = if config.enable_auth {
            config.auth_secret.as_ref().map_or_else(
                || {
                    warn!("ENABLE_AUTH set without AUTH_SECRET; falling back to anonymous access");
                    Arc::new(AnonymousAuthenticator::new()) as Arc<dyn Authenticator>
                },
                |secret| Arc::new(JwtAuthenticator::new(secret.clone())) as Arc<dyn Authenticator>,
            )
        } else {
            Arc::new(AnonymousAuthenticator::new())
        };
        Self::with_authenticator(config, authenticator)
    }

    /// Build a server around a custom authenticator.
    #[must_use]
    pub fn with_authenticator(config: Config, authenticator: Arc<dyn Authenticator>) -> Arc<Self> {
        let peers = Arc::new(PeerRegistry::new());
        let observers = Arc::new(Observers::default());
        let stats = Arc::new(StatsCollector::new());
        let rooms = RoomRegistry::new(
            peers.clone(),
            observers.clone(),
            stats.clone(),
            config.max_rooms,
            config.max_peers_per_room,
            config.collapse_empty_rooms,
        );

        Arc::new_cyclic(|weak_self| Self {
            config: Arc::new(config),
            peers,
            rooms,
            authenticator,
            chain: RwLock::new(MiddlewareChain::new()),
            observers,
            stats,
            suppressed: DashSet::new(),
            cancel: CancellationToken::new(),
            weak_self: weak_self.clone(),
        })
    }

    /// Server configuration.
    #[must_use]
    pub fn config(&self) -> &Arc<Config> {
        &self.config
    }

    /// Observer hook registration point.
    #[must_use]
    pub fn observers(&self) -> &Arc<Observers> {
        &self.observers
    }

    /// Peer registry.
    #[must_use]
    pub fn peers(&self) -> &Arc<PeerRegistry> {
        &self.peers
    }

    /// Room registry.
    #[must_use]
    pub fn rooms(&self) -> &Arc<RoomRegistry> {
        &self.rooms
    }

    /// Root cancellation token; child tokens thread through sessions.
    #[must_use]
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Append a middleware layer. Earlier registrations wrap later ones.
    pub fn use_middleware(&self, layer: Middleware) {
        self.chain
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(layer);
    }

    /// Spawn the stats ticker. Runs until shutdown.
    pub fn start_background_tasks(&self) -> JoinHandle<()> {
        self.stats
            .clone()
            .start_ticker(Duration::from_secs(1), self.cancel.clone())
    }

    /// Resolve an upgrade credential to a peer identity.
    pub fn authenticate(&self, credential: Option<&str>) -> Result<PeerInfo, SignalError> {
        self.authenticator.authenticate(credential)
    }

    /// Bind an authenticated peer to a fresh session and register it.
    /// Exactly one `peer-connected` fires on success. Returns the
    /// session handle and the outbound queue the write pump drains.
    pub async fn bind_session(
        &self,
        info: PeerInfo,
    ) -> Result<(Arc<Session>, mpsc::Receiver<String>), SignalError> {
        let (session, rx) = Session::new(info, OUTBOUND_QUEUE_CAPACITY);
        self.peers.insert(session.clone())?;
        session.mark_open();
        session
            .update_info(|i| i.connection_state = beacon_proto::ConnectionState::Connected)
            .await;
        self.stats.session_opened();

        let snapshot = session.info().await;
        info!(peer_id = %snapshot.id, "Peer connected");
        self.observers.fire_peer_connected(&snapshot);
        Ok((session, rx))
    }

    /// Tear down a session: cancel its pumps, remove the peer from the
    /// registry and every room (one `peer-left` per room), and fire
    /// exactly one `peer-disconnected`. Idempotent.
    pub async fn teardown_session(&self, session: &Arc<Session>) {
        if !session.begin_close() {
            return;
        }
        session.close();

        let peer_id = session.peer_id().to_owned();
        self.peers.remove(&peer_id);
        self.rooms.remove_peer_everywhere(&peer_id).await;
        self.suppressed
            .retain(|(from, to)| from != &peer_id && to != &peer_id);

        session
            .update_info(|i| i.connection_state = beacon_proto::ConnectionState::Disconnected)
            .await;
        session.mark_closed();
        self.stats.session_closed();

        let snapshot = session.info().await;
        info!(peer_id = %snapshot.id, "Peer disconnected");
        self.observers.fire_peer_disconnected(&snapshot);
    }

    /// Process one inbound frame: count it, decode it, stamp `from` and
    /// `timestamp`, and run the middleware chain into the dispatcher.
    /// Codec errors drop the frame and keep the session alive; handler
    /// panics are recovered and surfaced through the error observer.
    pub async fn handle_frame(&self, session: &Arc<Session>, text: &str) {
        self.stats.frame_ingested();

        let mut message = match SignalingMessage::decode(text) {
            Ok(message) => message,
            Err(e) => {
                warn!(peer_id = %session.peer_id(), error = %e, "Dropping malformed frame");
                let err = SignalError::from(e);
                let _ = session.enqueue(&error_frame(&err));
                self.observers.fire_error(&err);
                return;
            }
        };
        message.stamp(session.peer_id(), Utc::now());

        let Some(server) = self.weak_self.upgrade() else {
            return;
        };
        let terminal_session = session.clone();
        let terminal: Next = Arc::new(move |msg| {
            let server = server.clone();
            let session = terminal_session.clone();
            Box::pin(async move { handler::dispatch(&server, &session, msg).await })
        });

        let chain = self
            .chain
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let guarded = std::panic::AssertUnwindSafe(chain.run(message, terminal)).catch_unwind();

        match tokio::time::timeout(self.config.message_timeout, guarded).await {
            Ok(Ok(Ok(()))) => {}
            Ok(Ok(Err(e))) => self.report_error(session, &e),
            Ok(Err(_panic)) => {
                self.report_error(session, &SignalError::Internal("message handler panicked".into()));
            }
            Err(_elapsed) => {
                self.report_error(session, &SignalError::Internal("message handling timed out".into()));
            }
        }
    }

    /// Send an error frame back to the offending peer and notify the
    /// error observer. Never tears the session down.
    pub(crate) fn report_error(&self, session: &Arc<Session>, error: &SignalError) {
        warn!(peer_id = %session.peer_id(), error = %error, "Signaling error");
        let _ = session.enqueue(&error_frame(error));
        self.observers.fire_error(error);
    }

    /// Record a `bye` hint for the origin-to-destination pair.
    pub(crate) fn suppress_pair(&self, from: &str, to: &str) {
        self.suppressed.insert((from.to_owned(), to.to_owned()));
    }

    /// Whether routing for this pair has been suppressed by a `bye`.
    pub(crate) fn is_suppressed(&self, from: &str, to: &str) -> bool {
        self.suppressed
            .contains(&(from.to_owned(), to.to_owned()))
    }

    // ---- administrative surface -------------------------------------

    /// Create a room explicitly.
    pub async fn create_room(&self, info: RoomInfo) -> Result<RoomInfo, SignalError> {
        let room = self.rooms.create_room(info).await?;
        Ok(room.snapshot().await)
    }

    /// Delete a room, evicting its members.
    pub async fn delete_room(&self, room_id: &str) -> Result<(), SignalError> {
        self.rooms.delete_room(room_id).await
    }

    /// Metadata snapshot of one room.
    pub async fn get_room(&self, room_id: &str) -> Result<RoomInfo, SignalError> {
        match self.rooms.get_room(room_id).await {
            Some(room) => Ok(room.snapshot().await),
            None => Err(SignalError::RoomNotFound(room_id.to_owned())),
        }
    }

    /// Snapshots of all live rooms.
    pub async fn list_rooms(&self) -> Vec<RoomInfo> {
        self.rooms.list().await
    }

    /// Member records of one room.
    pub async fn get_room_peers(&self, room_id: &str) -> Result<Vec<PeerInfo>, SignalError> {
        match self.rooms.get_room(room_id).await {
            Some(room) => Ok(room.members().await),
            None => Err(SignalError::RoomNotFound(room_id.to_owned())),
        }
    }

    /// Identity record of one connected peer.
    pub async fn get_peer(&self, peer_id: &str) -> Result<PeerInfo, SignalError> {
        match self.peers.lookup(peer_id) {
            Some(session) => Ok(session.info().await),
            None => Err(SignalError::PeerNotFound(peer_id.to_owned())),
        }
    }

    /// Forcibly disconnect a peer. Its transport closes as soon as the
    /// pumps observe the cancelled token.
    pub async fn disconnect_peer(&self, peer_id: &str) -> Result<(), SignalError> {
        let session = self
            .peers
            .lookup(peer_id)
            .ok_or_else(|| SignalError::PeerNotFound(peer_id.to_owned()))?;
        self.teardown_session(&session).await;
        Ok(())
    }

    /// Fan a message out to every member of a room.
    pub async fn broadcast_to_room(
        &self,
        room_id: &str,
        mut message: SignalingMessage,
    ) -> Result<(), SignalError> {
        let room = self
            .rooms
            .get_room(room_id)
            .await
            .ok_or_else(|| SignalError::RoomNotFound(room_id.to_owned()))?;
        message.timestamp.get_or_insert_with(Utc::now);
        room.broadcast(&message).await;
        Ok(())
    }

    /// Deliver a message straight to one connected peer.
    pub fn send_to_peer(
        &self,
        peer_id: &str,
        mut message: SignalingMessage,
    ) -> Result<(), SignalError> {
        message.timestamp.get_or_insert_with(Utc::now);
        self.peers.send_to_peer(peer_id, &message)
    }

    /// Current stats snapshot.
    #[must_use]
    pub fn stats(&self) -> ServerStats {
        self.stats.snapshot()
    }

    /// Stats collector, for wiring into pumps and tickers.
    #[must_use]
    pub fn stats_collector(&self) -> &Arc<StatsCollector> {
        &self.stats
    }

    /// Shut the core down: cancel background tasks, tear down every
    /// session, and close every room.
    pub async fn shutdown(&self) {
        info!("Signaling server shutting down");
        self.cancel.cancel();
        for peer_id in self.peers.peer_ids() {
            if let Some(session) = self.peers.lookup(&peer_id) {
                self.teardown_session(&session).await;
            }
        }
        self.rooms.close_all().await;
    }
}

/// Render a `SignalError` as a wire error frame.
pub(crate) fn error_frame(error: &SignalError) -> SignalingMessage {
    let mut frame = SignalingMessage::error(error.code(), error.to_string());
    frame.timestamp = Some(Utc::now());
    frame
}
