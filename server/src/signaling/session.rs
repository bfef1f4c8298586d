//! Transport Session
//!
//! Server-side binding between one authenticated peer and one framed
//! transport. The session owns the outbound queue; the write pump in
//! `ws` is its sole consumer. Clients never address sessions directly,
//! only peer ids.

use std::sync::Mutex;

use beacon_proto::{PeerInfo, SignalingMessage};
use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, RwLock};
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;

use super::error::SignalError;

/// Default capacity of the outbound frame queue.
pub const OUTBOUND_QUEUE_CAPACITY: usize = 100;

/// Transport lifecycle of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Upgrade accepted, registry insertion pending.
    Handshaking,
    /// Registered and pumping frames.
    Open,
    /// First error or explicit close observed; teardown in progress.
    Closing,
    /// Both pumps exited and registry cleanup completed.
    Closed,
}

/// One live peer session.
pub struct Session {
    peer_id: String,
    info: RwLock<PeerInfo>,
    connected_at: DateTime<Utc>,
    outbound: mpsc::Sender<String>,
    cancel: CancellationToken,
    state: Mutex<SessionState>,
}

impl Session {
    /// Create a session for an authenticated peer. Returns the session
    /// handle and the receiving end of its outbound queue, which the
    /// write pump consumes.
    #[must_use]
    pub fn new(info: PeerInfo, queue_capacity: usize) -> (std::sync::Arc<Self>, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(queue_capacity);
        let session = std::sync::Arc::new(Self {
            peer_id: info.id.clone(),
            info: RwLock::new(info),
            connected_at: Utc::now(),
            outbound: tx,
            cancel: CancellationToken::new(),
            state: Mutex::new(SessionState::Handshaking),
        });
        (session, rx)
    }

    /// Authenticated peer id. Stamped onto every inbound frame.
    #[must_use]
    pub fn peer_id(&self) -> &str {
        &self.peer_id
    }

    /// Snapshot of the peer's identity record.
    pub async fn info(&self) -> PeerInfo {
        self.info.read().await.clone()
    }

    /// Mutate the peer record. Only the owning session and the registry
    /// call this.
    pub async fn update_info(&self, apply: impl FnOnce(&mut PeerInfo)) {
        let mut info = self.info.write().await;
        apply(&mut info);
    }

    /// When the transport was bound.
    #[must_use]
    pub const fn connected_at(&self) -> DateTime<Utc> {
        self.connected_at
    }

    /// Non-blocking enqueue of one message. Never waits for queue space.
    pub fn enqueue(&self, message: &SignalingMessage) -> Result<(), SignalError> {
        self.enqueue_frame(message.encode()?)
    }

    /// Non-blocking enqueue of an already-encoded frame.
    pub fn enqueue_frame(&self, frame: String) -> Result<(), SignalError> {
        match self.outbound.try_send(frame) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(SignalError::Backpressure),
            Err(TrySendError::Closed(_)) => Err(SignalError::SessionClosed(self.peer_id.clone())),
        }
    }

    /// Cancellation token shared by both pumps.
    #[must_use]
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Request session shutdown. Both pumps observe the token at their
    /// next suspension point.
    pub fn close(&self) {
        self.cancel.cancel();
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        *self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Handshaking to Open, on registry insertion.
    pub fn mark_open(&self) {
        let mut state = self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if *state == SessionState::Handshaking {
            *state = SessionState::Open;
        }
    }

    /// Transition into Closing. Returns true only for the first caller,
    /// which makes teardown run exactly once per session.
    pub fn begin_close(&self) -> bool {
        let mut state = self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        match *state {
            SessionState::Handshaking | SessionState::Open => {
                *state = SessionState::Closing;
                true
            }
            SessionState::Closing | SessionState::Closed => false,
        }
    }

    /// Closing to Closed, once registry cleanup has completed.
    pub fn mark_closed(&self) {
        let mut state = self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        *state = SessionState::Closed;
    }
}
