//! Peer Registry
//!
//! Live peer id to session map. Shard locks are never held across
//! handler invocations; sends are non-blocking enqueues.

use std::sync::Arc;

use beacon_proto::SignalingMessage;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use super::error::SignalError;
use super::session::Session;

/// Thread-safe registry of all connected peers.
#[derive(Default)]
pub struct PeerRegistry {
    sessions: DashMap<String, Arc<Session>>,
}

impl PeerRegistry {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session under its peer id. Fails when the id already
    /// holds a live session; the id becomes reusable after removal.
    pub fn insert(&self, session: Arc<Session>) -> Result<(), SignalError> {
        match self.sessions.entry(session.peer_id().to_owned()) {
            Entry::Occupied(_) => Err(SignalError::DuplicatePeer(session.peer_id().to_owned())),
            Entry::Vacant(slot) => {
                slot.insert(session);
                Ok(())
            }
        }
    }

    /// Constant-time session lookup.
    #[must_use]
    pub fn lookup(&self, peer_id: &str) -> Option<Arc<Session>> {
        self.sessions.get(peer_id).map(|entry| entry.value().clone())
    }

    /// Remove a peer. Idempotent; returns the session when removal
    /// actually occurred.
    pub fn remove(&self, peer_id: &str) -> Option<Arc<Session>> {
        self.sessions.remove(peer_id).map(|(_, session)| session)
    }

    /// Number of live sessions.
    #[must_use]
    pub fn count(&self) -> usize {
        self.sessions.len()
    }

    /// Ids of all live peers.
    #[must_use]
    pub fn peer_ids(&self) -> Vec<String> {
        self.sessions.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Look up and enqueue in one step. Non-blocking: a full queue
    /// yields `Backpressure` and the frame is dropped.
    pub fn send_to_peer(
        &self,
        peer_id: &str,
        message: &SignalingMessage,
    ) -> Result<(), SignalError> {
        let session = self
            .lookup(peer_id)
            .ok_or_else(|| SignalError::PeerNotFound(peer_id.to_owned()))?;
        session.enqueue(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use beacon_proto::{MessageType, PeerInfo};

    fn session(id: &str) -> (Arc<Session>, tokio::sync::mpsc::Receiver<String>) {
        Session::new(PeerInfo::new(id), 4)
    }

    #[test]
    fn duplicate_insert_is_rejected_until_removed() {
        let registry = PeerRegistry::new();
        let (alice, _rx) = session("alice");
        registry.insert(alice).unwrap();

        let (imposter, _rx2) = session("alice");
        assert!(matches!(
            registry.insert(imposter.clone()),
            Err(SignalError::DuplicatePeer(_))
        ));

        // After removal the id may be reused.
        assert!(registry.remove("alice").is_some());
        assert!(registry.remove("alice").is_none());
        registry.insert(imposter).unwrap();
        assert_eq!(registry.count(), 1);
    }

    #[tokio::test]
    async fn send_to_peer_routes_or_reports_unknown() {
        let registry = PeerRegistry::new();
        let (bob, mut rx) = session("bob");
        registry.insert(bob).unwrap();

        let msg = SignalingMessage::bye_to("bob");
        registry.send_to_peer("bob", &msg).unwrap();
        let frame = rx.recv().await.unwrap();
        assert!(frame.contains(r#""type":"bye""#));

        assert!(matches!(
            registry.send_to_peer("nobody", &msg),
            Err(SignalError::PeerNotFound(_))
        ));
    }
}
