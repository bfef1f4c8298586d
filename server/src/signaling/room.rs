//! Room
//!
//! A named membership set with broadcast primitives. Rooms publish
//! through hooks installed at construction and hold no back-pointer to
//! the registries that own them.

use std::collections::HashMap;
use std::sync::Arc;

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use beacon_proto::{PeerInfo, RoomInfo, SignalingMessage};
use chrono::Utc;
use futures::future::BoxFuture;
use tokio::sync::RwLock;
use tracing::warn;

use super::error::SignalError;
use super::peers::PeerRegistry;

/// Callback fired after the last member leaves. The default hook
/// installed by the room registry collapses the room.
pub type OnEmptyHook = Arc<dyn Fn(String) -> BoxFuture<'static, ()> + Send + Sync>;

/// One live room.
///
/// Lock order is members before metadata; membership events are
/// enqueued while the member lock is held (enqueue is non-blocking and
/// takes no other lock), which keeps the event sequence any member
/// observes in true membership order. Hooks fire after both locks are
/// released.
pub struct Room {
    id: String,
    info: RwLock<RoomInfo>,
    members: RwLock<HashMap<String, PeerInfo>>,
    registry: Arc<PeerRegistry>,
    on_empty: Option<OnEmptyHook>,
}

impl Room {
    /// Create a room around existing metadata.
    #[must_use]
    pub fn new(mut info: RoomInfo, registry: Arc<PeerRegistry>, on_empty: Option<OnEmptyHook>) -> Self {
        let now = Utc::now();
        info.created_at.get_or_insert(now);
        info.updated_at.get_or_insert(now);
        info.peers.clear();
        Self {
            id: info.id.clone(),
            info: RwLock::new(info),
            members: RwLock::new(HashMap::new()),
            registry,
            on_empty,
        }
    }

    /// Room identifier.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Check a joining peer against the room's role and password
    /// requirements.
    pub async fn verify_access(
        &self,
        peer: &PeerInfo,
        password: Option<&str>,
    ) -> Result<(), SignalError> {
        let info = self.info.read().await;

        if !info.required_roles.is_empty() && !info.required_roles.contains(&peer.role) {
            return Err(SignalError::RoomUnauthorized(self.id.clone()));
        }

        if let Some(hash) = &info.password_hash {
            let candidate = password.ok_or_else(|| SignalError::RoomUnauthorized(self.id.clone()))?;
            let parsed = PasswordHash::new(hash)
                .map_err(|e| SignalError::Internal(format!("corrupt room password hash: {e}")))?;
            Argon2::default()
                .verify_password(candidate.as_bytes(), &parsed)
                .map_err(|_| SignalError::RoomUnauthorized(self.id.clone()))?;
        }

        Ok(())
    }

    /// Insert a peer and announce `peer-joined` to the other members.
    pub async fn add_peer(&self, peer: PeerInfo) -> Result<(), SignalError> {
        let mut members = self.members.write().await;
        let mut info = self.info.write().await;

        if info.max_peers > 0 && members.len() >= info.max_peers {
            return Err(SignalError::RoomFull {
                room: self.id.clone(),
                max: info.max_peers,
            });
        }
        if members.contains_key(&peer.id) {
            return Err(SignalError::DuplicatePeer(peer.id));
        }

        let mut event = SignalingMessage::peer_joined(&self.id, &peer);
        event.timestamp = Some(Utc::now());
        for member_id in members.keys() {
            if let Err(e) = self.registry.send_to_peer(member_id, &event) {
                warn!(room = %self.id, peer_id = %member_id, error = %e, "Failed to deliver peer-joined");
            }
        }

        members.insert(peer.id.clone(), peer);
        info.updated_at = Some(Utc::now());
        Ok(())
    }

    /// Remove a peer, announce `peer-left` to the remaining members,
    /// and fire the empty hook when the last member is gone.
    pub async fn remove_peer(&self, peer_id: &str) -> Result<PeerInfo, SignalError> {
        let (removed, became_empty) = {
            let mut members = self.members.write().await;
            let mut info = self.info.write().await;

            let removed = members
                .remove(peer_id)
                .ok_or_else(|| SignalError::PeerNotFound(peer_id.to_owned()))?;
            info.updated_at = Some(Utc::now());

            let mut event = SignalingMessage::peer_left(&self.id, peer_id);
            event.timestamp = Some(Utc::now());
            for member_id in members.keys() {
                if let Err(e) = self.registry.send_to_peer(member_id, &event) {
                    warn!(room = %self.id, peer_id = %member_id, error = %e, "Failed to deliver peer-left");
                }
            }

            (removed, members.is_empty())
        };

        if became_empty {
            if let Some(hook) = &self.on_empty {
                hook(self.id.clone()).await;
            }
        }

        Ok(removed)
    }

    /// Evict every member, firing one `peer-left` per eviction to the
    /// peers still present. Does not fire the empty hook; callers close
    /// rooms they are already deleting.
    pub async fn close(&self) {
        let mut members = self.members.write().await;
        let ids: Vec<String> = members.keys().cloned().collect();
        for peer_id in ids {
            members.remove(&peer_id);
            let mut event = SignalingMessage::peer_left(&self.id, &peer_id);
            event.timestamp = Some(Utc::now());
            for member_id in members.keys() {
                if let Err(e) = self.registry.send_to_peer(member_id, &event) {
                    warn!(room = %self.id, peer_id = %member_id, error = %e, "Failed to deliver peer-left");
                }
            }
        }
        self.info.write().await.updated_at = Some(Utc::now());
    }

    /// Deliver a message to every current member. Per-recipient failures
    /// are logged and do not abort the fan-out.
    pub async fn broadcast(&self, message: &SignalingMessage) {
        self.fan_out(message, None).await;
    }

    /// Deliver a message to every current member except one.
    pub async fn broadcast_except(&self, message: &SignalingMessage, except: &str) {
        self.fan_out(message, Some(except)).await;
    }

    async fn fan_out(&self, message: &SignalingMessage, except: Option<&str>) {
        let member_ids: Vec<String> = {
            let members = self.members.read().await;
            members
                .keys()
                .filter(|id| except != Some(id.as_str()))
                .cloned()
                .collect()
        };

        for member_id in member_ids {
            if let Err(e) = self.registry.send_to_peer(&member_id, message) {
                warn!(room = %self.id, peer_id = %member_id, error = %e, "Failed to deliver broadcast frame");
            }
        }
    }

    /// Deliver a message to one member. Rejected when the peer is not a
    /// member of this room, even if it is known to the server.
    pub async fn send_to_peer(
        &self,
        peer_id: &str,
        message: &SignalingMessage,
    ) -> Result<(), SignalError> {
        if !self.members.read().await.contains_key(peer_id) {
            return Err(SignalError::PeerNotFound(peer_id.to_owned()));
        }
        self.registry.send_to_peer(peer_id, message)
    }

    /// Replace the mutable metadata fields.
    pub async fn update_info(&self, patch: RoomInfo) {
        let mut info = self.info.write().await;
        info.name = patch.name;
        info.description = patch.description;
        info.private = patch.private;
        info.required_roles = patch.required_roles;
        info.capabilities = patch.capabilities;
        info.quality = patch.quality;
        if patch.password_hash.is_some() {
            info.password_hash = patch.password_hash;
        }
        info.updated_at = Some(Utc::now());
    }

    /// Change the membership ceiling. A ceiling below the current
    /// member count is rejected; members are never evicted.
    pub async fn set_max_peers(&self, max_peers: usize) -> Result<(), SignalError> {
        let members = self.members.read().await;
        let mut info = self.info.write().await;

        if max_peers > 0 && max_peers < members.len() {
            return Err(SignalError::RoomOvercommit {
                current: members.len(),
                requested: max_peers,
            });
        }
        info.max_peers = max_peers;
        info.updated_at = Some(Utc::now());
        Ok(())
    }

    /// Metadata snapshot including the current member list.
    pub async fn snapshot(&self) -> RoomInfo {
        let members = self.members.read().await;
        let mut info = self.info.read().await.clone();
        info.peers = members.keys().cloned().collect();
        info.peers.sort_unstable();
        info
    }

    /// Snapshot of all member records.
    pub async fn members(&self) -> Vec<PeerInfo> {
        self.members.read().await.values().cloned().collect()
    }

    /// Whether the peer is currently a member.
    pub async fn contains(&self, peer_id: &str) -> bool {
        self.members.read().await.contains_key(peer_id)
    }

    /// Current member count.
    pub async fn peer_count(&self) -> usize {
        self.members.read().await.len()
    }

    /// Whether the room has no members.
    pub async fn is_empty(&self) -> bool {
        self.members.read().await.is_empty()
    }
}

/// Hash a room password for storage.
pub fn hash_password(password: &str) -> Result<String, SignalError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| SignalError::Internal(format!("password hashing failed: {e}")))
}
