//! Room Registry
//!
//! Creates and deletes rooms, enforces the global room cap, and walks
//! all rooms during session teardown. Holds no other locks across that
//! walk.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use beacon_proto::RoomInfo;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use super::error::SignalError;
use super::observers::Observers;
use super::peers::PeerRegistry;
use super::room::{OnEmptyHook, Room};
use super::stats::StatsCollector;

/// Registry of all live rooms.
pub struct RoomRegistry {
    rooms: RwLock<HashMap<String, Arc<Room>>>,
    peers: Arc<PeerRegistry>,
    observers: Arc<Observers>,
    stats: Arc<StatsCollector>,
    max_rooms: usize,
    default_max_peers: usize,
    collapse_empty: bool,
    weak_self: Weak<Self>,
}

impl RoomRegistry {
    /// Build the registry. `default_max_peers` applies to rooms created
    /// implicitly by `join-room`; `collapse_empty` installs the
    /// delete-on-empty hook on every room.
    #[must_use]
    pub fn new(
        peers: Arc<PeerRegistry>,
        observers: Arc<Observers>,
        stats: Arc<StatsCollector>,
        max_rooms: usize,
        default_max_peers: usize,
        collapse_empty: bool,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak_self| Self {
            rooms: RwLock::new(HashMap::new()),
            peers,
            observers,
            stats,
            max_rooms,
            default_max_peers,
            collapse_empty,
            weak_self: weak_self.clone(),
        })
    }

    fn empty_hook(&self) -> Option<OnEmptyHook> {
        if !self.collapse_empty {
            return None;
        }
        let weak = self.weak_self.clone();
        Some(Arc::new(move |room_id: String| {
            let weak = weak.clone();
            Box::pin(async move {
                if let Some(registry) = weak.upgrade() {
                    if let Err(e) = registry.delete_room(&room_id).await {
                        debug!(room = %room_id, error = %e, "Empty-room collapse skipped");
                    }
                }
            })
        }))
    }

    /// Create a room. An empty id gets a minted one. Fails when the
    /// global cap is hit or the id already exists.
    pub async fn create_room(&self, mut info: RoomInfo) -> Result<Arc<Room>, SignalError> {
        if info.id.is_empty() {
            info.id = Uuid::new_v4().to_string();
        }
        validate_room_id(&info.id)?;

        let room = {
            let mut rooms = self.rooms.write().await;
            if rooms.len() >= self.max_rooms {
                return Err(SignalError::RoomCapacityExceeded {
                    max: self.max_rooms,
                });
            }
            if rooms.contains_key(&info.id) {
                return Err(SignalError::DuplicateRoom(info.id));
            }
            let room = Arc::new(Room::new(info, self.peers.clone(), self.empty_hook()));
            rooms.insert(room.id().to_owned(), room.clone());
            room
        };

        self.stats.room_created();
        let snapshot = room.snapshot().await;
        info!(room = %snapshot.id, "Room created");
        self.observers.fire_room_created(&snapshot);
        Ok(room)
    }

    /// Resolve a room, creating it with the default capacity when
    /// absent. Returns whether creation happened.
    pub async fn get_or_create(&self, room_id: &str) -> Result<(Arc<Room>, bool), SignalError> {
        if let Some(room) = self.get_room(room_id).await {
            return Ok((room, false));
        }

        let info = RoomInfo::new(room_id).with_max_peers(self.default_max_peers);
        match self.create_room(info).await {
            Ok(room) => Ok((room, true)),
            // Lost the creation race; the room exists now.
            Err(SignalError::DuplicateRoom(_)) => {
                let room = self
                    .get_room(room_id)
                    .await
                    .ok_or_else(|| SignalError::RoomNotFound(room_id.to_owned()))?;
                Ok((room, false))
            }
            Err(e) => Err(e),
        }
    }

    /// Delete a room: evict members (one `peer-left` each) and fire the
    /// deleted observer exactly once.
    pub async fn delete_room(&self, room_id: &str) -> Result<(), SignalError> {
        let room = {
            let mut rooms = self.rooms.write().await;
            rooms
                .remove(room_id)
                .ok_or_else(|| SignalError::RoomNotFound(room_id.to_owned()))?
        };

        room.close().await;
        self.stats.room_deleted();
        let snapshot = room.snapshot().await;
        info!(room = %snapshot.id, "Room deleted");
        self.observers.fire_room_deleted(&snapshot);
        Ok(())
    }

    /// Look up a live room.
    pub async fn get_room(&self, room_id: &str) -> Option<Arc<Room>> {
        self.rooms.read().await.get(room_id).cloned()
    }

    /// Metadata snapshots of all live rooms.
    pub async fn list(&self) -> Vec<RoomInfo> {
        let rooms: Vec<Arc<Room>> = self.rooms.read().await.values().cloned().collect();
        let mut infos = Vec::with_capacity(rooms.len());
        for room in rooms {
            infos.push(room.snapshot().await);
        }
        infos.sort_unstable_by(|a, b| a.id.cmp(&b.id));
        infos
    }

    /// Number of live rooms.
    pub async fn count(&self) -> usize {
        self.rooms.read().await.len()
    }

    /// Remove a peer from every room it occupies. Called during session
    /// teardown; takes the room list under a short read lock and walks
    /// it with no locks held.
    pub async fn remove_peer_everywhere(&self, peer_id: &str) {
        let rooms: Vec<Arc<Room>> = self.rooms.read().await.values().cloned().collect();
        for room in rooms {
            if room.contains(peer_id).await {
                if let Err(e) = room.remove_peer(peer_id).await {
                    debug!(room = %room.id(), peer_id = %peer_id, error = %e, "Teardown removal raced");
                }
            }
        }
    }

    /// Close every room, firing deletion events. Used at shutdown.
    pub async fn close_all(&self) {
        let drained: Vec<Arc<Room>> = {
            let mut rooms = self.rooms.write().await;
            rooms.drain().map(|(_, room)| room).collect()
        };
        for room in drained {
            room.close().await;
            self.stats.room_deleted();
            let snapshot = room.snapshot().await;
            self.observers.fire_room_deleted(&snapshot);
        }
    }
}

fn validate_room_id(id: &str) -> Result<(), SignalError> {
    if id.len() > 128 || id.chars().any(|c| c.is_control() || c.is_whitespace()) {
        return Err(SignalError::InvalidRoomId(id.to_owned()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use beacon_proto::PeerInfo;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn fixture(max_rooms: usize, collapse: bool) -> (Arc<RoomRegistry>, Arc<Observers>) {
        let peers = Arc::new(PeerRegistry::new());
        let observers = Arc::new(Observers::default());
        let stats = Arc::new(StatsCollector::new());
        let registry = RoomRegistry::new(peers, observers.clone(), stats, max_rooms, 50, collapse);
        (registry, observers)
    }

    #[tokio::test]
    async fn global_cap_rejects_extra_rooms() {
        let (registry, _observers) = fixture(2, false);
        registry.create_room(RoomInfo::new("a")).await.unwrap();
        registry.create_room(RoomInfo::new("b")).await.unwrap();
        assert!(matches!(
            registry.create_room(RoomInfo::new("c")).await,
            Err(SignalError::RoomCapacityExceeded { max: 2 })
        ));
    }

    #[tokio::test]
    async fn duplicate_room_id_is_rejected() {
        let (registry, _observers) = fixture(10, false);
        registry.create_room(RoomInfo::new("a")).await.unwrap();
        assert!(matches!(
            registry.create_room(RoomInfo::new("a")).await,
            Err(SignalError::DuplicateRoom(_))
        ));
    }

    #[tokio::test]
    async fn implicit_creation_inherits_default_capacity() {
        let (registry, _observers) = fixture(10, false);
        let (room, created) = registry.get_or_create("r1").await.unwrap();
        assert!(created);
        assert_eq!(room.snapshot().await.max_peers, 50);

        let (_same, created) = registry.get_or_create("r1").await.unwrap();
        assert!(!created);
        assert_eq!(registry.count().await, 1);
    }

    #[tokio::test]
    async fn invalid_room_ids_fail_synchronously() {
        let (registry, _observers) = fixture(10, false);
        assert!(matches!(
            registry.create_room(RoomInfo::new("has space")).await,
            Err(SignalError::InvalidRoomId(_))
        ));
        assert!(matches!(
            registry.create_room(RoomInfo::new("x".repeat(200))).await,
            Err(SignalError::InvalidRoomId(_))
        ));
        // An empty id gets minted instead.
        let room = registry.create_room(RoomInfo::new("")).await.unwrap();
        assert!(!room.id().is_empty());
    }

    #[tokio::test]
    async fn empty_room_collapses_and_fires_deleted_once() {
        let (registry, observers) = fixture(10, true);
        let deleted = Arc::new(AtomicUsize::new(0));
        let counter = deleted.clone();
        observers.on_room_deleted(move |_info| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let (room, _) = registry.get_or_create("rZ").await.unwrap();
        room.add_peer(PeerInfo::new("p1")).await.unwrap();
        room.add_peer(PeerInfo::new("p2")).await.unwrap();
        room.remove_peer("p1").await.unwrap();
        room.remove_peer("p2").await.unwrap();

        assert_eq!(deleted.load(Ordering::SeqCst), 1);
        assert!(registry.get_room("rZ").await.is_none());
        assert!(matches!(
            registry.delete_room("rZ").await,
            Err(SignalError::RoomNotFound(_))
        ));
    }

    #[tokio::test]
    async fn remove_peer_everywhere_walks_all_rooms() {
        let (registry, _observers) = fixture(10, false);
        let (room_x, _) = registry.get_or_create("rX").await.unwrap();
        let (room_y, _) = registry.get_or_create("rY").await.unwrap();
        room_x.add_peer(PeerInfo::new("carol")).await.unwrap();
        room_y.add_peer(PeerInfo::new("carol")).await.unwrap();
        room_y.add_peer(PeerInfo::new("dan")).await.unwrap();

        registry.remove_peer_everywhere("carol").await;
        assert!(!room_x.contains("carol").await);
        assert!(!room_y.contains("carol").await);
        assert!(room_y.contains("dan").await);
    }
}
