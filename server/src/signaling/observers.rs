//! Observer Hooks
//!
//! One-way publication channel from registries and sessions to the
//! embedding application. Hooks are plain callbacks; they run on the
//! task that produced the event, after all registry locks are released.

use std::sync::{Arc, PoisonError, RwLock};

use beacon_proto::{PeerInfo, RoomInfo, SignalingMessage};

use super::error::SignalError;

type PeerHook = Arc<dyn Fn(&PeerInfo) + Send + Sync>;
type RoomHook = Arc<dyn Fn(&RoomInfo) + Send + Sync>;
type MessageHook = Arc<dyn Fn(&SignalingMessage) + Send + Sync>;
type ErrorHook = Arc<dyn Fn(&SignalError) + Send + Sync>;

/// Registered observer callbacks.
#[derive(Default)]
pub struct Observers {
    peer_connected: RwLock<Option<PeerHook>>,
    peer_disconnected: RwLock<Option<PeerHook>>,
    room_created: RwLock<Option<RoomHook>>,
    room_deleted: RwLock<Option<RoomHook>>,
    message: RwLock<Option<MessageHook>>,
    error: RwLock<Option<ErrorHook>>,
}

impl Observers {
    /// Observe sessions entering the open state.
    pub fn on_peer_connected(&self, hook: impl Fn(&PeerInfo) + Send + Sync + 'static) {
        *write(&self.peer_connected) = Some(Arc::new(hook));
    }

    /// Observe sessions leaving the closed state.
    pub fn on_peer_disconnected(&self, hook: impl Fn(&PeerInfo) + Send + Sync + 'static) {
        *write(&self.peer_disconnected) = Some(Arc::new(hook));
    }

    /// Observe room creation.
    pub fn on_room_created(&self, hook: impl Fn(&RoomInfo) + Send + Sync + 'static) {
        *write(&self.room_created) = Some(Arc::new(hook));
    }

    /// Observe room deletion.
    pub fn on_room_deleted(&self, hook: impl Fn(&RoomInfo) + Send + Sync + 'static) {
        *write(&self.room_deleted) = Some(Arc::new(hook));
    }

    /// Observe messages the dispatcher does not recognize.
    pub fn on_message(&self, hook: impl Fn(&SignalingMessage) + Send + Sync + 'static) {
        *write(&self.message) = Some(Arc::new(hook));
    }

    /// Observe per-session and per-room errors.
    pub fn on_error(&self, hook: impl Fn(&SignalError) + Send + Sync + 'static) {
        *write(&self.error) = Some(Arc::new(hook));
    }

    pub(crate) fn fire_peer_connected(&self, info: &PeerInfo) {
        if let Some(hook) = read(&self.peer_connected) {
            hook(info);
        }
    }

    pub(crate) fn fire_peer_disconnected(&self, info: &PeerInfo) {
        if let Some(hook) = read(&self.peer_disconnected) {
            hook(info);
        }
    }

    pub(crate) fn fire_room_created(&self, info: &RoomInfo) {
        if let Some(hook) = read(&self.room_created) {
            hook(info);
        }
    }

    pub(crate) fn fire_room_deleted(&self, info: &RoomInfo) {
        if let Some(hook) = read(&self.room_deleted) {
            hook(info);
        }
    }

    pub(crate) fn fire_message(&self, message: &SignalingMessage) {
        if let Some(hook) = read(&self.message) {
            hook(message);
        }
    }

    pub(crate) fn fire_error(&self, error: &SignalError) {
        if let Some(hook) = read(&self.error) {
            hook(error);
        }
    }
}

/// Clone the hook out under the read lock so user callbacks never run
/// while a lock is held.
fn read<T: Clone>(slot: &RwLock<Option<T>>) -> Option<T> {
    slot.read().unwrap_or_else(PoisonError::into_inner).clone()
}

fn write<T>(slot: &RwLock<Option<T>>) -> std::sync::RwLockWriteGuard<'_, Option<T>> {
    slot.write().unwrap_or_else(PoisonError::into_inner)
}
