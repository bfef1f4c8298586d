//! Peer Types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Last-known transport state of a peer, mirroring the connection
/// lifecycle the surrounding WebRTC stack reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// Peer has not connected yet.
    #[default]
    New,
    /// Transport handshake in progress.
    Connecting,
    /// Peer holds a live session.
    Connected,
    /// Session ended or timed out.
    Disconnected,
    /// Transport failed.
    Failed,
    /// Session closed cleanly.
    Closed,
}

/// Media flags a peer advertises for itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct MediaState {
    /// Microphone enabled.
    #[serde(default)]
    pub audio: bool,
    /// Camera enabled.
    #[serde(default)]
    pub video: bool,
    /// Screen share active.
    #[serde(default)]
    pub screen: bool,
}

/// Identity and presence metadata for one connected peer.
///
/// The `id` is unique among currently-connected peers; the server mints
/// one when the auth layer does not supply it. Everything except `id` is
/// optional in a client's self-description.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerInfo {
    /// Opaque peer identifier, unique among live peers.
    pub id: String,
    /// Application-level user identifier, if the auth layer resolved one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Human-readable name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// Role assigned by the authenticator. Rooms may require roles.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub role: String,
    /// When the peer connected.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub joined_at: Option<DateTime<Utc>>,
    /// Advertised media flags.
    #[serde(default)]
    pub media: MediaState,
    /// Last-known connection state.
    #[serde(default)]
    pub connection_state: ConnectionState,
}

impl PeerInfo {
    /// Minimal peer record with just an identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            user_id: None,
            display_name: None,
            role: String::new(),
            joined_at: None,
            media: MediaState::default(),
            connection_state: ConnectionState::New,
        }
    }

    /// Set the display name.
    #[must_use]
    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    /// Set the role.
    #[must_use]
    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = role.into();
        self
    }
}
