//! Room Types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Media kinds a room permits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaCapabilities {
    /// Audio allowed.
    #[serde(default = "default_true")]
    pub allow_audio: bool,
    /// Camera video allowed.
    #[serde(default = "default_true")]
    pub allow_video: bool,
    /// Screen share allowed.
    #[serde(default = "default_true")]
    pub allow_screen: bool,
}

const fn default_true() -> bool {
    true
}

impl Default for MediaCapabilities {
    fn default() -> Self {
        Self {
            allow_audio: true,
            allow_video: true,
            allow_screen: true,
        }
    }
}

/// Quality ceilings a room imposes on its members. Zero means unlimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct QualityLimits {
    /// Maximum video height in pixels.
    #[serde(default)]
    pub max_video_height: u32,
    /// Maximum media bitrate in kbit/s.
    #[serde(default)]
    pub max_bitrate_kbps: u32,
}

/// Metadata and membership summary for one room.
///
/// Carried as the payload of `room-update` messages and by the REST
/// listing. The password hash never leaves the server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomInfo {
    /// Room identifier, unique among live rooms.
    pub id: String,
    /// Display name.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    /// Free-form description.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    /// Membership ceiling. Zero means unlimited.
    #[serde(default)]
    pub max_peers: usize,
    /// Creation time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    /// Last membership or metadata change.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    /// Hidden from public listings.
    #[serde(default)]
    pub private: bool,
    /// Roles a joining peer must hold one of. Empty set admits everyone.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required_roles: Vec<String>,
    /// Argon2 hash of the room password. Server-side only.
    #[serde(skip)]
    pub password_hash: Option<String>,
    /// Media kinds permitted in the room.
    #[serde(default)]
    pub capabilities: MediaCapabilities,
    /// Quality ceilings.
    #[serde(default)]
    pub quality: QualityLimits,
    /// Current member peer ids.
    #[serde(default)]
    pub peers: Vec<String>,
}

impl RoomInfo {
    /// Empty room shell with just an identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            description: String::new(),
            max_peers: 0,
            created_at: None,
            updated_at: None,
            private: false,
            required_roles: Vec::new(),
            password_hash: None,
            capabilities: MediaCapabilities::default(),
            quality: QualityLimits::default(),
            peers: Vec::new(),
        }
    }

    /// Set the membership ceiling.
    #[must_use]
    pub const fn with_max_peers(mut self, max: usize) -> Self {
        self.max_peers = max;
        self
    }

    /// Set the display name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_hash_never_serializes() {
        let mut room = RoomInfo::new("r1");
        room.password_hash = Some("$argon2id$secret".into());
        let json = serde_json::to_string(&room).unwrap();
        assert!(!json.contains("argon2"));
        assert!(!json.contains("password"));
    }

    #[test]
    fn capabilities_default_to_all_allowed() {
        let room: RoomInfo = serde_json::from_str(r#"{"id":"r1"}"#).unwrap();
        assert!(room.capabilities.allow_audio);
        assert!(room.capabilities.allow_video);
        assert!(room.capabilities.allow_screen);
        assert_eq!(room.max_peers, 0);
    }
}
