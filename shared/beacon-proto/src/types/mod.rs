//! Shared Signaling Types

pub mod peer;
pub mod room;
pub mod rtc;

pub use peer::{ConnectionState, MediaState, PeerInfo};
pub use room::{MediaCapabilities, QualityLimits, RoomInfo};
pub use rtc::{IceCandidate, SdpKind, SessionDescription};
