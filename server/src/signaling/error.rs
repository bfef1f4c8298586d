//! Signaling Errors

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use beacon_proto::ProtoError;
use thiserror::Error;

/// Errors that can occur during signaling operations.
///
/// None of these invalidate the server; errors that invalidate a single
/// transport tear down only that session.
#[derive(Debug, Error)]
pub enum SignalError {
    /// A peer with this id already holds a live session.
    #[error("peer already connected: {0}")]
    DuplicatePeer(String),

    /// No live session for this peer id.
    #[error("peer not found: {0}")]
    PeerNotFound(String),

    /// The peer's session is shutting down and no longer accepts frames.
    #[error("session closed: {0}")]
    SessionClosed(String),

    /// Outbound queue is full; the frame was not enqueued.
    #[error("outbound queue full")]
    Backpressure,

    /// No room with this id.
    #[error("room not found: {0}")]
    RoomNotFound(String),

    /// A room with this id already exists.
    #[error("room already exists: {0}")]
    DuplicateRoom(String),

    /// The room is at its membership ceiling.
    #[error("room {room} is full (max: {max})")]
    RoomFull {
        /// Room id.
        room: String,
        /// Membership ceiling.
        max: usize,
    },

    /// The server is at its global room ceiling.
    #[error("room capacity exceeded (max: {max})")]
    RoomCapacityExceeded {
        /// Global room ceiling.
        max: usize,
    },

    /// A new membership ceiling would be below the current member count.
    #[error("cannot set max peers to {requested}: room has {current} members")]
    RoomOvercommit {
        /// Current member count.
        current: usize,
        /// Requested ceiling.
        requested: usize,
    },

    /// A directed message arrived without a recipient.
    #[error("directed message requires a recipient")]
    MissingRecipient,

    /// The peer is not a member of the room.
    #[error("peer {peer} is not in room {room}")]
    PeerNotInRoom {
        /// Peer id.
        peer: String,
        /// Room id.
        room: String,
    },

    /// The peer does not satisfy the room's access requirements.
    #[error("not authorized to join room {0}")]
    RoomUnauthorized(String),

    /// Credential missing or invalid at the upgrade handshake.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Too many messages from one peer.
    #[error("rate limited")]
    RateLimited,

    /// Room id failed validation.
    #[error("invalid room id: {0}")]
    InvalidRoomId(String),

    /// Inbound frame exceeded the configured size ceiling.
    #[error("frame exceeds the {limit}-byte ceiling")]
    FrameTooLarge {
        /// Configured ceiling in bytes.
        limit: usize,
    },

    /// Malformed frame.
    #[error(transparent)]
    Codec(#[from] ProtoError),

    /// Internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl SignalError {
    /// Machine-readable code carried on `error` frames and REST bodies.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::DuplicatePeer(_) => "duplicate_peer",
            Self::PeerNotFound(_) => "peer_not_found",
            Self::SessionClosed(_) => "session_closed",
            Self::Backpressure => "backpressure",
            Self::RoomNotFound(_) => "room_not_found",
            Self::DuplicateRoom(_) => "duplicate_room",
            Self::RoomFull { .. } => "room_full",
            Self::RoomCapacityExceeded { .. } => "room_capacity_exceeded",
            Self::RoomOvercommit { .. } => "room_overcommit",
            Self::MissingRecipient => "missing_recipient",
            Self::PeerNotInRoom { .. } => "peer_not_in_room",
            Self::RoomUnauthorized(_) => "room_unauthorized",
            Self::Unauthorized(_) => "unauthorized",
            Self::RateLimited => "rate_limited",
            Self::InvalidRoomId(_) => "invalid_room_id",
            Self::FrameTooLarge { .. } => "frame_too_large",
            Self::Codec(_) => "codec_invalid",
            Self::Internal(_) => "internal_error",
        }
    }
}

impl IntoResponse for SignalError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::PeerNotFound(_) | Self::RoomNotFound(_) | Self::PeerNotInRoom { .. } => {
                StatusCode::NOT_FOUND
            }
            Self::DuplicatePeer(_)
            | Self::DuplicateRoom(_)
            | Self::RoomFull { .. }
            | Self::RoomCapacityExceeded { .. }
            | Self::RoomOvercommit { .. } => StatusCode::CONFLICT,
            Self::RoomUnauthorized(_) | Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Self::Backpressure | Self::SessionClosed(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::MissingRecipient | Self::InvalidRoomId(_) | Self::Codec(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::FrameTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(serde_json::json!({
            "error": self.to_string(),
            "code": self.code(),
        }));

        (status, body).into_response()
    }
}
