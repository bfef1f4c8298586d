//! Client Errors

use std::time::Duration;

use beacon_proto::ProtoError;
use thiserror::Error;

/// Errors surfaced by the signaling client.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Dial or upgrade failed.
    #[error("connection failed: {0}")]
    Connect(String),

    /// The upgrade handshake did not complete inside the deadline.
    #[error("handshake timed out after {0:?}")]
    HandshakeTimeout(Duration),

    /// An operation needs a live connection.
    #[error("not connected")]
    NotConnected,

    /// The client was closed explicitly.
    #[error("client closed")]
    Closed,

    /// The reconnect supervisor exhausted its attempt budget.
    #[error("reconnect attempts exhausted after {0} tries")]
    ReconnectExhausted(u32),

    /// A frame failed to encode or decode. The frame is dropped; the
    /// connection stays up.
    #[error(transparent)]
    Codec(#[from] ProtoError),

    /// The transport failed mid-session.
    #[error("transport error: {0}")]
    Transport(String),

    /// The server reported an error frame.
    #[error("server error {code}: {message}")]
    Server {
        /// Machine-readable code from the error frame.
        code: String,
        /// Human-readable description.
        message: String,
    },
}
