//! Protocol Errors

use thiserror::Error;

/// Errors produced while encoding or decoding signaling frames.
///
/// A codec error never invalidates the transport: the offending frame is
/// dropped and the connection stays up.
#[derive(Debug, Error)]
pub enum ProtoError {
    /// Frame is not a well-formed signaling envelope.
    #[error("malformed signaling envelope: {0}")]
    Invalid(#[from] serde_json::Error),

    /// Envelope carries no `type` field (or an empty one).
    #[error("signaling envelope is missing a message type")]
    MissingType,

    /// A typed payload accessor was called but the envelope has no `data`.
    #[error("{0} message carries no payload")]
    MissingPayload(String),

    /// A typed payload accessor was called on the wrong message type.
    #[error("expected a {expected} message, got {actual}")]
    UnexpectedType {
        /// Message type the accessor handles.
        expected: &'static str,
        /// Message type actually present on the envelope.
        actual: String,
    },
}
