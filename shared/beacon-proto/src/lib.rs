//! Beacon Wire Protocol
//!
//! Shared signaling types used by both server and client: the
//! [`SignalingMessage`] envelope, its typed payloads, and the JSON codec.

pub mod error;
pub mod message;
pub mod types;

pub use error::ProtoError;
pub use message::{ErrorInfo, MessageType, SignalingMessage};
pub use types::*;
