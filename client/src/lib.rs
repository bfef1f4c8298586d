//! Beacon Client
//!
//! Signaling client with automatic reconnection. Owns its send and
//! receive pumps plus a reconnect supervisor, and surfaces typed
//! handlers for offer/answer/ICE and room membership events.

pub mod client;
pub mod connection;
pub mod error;

pub use client::{ClientConfig, ConnectionStatus, SignalingClient};
pub use error::ClientError;
