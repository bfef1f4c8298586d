//! Signaling Core
//!
//! Peer and room coordination for WebRTC negotiation. The wire
//! transport lives in `ws`; this module owns the registries, the
//! per-message dispatch, authentication, middleware, and stats.
//!
//! The media plane is an external collaborator: SDP and ICE payloads
//! pass through opaque and unparsed.

pub mod auth;
pub mod error;
mod handler;
pub mod middleware;
mod observers;
pub mod peers;
pub mod room;
pub mod rooms;
mod server;
pub mod session;
pub mod stats;

// Re-exports
pub(crate) use server::error_frame;
pub use auth::{AnonymousAuthenticator, Authenticator, JwtAuthenticator};
pub use error::SignalError;
pub use middleware::{Middleware, MiddlewareChain};
pub use observers::Observers;
pub use peers::PeerRegistry;
pub use room::Room;
pub use rooms::RoomRegistry;
pub use server::SignalingServer;
pub use session::{Session, SessionState};
pub use stats::{ServerStats, StatsCollector};
