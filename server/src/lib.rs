//! Beacon Server
//!
//! WebRTC signaling and room coordination: peers exchange SDP offers,
//! answers, and ICE candidates through a central relay with per-room
//! fan-out, authenticated sessions, and live statistics. The media
//! plane itself is an external collaborator.

pub mod api;
pub mod config;
pub mod signaling;
pub mod ws;
