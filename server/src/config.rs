//! Server Configuration
//!
//! Loads configuration from environment variables.

use anyhow::Result;
use std::env;
use std::time::Duration;

/// Server configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server bind address (e.g., "0.0.0.0:8080")
    pub bind_address: String,

    /// Global ceiling on concurrently live rooms (default: 1000)
    pub max_rooms: usize,

    /// Default membership ceiling for implicitly created rooms (default: 50)
    pub max_peers_per_room: usize,

    /// Deadline for processing one inbound message (default: 30s)
    pub message_timeout: Duration,

    /// Read deadline between inbound frames or heartbeats (default: 60s)
    pub peer_timeout: Duration,

    /// Require bearer-token authentication on the upgrade handshake
    pub enable_auth: bool,

    /// HS256 secret for token validation (required when auth is enabled)
    pub auth_secret: Option<String>,

    /// Attach a CORS layer to the router (default: true)
    pub enable_cors: bool,

    /// Allowed CORS origins; `*` means any (default: `*`)
    pub cors_allowed_origins: Vec<String>,

    /// Per-frame size ceiling in bytes for control traffic (default: 512)
    pub max_frame_bytes: usize,

    /// Delete a room as soon as its last member leaves (default: true)
    pub collapse_empty_rooms: bool,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let enable_auth = env_parse("ENABLE_AUTH", false);
        let auth_secret = env::var("AUTH_SECRET").ok();

        if enable_auth && auth_secret.is_none() {
            anyhow::bail!("AUTH_SECRET must be set when ENABLE_AUTH=true");
        }

        Ok(Self {
            bind_address: env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:8080".into()),
            max_rooms: env_parse("MAX_ROOMS", 1000),
            max_peers_per_room: env_parse("MAX_PEERS_PER_ROOM", 50),
            message_timeout: Duration::from_secs(env_parse("MESSAGE_TIMEOUT_SECS", 30)),
            peer_timeout: Duration::from_secs(env_parse("PEER_TIMEOUT_SECS", 60)),
            enable_auth,
            auth_secret,
            enable_cors: env_parse("ENABLE_CORS", true),
            cors_allowed_origins: env::var("CORS_ALLOWED_ORIGINS")
                .map(|s| {
                    s.split(',')
                        .map(|o| o.trim().to_string())
                        .filter(|o| !o.is_empty())
                        .collect()
                })
                .unwrap_or_else(|_| vec!["*".into()]),
            max_frame_bytes: env_parse("MAX_FRAME_BYTES", 512),
            collapse_empty_rooms: env_parse("COLLAPSE_EMPTY_ROOMS", true),
        })
    }

    /// Create a default configuration for testing.
    ///
    /// The frame ceiling is raised so tests can carry realistic SDP
    /// payloads without tuning the environment.
    #[must_use]
    pub fn default_for_test() -> Self {
        Self {
            bind_address: "127.0.0.1:8080".into(),
            max_rooms: 1000,
            max_peers_per_room: 50,
            message_timeout: Duration::from_secs(30),
            peer_timeout: Duration::from_secs(60),
            enable_auth: false,
            auth_secret: None,
            enable_cors: true,
            cors_allowed_origins: vec!["*".into()],
            max_frame_bytes: 64 * 1024,
            collapse_empty_rooms: true,
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = Config::default_for_test();
        assert_eq!(config.max_rooms, 1000);
        assert_eq!(config.max_peers_per_room, 50);
        assert_eq!(config.peer_timeout, Duration::from_secs(60));
        assert!(!config.enable_auth);
        assert_eq!(config.cors_allowed_origins, vec!["*".to_string()]);
    }
}
