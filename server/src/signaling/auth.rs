//! Authenticators
//!
//! Credential validation on the transport upgrade, before the session
//! reaches the peer registry. A failed authentication closes the
//! upgrade; no `peer-connected` is observed.

use std::sync::atomic::{AtomicU64, Ordering};

use beacon_proto::{ConnectionState, PeerInfo};
use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use super::error::SignalError;

/// Resolves an upgrade credential to a peer identity.
pub trait Authenticator: Send + Sync {
    /// Validate the credential (already stripped of its `Bearer `
    /// prefix). `None` means the client sent no credential at all.
    fn authenticate(&self, credential: Option<&str>) -> Result<PeerInfo, SignalError>;
}

/// Strip the `Bearer ` scheme from an `Authorization` header value.
#[must_use]
pub fn strip_bearer(header: &str) -> &str {
    header
        .strip_prefix("Bearer ")
        .unwrap_or(header)
        .trim()
}

/// Mints anonymous identities when auth is disabled.
#[derive(Default)]
pub struct AnonymousAuthenticator {
    counter: AtomicU64,
}

impl AnonymousAuthenticator {
    /// Authenticator starting its counter at zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Authenticator for AnonymousAuthenticator {
    fn authenticate(&self, _credential: Option<&str>) -> Result<PeerInfo, SignalError> {
        let n = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        let mut info = PeerInfo::new(format!("peer_{n}")).with_role("anonymous");
        info.joined_at = Some(Utc::now());
        info.connection_state = ConnectionState::Connecting;
        Ok(info)
    }
}

/// Claims carried by a Beacon access token.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Subject: the peer id.
    pub sub: String,
    /// Expiration time (Unix timestamp).
    pub exp: i64,
    /// Display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Role granted to the peer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

/// Validates HS256 bearer tokens against a shared secret.
pub struct JwtAuthenticator {
    secret: String,
}

impl JwtAuthenticator {
    /// Authenticator over the given shared secret.
    #[must_use]
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }
}

impl Authenticator for JwtAuthenticator {
    fn authenticate(&self, credential: Option<&str>) -> Result<PeerInfo, SignalError> {
        let token =
            credential.ok_or_else(|| SignalError::Unauthorized("missing credential".into()))?;

        let data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &Validation::new(Algorithm::HS256),
        )
        .map_err(|e| SignalError::Unauthorized(format!("invalid token: {e}")))?;

        let claims = data.claims;
        if claims.sub.is_empty() {
            return Err(SignalError::Unauthorized("token has an empty subject".into()));
        }

        let mut info = PeerInfo::new(claims.sub.clone())
            .with_role(claims.role.unwrap_or_else(|| "user".into()));
        info.user_id = Some(claims.sub);
        info.display_name = claims.name;
        info.joined_at = Some(Utc::now());
        info.connection_state = ConnectionState::Connecting;
        Ok(info)
    }
}

/// Issue an HS256 token for the given peer. Used by deployments that
/// mint their own credentials and by the test suite.
pub fn issue_token(
    secret: &str,
    peer_id: &str,
    role: Option<&str>,
    name: Option<&str>,
    ttl: chrono::Duration,
) -> Result<String, SignalError> {
    let claims = Claims {
        sub: peer_id.to_owned(),
        exp: (Utc::now() + ttl).timestamp(),
        name: name.map(str::to_owned),
        role: role.map(str::to_owned),
    };
    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| SignalError::Internal(format!("token encoding failed: {e}")))
}
