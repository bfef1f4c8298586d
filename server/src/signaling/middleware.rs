//! Message Middleware
//!
//! A chain of wrappers around per-message handling. Registration order
//! is preserved; the first registered middleware is the outermost. A
//! middleware short-circuits by returning an error instead of calling
//! `next`; the error reaches the error observer but does not tear down
//! the session.

use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use beacon_proto::SignalingMessage;
use futures::future::BoxFuture;
use tokio::sync::RwLock;
use tracing::debug;

use super::error::SignalError;

/// Innermost continuation of the chain.
pub type Next = Arc<dyn Fn(SignalingMessage) -> BoxFuture<'static, Result<(), SignalError>> + Send + Sync>;

/// One middleware layer.
pub type Middleware = Arc<
    dyn Fn(SignalingMessage, Next) -> BoxFuture<'static, Result<(), SignalError>> + Send + Sync,
>;

/// Ordered middleware stack.
#[derive(Default, Clone)]
pub struct MiddlewareChain {
    layers: Vec<Middleware>,
}

impl MiddlewareChain {
    /// Empty chain: messages flow straight to the handler.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a layer. Earlier registrations wrap later ones.
    pub fn push(&mut self, layer: Middleware) {
        self.layers.push(layer);
    }

    /// Run the message through every layer and into `terminal`.
    pub async fn run(&self, message: SignalingMessage, terminal: Next) -> Result<(), SignalError> {
        let mut next = terminal;
        for layer in self.layers.iter().rev() {
            let layer = layer.clone();
            let inner = next;
            next = Arc::new(move |msg| layer(msg, inner.clone()));
        }
        next(message).await
    }
}

/// Per-peer message rate limiter: at most one message per `min_interval`
/// from each peer id.
pub struct PeerRateLimiter {
    last_seen: RwLock<HashMap<String, Instant>>,
    min_interval: Duration,
}

impl PeerRateLimiter {
    /// Limiter allowing one message per `min_interval` per peer.
    #[must_use]
    pub fn new(min_interval: Duration) -> Self {
        Self {
            last_seen: RwLock::new(HashMap::new()),
            min_interval,
        }
    }

    /// Record one message from the peer, rejecting it when it arrives
    /// inside the interval window.
    pub async fn check(&self, peer_id: &str) -> Result<(), SignalError> {
        let mut map = self.last_seen.write().await;
        if let Some(last) = map.get(peer_id) {
            if last.elapsed() < self.min_interval {
                return Err(SignalError::RateLimited);
            }
        }
        map.insert(peer_id.to_owned(), Instant::now());
        Ok(())
    }

    /// Drop entries idle for ten intervals. Call periodically.
    pub async fn cleanup(&self) {
        let threshold = self.min_interval * 10;
        let mut map = self.last_seen.write().await;
        map.retain(|_, last| last.elapsed() < threshold);
    }
}

/// Rate-limiting middleware over [`PeerRateLimiter`].
#[must_use]
pub fn rate_limit(min_interval: Duration) -> Middleware {
    let limiter = Arc::new(PeerRateLimiter::new(min_interval));
    Arc::new(move |message, next| {
        let limiter = limiter.clone();
        Box::pin(async move {
            limiter.check(&message.from).await?;
            next(message).await
        })
    })
}

/// Audit-logging middleware: one structured line per message.
#[must_use]
pub fn audit_log() -> Middleware {
    Arc::new(|message, next| {
        Box::pin(async move {
            debug!(
                kind = %message.kind,
                from = %message.from,
                to = message.to.as_deref().unwrap_or(""),
                room = message.room.as_deref().unwrap_or(""),
                "Signaling message"
            );
            next(message).await
        })
    })
}

/// Denylist middleware: rejects messages from listed peer ids.
#[must_use]
pub fn denylist(blocked: HashSet<String>) -> Middleware {
    let blocked = Arc::new(blocked);
    Arc::new(move |message, next| {
        let blocked = blocked.clone();
        Box::pin(async move {
            if blocked.contains(&message.from) {
                return Err(SignalError::Unauthorized(format!(
                    "peer {} is denylisted",
                    message.from
                )));
            }
            next(message).await
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use beacon_proto::MessageType;
    use std::sync::Mutex;

    fn tagger(tag: &'static str, log: Arc<Mutex<Vec<&'static str>>>) -> Middleware {
        Arc::new(move |message, next| {
            let log = log.clone();
            Box::pin(async move {
                log.lock().unwrap().push(tag);
                next(message).await
            })
        })
    }

    fn message_from(peer: &str) -> SignalingMessage {
        let mut msg = SignalingMessage::new(MessageType::Bye);
        msg.from = peer.into();
        msg
    }

    #[tokio::test]
    async fn layers_run_in_registration_order() {
        let log: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));
        let mut chain = MiddlewareChain::new();
        chain.push(tagger("outer", log.clone()));
        chain.push(tagger("inner", log.clone()));

        let log_terminal = log.clone();
        let terminal: Next = Arc::new(move |_msg| {
            let log = log_terminal.clone();
            Box::pin(async move {
                log.lock().unwrap().push("handler");
                Ok(())
            })
        });

        chain.run(message_from("p"), terminal).await.unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["outer", "inner", "handler"]);
    }

    #[tokio::test]
    async fn short_circuit_skips_the_handler() {
        let mut chain = MiddlewareChain::new();
        chain.push(denylist(HashSet::from(["mallory".to_string()])));

        let reached = Arc::new(Mutex::new(false));
        let reached_inner = reached.clone();
        let terminal: Next = Arc::new(move |_msg| {
            let reached = reached_inner.clone();
            Box::pin(async move {
                *reached.lock().unwrap() = true;
                Ok(())
            })
        });

        let err = chain
            .run(message_from("mallory"), terminal.clone())
            .await
            .unwrap_err();
        assert!(matches!(err, SignalError::Unauthorized(_)));
        assert!(!*reached.lock().unwrap());

        chain.run(message_from("alice"), terminal).await.unwrap();
        assert!(*reached.lock().unwrap());
    }

    #[tokio::test]
    async fn rate_limiter_throttles_per_peer() {
        let limiter = PeerRateLimiter::new(Duration::from_millis(50));
        limiter.check("alice").await.unwrap();
        assert!(matches!(
            limiter.check("alice").await,
            Err(SignalError::RateLimited)
        ));
        // Another peer is unaffected.
        limiter.check("bob").await.unwrap();

        tokio::time::sleep(Duration::from_millis(60)).await;
        limiter.check("alice").await.unwrap();
    }

    #[tokio::test]
    async fn cleanup_drops_idle_entries() {
        let limiter = PeerRateLimiter::new(Duration::from_millis(10));
        limiter.check("alice").await.ok();
        tokio::time::sleep(Duration::from_millis(150)).await;
        limiter.cleanup().await;
        assert!(limiter.last_seen.read().await.is_empty());
    }
}
