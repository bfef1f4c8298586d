//! Server Statistics
//!
//! Counters are incremented at session, room, and frame boundaries; a
//! periodic tick derives the message rate from the frame counter.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Aggregate server counters, as exposed over REST.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerStats {
    /// Live transport sessions.
    pub active_sessions: usize,
    /// Live rooms.
    pub total_rooms: usize,
    /// Peers currently registered (one per session).
    pub total_peers: usize,
    /// Approximate inbound message rate.
    pub messages_per_second: f64,
    /// Seconds since the collector was created.
    pub uptime_seconds: u64,
    /// When the rate was last recomputed.
    pub last_update: DateTime<Utc>,
}

struct RateWindow {
    frames_at_tick: u64,
    ticked_at: Instant,
    messages_per_second: f64,
    last_update: DateTime<Utc>,
}

/// Collector shared by sessions, registries, and the REST surface.
pub struct StatsCollector {
    started: Instant,
    active_sessions: AtomicUsize,
    total_rooms: AtomicUsize,
    frames: AtomicU64,
    window: Mutex<RateWindow>,
}

impl Default for StatsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl StatsCollector {
    /// Fresh collector with zeroed counters.
    #[must_use]
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            active_sessions: AtomicUsize::new(0),
            total_rooms: AtomicUsize::new(0),
            frames: AtomicU64::new(0),
            window: Mutex::new(RateWindow {
                frames_at_tick: 0,
                ticked_at: Instant::now(),
                messages_per_second: 0.0,
                last_update: Utc::now(),
            }),
        }
    }

    /// A session entered the open state.
    pub fn session_opened(&self) {
        self.active_sessions.fetch_add(1, Ordering::Relaxed);
    }

    /// A session finished teardown.
    pub fn session_closed(&self) {
        self.active_sessions.fetch_sub(1, Ordering::Relaxed);
    }

    /// A room was created.
    pub fn room_created(&self) {
        self.total_rooms.fetch_add(1, Ordering::Relaxed);
    }

    /// A room was deleted.
    pub fn room_deleted(&self) {
        self.total_rooms.fetch_sub(1, Ordering::Relaxed);
    }

    /// One inbound frame was ingested.
    pub fn frame_ingested(&self) {
        self.frames.fetch_add(1, Ordering::Relaxed);
    }

    /// Total frames ingested since start.
    #[must_use]
    pub fn frames_total(&self) -> u64 {
        self.frames.load(Ordering::Relaxed)
    }

    /// Recompute the message rate over the elapsed tick window.
    pub fn tick(&self) {
        let frames = self.frames.load(Ordering::Relaxed);
        let mut window = self.window.lock().unwrap_or_else(PoisonError::into_inner);
        let elapsed = window.ticked_at.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            window.messages_per_second = (frames - window.frames_at_tick) as f64 / elapsed;
        }
        window.frames_at_tick = frames;
        window.ticked_at = Instant::now();
        window.last_update = Utc::now();
    }

    /// Current snapshot.
    #[must_use]
    pub fn snapshot(&self) -> ServerStats {
        let window = self.window.lock().unwrap_or_else(PoisonError::into_inner);
        let sessions = self.active_sessions.load(Ordering::Relaxed);
        ServerStats {
            active_sessions: sessions,
            total_rooms: self.total_rooms.load(Ordering::Relaxed),
            total_peers: sessions,
            messages_per_second: window.messages_per_second,
            uptime_seconds: self.started.elapsed().as_secs(),
            last_update: window.last_update,
        }
    }

    /// Spawn the rate ticker. Exits when the token is cancelled.
    pub fn start_ticker(
        self: std::sync::Arc<Self>,
        period: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let collector = self;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    _ = interval.tick() => collector.tick(),
                }
            }
        })
    }
}
