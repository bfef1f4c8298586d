//! API Router and Application State
//!
//! REST surface for room administration and stats, plus the WebSocket
//! upgrade route.

pub mod rooms;

use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::signaling::{ServerStats, SignalingServer};
use crate::ws;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// The signaling core.
    pub server: Arc<SignalingServer>,
    /// Server configuration.
    pub config: Arc<Config>,
}

impl AppState {
    /// State around an existing signaling core.
    #[must_use]
    pub fn new(server: Arc<SignalingServer>) -> Self {
        let config = server.config().clone();
        Self { server, config }
    }
}

/// Create the main application router.
pub fn create_router(state: AppState) -> Router {
    // Configure CORS based on allowed origins
    // In production, set CORS_ALLOWED_ORIGINS to specific origins
    let cors = if state.config.cors_allowed_origins.iter().any(|o| o == "*") {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        use axum::http::{header, Method};
        let origins: Vec<_> = state
            .config
            .cors_allowed_origins
            .iter()
            .filter_map(|o| {
                if let Ok(origin) = o.parse() {
                    Some(origin)
                } else {
                    tracing::warn!(origin = %o, "Invalid CORS origin in configuration, skipping");
                    None
                }
            })
            .collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
    };

    let enable_cors = state.config.enable_cors;
    let router = Router::new()
        .route("/rooms", get(rooms::list_rooms).post(rooms::create_room))
        .route(
            "/rooms/{id}",
            get(rooms::get_room).delete(rooms::delete_room),
        )
        .route("/rooms/{id}/peers", get(rooms::get_room_peers))
        .route("/stats", get(get_stats))
        .route("/ws", get(ws::handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    if enable_cors {
        router.layer(cors)
    } else {
        router
    }
}

/// `GET /stats`: current server counters.
async fn get_stats(State(state): State<AppState>) -> Json<ServerStats> {
    Json(state.server.stats())
}
