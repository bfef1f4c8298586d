//! Room Administration Handlers

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use beacon_proto::{MediaCapabilities, PeerInfo, QualityLimits, RoomInfo};
use serde::Deserialize;

use super::AppState;
use crate::signaling::error::SignalError;
use crate::signaling::room;

/// `POST /rooms` request body. The password, when present, is hashed
/// before the room record is stored and never returned.
#[derive(Debug, Deserialize)]
pub struct CreateRoomRequest {
    /// Room id; minted when empty.
    #[serde(default)]
    pub id: String,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Free-form description.
    #[serde(default)]
    pub description: String,
    /// Membership ceiling. Zero means unlimited.
    #[serde(default)]
    pub max_peers: usize,
    /// Hidden from the public listing.
    #[serde(default)]
    pub private: bool,
    /// Roles a joining peer must hold one of.
    #[serde(default)]
    pub required_roles: Vec<String>,
    /// Plain-text join password.
    #[serde(default)]
    pub password: Option<String>,
    /// Media kinds permitted in the room.
    #[serde(default)]
    pub capabilities: MediaCapabilities,
    /// Quality ceilings.
    #[serde(default)]
    pub quality: QualityLimits,
}

/// `GET /rooms`: public room listing. Private rooms are omitted.
pub async fn list_rooms(State(state): State<AppState>) -> Json<Vec<RoomInfo>> {
    let rooms = state
        .server
        .list_rooms()
        .await
        .into_iter()
        .filter(|info| !info.private)
        .collect();
    Json(rooms)
}

/// `POST /rooms`: create a room explicitly.
pub async fn create_room(
    State(state): State<AppState>,
    Json(request): Json<CreateRoomRequest>,
) -> Result<(StatusCode, Json<RoomInfo>), SignalError> {
    let mut info = RoomInfo::new(request.id)
        .with_name(request.name)
        .with_max_peers(request.max_peers);
    info.description = request.description;
    info.private = request.private;
    info.required_roles = request.required_roles;
    info.capabilities = request.capabilities;
    info.quality = request.quality;

    if let Some(password) = request.password.filter(|p| !p.is_empty()) {
        info.password_hash = Some(room::hash_password(&password)?);
    }

    let created = state.server.create_room(info).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// `GET /rooms/{id}`: one room's metadata and member list.
pub async fn get_room(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<RoomInfo>, SignalError> {
    Ok(Json(state.server.get_room(&id).await?))
}

/// `DELETE /rooms/{id}`: close the room, evicting members.
pub async fn delete_room(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, SignalError> {
    state.server.delete_room(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /rooms/{id}/peers`: member records of one room.
pub async fn get_room_peers(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<PeerInfo>>, SignalError> {
    Ok(Json(state.server.get_room_peers(&id).await?))
}
