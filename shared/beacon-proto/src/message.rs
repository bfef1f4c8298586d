//! Signaling Message Envelope
//!
//! Every frame on the wire is a single JSON object in this shape. The
//! codec recognizes the built-in message types and passes everything
//! else through verbatim, payload and unknown envelope fields included,
//! so proprietary extensions survive the relay unchanged.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::error::ProtoError;
use crate::types::{IceCandidate, PeerInfo, RoomInfo, SessionDescription};

/// Wire type tag of a signaling message.
///
/// Unrecognized tags round-trip through [`MessageType::Extension`]
/// instead of failing decode.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MessageType {
    /// SDP offer, directed.
    Offer,
    /// SDP answer, directed.
    Answer,
    /// Provisional SDP answer, directed.
    Pranswer,
    /// SDP rollback, directed.
    Rollback,
    /// ICE candidate, directed.
    IceCandidate,
    /// End-of-negotiation hint, directed.
    Bye,
    /// Join (and implicitly create) a room.
    JoinRoom,
    /// Leave a room.
    LeaveRoom,
    /// A peer entered a room the recipient is in.
    PeerJoined,
    /// A peer left a room the recipient is in.
    PeerLeft,
    /// Room metadata and membership snapshot.
    RoomUpdate,
    /// Server-reported error.
    Error,
    /// Any other tag, preserved verbatim.
    Extension(String),
}

impl MessageType {
    /// Wire representation of the tag.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Offer => "offer",
            Self::Answer => "answer",
            Self::Pranswer => "pranswer",
            Self::Rollback => "rollback",
            Self::IceCandidate => "ice-candidate",
            Self::Bye => "bye",
            Self::JoinRoom => "join-room",
            Self::LeaveRoom => "leave-room",
            Self::PeerJoined => "peer-joined",
            Self::PeerLeft => "peer-left",
            Self::RoomUpdate => "room-update",
            Self::Error => "error",
            Self::Extension(tag) => tag,
        }
    }

    /// Whether the server requires a non-empty `to` for this type.
    #[must_use]
    pub const fn is_directed(&self) -> bool {
        matches!(
            self,
            Self::Offer
                | Self::Answer
                | Self::Pranswer
                | Self::Rollback
                | Self::IceCandidate
                | Self::Bye
        )
    }
}

impl From<String> for MessageType {
    fn from(tag: String) -> Self {
        match tag.as_str() {
            "offer" => Self::Offer,
            "answer" => Self::Answer,
            "pranswer" => Self::Pranswer,
            "rollback" => Self::Rollback,
            "ice-candidate" => Self::IceCandidate,
            "bye" => Self::Bye,
            "join-room" => Self::JoinRoom,
            "leave-room" => Self::LeaveRoom,
            "peer-joined" => Self::PeerJoined,
            "peer-left" => Self::PeerLeft,
            "room-update" => Self::RoomUpdate,
            "error" => Self::Error,
            _ => Self::Extension(tag),
        }
    }
}

impl From<MessageType> for String {
    fn from(kind: MessageType) -> Self {
        kind.as_str().to_owned()
    }
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload of a `type:"error"` frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Machine-readable code, e.g. `room_full`.
    pub code: String,
    /// Human-readable description.
    pub message: String,
}

/// The wire envelope for all signaling traffic.
///
/// `from` and `timestamp` are stamped by the server on ingest and are
/// never trusted from the client. Unknown envelope fields land in
/// `extra` and are re-emitted on encode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalingMessage {
    /// Message type tag.
    #[serde(rename = "type")]
    pub kind: MessageType,
    /// Sender peer id, server-stamped.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub from: String,
    /// Directed recipient peer id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    /// Room scope.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room: Option<String>,
    /// Type-specific payload, opaque for extension types.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Ingest time, server-stamped.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "de_timestamp"
    )]
    pub timestamp: Option<DateTime<Utc>>,
    /// Unknown envelope fields, preserved verbatim.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Accept RFC3339 strings or epoch-millis numbers; servers always emit
/// RFC3339 but clients in the wild send both.
fn de_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error as _;

    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => DateTime::parse_from_rfc3339(&s)
            .map(|t| Some(t.with_timezone(&Utc)))
            .map_err(D::Error::custom),
        Some(Value::Number(n)) => n
            .as_i64()
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
            .map(Some)
            .ok_or_else(|| D::Error::custom("timestamp out of range")),
        Some(other) => Err(D::Error::custom(format!(
            "timestamp must be RFC3339 or epoch-millis, got {other}"
        ))),
    }
}

impl SignalingMessage {
    /// Bare envelope of the given type.
    #[must_use]
    pub fn new(kind: MessageType) -> Self {
        Self {
            kind,
            from: String::new(),
            to: None,
            room: None,
            data: None,
            timestamp: None,
            extra: Map::new(),
        }
    }

    /// Directed SDP envelope. The envelope type mirrors the SDP kind.
    #[must_use]
    pub fn session_description_to(to: impl Into<String>, desc: &SessionDescription) -> Self {
        let kind = match desc.kind {
            crate::types::SdpKind::Offer => MessageType::Offer,
            crate::types::SdpKind::Answer => MessageType::Answer,
            crate::types::SdpKind::Pranswer => MessageType::Pranswer,
            crate::types::SdpKind::Rollback => MessageType::Rollback,
        };
        let mut msg = Self::new(kind);
        msg.to = Some(to.into());
        msg.data = serde_json::to_value(desc).ok();
        msg
    }

    /// Directed ICE candidate envelope.
    #[must_use]
    pub fn ice_candidate_to(to: impl Into<String>, candidate: &IceCandidate) -> Self {
        let mut msg = Self::new(MessageType::IceCandidate);
        msg.to = Some(to.into());
        msg.data = serde_json::to_value(candidate).ok();
        msg
    }

    /// Directed end-of-negotiation hint.
    #[must_use]
    pub fn bye_to(to: impl Into<String>) -> Self {
        let mut msg = Self::new(MessageType::Bye);
        msg.to = Some(to.into());
        msg
    }

    /// Join request carrying the joining peer's self-description.
    #[must_use]
    pub fn join_room(room: impl Into<String>, info: &PeerInfo) -> Self {
        let mut msg = Self::new(MessageType::JoinRoom);
        msg.room = Some(room.into());
        msg.data = serde_json::to_value(info).ok();
        msg
    }

    /// Leave request.
    #[must_use]
    pub fn leave_room(room: impl Into<String>) -> Self {
        let mut msg = Self::new(MessageType::LeaveRoom);
        msg.room = Some(room.into());
        msg
    }

    /// Membership event announcing a new peer to existing members.
    #[must_use]
    pub fn peer_joined(room: impl Into<String>, info: &PeerInfo) -> Self {
        let mut msg = Self::new(MessageType::PeerJoined);
        msg.room = Some(room.into());
        msg.from = info.id.clone();
        msg.data = serde_json::to_value(info).ok();
        msg
    }

    /// Membership event announcing a departure. `from` names the leaver.
    #[must_use]
    pub fn peer_left(room: impl Into<String>, peer_id: impl Into<String>) -> Self {
        let mut msg = Self::new(MessageType::PeerLeft);
        msg.room = Some(room.into());
        msg.from = peer_id.into();
        msg
    }

    /// Room metadata and membership snapshot.
    #[must_use]
    pub fn room_update(info: &RoomInfo) -> Self {
        let mut msg = Self::new(MessageType::RoomUpdate);
        msg.room = Some(info.id.clone());
        msg.data = serde_json::to_value(info).ok();
        msg
    }

    /// Server-reported error frame.
    #[must_use]
    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        let mut msg = Self::new(MessageType::Error);
        msg.data = serde_json::to_value(ErrorInfo {
            code: code.into(),
            message: message.into(),
        })
        .ok();
        msg
    }

    /// Overwrite sender identity and ingest time. Applied by the server
    /// to every inbound frame before dispatch or forwarding.
    pub fn stamp(&mut self, from: impl Into<String>, now: DateTime<Utc>) {
        self.from = from.into();
        self.timestamp = Some(now);
    }

    /// Decode one JSON text frame.
    pub fn decode(text: &str) -> Result<Self, ProtoError> {
        let value: Value = serde_json::from_str(text)?;
        match value.get("type") {
            Some(Value::String(tag)) if !tag.is_empty() => {}
            _ => return Err(ProtoError::MissingType),
        }
        Ok(serde_json::from_value(value)?)
    }

    /// Encode to a JSON text frame.
    pub fn encode(&self) -> Result<String, ProtoError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Typed payload of an SDP envelope.
    pub fn session_description(&self) -> Result<SessionDescription, ProtoError> {
        if !matches!(
            self.kind,
            MessageType::Offer | MessageType::Answer | MessageType::Pranswer | MessageType::Rollback
        ) {
            return Err(ProtoError::UnexpectedType {
                expected: "offer/answer/pranswer/rollback",
                actual: self.kind.to_string(),
            });
        }
        self.parse_data()
    }

    /// Typed payload of an `ice-candidate` envelope.
    pub fn ice_candidate(&self) -> Result<IceCandidate, ProtoError> {
        self.expect_kind(&MessageType::IceCandidate, "ice-candidate")?;
        self.parse_data()
    }

    /// Typed payload of a `join-room` or `peer-joined` envelope.
    pub fn peer_info(&self) -> Result<PeerInfo, ProtoError> {
        if !matches!(self.kind, MessageType::JoinRoom | MessageType::PeerJoined) {
            return Err(ProtoError::UnexpectedType {
                expected: "join-room/peer-joined",
                actual: self.kind.to_string(),
            });
        }
        self.parse_data()
    }

    /// Typed payload of a `room-update` envelope.
    pub fn room_info(&self) -> Result<RoomInfo, ProtoError> {
        self.expect_kind(&MessageType::RoomUpdate, "room-update")?;
        self.parse_data()
    }

    /// Typed payload of an `error` envelope.
    pub fn error_info(&self) -> Result<ErrorInfo, ProtoError> {
        self.expect_kind(&MessageType::Error, "error")?;
        self.parse_data()
    }

    fn expect_kind(&self, kind: &MessageType, name: &'static str) -> Result<(), ProtoError> {
        if &self.kind == kind {
            Ok(())
        } else {
            Err(ProtoError::UnexpectedType {
                expected: name,
                actual: self.kind.to_string(),
            })
        }
    }

    fn parse_data<T: serde::de::DeserializeOwned>(&self) -> Result<T, ProtoError> {
        let data = self
            .data
            .as_ref()
            .ok_or_else(|| ProtoError::MissingPayload(self.kind.to_string()))?;
        Ok(serde_json::from_value(data.clone())?)
    }
}
