//! SDP and ICE Envelope Types
//!
//! Opaque payloads produced by the surrounding WebRTC stack. The
//! signaling core transports them unmodified and never parses the SDP
//! or candidate strings.

use serde::{Deserialize, Serialize};

/// SDP message kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpKind {
    /// Initial or renegotiation offer.
    Offer,
    /// Final answer.
    Answer,
    /// Provisional answer.
    Pranswer,
    /// Roll back the in-progress negotiation.
    Rollback,
}

/// An SDP blob with its kind tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    /// Kind tag, mirroring the envelope type for offer/answer.
    #[serde(rename = "type")]
    pub kind: SdpKind,
    /// The SDP text, opaque to the signaling core.
    pub sdp: String,
}

impl SessionDescription {
    /// Wrap an offer SDP.
    #[must_use]
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Offer,
            sdp: sdp.into(),
        }
    }

    /// Wrap an answer SDP.
    #[must_use]
    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Answer,
            sdp: sdp.into(),
        }
    }
}

/// One ICE candidate in transit. Field names follow the W3C dictionary
/// so browser peers can relay candidates verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceCandidate {
    /// The candidate string.
    pub candidate: String,
    /// Media section identifier.
    #[serde(rename = "sdpMid", default)]
    pub sdp_mid: String,
    /// Media line index within the SDP.
    #[serde(rename = "sdpMLineIndex", default)]
    pub sdp_m_line_index: u16,
}
