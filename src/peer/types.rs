use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SdpType {
    Offer,
    Answer,
}

/// Offer or answer as exchanged over signaling (`{"type": "offer", "sdp": "..."}`).
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    pub kind: SdpType,
    pub sdp: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpType::Offer,
            sdp: sdp.into(),
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpType::Answer,
            sdp: sdp.into(),
        }
    }
}

/// One trickled ICE candidate, in the browser's JSON shape.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct NetworkCandidate {
    pub candidate: String,
    #[serde(rename = "sdpMid", default, skip_serializing_if = "Option::is_none")]
    pub sdp_mid: Option<String>,
    #[serde(
        rename = "sdpMLineIndex",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub sdp_mline_index: Option<u16>,
    #[serde(
        rename = "usernameFragment",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub username_fragment: Option<String>,
}

impl NetworkCandidate {
    pub fn new(candidate: impl Into<String>) -> Self {
        Self {
            candidate: candidate.into(),
            sdp_mid: None,
            sdp_mline_index: None,
            username_fragment: None,
        }
    }
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Unresolved,
    Offerer,
    Answerer,
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionState {
    New,
    OfferPending,
    AwaitingAnswer,
    NegotiatingIce,
    Connected,
    Closed,
}

impl SessionState {
    /// True while this side's own offer is outstanding.
    pub fn is_offering(self) -> bool {
        matches!(self, SessionState::OfferPending | SessionState::AwaitingAnswer)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::New => "NEW",
            SessionState::OfferPending => "OFFER_PENDING",
            SessionState::AwaitingAnswer => "AWAITING_ANSWER",
            SessionState::NegotiatingIce => "NEGOTIATING_ICE",
            SessionState::Connected => "CONNECTED",
            SessionState::Closed => "CLOSED",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptionSlot {
    Local,
    Remote,
}

impl fmt::Display for DescriptionSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DescriptionSlot::Local => f.write_str("local"),
            DescriptionSlot::Remote => f.write_str("remote"),
        }
    }
}

/// Why a session reached `CLOSED`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// Closed by the local application or node shutdown.
    Local,
    /// The counterpart answered our offer with `NO_OFFER`.
    Rejected,
    /// Lost offer arbitration; a fresh answering session replaced it.
    Superseded,
    TimedOut,
    Failed(String),
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloseReason::Local => f.write_str("closed locally"),
            CloseReason::Rejected => f.write_str("offer rejected by peer"),
            CloseReason::Superseded => f.write_str("superseded by peer offer"),
            CloseReason::TimedOut => f.write_str("negotiation timed out"),
            CloseReason::Failed(reason) => write!(f, "failed: {reason}"),
        }
    }
}

/// Notifications surfaced to the application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerEvent {
    Connected { peer: String },
    ChannelOpen { peer: String, label: String },
    Closed { peer: String, reason: CloseReason },
}

/// Snapshot of one registered session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub peer_id: String,
    pub role: Role,
    pub state: SessionState,
    pub started_at: chrono::DateTime<chrono::Utc>,
}
