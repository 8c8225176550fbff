use crate::peer::types::{NetworkCandidate, SessionDescription};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    NewConnection,
    NoOffer,
    Offer,
    Answer,
    IceCandidate,
    ShareIceCandidate,
}

impl MessageType {
    pub fn as_str(self) -> &'static str {
        match self {
            MessageType::NewConnection => "NEW_CONNECTION",
            MessageType::NoOffer => "NO_OFFER",
            MessageType::Offer => "OFFER",
            MessageType::Answer => "ANSWER",
            MessageType::IceCandidate => "ICE_CANDIDATE",
            MessageType::ShareIceCandidate => "SHARE_ICE_CANDIDATE",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Announce {
    pub id: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub peers: Vec<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PeerRef {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct OfferPayload {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    pub offer: SessionDescription,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct AnswerPayload {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    pub answer: SessionDescription,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct CandidatePayload {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(rename = "iceCandidate")]
    pub ice_candidate: NetworkCandidate,
}

/// Wire envelope: `{"type": "<MESSAGE_TYPE>", "payload": {...}}`.
///
/// `id` is always the sender. `target`, when present, names the only peer
/// that should act on the message.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SignalingMessage {
    NewConnection(Announce),
    NoOffer(PeerRef),
    Offer(OfferPayload),
    Answer(AnswerPayload),
    IceCandidate(CandidatePayload),
    ShareIceCandidate(PeerRef),
}

impl SignalingMessage {
    pub fn new_connection(id: &str, peers: Vec<String>) -> Self {
        SignalingMessage::NewConnection(Announce {
            id: id.to_string(),
            peers,
        })
    }

    pub fn no_offer(id: &str, target: &str) -> Self {
        SignalingMessage::NoOffer(PeerRef {
            id: id.to_string(),
            target: Some(target.to_string()),
        })
    }

    pub fn offer(id: &str, target: &str, offer: SessionDescription) -> Self {
        SignalingMessage::Offer(OfferPayload {
            id: id.to_string(),
            target: Some(target.to_string()),
            offer,
        })
    }

    pub fn answer(id: &str, target: &str, answer: SessionDescription) -> Self {
        SignalingMessage::Answer(AnswerPayload {
            id: id.to_string(),
            target: Some(target.to_string()),
            answer,
        })
    }

    pub fn ice_candidate(id: &str, target: &str, ice_candidate: NetworkCandidate) -> Self {
        SignalingMessage::IceCandidate(CandidatePayload {
            id: id.to_string(),
            target: Some(target.to_string()),
            ice_candidate,
        })
    }

    pub fn share_ice_candidate(id: &str, target: &str) -> Self {
        SignalingMessage::ShareIceCandidate(PeerRef {
            id: id.to_string(),
            target: Some(target.to_string()),
        })
    }

    pub fn kind(&self) -> MessageType {
        match self {
            SignalingMessage::NewConnection(_) => MessageType::NewConnection,
            SignalingMessage::NoOffer(_) => MessageType::NoOffer,
            SignalingMessage::Offer(_) => MessageType::Offer,
            SignalingMessage::Answer(_) => MessageType::Answer,
            SignalingMessage::IceCandidate(_) => MessageType::IceCandidate,
            SignalingMessage::ShareIceCandidate(_) => MessageType::ShareIceCandidate,
        }
    }

    /// Identity of the sending peer.
    pub fn sender(&self) -> &str {
        match self {
            SignalingMessage::NewConnection(p) => &p.id,
            SignalingMessage::NoOffer(p) | SignalingMessage::ShareIceCandidate(p) => &p.id,
            SignalingMessage::Offer(p) => &p.id,
            SignalingMessage::Answer(p) => &p.id,
            SignalingMessage::IceCandidate(p) => &p.id,
        }
    }

    pub fn target(&self) -> Option<&str> {
        match self {
            SignalingMessage::NewConnection(_) => None,
            SignalingMessage::NoOffer(p) | SignalingMessage::ShareIceCandidate(p) => {
                p.target.as_deref()
            }
            SignalingMessage::Offer(p) => p.target.as_deref(),
            SignalingMessage::Answer(p) => p.target.as_deref(),
            SignalingMessage::IceCandidate(p) => p.target.as_deref(),
        }
    }

    /// True when the message may be acted on by `local_id`.
    pub fn is_for(&self, local_id: &str) -> bool {
        self.sender() != local_id && self.target().map_or(true, |t| t == local_id)
    }
}
