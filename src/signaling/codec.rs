use crate::peer::types::{SdpType, SessionDescription};
use crate::sdp;
use crate::signaling::message::{MessageType, SignalingMessage};
use serde_json::Value;
use thiserror::Error;

const KNOWN_TYPES: [MessageType; 6] = [
    MessageType::NewConnection,
    MessageType::NoOffer,
    MessageType::Offer,
    MessageType::Answer,
    MessageType::IceCandidate,
    MessageType::ShareIceCandidate,
];

/// A signaling message that cannot be dispatched.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("not a json object: {0}")]
    NotJson(#[source] serde_json::Error),
    #[error("envelope has no type")]
    MissingType,
    #[error("unknown message type {0}")]
    UnknownType(String),
    #[error("invalid {kind} payload: {source}")]
    InvalidPayload {
        kind: MessageType,
        #[source]
        source: serde_json::Error,
    },
    #[error("{kind} payload has an empty id")]
    EmptyId { kind: MessageType },
    #[error("{kind} carries a {found:?} description")]
    WrongDescription { kind: MessageType, found: SdpType },
    #[error("serialize: {0}")]
    Serialize(#[source] serde_json::Error),
}

/// Serializes the envelope. SDP bodies are sanitized on the way out.
pub fn encode(message: &SignalingMessage) -> Result<String, CodecError> {
    let wire = match message {
        SignalingMessage::Offer(payload) => {
            let mut payload = payload.clone();
            payload.offer = sanitized(&payload.offer);
            SignalingMessage::Offer(payload)
        }
        SignalingMessage::Answer(payload) => {
            let mut payload = payload.clone();
            payload.answer = sanitized(&payload.answer);
            SignalingMessage::Answer(payload)
        }
        other => other.clone(),
    };
    serde_json::to_string(&wire).map_err(CodecError::Serialize)
}

/// Parses and validates one envelope.
///
/// Descriptions are returned as received; the session desanitizes them
/// before they reach the transport engine.
pub fn decode(wire: &str) -> Result<SignalingMessage, CodecError> {
    let value: Value = serde_json::from_str(wire).map_err(CodecError::NotJson)?;
    let type_name = value
        .get("type")
        .and_then(Value::as_str)
        .ok_or(CodecError::MissingType)?;
    let kind = KNOWN_TYPES
        .iter()
        .copied()
        .find(|kind| kind.as_str() == type_name)
        .ok_or_else(|| CodecError::UnknownType(type_name.to_string()))?;

    let message: SignalingMessage = serde_json::from_value(value)
        .map_err(|source| CodecError::InvalidPayload { kind, source })?;
    validate(&message)?;
    Ok(message)
}

fn validate(message: &SignalingMessage) -> Result<(), CodecError> {
    let kind = message.kind();
    if message.sender().trim().is_empty() {
        return Err(CodecError::EmptyId { kind });
    }
    match message {
        SignalingMessage::Offer(p) if p.offer.kind != SdpType::Offer => {
            Err(CodecError::WrongDescription {
                kind,
                found: p.offer.kind,
            })
        }
        SignalingMessage::Answer(p) if p.answer.kind != SdpType::Answer => {
            Err(CodecError::WrongDescription {
                kind,
                found: p.answer.kind,
            })
        }
        _ => Ok(()),
    }
}

fn sanitized(desc: &SessionDescription) -> SessionDescription {
    SessionDescription {
        kind: desc.kind,
        sdp: sdp::sanitize(&desc.sdp),
    }
}
