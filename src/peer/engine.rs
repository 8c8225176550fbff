use crate::peer::types::{NetworkCandidate, SessionDescription};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("webrtc: {0}")]
    WebRtc(#[from] webrtc::Error),
    #[error("unsupported: {0}")]
    Unsupported(String),
}

/// Connectivity as reported by the transport engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityState {
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

/// Asynchronous notifications from a transport engine to its session.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    CandidateDiscovered(NetworkCandidate),
    GatheringComplete,
    StateChanged(ConnectivityState),
    ChannelOpen(String),
    ChannelClosed(String),
}

pub type EngineEvents = mpsc::UnboundedSender<EngineEvent>;

/// Direct-transport collaborator driven by one `PeerSession`.
///
/// Setting a local description starts candidate gathering; discovered
/// candidates and connectivity changes come back as [`EngineEvent`]s.
#[async_trait]
pub trait TransportEngine: Send + Sync {
    async fn create_offer(&self) -> Result<SessionDescription, EngineError>;
    async fn create_answer(&self) -> Result<SessionDescription, EngineError>;
    async fn set_local_description(&self, desc: SessionDescription) -> Result<(), EngineError>;
    async fn set_remote_description(&self, desc: SessionDescription) -> Result<(), EngineError>;
    async fn add_candidate(&self, candidate: NetworkCandidate) -> Result<(), EngineError>;
    /// Releases transport resources. Must tolerate repeated calls.
    async fn close(&self) -> Result<(), EngineError>;
}

#[async_trait]
pub trait EngineFactory: Send + Sync {
    async fn create(
        &self,
        peer_id: &str,
        events: EngineEvents,
    ) -> Result<Arc<dyn TransportEngine>, EngineError>;
}
