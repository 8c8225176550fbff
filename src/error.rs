use crate::config::ConfigError;
use crate::signaling::transport::SignalingError;
use thiserror::Error;

/// Failures surfaced by the node's public entry points. Session-level
/// failures never reach here; they close the session and show up as
/// `PeerEvent::Closed`.
#[derive(Debug, Error)]
pub enum Error {
    #[error("config: {0}")]
    Config(#[from] ConfigError),
    #[error("signaling: {0}")]
    Signaling(#[from] SignalingError),
    #[error("cannot connect to own identity")]
    SelfConnect,
    #[error("node is closed")]
    Closed,
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
