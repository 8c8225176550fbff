//! Peer-to-peer connection negotiation over a relay signaling server.
//!
//! A node subscribes to the server's push channel, announces itself with a
//! random identity, and runs one negotiation session per counterpart until
//! a direct WebRTC connection is up.

pub mod config;
pub mod error;
pub mod identity;
pub mod logger;
pub mod node;
pub mod peer;
pub mod sdp;
pub mod signaling;
pub mod utils;

pub use config::{Config, ConfigError, IceServerConfig, LogConfig};
pub use error::{Error, Result};
pub use identity::Identity;
pub use node::{start, start_with, Handle};
pub use peer::{
    CloseReason, EngineFactory, NetworkCandidate, PeerEvent, Role, SessionDescription,
    SessionInfo, SessionState, TransportEngine,
};
pub use signaling::{PushChannel, RequestChannel, SignalingMessage};
