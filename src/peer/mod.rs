pub mod actor;
pub mod candidates;
pub mod connection;
pub mod data_channel;
pub mod engine;
pub mod registry;
pub mod session;
pub mod types;

pub use actor::{SessionContext, SessionExit, SessionHandle, SessionStatus};
pub use candidates::CandidateBuffer;
pub use connection::{WebRtcEngine, WebRtcEngineFactory, DATA_CHANNEL_LABEL};
pub use engine::{ConnectivityState, EngineError, EngineEvent, EngineEvents, EngineFactory, TransportEngine};
pub use registry::SessionRegistry;
pub use session::{Outcome, PeerSession, SessionError, SessionInput};
pub use types::{
    CloseReason, NetworkCandidate, PeerEvent, Role, SdpType, SessionDescription, SessionInfo,
    SessionState,
};
