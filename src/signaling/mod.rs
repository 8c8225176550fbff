pub mod codec;
pub mod message;
pub mod transport;

pub use codec::{decode, encode, CodecError};
pub use message::{MessageType, SignalingMessage};
pub use transport::{
    Endpoints, HttpRequestChannel, PushChannel, RequestChannel, SignalingError, WebSocketPush,
};
