use crate::traits::PeerId;

/// Errors that can occur in socket operations.
#[derive(Debug, thiserror::Error)]
pub enum SocketError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] rpcbus_transport::TransportError),

    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] rpcbus_frame::FrameError),

    /// Value encoding or decoding error.
    #[error("value error: {0}")]
    Value(#[from] rpcbus_value::ValueError),

    /// JSON serialization/deserialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// No connection with this id exists.
    #[error("unknown peer {0}")]
    UnknownPeer(PeerId),

    /// A decoded payload is not a valid message envelope.
    #[error("malformed message: {0}")]
    Malformed(String),

    /// Every connection id is in use.
    #[error("connection ids exhausted")]
    IdsExhausted,

    /// `listen` was called twice on the same socket.
    #[error("socket is already listening")]
    AlreadyListening,
}

pub type Result<T> = std::result::Result<T, SocketError>;
