use rpcbus_socket::PeerId;

use crate::status::Rejection;

/// Errors reported by the bus context and its registries.
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    /// Socket-level error.
    #[error("socket error: {0}")]
    Socket(#[from] rpcbus_socket::SocketError),

    /// Value error.
    #[error("value error: {0}")]
    Value(#[from] rpcbus_value::ValueError),

    /// An object with this name is already registered.
    #[error("object {0:?} is already registered")]
    DuplicateObject(String),

    /// The object already has a method with this name.
    #[error("object {object:?} already has method {method:?}")]
    DuplicateMethod { object: String, method: String },

    /// No object with this name is registered.
    #[error("no object named {0:?}")]
    UnknownObject(String),

    /// No peer with this id is connected.
    #[error("unknown peer {0}")]
    UnknownPeer(PeerId),

    /// The name is held by another live peer.
    #[error("name {name:?} is already held by peer {holder}")]
    NameConflict { name: String, holder: PeerId },

    /// Object ids exhausted.
    #[error("object ids exhausted")]
    IdsExhausted,

    /// A blocking call was rejected or timed out.
    #[error("request rejected: {0}")]
    Rejected(Rejection),
}

pub type Result<T> = std::result::Result<T, BusError>;
