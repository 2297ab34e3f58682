//! Bus sockets for rpcbus.
//!
//! A [`Socket`] owns a listener and a set of numbered connections and moves
//! [`Message`]s over them. Two backends are built in:
//! - [`RawSocket`]: checksummed binary frames carrying `[kind, seq, payload]`
//! - [`JsonSocket`]: one JSON-RPC 2.0 object per line
//!
//! Both work over Unix domain sockets and TCP.

pub mod error;
pub mod id;
pub mod jsonrpc;
pub mod message;
pub mod stream_socket;
pub mod traits;
pub mod wire;

use std::fmt;
use std::str::FromStr;

use rpcbus_frame::FrameConfig;

pub use error::{Result, SocketError};
pub use id::IdPool;
pub use jsonrpc::JsonRpcEnvelope;
pub use message::{Message, MessageKind};
pub use stream_socket::{JsonSocket, RawSocket, StreamSocket};
pub use rpcbus_transport::Readiness;
pub use traits::{wait_any, PeerId, Socket, SocketEvent, Target};
pub use wire::{JsonWire, RawWire, Wire};

/// Built-in socket backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SocketKind {
    #[default]
    Raw,
    Json,
}

impl SocketKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SocketKind::Raw => RawWire::NAME,
            SocketKind::Json => JsonWire::NAME,
        }
    }
}

impl fmt::Display for SocketKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SocketKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "raw" => Ok(SocketKind::Raw),
            "json" => Ok(SocketKind::Json),
            other => Err(format!("unknown socket kind {other:?} (expected raw or json)")),
        }
    }
}

/// Open a socket of the given kind with default frame limits.
pub fn open_socket(kind: SocketKind) -> Box<dyn Socket> {
    open_socket_with_config(kind, FrameConfig::default())
}

pub fn open_socket_with_config(kind: SocketKind, config: FrameConfig) -> Box<dyn Socket> {
    match kind {
        SocketKind::Raw => Box::new(RawSocket::with_config(config)),
        SocketKind::Json => Box::new(JsonSocket::with_config(config)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_socket_kind_parse() {
        assert_eq!("raw".parse::<SocketKind>().unwrap(), SocketKind::Raw);
        assert_eq!("json".parse::<SocketKind>().unwrap(), SocketKind::Json);
        assert!("ws".parse::<SocketKind>().is_err());
    }

    #[test]
    fn test_open_socket_names() {
        assert_eq!(open_socket(SocketKind::Raw).name(), "raw");
        assert_eq!(open_socket(SocketKind::Json).name(), "json");
    }
}
