//! Lightweight local RPC bus.
//!
//! Processes connect over Unix domain sockets (or TCP), announce a
//! well-known name, export objects with named methods and call each other's
//! methods or broadcast signals. A bus server adds a system object through
//! which clients list, publish and call objects, so it can act as a hub.
//!
//! # Crate Structure
//!
//! - [`value`]: Self-describing value model and its binary/JSON encodings
//! - [`transport`]: Unix socket and TCP streams with readiness polling
//! - [`frame`]: Checksummed binary frames and newline-delimited JSON
//! - [`socket`]: Message envelopes and the raw/JSON socket implementations
//! - [`bus`]: Bus context, objects, requests, the system object and the proxy

/// Re-export value types.
pub mod value {
    pub use rpcbus_value::*;
}

/// Re-export transport types.
pub mod transport {
    pub use rpcbus_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use rpcbus_frame::*;
}

/// Re-export socket types.
pub mod socket {
    pub use rpcbus_socket::*;
}

/// Re-export bus types.
pub mod bus {
    pub use rpcbus_core::*;
}

pub use rpcbus_core::{BusContext, BusServer, Method, Object, Request, Status};
pub use rpcbus_socket::SocketKind;
pub use rpcbus_value::Value;
