//! Stream plumbing for rpcbus.
//!
//! Provides non-blocking listeners and connected streams over:
//! - Unix domain sockets (filesystem paths)
//! - TCP (`host:port`)
//!
//! plus a thin readiness poll. This is the lowest layer of rpcbus; framing
//! and the bus protocol build on the [`BusStream`] type provided here.

pub mod address;
pub mod error;
pub mod listener;
pub mod poll;
pub mod stream;
pub mod uds;

pub use address::Address;
pub use error::{Result, TransportError};
pub use listener::BusListener;
pub use poll::{poll_readiness, Readiness};
pub use stream::BusStream;
pub use uds::UnixDomainSocket;
