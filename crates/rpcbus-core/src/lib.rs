//! The rpcbus protocol engine.
//!
//! A [`BusContext`] owns one socket together with:
//! - a [`PeerRegistry`] of connected endpoints and their well-known names
//! - an [`ObjectRegistry`] of locally callable objects
//! - the outbound request state machine and the incoming call table
//!
//! Everything runs on the caller's thread; [`BusContext::handle_events`]
//! performs one bounded tick. [`BusServer`] adds the system object and
//! [`Proxy`] relays between two sockets.

pub mod context;
pub mod error;
pub mod method;
pub mod object;
pub mod peer;
pub mod proxy;
pub mod request;
pub mod server;
pub mod status;

pub use context::{
    BusConfig, BusContext, SignalEvent, SubscriptionId, DEFAULT_REQUEST_TIMEOUT, NAME_SIGNAL,
};
pub use error::{BusError, Result};
pub use method::{signature_field, Handler, Invocation, Method, ParamDirection, Responder};
pub use object::{Object, ObjectRegistry};
pub use peer::{Peer, PeerRegistry};
pub use proxy::Proxy;
pub use request::{Request, RequestState};
pub use server::{
    publish_object, BusServer, METHOD_CALL, METHOD_LIST, METHOD_NICK, METHOD_PUBLISH,
    SERVER_OBJECT,
};
pub use status::{Rejection, Status};
