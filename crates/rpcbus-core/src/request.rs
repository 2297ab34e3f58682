use std::fmt;
use std::time::{Duration, Instant};

use rpcbus_socket::PeerId;
use rpcbus_value::Value;

use crate::context::BusContext;
use crate::status::Rejection;

pub(crate) type ResolveFn = Box<dyn FnOnce(&mut BusContext, Value)>;
pub(crate) type RejectFn = Box<dyn FnOnce(&mut BusContext, Rejection)>;

/// Lifecycle of an outbound request.
///
/// ```text
/// Created -> Queued -> Sent -> Resolved | Rejected | TimedOut
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    Created,
    /// Waiting for the destination name to resolve to a peer.
    Queued,
    /// On the wire, waiting for a reply.
    Sent,
    Resolved,
    Rejected,
    TimedOut,
}

impl RequestState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RequestState::Resolved | RequestState::Rejected | RequestState::TimedOut
        )
    }
}

/// An outbound method call addressed to a peer by well-known name.
///
/// Exactly one of the resolve and reject callbacks runs, at most once.
pub struct Request {
    pub(crate) destination: String,
    pub(crate) object: String,
    pub(crate) method: String,
    pub(crate) argument: Value,
    pub(crate) timeout: Option<Duration>,
    pub(crate) state: RequestState,
    on_resolve: Option<ResolveFn>,
    on_reject: Option<RejectFn>,
}

impl Request {
    pub fn new(
        destination: impl Into<String>,
        object: impl Into<String>,
        method: impl Into<String>,
        argument: Value,
    ) -> Self {
        Self {
            destination: destination.into(),
            object: object.into(),
            method: method.into(),
            argument,
            timeout: None,
            state: RequestState::Created,
            on_resolve: None,
            on_reject: None,
        }
    }

    pub fn on_resolve(mut self, callback: impl FnOnce(&mut BusContext, Value) + 'static) -> Self {
        self.on_resolve = Some(Box::new(callback));
        self
    }

    pub fn on_reject(
        mut self,
        callback: impl FnOnce(&mut BusContext, Rejection) + 'static,
    ) -> Self {
        self.on_reject = Some(Box::new(callback));
        self
    }

    /// Override the context's default request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn destination(&self) -> &str {
        &self.destination
    }

    pub fn object(&self) -> &str {
        &self.object
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn argument(&self) -> &Value {
        &self.argument
    }

    pub fn state(&self) -> RequestState {
        self.state
    }

    pub(crate) fn take_callbacks(&mut self) -> (Option<ResolveFn>, Option<RejectFn>) {
        (self.on_resolve.take(), self.on_reject.take())
    }
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("destination", &self.destination)
            .field("object", &self.object)
            .field("method", &self.method)
            .field("argument", &self.argument)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

/// A request owned by the context until it reaches a terminal state.
#[derive(Debug)]
pub(crate) struct Outbound {
    pub seq: u32,
    pub deadline: Instant,
    pub peer: Option<PeerId>,
    pub request: Request,
}

/// An incoming call awaiting its answer.
#[derive(Debug)]
pub(crate) struct Incoming {
    pub peer: PeerId,
    pub seq: u32,
    pub object: String,
    pub method: String,
    pub completed: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_fields() {
        let request = Request::new("ubus", "/ubus/server", "ubus.server.list", Value::table())
            .timeout(Duration::from_millis(250));
        assert_eq!(request.destination(), "ubus");
        assert_eq!(request.object(), "/ubus/server");
        assert_eq!(request.method(), "ubus.server.list");
        assert_eq!(request.timeout, Some(Duration::from_millis(250)));
        assert_eq!(request.state(), RequestState::Created);
    }

    #[test]
    fn test_callbacks_can_be_taken_once() {
        let mut request = Request::new("p", "/o", "m", Value::Null)
            .on_resolve(|_, _| {})
            .on_reject(|_, _| {});
        let (resolve, reject) = request.take_callbacks();
        assert!(resolve.is_some() && reject.is_some());
        let (resolve, reject) = request.take_callbacks();
        assert!(resolve.is_none() && reject.is_none());
    }

    #[test]
    fn test_terminal_states() {
        assert!(!RequestState::Queued.is_terminal());
        assert!(!RequestState::Sent.is_terminal());
        assert!(RequestState::TimedOut.is_terminal());
    }
}
