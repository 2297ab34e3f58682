use std::time::Duration;

use rpcbus_transport::{poll_readiness, Readiness};

use crate::error::Result;
use crate::message::Message;

/// Locally scoped connection id. Never 0.
pub type PeerId = u32;

/// Destination of [`Socket::send`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Peer(PeerId),
    /// Every currently connected peer.
    Broadcast,
}

/// Something a [`Socket::poll`] observed.
#[derive(Debug, Clone, PartialEq)]
pub enum SocketEvent {
    /// A connection was accepted by the listener.
    Connected(PeerId),
    /// A connection closed, failed or was disconnected locally.
    Disconnected(PeerId),
    Message(PeerId, Message),
    /// A call arrived whose envelope could not be decoded, but whose
    /// sequence number could. The caller is still waiting for an answer.
    BadRequest(PeerId, u32),
}

/// Transport capability used by the bus context.
///
/// Implementations never block except inside [`poll`](Socket::poll), and
/// only for up to the given timeout.
pub trait Socket {
    /// Backend name for diagnostics.
    fn name(&self) -> &'static str;

    /// Bind for incoming connections.
    fn listen(&mut self, address: &str) -> Result<()>;

    /// Open a connection and return its id. No `Connected` event is reported
    /// for outgoing connections.
    fn connect(&mut self, address: &str) -> Result<PeerId>;

    /// Close a connection. A `Disconnected` event is reported on the next poll.
    fn disconnect(&mut self, peer: PeerId);

    /// Queue a message and try to write it out.
    ///
    /// A write failure closes the connection and returns the error. Broadcast
    /// never fails on individual peers.
    fn send(&mut self, target: Target, message: &Message) -> Result<()>;

    /// Flush queued output, accept connections and read incoming messages.
    /// `None` waits until something happens.
    fn poll(&mut self, timeout: Option<Duration>) -> Result<Vec<SocketEvent>>;

    /// Ids of the open connections.
    fn peers(&self) -> Vec<PeerId>;

    /// Descriptors whose readiness means [`poll`](Socket::poll) has work to
    /// do. Empty if the socket cannot be waited on from outside.
    fn readiness(&self) -> Vec<Readiness> {
        Vec::new()
    }

    /// Events are already queued; the next poll returns without waiting.
    fn has_queued_events(&self) -> bool {
        false
    }
}

/// Block until any of `sockets` has work or `timeout` elapses.
///
/// Returns `false` without waiting when none of them exposes descriptors;
/// the caller then has to wait inside [`Socket::poll`] instead.
pub fn wait_any(sockets: &[&dyn Socket], timeout: Duration) -> Result<bool> {
    if sockets.iter().any(|socket| socket.has_queued_events()) {
        return Ok(true);
    }
    let mut entries: Vec<Readiness> = sockets.iter().flat_map(|socket| socket.readiness()).collect();
    if entries.is_empty() {
        return Ok(false);
    }
    poll_readiness(&mut entries, Some(timeout))?;
    Ok(true)
}
