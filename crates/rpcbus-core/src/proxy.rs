use std::collections::BTreeMap;
use std::time::Duration;

use rpcbus_socket::{wait_any, Message, PeerId, Socket, SocketEvent, Target};
use tracing::{debug, warn};

use crate::error::Result;
use crate::status::Status;

/// Relays messages between clients on one socket and an upstream bus.
///
/// Each inbound peer gets its own outbound connection, opened when the
/// peer sends its first message. Message contents are never inspected;
/// only peer ids are translated.
pub struct Proxy {
    inbound: Box<dyn Socket>,
    outbound: Box<dyn Socket>,
    upstream: String,
    by_inbound: BTreeMap<PeerId, PeerId>,
    by_outbound: BTreeMap<PeerId, PeerId>,
}

impl Proxy {
    pub fn new(inbound: Box<dyn Socket>, outbound: Box<dyn Socket>, upstream: impl Into<String>) -> Self {
        Self {
            inbound,
            outbound,
            upstream: upstream.into(),
            by_inbound: BTreeMap::new(),
            by_outbound: BTreeMap::new(),
        }
    }

    pub fn listen(&mut self, address: &str) -> Result<()> {
        self.inbound.listen(address)?;
        debug!(%address, upstream = %self.upstream, "proxy listening");
        Ok(())
    }

    /// Number of inbound peers with an open upstream leg.
    pub fn pairings(&self) -> usize {
        self.by_inbound.len()
    }

    /// Upstream connection id for an inbound peer.
    pub fn outbound_for(&self, inbound: PeerId) -> Option<PeerId> {
        self.by_inbound.get(&inbound).copied()
    }

    /// One tick: wait up to `timeout` for traffic on either side, then relay
    /// in both directions.
    pub fn handle_events(&mut self, timeout: Duration) -> Result<()> {
        let waited = wait_any(&[self.inbound.as_ref(), self.outbound.as_ref()], timeout)?;
        // Sockets without descriptors fall back to waiting on the inbound side.
        let slice = if waited { Duration::ZERO } else { timeout };

        for event in self.inbound.poll(Some(slice))? {
            match event {
                SocketEvent::Connected(peer) => debug!(peer, "proxy client connected"),
                SocketEvent::Disconnected(peer) => {
                    debug!(peer, "proxy client disconnected");
                    self.unpair_inbound(peer);
                }
                SocketEvent::Message(peer, message) => self.relay_up(peer, &message),
                SocketEvent::BadRequest(peer, seq) => reject(self.inbound.as_mut(), peer, seq),
            }
        }

        for event in self.outbound.poll(Some(Duration::ZERO))? {
            match event {
                SocketEvent::Connected(_) => {}
                SocketEvent::Disconnected(out) => {
                    if let Some(peer) = self.by_outbound.remove(&out) {
                        debug!(peer, upstream = out, "upstream leg closed");
                        self.by_inbound.remove(&peer);
                    }
                }
                SocketEvent::Message(out, message) => self.relay_down(out, &message),
                SocketEvent::BadRequest(out, seq) => reject(self.outbound.as_mut(), out, seq),
            }
        }
        Ok(())
    }

    fn relay_up(&mut self, peer: PeerId, message: &Message) {
        let out = match self.by_inbound.get(&peer) {
            Some(out) => *out,
            None => match self.outbound.connect(&self.upstream) {
                Ok(out) => {
                    debug!(peer, upstream = out, "upstream leg opened");
                    self.by_inbound.insert(peer, out);
                    self.by_outbound.insert(out, peer);
                    out
                }
                Err(err) => {
                    warn!(peer, error = %err, upstream = %self.upstream, "upstream connect failed");
                    self.inbound.disconnect(peer);
                    return;
                }
            },
        };
        if let Err(err) = self.outbound.send(Target::Peer(out), message) {
            warn!(peer, upstream = out, error = %err, "relay upstream failed");
            self.unpair_inbound(peer);
        }
    }

    fn relay_down(&mut self, out: PeerId, message: &Message) {
        let Some(&peer) = self.by_outbound.get(&out) else {
            debug!(upstream = out, "dropping message for unpaired leg");
            return;
        };
        if let Err(err) = self.inbound.send(Target::Peer(peer), message) {
            warn!(peer, upstream = out, error = %err, "relay downstream failed");
            self.unpair_inbound(peer);
        }
    }

    /// Tear down a pairing and close its upstream leg.
    fn unpair_inbound(&mut self, peer: PeerId) {
        if let Some(out) = self.by_inbound.remove(&peer) {
            self.by_outbound.remove(&out);
            self.outbound.disconnect(out);
        }
    }
}

/// Answer an undecodable call on the leg it came from.
fn reject(socket: &mut dyn Socket, peer: PeerId, seq: u32) {
    let reply = Message::error(seq, Status::InvalidCommand.error_value(None, None));
    if let Err(err) = socket.send(Target::Peer(peer), &reply) {
        debug!(peer, seq, error = %err, "rejection not delivered");
    }
}

impl std::fmt::Debug for Proxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Proxy")
            .field("inbound", &self.inbound.name())
            .field("outbound", &self.outbound.name())
            .field("upstream", &self.upstream)
            .field("pairings", &self.by_inbound.len())
            .finish()
    }
}
