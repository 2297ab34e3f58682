use std::collections::BTreeMap;
use std::marker::PhantomData;
use std::os::fd::AsRawFd;
use std::time::Duration;

use rpcbus_frame::{FrameConfig, FrameError, FrameReader, FrameWriter};
use rpcbus_transport::{poll_readiness, Address, BusListener, BusStream, Readiness};
use tracing::{debug, warn};

use crate::error::{Result, SocketError};
use crate::id::IdPool;
use crate::message::Message;
use crate::traits::{PeerId, Socket, SocketEvent, Target};
use crate::wire::{JsonWire, RawWire, Wire};

/// Framed binary socket.
pub type RawSocket = StreamSocket<RawWire>;

/// Line-delimited JSON-RPC socket.
pub type JsonSocket = StreamSocket<JsonWire>;

struct Connection<W: Wire> {
    reader: FrameReader<BusStream, W::Decoder>,
    writer: FrameWriter<BusStream>,
}

/// A [`Socket`] over Unix domain or TCP streams, generic over the wire format.
///
/// Holds at most one listener and any number of connections, each with its
/// own read buffer and transmit queue.
pub struct StreamSocket<W: Wire> {
    config: FrameConfig,
    listener: Option<BusListener>,
    connections: BTreeMap<PeerId, Connection<W>>,
    ids: IdPool,
    events: Vec<SocketEvent>,
    _wire: PhantomData<W>,
}

impl<W: Wire> StreamSocket<W> {
    pub fn new() -> Self {
        Self::with_config(FrameConfig::default())
    }

    pub fn with_config(config: FrameConfig) -> Self {
        Self {
            config,
            listener: None,
            connections: BTreeMap::new(),
            ids: IdPool::new(),
            events: Vec::new(),
            _wire: PhantomData,
        }
    }

    /// Address the listener is bound to, if listening.
    pub fn local_address(&self) -> Option<Address> {
        self.listener.as_ref().and_then(BusListener::local_address)
    }

    fn register(&mut self, stream: BusStream) -> Result<PeerId> {
        stream.set_nonblocking(true)?;
        let writer = stream.try_clone()?;
        let id = self.ids.allocate(0).ok_or(SocketError::IdsExhausted)?;
        self.connections.insert(
            id,
            Connection {
                reader: FrameReader::new(stream, W::decoder(self.config.max_payload_size)),
                writer: FrameWriter::new(writer),
            },
        );
        Ok(id)
    }

    /// Close a connection and queue its `Disconnected` event.
    fn drop_connection(&mut self, id: PeerId) {
        if let Some(conn) = self.connections.remove(&id) {
            conn.reader.get_ref().shutdown();
            self.ids.free(id);
            debug!(peer = id, wire = W::NAME, "connection closed");
            self.events.push(SocketEvent::Disconnected(id));
        }
    }

    fn accept_pending(&mut self) {
        let Some(listener) = &self.listener else {
            return;
        };
        let mut accepted = Vec::new();
        loop {
            match listener.try_accept() {
                Ok(Some(stream)) => accepted.push(stream),
                Ok(None) => break,
                Err(err) => {
                    warn!(error = %err, "accept failed");
                    break;
                }
            }
        }

        for stream in accepted {
            if let Some((uid, gid, pid)) = stream.peer_credentials() {
                debug!(uid, gid, pid, "peer credentials");
            }
            match self.register(stream) {
                Ok(id) => {
                    debug!(peer = id, wire = W::NAME, "accepted connection");
                    self.events.push(SocketEvent::Connected(id));
                }
                Err(err) => warn!(error = %err, "dropping accepted connection"),
            }
        }
    }

    fn read_connection(&mut self, id: PeerId) {
        let Some(conn) = self.connections.get_mut(&id) else {
            return;
        };
        let mut items = Vec::new();
        let outcome = drain(&mut conn.reader, &mut items);

        for item in items {
            match W::decode(&item) {
                Ok(message) => self.events.push(SocketEvent::Message(id, message)),
                Err(err) => match W::request_seq(&item) {
                    Some(seq) => {
                        warn!(peer = id, seq, error = %err, "rejecting malformed call");
                        self.events.push(SocketEvent::BadRequest(id, seq));
                    }
                    None => warn!(peer = id, error = %err, "dropping malformed message"),
                },
            }
        }

        match outcome {
            Ok(()) => {}
            Err(FrameError::ConnectionClosed) => {
                debug!(peer = id, "peer closed connection");
                self.drop_connection(id);
            }
            Err(err) => {
                warn!(peer = id, error = %err, "framing error, closing connection");
                self.drop_connection(id);
            }
        }
    }

    fn flush_connection(&mut self, id: PeerId) -> Result<()> {
        let Some(conn) = self.connections.get_mut(&id) else {
            return Err(SocketError::UnknownPeer(id));
        };
        if let Err(err) = conn.writer.flush_pending() {
            debug!(peer = id, error = %err, "write failed");
            self.drop_connection(id);
            return Err(err.into());
        }
        Ok(())
    }
}

fn drain<D: rpcbus_frame::Decoder>(
    reader: &mut FrameReader<BusStream, D>,
    items: &mut Vec<bytes::Bytes>,
) -> rpcbus_frame::Result<()> {
    reader.fill()?;
    while let Some(item) = reader.next_frame()? {
        items.push(item);
    }
    Ok(())
}

impl<W: Wire> Default for StreamSocket<W> {
    fn default() -> Self {
        Self::new()
    }
}

impl<W: Wire> Socket for StreamSocket<W> {
    fn name(&self) -> &'static str {
        W::NAME
    }

    fn listen(&mut self, address: &str) -> Result<()> {
        if self.listener.is_some() {
            return Err(SocketError::AlreadyListening);
        }
        let address = Address::parse(address)?;
        self.listener = Some(BusListener::bind(&address)?);
        Ok(())
    }

    fn connect(&mut self, address: &str) -> Result<PeerId> {
        let address = Address::parse(address)?;
        let stream = BusStream::connect(&address)?;
        let id = self.register(stream)?;
        debug!(peer = id, %address, wire = W::NAME, "connection opened");
        Ok(id)
    }

    fn disconnect(&mut self, peer: PeerId) {
        self.drop_connection(peer);
    }

    fn send(&mut self, target: Target, message: &Message) -> Result<()> {
        let bytes = W::encode(message)?;
        match target {
            Target::Peer(id) => {
                let conn = self
                    .connections
                    .get_mut(&id)
                    .ok_or(SocketError::UnknownPeer(id))?;
                conn.writer.queue_bytes(bytes);
                self.flush_connection(id)
            }
            Target::Broadcast => {
                let ids: Vec<PeerId> = self.connections.keys().copied().collect();
                for id in ids {
                    if let Some(conn) = self.connections.get_mut(&id) {
                        conn.writer.queue_bytes(bytes.clone());
                    }
                    let _ = self.flush_connection(id);
                }
                Ok(())
            }
        }
    }

    fn poll(&mut self, timeout: Option<Duration>) -> Result<Vec<SocketEvent>> {
        let ids: Vec<PeerId> = self.connections.keys().copied().collect();
        for id in &ids {
            let _ = self.flush_connection(*id);
        }

        let mut entries = self.readiness();
        let ids: Vec<PeerId> = self.connections.keys().copied().collect();

        let timeout = if self.events.is_empty() {
            timeout
        } else {
            Some(Duration::ZERO)
        };
        poll_readiness(&mut entries, timeout)?;

        let mut entries = entries.into_iter();
        if self.listener.is_some() {
            if let Some(entry) = entries.next() {
                if entry.readable {
                    self.accept_pending();
                }
            }
        }

        for (id, entry) in ids.into_iter().zip(entries) {
            if entry.readable || entry.closed {
                self.read_connection(id);
            }
            if entry.writable && self.connections.contains_key(&id) {
                let _ = self.flush_connection(id);
            }
        }

        Ok(std::mem::take(&mut self.events))
    }

    fn peers(&self) -> Vec<PeerId> {
        self.connections.keys().copied().collect()
    }

    /// Listener first, then one entry per connection in id order.
    fn readiness(&self) -> Vec<Readiness> {
        let mut entries = Vec::with_capacity(self.connections.len() + 1);
        if let Some(listener) = &self.listener {
            entries.push(Readiness::new(listener.as_raw_fd(), false));
        }
        for conn in self.connections.values() {
            entries.push(Readiness::new(
                conn.reader.get_ref().as_raw_fd(),
                conn.writer.has_pending(),
            ));
        }
        entries
    }

    fn has_queued_events(&self) -> bool {
        !self.events.is_empty()
    }
}
