use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;
use std::time::{Duration, Instant};

use rpcbus_socket::{open_socket, Message, MessageKind, PeerId, Socket, SocketEvent, SocketKind, Target};
use rpcbus_value::Value;
use tracing::{debug, warn};

use crate::error::{BusError, Result};
use crate::method::{Handler, Invocation, Method, Responder};
use crate::object::{Object, ObjectRegistry};
use crate::peer::{Peer, PeerRegistry};
use crate::request::{Incoming, Outbound, Request, RequestState};
use crate::status::{Rejection, Status};

/// Signal a peer sends right after connecting to announce its well-known name.
pub const NAME_SIGNAL: &str = "ubus.peer.name";

/// Default time a request may wait for a reply.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

const BLOCKING_POLL_SLICE: Duration = Duration::from_millis(50);

/// Context configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusConfig {
    /// Default deadline for outbound requests. Default: 5 s.
    pub request_timeout: Duration,
    /// How long [`BusContext::handle_events`] waits for socket activity. Default: 0.
    pub poll_timeout: Duration,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            poll_timeout: Duration::ZERO,
        }
    }
}

/// Subscription handle returned by [`BusContext::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriptionId(u64);

/// A signal delivered to subscribers.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalEvent {
    pub peer: PeerId,
    pub name: String,
    pub args: Vec<Value>,
}

type SignalHandler = Rc<dyn Fn(&mut BusContext, &SignalEvent)>;

/// One bus endpoint: a socket plus the peers, objects and requests that
/// travel over it.
///
/// Single-threaded. All callbacks run inside [`handle_events`](Self::handle_events)
/// or the call that triggered them, with the context passed back in.
pub struct BusContext {
    name: String,
    socket: Box<dyn Socket>,
    config: BusConfig,
    peers: PeerRegistry,
    objects: ObjectRegistry,
    unsent: BTreeMap<u32, Outbound>,
    pending: BTreeMap<(PeerId, u32), Outbound>,
    incoming: BTreeMap<Responder, Incoming>,
    subscribers: BTreeMap<SubscriptionId, SignalHandler>,
    last_seq: u32,
    next_responder: u64,
    next_subscription: u64,
}

impl BusContext {
    pub fn new(name: impl Into<String>, socket: Box<dyn Socket>) -> Self {
        Self::with_config(name, socket, BusConfig::default())
    }

    pub fn with_config(name: impl Into<String>, socket: Box<dyn Socket>, config: BusConfig) -> Self {
        Self {
            name: name.into(),
            socket,
            config,
            peers: PeerRegistry::new(),
            objects: ObjectRegistry::new(),
            unsent: BTreeMap::new(),
            pending: BTreeMap::new(),
            incoming: BTreeMap::new(),
            subscribers: BTreeMap::new(),
            last_seq: 0,
            next_responder: 1,
            next_subscription: 1,
        }
    }

    /// Context over one of the built-in sockets.
    pub fn open(name: impl Into<String>, kind: SocketKind) -> Self {
        Self::new(name, open_socket(kind))
    }

    /// Well-known name announced to every peer.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &BusConfig {
        &self.config
    }

    pub fn socket_name(&self) -> &'static str {
        self.socket.name()
    }

    pub fn peers(&self) -> &PeerRegistry {
        &self.peers
    }

    pub fn objects(&self) -> &ObjectRegistry {
        &self.objects
    }

    pub fn listen(&mut self, address: &str) -> Result<()> {
        self.socket.listen(address)?;
        debug!(name = %self.name, %address, socket = self.socket.name(), "bus listening");
        Ok(())
    }

    /// Connect to `address` and announce this context's name to the new peer.
    pub fn connect(&mut self, address: &str) -> Result<PeerId> {
        let peer = self.socket.connect(address)?;
        self.peers.create(peer);
        self.announce(peer);
        Ok(peer)
    }

    /// Close a connection. Requests waiting on it fail on the next tick.
    pub fn disconnect(&mut self, peer: PeerId) {
        self.socket.disconnect(peer);
    }

    pub fn set_peer_name(&mut self, peer: PeerId, name: &str) -> Result<()> {
        self.peers.set_name(peer, name)?;
        debug!(peer, name, "peer named");
        Ok(())
    }

    pub fn add_object(&mut self, object: Object) -> Result<u32> {
        let name = object.name().to_string();
        let id = self.objects.register(object)?;
        debug!(object = %name, id, "object registered");
        Ok(id)
    }

    pub fn remove_object(&mut self, name: &str) -> Option<Object> {
        self.objects.unregister(name)
    }

    /// Queue an outbound request and try to send it right away.
    /// Returns its sequence number.
    pub fn send_request(&mut self, mut request: Request) -> u32 {
        let seq = self.next_seq();
        let timeout = request.timeout.unwrap_or(self.config.request_timeout);
        request.state = RequestState::Queued;
        debug!(
            seq,
            destination = %request.destination,
            object = %request.object,
            method = %request.method,
            "request queued"
        );
        self.unsent.insert(
            seq,
            Outbound {
                seq,
                deadline: Instant::now() + timeout,
                peer: None,
                request,
            },
        );
        self.flush_unsent(Instant::now());
        seq
    }

    /// State of a request that has not completed yet.
    pub fn request_state(&self, seq: u32) -> Option<RequestState> {
        self.unsent
            .get(&seq)
            .or_else(|| self.pending.values().find(|out| out.seq == seq))
            .map(|out| out.request.state)
    }

    /// Drop an outstanding request without running either callback.
    pub fn cancel(&mut self, seq: u32) -> bool {
        if self.unsent.remove(&seq).is_some() {
            debug!(seq, "queued request cancelled");
            return true;
        }
        let key = self.pending.keys().find(|(_, s)| *s == seq).copied();
        match key.and_then(|key| self.pending.remove(&key)) {
            Some(_) => {
                debug!(seq, "sent request cancelled");
                true
            }
            None => false,
        }
    }

    /// Outbound requests not yet completed.
    pub fn pending_requests(&self) -> usize {
        self.unsent.len() + self.pending.len()
    }

    /// Incoming calls still tracked, including answered ones awaiting cleanup.
    pub fn pending_incoming(&self) -> usize {
        self.incoming.len()
    }

    /// Answer an incoming call. Returns `false` if it was already answered
    /// or its peer is gone.
    pub fn resolve(&mut self, responder: Responder, value: Value) -> bool {
        self.answer(responder, |seq, _| Message::reply(seq, value))
    }

    /// Fail an incoming call with `status`.
    pub fn reject(&mut self, responder: Responder, status: Status) -> bool {
        self.answer(responder, |seq, incoming| {
            Message::error(
                seq,
                status.error_value(Some(incoming.object.as_str()), Some(incoming.method.as_str())),
            )
        })
    }

    /// Fail an incoming call with an arbitrary error payload.
    pub fn reject_with(&mut self, responder: Responder, payload: Value) -> bool {
        self.answer(responder, |seq, _| Message::error(seq, payload))
    }

    fn answer(&mut self, responder: Responder, build: impl FnOnce(u32, &Incoming) -> Message) -> bool {
        let Some(incoming) = self.incoming.get_mut(&responder) else {
            return false;
        };
        if incoming.completed {
            return false;
        }
        incoming.completed = true;
        let peer = incoming.peer;
        let message = build(incoming.seq, incoming);
        if let Err(err) = self.socket.send(Target::Peer(peer), &message) {
            debug!(peer, seq = message.seq, error = %err, "answer not delivered");
        }
        true
    }

    pub fn send_signal(&mut self, target: Target, name: &str, args: Vec<Value>) -> Result<()> {
        self.socket.send(target, &Message::signal(name, args))?;
        Ok(())
    }

    /// Receive every signal other than name announcements.
    pub fn subscribe(
        &mut self,
        handler: impl Fn(&mut BusContext, &SignalEvent) + 'static,
    ) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription);
        self.next_subscription += 1;
        self.subscribers.insert(id, Rc::new(handler));
        id
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.subscribers.remove(&id).is_some()
    }

    /// One tick with the configured poll timeout.
    pub fn handle_events(&mut self) -> Result<()> {
        self.handle_events_timeout(self.config.poll_timeout)
    }

    /// One tick: drop answered incoming calls, send or expire queued
    /// requests, expire sent ones, then poll the socket for at most
    /// `timeout` and dispatch what arrived.
    pub fn handle_events_timeout(&mut self, timeout: Duration) -> Result<()> {
        self.incoming.retain(|_, incoming| !incoming.completed);

        let now = Instant::now();
        self.flush_unsent(now);
        self.expire_pending(now);

        let timeout = match self.next_deadline() {
            Some(deadline) => timeout.min(deadline.saturating_duration_since(now)),
            None => timeout,
        };
        let events = self.socket.poll(Some(timeout))?;
        for event in events {
            self.dispatch(event);
        }
        Ok(())
    }

    /// Send `request` and run the event loop until it completes.
    ///
    /// Callbacks set on `request` are replaced. The request's own timeout is
    /// capped at `timeout`.
    pub fn call_blocking(&mut self, mut request: Request, timeout: Duration) -> Result<Value> {
        let timeout = request.timeout.map_or(timeout, |own| own.min(timeout));
        request.timeout = Some(timeout);

        let outcome: Rc<RefCell<Option<std::result::Result<Value, Rejection>>>> = Rc::default();
        let on_resolve = Rc::clone(&outcome);
        let on_reject = Rc::clone(&outcome);
        let seq = self.send_request(
            request
                .on_resolve(move |_, value| *on_resolve.borrow_mut() = Some(Ok(value)))
                .on_reject(move |_, rejection| *on_reject.borrow_mut() = Some(Err(rejection))),
        );

        loop {
            if let Some(result) = outcome.borrow_mut().take() {
                return result.map_err(BusError::Rejected);
            }
            if self.request_state(seq).is_none() {
                return Err(BusError::Rejected(Rejection::new(Status::NoData)));
            }
            self.handle_events_timeout(BLOCKING_POLL_SLICE)?;
        }
    }

    /// Fail every outstanding request, forget objects and peers and close
    /// all connections. Also runs on drop.
    pub fn close(&mut self) {
        let unsent = std::mem::take(&mut self.unsent);
        let pending = std::mem::take(&mut self.pending);
        for out in unsent.into_values().chain(pending.into_values()) {
            let rejection = Rejection::with_context(
                Status::ConnectionFailed,
                &out.request.object,
                &out.request.method,
            );
            self.finish_rejected(out, RequestState::Rejected, rejection);
        }
        self.incoming.clear();
        self.subscribers.clear();
        self.objects.clear();
        for peer in self.socket.peers() {
            self.socket.disconnect(peer);
        }
        self.peers.clear();
    }

    fn next_seq(&mut self) -> u32 {
        loop {
            self.last_seq = self.last_seq.wrapping_add(1);
            let seq = self.last_seq;
            let in_use = self.unsent.contains_key(&seq)
                || self.pending.keys().any(|(_, pending)| *pending == seq);
            if seq != 0 && !in_use {
                return seq;
            }
        }
    }

    fn next_deadline(&self) -> Option<Instant> {
        self.unsent
            .values()
            .chain(self.pending.values())
            .map(|out| out.deadline)
            .min()
    }

    fn announce(&mut self, peer: PeerId) {
        if self.name.is_empty() {
            return;
        }
        let signal = Message::signal(NAME_SIGNAL, [Value::from(self.name.as_str())]);
        if let Err(err) = self.socket.send(Target::Peer(peer), &signal) {
            warn!(peer, error = %err, "name announcement failed");
        }
    }

    fn flush_unsent(&mut self, now: Instant) {
        let seqs: Vec<u32> = self.unsent.keys().copied().collect();
        for seq in seqs {
            let Some(out) = self.unsent.get(&seq) else {
                continue;
            };
            let peer = self.peers.find_by_name(&out.request.destination).map(Peer::id);
            let expired = out.deadline <= now;
            if peer.is_none() && !expired {
                continue;
            }
            let Some(mut out) = self.unsent.remove(&seq) else {
                continue;
            };

            let Some(peer) = peer else {
                let rejection =
                    Rejection::with_context(Status::Timeout, &out.request.object, &out.request.method);
                self.finish_rejected(out, RequestState::TimedOut, rejection);
                continue;
            };
            if expired {
                let rejection =
                    Rejection::with_context(Status::NotFound, &out.request.object, &out.request.method);
                self.finish_rejected(out, RequestState::Rejected, rejection);
                continue;
            }

            let argument = std::mem::take(&mut out.request.argument);
            let message = Message::call(seq, &out.request.object, &out.request.method, argument);
            match self.socket.send(Target::Peer(peer), &message) {
                Ok(()) => {
                    debug!(seq, peer, "request sent");
                    out.peer = Some(peer);
                    out.request.state = RequestState::Sent;
                    self.pending.insert((peer, seq), out);
                }
                Err(err) => {
                    warn!(seq, peer, error = %err, "request send failed");
                    let rejection = Rejection::with_context(
                        Status::ConnectionFailed,
                        &out.request.object,
                        &out.request.method,
                    );
                    self.finish_rejected(out, RequestState::Rejected, rejection);
                }
            }
        }
    }

    fn expire_pending(&mut self, now: Instant) {
        let expired: Vec<(PeerId, u32)> = self
            .pending
            .iter()
            .filter(|(_, out)| out.deadline <= now)
            .map(|(key, _)| *key)
            .collect();
        for key in expired {
            if let Some(out) = self.pending.remove(&key) {
                let rejection =
                    Rejection::with_context(Status::Timeout, &out.request.object, &out.request.method);
                self.finish_rejected(out, RequestState::TimedOut, rejection);
            }
        }
    }

    fn finish_resolved(&mut self, mut out: Outbound, value: Value) {
        out.request.state = RequestState::Resolved;
        debug!(seq = out.seq, "request resolved");
        if let (Some(on_resolve), _) = out.request.take_callbacks() {
            on_resolve(self, value);
        }
    }

    fn finish_rejected(&mut self, mut out: Outbound, state: RequestState, rejection: Rejection) {
        out.request.state = state;
        debug!(seq = out.seq, status = %rejection.status, ?state, "request failed");
        if let (_, Some(on_reject)) = out.request.take_callbacks() {
            on_reject(self, rejection);
        }
    }

    fn dispatch(&mut self, event: SocketEvent) {
        match event {
            SocketEvent::Connected(peer) => {
                debug!(peer, "peer connected");
                self.peers.create(peer);
                self.announce(peer);
            }
            SocketEvent::Disconnected(peer) => self.peer_gone(peer),
            SocketEvent::BadRequest(peer, seq) => {
                self.peers.create(peer);
                self.send_error(peer, seq, Status::InvalidCommand.error_value(None, None));
            }
            SocketEvent::Message(peer, message) => {
                self.peers.create(peer);
                match message.kind {
                    MessageKind::MethodCall => self.handle_call(peer, message),
                    MessageKind::MethodReturn | MessageKind::Error => self.handle_reply(peer, message),
                    MessageKind::Signal => self.handle_signal(peer, message),
                }
            }
        }
    }

    fn peer_gone(&mut self, peer: PeerId) {
        let name = self.peers.remove(peer).and_then(|p| p.name().map(str::to_string));
        debug!(peer, name = name.as_deref().unwrap_or(""), "peer disconnected");
        self.incoming.retain(|_, incoming| incoming.peer != peer);

        let keys: Vec<(PeerId, u32)> = self
            .pending
            .range((peer, 0)..=(peer, u32::MAX))
            .map(|(key, _)| *key)
            .collect();
        for key in keys {
            if let Some(out) = self.pending.remove(&key) {
                let rejection = Rejection::with_context(
                    Status::ConnectionFailed,
                    &out.request.object,
                    &out.request.method,
                );
                self.finish_rejected(out, RequestState::Rejected, rejection);
            }
        }
    }

    fn send_error(&mut self, peer: PeerId, seq: u32, payload: Value) {
        if let Err(err) = self.socket.send(Target::Peer(peer), &Message::error(seq, payload)) {
            debug!(peer, seq, error = %err, "error reply not delivered");
        }
    }

    fn handle_call(&mut self, peer: PeerId, message: Message) {
        let seq = message.seq;
        let Some((object, method, argument)) = message.call_parts() else {
            warn!(peer, seq, "malformed call");
            self.send_error(peer, seq, Status::InvalidArgument.error_value(None, None));
            return;
        };
        let (object, method, argument) = (object.to_string(), method.to_string(), argument.clone());

        let lookup: std::result::Result<Handler, Status> = match self.objects.find(&object) {
            Some(found) => found
                .find_method(&method)
                .map(Method::handler)
                .ok_or(Status::MethodNotFound),
            None => Err(Status::NotFound),
        };
        let handler = match lookup {
            Ok(handler) => handler,
            Err(status) => {
                debug!(peer, seq, %object, %method, %status, "call not dispatched");
                self.send_error(peer, seq, status.error_value(Some(object.as_str()), Some(method.as_str())));
                return;
            }
        };

        let responder = Responder(self.next_responder);
        self.next_responder += 1;
        self.incoming.insert(
            responder,
            Incoming {
                peer,
                seq,
                object: object.clone(),
                method: method.clone(),
                completed: false,
            },
        );

        debug!(peer, seq, %object, %method, "dispatching call");
        let invocation = Invocation {
            responder,
            peer,
            object,
            method,
            argument,
        };
        let status = handler(self, &invocation);
        if !status.is_ok() {
            self.reject(responder, status);
            self.incoming.remove(&responder);
        }
    }

    fn handle_reply(&mut self, peer: PeerId, message: Message) {
        let Some(out) = self.pending.remove(&(peer, message.seq)) else {
            debug!(peer, seq = message.seq, kind = message.kind.as_str(), "dropping unmatched reply");
            return;
        };
        match message.kind {
            MessageKind::MethodReturn => self.finish_resolved(out, message.payload),
            _ => {
                let rejection = Rejection::from_payload(message.payload);
                self.finish_rejected(out, RequestState::Rejected, rejection);
            }
        }
    }

    fn handle_signal(&mut self, peer: PeerId, message: Message) {
        let Some((name, args)) = message.signal_parts() else {
            warn!(peer, "malformed signal");
            return;
        };

        if name == NAME_SIGNAL {
            match args.first().and_then(Value::as_str) {
                Some(announced) if !announced.is_empty() => {
                    if let Err(err) = self.set_peer_name(peer, announced) {
                        warn!(peer, error = %err, "peer name rejected");
                    }
                }
                _ => warn!(peer, "malformed name announcement"),
            }
            return;
        }

        let event = SignalEvent {
            peer,
            name: name.to_string(),
            args: args.to_vec(),
        };
        let handlers: Vec<SignalHandler> = self.subscribers.values().cloned().collect();
        for handler in handlers {
            handler(self, &event);
        }
    }
}

impl fmt::Debug for BusContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BusContext")
            .field("name", &self.name)
            .field("socket", &self.socket.name())
            .field("peers", &self.peers.len())
            .field("objects", &self.objects.len())
            .field("unsent", &self.unsent.len())
            .field("pending", &self.pending.len())
            .field("incoming", &self.incoming.len())
            .finish()
    }
}

impl Drop for BusContext {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    use rpcbus_socket::SocketError;

    /// Shared state of [`MockSocket`]: what was sent and what the next poll returns.
    #[derive(Default)]
    struct MockWire {
        sent: Vec<(Target, Message)>,
        inbox: Vec<SocketEvent>,
        peers: Vec<PeerId>,
    }

    struct MockSocket(Rc<RefCell<MockWire>>);

    impl Socket for MockSocket {
        fn name(&self) -> &'static str {
            "mock"
        }

        fn listen(&mut self, _address: &str) -> rpcbus_socket::Result<()> {
            Ok(())
        }

        fn connect(&mut self, _address: &str) -> rpcbus_socket::Result<PeerId> {
            let mut wire = self.0.borrow_mut();
            let id = wire.peers.iter().max().copied().unwrap_or(0) + 1;
            wire.peers.push(id);
            Ok(id)
        }

        fn disconnect(&mut self, peer: PeerId) {
            let mut wire = self.0.borrow_mut();
            if wire.peers.contains(&peer) {
                wire.peers.retain(|p| *p != peer);
                wire.inbox.push(SocketEvent::Disconnected(peer));
            }
        }

        fn send(&mut self, target: Target, message: &Message) -> rpcbus_socket::Result<()> {
            let mut wire = self.0.borrow_mut();
            if let Target::Peer(peer) = target {
                if !wire.peers.contains(&peer) {
                    return Err(SocketError::UnknownPeer(peer));
                }
            }
            wire.sent.push((target, message.clone()));
            Ok(())
        }

        fn poll(&mut self, _timeout: Option<Duration>) -> rpcbus_socket::Result<Vec<SocketEvent>> {
            Ok(std::mem::take(&mut self.0.borrow_mut().inbox))
        }

        fn peers(&self) -> Vec<PeerId> {
            self.0.borrow().peers.clone()
        }
    }

    type Outcomes = Rc<RefCell<Vec<std::result::Result<Value, Rejection>>>>;

    fn setup() -> (BusContext, Rc<RefCell<MockWire>>) {
        let wire = Rc::new(RefCell::new(MockWire::default()));
        let ctx = BusContext::new("local", Box::new(MockSocket(Rc::clone(&wire))));
        (ctx, wire)
    }

    fn deliver(ctx: &mut BusContext, wire: &Rc<RefCell<MockWire>>, event: SocketEvent) {
        wire.borrow_mut().inbox.push(event);
        ctx.handle_events().unwrap();
    }

    fn accept_named(ctx: &mut BusContext, wire: &Rc<RefCell<MockWire>>, peer: PeerId, name: &str) {
        wire.borrow_mut().peers.push(peer);
        deliver(ctx, wire, SocketEvent::Connected(peer));
        let announce = Message::signal(NAME_SIGNAL, [Value::from(name)]);
        deliver(ctx, wire, SocketEvent::Message(peer, announce));
    }

    fn track(request: Request) -> (Request, Outcomes) {
        let outcomes: Outcomes = Rc::default();
        let ok = Rc::clone(&outcomes);
        let err = Rc::clone(&outcomes);
        let request = request
            .on_resolve(move |_, value| ok.borrow_mut().push(Ok(value)))
            .on_reject(move |_, rejection| err.borrow_mut().push(Err(rejection)));
        (request, outcomes)
    }

    fn last_sent(wire: &Rc<RefCell<MockWire>>) -> (Target, Message) {
        wire.borrow().sent.last().cloned().expect("something should have been sent")
    }

    fn echo_object() -> Object {
        Object::new("/echo")
            .with_method(Method::new("echo", |ctx, inv| {
                ctx.resolve(inv.responder, inv.argument.clone());
                Status::Ok
            }))
            .unwrap()
            .with_method(Method::new("fail", |_, _| Status::InvalidArgument))
            .unwrap()
    }

    #[test]
    fn test_accepted_peer_gets_name_announcement() {
        let (mut ctx, wire) = setup();
        wire.borrow_mut().peers.push(1);
        deliver(&mut ctx, &wire, SocketEvent::Connected(1));
        let (target, message) = last_sent(&wire);
        assert_eq!(target, Target::Peer(1));
        assert_eq!(message, Message::signal(NAME_SIGNAL, [Value::from("local")]));
    }

    #[test]
    fn test_connect_announces_name() {
        let (mut ctx, wire) = setup();
        let peer = ctx.connect("/tmp/unused.sock").unwrap();
        assert!(ctx.peers().find_by_id(peer).is_some());
        let (_, message) = last_sent(&wire);
        assert_eq!(message.signal_parts().map(|(name, _)| name), Some(NAME_SIGNAL));
    }

    #[test]
    fn test_reply_resolves_exactly_once() {
        let (mut ctx, wire) = setup();
        accept_named(&mut ctx, &wire, 1, "srv");

        let (request, outcomes) = track(Request::new("srv", "/obj", "m", Value::Int(1)));
        let seq = ctx.send_request(request);
        assert_eq!(ctx.request_state(seq), Some(RequestState::Sent));
        let (target, message) = last_sent(&wire);
        assert_eq!(target, Target::Peer(1));
        assert_eq!(message, Message::call(seq, "/obj", "m", Value::Int(1)));

        deliver(&mut ctx, &wire, SocketEvent::Message(1, Message::reply(seq, "ok".into())));
        deliver(&mut ctx, &wire, SocketEvent::Message(1, Message::reply(seq, "again".into())));
        assert_eq!(*outcomes.borrow(), vec![Ok::<_, Rejection>(Value::from("ok"))]);
        assert_eq!(ctx.pending_requests(), 0);
        assert_eq!(ctx.request_state(seq), None);
    }

    #[test]
    fn test_error_reply_rejects_with_remote_status() {
        let (mut ctx, wire) = setup();
        accept_named(&mut ctx, &wire, 1, "srv");
        let (request, outcomes) = track(Request::new("srv", "/obj", "m", Value::Null));
        let seq = ctx.send_request(request);

        let payload = Status::PermissionDenied.error_value(Some("/obj"), Some("m"));
        deliver(&mut ctx, &wire, SocketEvent::Message(1, Message::error(seq, payload)));
        let outcomes = outcomes.borrow();
        let Err(rejection) = &outcomes[0] else {
            panic!("expected rejection");
        };
        assert_eq!(rejection.status, Status::PermissionDenied);
    }

    #[test]
    fn test_replies_match_peer_and_sequence() {
        let (mut ctx, wire) = setup();
        accept_named(&mut ctx, &wire, 1, "a");
        accept_named(&mut ctx, &wire, 2, "b");

        let (to_a, a_outcomes) = track(Request::new("a", "/o", "m", Value::Null));
        let (to_b, b_outcomes) = track(Request::new("b", "/o", "m", Value::Null));
        let seq_a = ctx.send_request(to_a);
        let seq_b = ctx.send_request(to_b);
        assert_ne!(seq_a, seq_b);

        // Right sequence number, wrong peer.
        deliver(&mut ctx, &wire, SocketEvent::Message(2, Message::reply(seq_a, Value::Int(2))));
        assert!(a_outcomes.borrow().is_empty());
        assert!(b_outcomes.borrow().is_empty());
        assert_eq!(ctx.pending_requests(), 2);

        deliver(&mut ctx, &wire, SocketEvent::Message(1, Message::reply(seq_a, Value::Int(1))));
        assert_eq!(*a_outcomes.borrow(), vec![Ok::<_, Rejection>(Value::Int(1))]);
        assert!(b_outcomes.borrow().is_empty());
    }

    #[test]
    fn test_unresolved_name_times_out() {
        let (mut ctx, _wire) = setup();
        let (request, outcomes) = track(
            Request::new("nobody", "/o", "m", Value::Null).timeout(Duration::from_millis(10)),
        );
        let seq = ctx.send_request(request);
        assert_eq!(ctx.request_state(seq), Some(RequestState::Queued));

        std::thread::sleep(Duration::from_millis(20));
        ctx.handle_events().unwrap();
        let outcomes = outcomes.borrow();
        assert_eq!(outcomes.len(), 1);
        assert!(matches!(&outcomes[0], Err(r) if r.status == Status::Timeout));
        assert_eq!(ctx.pending_requests(), 0);
    }

    #[test]
    fn test_sent_request_times_out_and_late_reply_is_dropped() {
        let (mut ctx, wire) = setup();
        accept_named(&mut ctx, &wire, 1, "srv");
        let (request, outcomes) =
            track(Request::new("srv", "/o", "m", Value::Null).timeout(Duration::from_millis(10)));
        let seq = ctx.send_request(request);

        std::thread::sleep(Duration::from_millis(20));
        ctx.handle_events().unwrap();
        deliver(&mut ctx, &wire, SocketEvent::Message(1, Message::reply(seq, Value::Null)));

        let outcomes = outcomes.borrow();
        assert_eq!(outcomes.len(), 1);
        assert!(matches!(&outcomes[0], Err(r) if r.status == Status::Timeout));
        assert_eq!(ctx.pending_requests(), 0);
    }

    #[test]
    fn test_name_resolving_after_deadline_is_not_found() {
        let (mut ctx, wire) = setup();
        let (request, outcomes) = track(
            Request::new("late", "/o", "m", Value::Null).timeout(Duration::from_millis(10)),
        );
        ctx.send_request(request);
        std::thread::sleep(Duration::from_millis(20));

        // The name shows up in the same tick the deadline is noticed.
        wire.borrow_mut().peers.push(1);
        ctx.peers.create(1);
        ctx.set_peer_name(1, "late").unwrap();
        ctx.handle_events().unwrap();

        let outcomes = outcomes.borrow();
        assert!(matches!(&outcomes[0], Err(r) if r.status == Status::NotFound));
    }

    #[test]
    fn test_disconnect_fails_pending_and_frees_name() {
        let (mut ctx, wire) = setup();
        accept_named(&mut ctx, &wire, 1, "srv");
        let (request, outcomes) = track(Request::new("srv", "/o", "m", Value::Null));
        ctx.send_request(request);

        ctx.disconnect(1);
        ctx.handle_events().unwrap();
        assert!(matches!(
            &outcomes.borrow()[0],
            Err(r) if r.status == Status::ConnectionFailed
        ));
        assert!(ctx.peers().find_by_name("srv").is_none());
    }

    #[test]
    fn test_second_claim_on_name_is_ignored() {
        let (mut ctx, wire) = setup();
        accept_named(&mut ctx, &wire, 1, "svc");
        accept_named(&mut ctx, &wire, 2, "svc");
        assert_eq!(ctx.peers().find_by_name("svc").map(Peer::id), Some(1));
        assert_eq!(ctx.peers().find_by_id(2).and_then(Peer::name), None);
    }

    #[test]
    fn test_cancel_fires_no_callback() {
        let (mut ctx, wire) = setup();
        accept_named(&mut ctx, &wire, 1, "srv");
        let (queued, queued_outcomes) = track(Request::new("nobody", "/o", "m", Value::Null));
        let (sent, sent_outcomes) = track(Request::new("srv", "/o", "m", Value::Null));
        let queued = ctx.send_request(queued);
        let sent = ctx.send_request(sent);

        assert!(ctx.cancel(queued));
        assert!(ctx.cancel(sent));
        assert!(!ctx.cancel(sent));
        deliver(&mut ctx, &wire, SocketEvent::Message(1, Message::reply(sent, Value::Null)));
        drop(ctx);
        assert!(queued_outcomes.borrow().is_empty());
        assert!(sent_outcomes.borrow().is_empty());
    }

    #[test]
    fn test_drop_rejects_outstanding_requests() {
        let (mut ctx, wire) = setup();
        accept_named(&mut ctx, &wire, 1, "srv");
        let (queued, queued_outcomes) = track(Request::new("nobody", "/o", "m", Value::Null));
        let (sent, sent_outcomes) = track(Request::new("srv", "/o", "m", Value::Null));
        ctx.send_request(queued);
        ctx.send_request(sent);

        drop(ctx);
        for outcomes in [queued_outcomes, sent_outcomes] {
            let outcomes = outcomes.borrow();
            assert_eq!(outcomes.len(), 1);
            assert!(matches!(&outcomes[0], Err(r) if r.status == Status::ConnectionFailed));
        }
    }

    #[test]
    fn test_incoming_call_dispatch() {
        let (mut ctx, wire) = setup();
        ctx.add_object(echo_object()).unwrap();
        accept_named(&mut ctx, &wire, 1, "client");

        deliver(&mut ctx, &wire, SocketEvent::Message(1, Message::call(7, "/echo", "echo", Value::Int(5))));
        assert_eq!(last_sent(&wire).1, Message::reply(7, Value::Int(5)));

        let cases = [
            ("/missing", "echo", Status::NotFound),
            ("/echo", "missing", Status::MethodNotFound),
            ("/echo", "fail", Status::InvalidArgument),
        ];
        for (object, method, status) in cases {
            deliver(&mut ctx, &wire, SocketEvent::Message(1, Message::call(8, object, method, Value::Null)));
            let (_, reply) = last_sent(&wire);
            assert_eq!(reply.kind, MessageKind::Error);
            assert_eq!(reply.seq, 8);
            assert_eq!(reply.payload, status.error_value(Some(object), Some(method)));
        }
        ctx.handle_events().unwrap();
        assert_eq!(ctx.pending_incoming(), 0);
    }

    #[test]
    fn test_malformed_call_gets_invalid_argument() {
        let (mut ctx, wire) = setup();
        accept_named(&mut ctx, &wire, 1, "client");
        let bad = Message {
            kind: MessageKind::MethodCall,
            seq: 4,
            payload: Value::Int(1),
        };
        deliver(&mut ctx, &wire, SocketEvent::Message(1, bad));
        let (_, reply) = last_sent(&wire);
        assert_eq!(reply.kind, MessageKind::Error);
        assert_eq!(reply.payload.get("code"), Some(&Value::Int(2)));
    }

    #[test]
    fn test_undecodable_call_gets_invalid_command() {
        let (mut ctx, wire) = setup();
        accept_named(&mut ctx, &wire, 1, "client");
        deliver(&mut ctx, &wire, SocketEvent::BadRequest(1, 5));
        let (target, reply) = last_sent(&wire);
        assert_eq!(target, Target::Peer(1));
        assert_eq!(reply.kind, MessageKind::Error);
        assert_eq!(reply.seq, 5);
        assert_eq!(reply.payload.get("code"), Some(&Value::Int(1)));
    }

    #[test]
    fn test_deferred_answer_is_swept_after_completion() {
        let (mut ctx, wire) = setup();
        let parked: Rc<Cell<Option<Responder>>> = Rc::default();
        let slot = Rc::clone(&parked);
        ctx.add_object(
            Object::new("/later")
                .with_method(Method::new("wait", move |_, inv| {
                    slot.set(Some(inv.responder));
                    Status::Ok
                }))
                .unwrap(),
        )
        .unwrap();
        accept_named(&mut ctx, &wire, 1, "client");
        let sent_before = wire.borrow().sent.len();

        deliver(&mut ctx, &wire, SocketEvent::Message(1, Message::call(3, "/later", "wait", Value::Null)));
        assert_eq!(ctx.pending_incoming(), 1);
        assert_eq!(wire.borrow().sent.len(), sent_before);

        let responder = parked.get().unwrap();
        assert!(ctx.resolve(responder, Value::from("done")));
        assert!(!ctx.reject(responder, Status::UnknownError));
        assert_eq!(last_sent(&wire).1, Message::reply(3, Value::from("done")));
        assert_eq!(ctx.pending_incoming(), 1);

        ctx.handle_events().unwrap();
        assert_eq!(ctx.pending_incoming(), 0);
    }

    #[test]
    fn test_subscribers_receive_signals() {
        let (mut ctx, wire) = setup();
        accept_named(&mut ctx, &wire, 1, "client");
        let seen: Rc<RefCell<Vec<SignalEvent>>> = Rc::default();
        let sink = Rc::clone(&seen);
        let id = ctx.subscribe(move |_, event| sink.borrow_mut().push(event.clone()));

        deliver(&mut ctx, &wire, SocketEvent::Message(1, Message::signal("tick", [Value::Int(1)])));
        assert_eq!(
            *seen.borrow(),
            vec![SignalEvent {
                peer: 1,
                name: "tick".into(),
                args: vec![Value::Int(1)],
            }]
        );

        assert!(ctx.unsubscribe(id));
        deliver(&mut ctx, &wire, SocketEvent::Message(1, Message::signal("tick", [])));
        assert_eq!(seen.borrow().len(), 1);
    }

    #[test]
    fn test_sequence_numbers_skip_zero() {
        let (mut ctx, _wire) = setup();
        ctx.last_seq = u32::MAX;
        let seq = ctx.send_request(Request::new("nobody", "/o", "m", Value::Null));
        assert_eq!(seq, 1);
    }
}
