use std::any::Any;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use crossbeam_channel::bounded;
use parking_lot::{Condvar, Mutex};
use xpc_transport::{
    Event, EventHandler, Fault, Handle, Job, Message, PeerCredentials, RawConnection,
    ReplyHandler, ReplySlot, SerialQueue, TransportResult,
};

use crate::namespace::{Namespace, ServiceKey};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Readiness {
    Ready,
    Invalid,
    Cancelled,
}

struct PendingReply {
    queue: SerialQueue,
    reply: ReplyHandler,
}

impl PendingReply {
    fn complete(self, event: Event) {
        let PendingReply { queue, reply } = self;
        queue.async_run(move || reply(event));
    }
}

#[derive(Default)]
struct State {
    handler: Option<EventHandler>,
    resumed: bool,
    cancelled: bool,
    invalid: bool,
    looked_up: bool,
    invalid_notified: bool,
    peer: Weak<Endpoint>,
    peer_credentials: PeerCredentials,
    pending: HashMap<u64, PendingReply>,
}

/// One simulated connection end.
///
/// Every send, inbound event, reply completion and barrier passes through the
/// endpoint's delivery worker. Work waits there while the endpoint is
/// suspended, which is how suspension and barrier exclusion are enforced.
pub(crate) struct Endpoint {
    id: u64,
    name: Option<String>,
    target: Option<ServiceKey>,
    namespace: Weak<Namespace>,
    delivery: SerialQueue,
    next_slot: AtomicU64,
    state: Mutex<State>,
    ready: Condvar,
}

impl Endpoint {
    pub(crate) fn new(
        ns: &Arc<Namespace>,
        name: Option<String>,
        target: Option<ServiceKey>,
    ) -> TransportResult<Arc<Self>> {
        let id = ns.next_endpoint_id();
        let delivery = SerialQueue::new(format!("sim.delivery.{id}"))?;
        let looked_up = target.is_none();
        Ok(Arc::new(Self {
            id,
            name,
            target,
            namespace: Arc::downgrade(ns),
            delivery,
            next_slot: AtomicU64::new(1),
            state: Mutex::new(State {
                looked_up,
                ..State::default()
            }),
            ready: Condvar::new(),
        }))
    }

    /// Pairs two endpoints; each side reports the other's credentials.
    pub(crate) fn link(
        a: &Arc<Endpoint>,
        a_creds: PeerCredentials,
        b: &Arc<Endpoint>,
        b_creds: PeerCredentials,
    ) {
        {
            let mut st = a.state.lock();
            st.peer = Arc::downgrade(b);
            st.peer_credentials = b_creds;
        }
        let mut st = b.state.lock();
        st.peer = Arc::downgrade(a);
        st.peer_credentials = a_creds;
    }

    pub(crate) fn is_live(&self) -> bool {
        let st = self.state.lock();
        !st.cancelled && !st.invalid
    }

    fn set_event_handler(&self, handler: EventHandler) {
        let mut st = self.state.lock();
        if !st.cancelled {
            st.handler = Some(handler);
        }
    }

    fn resume(self: &Arc<Self>) {
        let lookup = {
            let mut st = self.state.lock();
            if st.cancelled || st.resumed {
                return;
            }
            if st.looked_up {
                None
            } else {
                st.looked_up = true;
                self.target.clone()
            }
        };
        if let Some(key) = lookup {
            self.connect(key);
        }
        self.state.lock().resumed = true;
        self.ready.notify_all();
        tracing::trace!(endpoint = self.id, "sim endpoint resumed");
    }

    fn suspend(&self) {
        let mut st = self.state.lock();
        if !st.cancelled {
            st.resumed = false;
        }
    }

    fn connect(self: &Arc<Self>, key: ServiceKey) {
        let listener = self.namespace.upgrade().and_then(|ns| {
            let listener = ns.lookup(&key)?;
            Some((ns, listener))
        });
        let Some((ns, listener)) = listener else {
            tracing::debug!(service = %key.1, domain = %key.0, "sim lookup failed");
            self.invalidate();
            return;
        };
        let server = match Endpoint::new(&ns, None, None) {
            Ok(server) => server,
            Err(err) => {
                tracing::error!("sim peer endpoint creation failed: {err}");
                self.invalidate();
                return;
            }
        };
        Endpoint::link(self, ns.client_credentials(), &server, listener.credentials());
        listener.register_client(Arc::downgrade(self));
        if !listener.offer(Handle::new(SimConnection::new(server))) {
            self.invalidate();
        }
    }

    /// Cancels the endpoint: pending replies and the event handler each get one
    /// final `CONNECTION_INVALID`, and the peer is invalidated.
    pub(crate) fn cancel(self: &Arc<Self>) {
        let (pending, handler, peer) = {
            let mut st = self.state.lock();
            if st.cancelled {
                return;
            }
            st.cancelled = true;
            st.invalid = true;
            let pending: Vec<_> = st.pending.drain().map(|(_, p)| p).collect();
            (pending, st.handler.take(), st.peer.upgrade())
        };
        self.ready.notify_all();
        tracing::debug!(endpoint = self.id, "sim endpoint cancelled");

        for p in pending {
            p.complete(Event::Fault(Fault::CONNECTION_INVALID));
        }
        if let Some(handler) = handler {
            let ep = Arc::clone(self);
            self.delivery.async_run(move || {
                let notified = std::mem::replace(&mut ep.state.lock().invalid_notified, true);
                if !notified {
                    handler(Event::Fault(Fault::CONNECTION_INVALID));
                }
            });
        }
        if let Some(peer) = peer {
            peer.invalidate();
        }
    }

    /// Marks the endpoint unusable without cancelling it.
    pub(crate) fn invalidate(self: &Arc<Self>) {
        let pending = {
            let mut st = self.state.lock();
            if st.cancelled || st.invalid {
                return;
            }
            st.invalid = true;
            st.pending.drain().map(|(_, p)| p).collect::<Vec<_>>()
        };
        for p in pending {
            p.complete(Event::Fault(Fault::CONNECTION_INVALID));
        }
        self.enqueue_event(Event::Fault(Fault::CONNECTION_INVALID));
    }

    /// Queues `event` for the bound event handler.
    ///
    /// `CONNECTION_INVALID` is terminal and reaches the handler at most once.
    pub(crate) fn enqueue_event(self: &Arc<Self>, event: Event) {
        let ep = Arc::clone(self);
        self.delivery.async_run(move || {
            if ep.wait_ready() == Readiness::Cancelled {
                return;
            }
            let handler = {
                let mut st = ep.state.lock();
                if event.as_fault() == Some(&Fault::CONNECTION_INVALID) {
                    if st.invalid_notified {
                        return;
                    }
                    st.invalid_notified = true;
                }
                st.handler.clone()
            };
            match handler {
                Some(handler) => handler(event),
                None => tracing::trace!(endpoint = ep.id, "no event handler; event dropped"),
            }
        });
    }

    fn send(self: &Arc<Self>, message: Message) {
        let ep = Arc::clone(self);
        self.delivery.async_run(move || {
            if ep.wait_ready() != Readiness::Ready {
                tracing::trace!(endpoint = ep.id, "send on unusable endpoint dropped");
                return;
            }
            let Some(peer) = ep.peer() else {
                return;
            };
            match message.in_reply_to() {
                Some(slot) => peer.complete_reply(slot, Event::Message(message)),
                None => peer.enqueue_event(Event::Message(message)),
            }
        });
    }

    fn send_with_reply(
        self: &Arc<Self>,
        mut message: Message,
        queue: &SerialQueue,
        reply: ReplyHandler,
    ) {
        let ep = Arc::clone(self);
        let pending = PendingReply {
            queue: queue.clone(),
            reply,
        };
        self.delivery.async_run(move || {
            let ready = ep.wait_ready() == Readiness::Ready;
            let peer = ep.peer();
            let (Some(peer), true) = (peer, ready) else {
                pending.complete(Event::Fault(Fault::CONNECTION_INVALID));
                return;
            };
            let slot = ReplySlot::new(ep.next_slot.fetch_add(1, Ordering::Relaxed));
            {
                let mut st = ep.state.lock();
                if st.cancelled || st.invalid {
                    drop(st);
                    pending.complete(Event::Fault(Fault::CONNECTION_INVALID));
                    return;
                }
                st.pending.insert(slot.id(), pending);
            }
            message.attach_reply_slot(slot);
            peer.enqueue_event(Event::Message(message));
        });
    }

    fn complete_reply(self: &Arc<Self>, slot: ReplySlot, event: Event) {
        let ep = Arc::clone(self);
        self.delivery.async_run(move || {
            if ep.wait_ready() == Readiness::Cancelled {
                return;
            }
            let pending = ep.state.lock().pending.remove(&slot.id());
            match pending {
                Some(pending) => pending.complete(event),
                None => tracing::trace!(endpoint = ep.id, slot = slot.id(), "stale reply dropped"),
            }
        });
    }

    fn send_barrier(self: &Arc<Self>, queue: &SerialQueue, barrier: Job) {
        let ep = Arc::clone(self);
        let queue = queue.clone();
        self.delivery.async_run(move || {
            ep.wait_ready();
            // Delivery stays parked here until the barrier has run on `queue`.
            let (done_tx, done_rx) = bounded::<()>(1);
            queue.async_run(move || {
                barrier();
                let _ = done_tx.send(());
            });
            let _ = done_rx.recv();
        });
    }

    fn wait_ready(&self) -> Readiness {
        let mut st = self.state.lock();
        while !st.resumed && !st.cancelled {
            self.ready.wait(&mut st);
        }
        if st.cancelled {
            Readiness::Cancelled
        } else if st.invalid {
            Readiness::Invalid
        } else {
            Readiness::Ready
        }
    }

    fn peer(&self) -> Option<Arc<Endpoint>> {
        self.state.lock().peer.upgrade()
    }
}

/// [`RawConnection`] implementation handed out by [`crate::SimTransport`].
///
/// Dropping the last [`Handle`] onto it cancels the connection.
pub struct SimConnection {
    endpoint: Arc<Endpoint>,
}

impl SimConnection {
    pub(crate) fn new(endpoint: Arc<Endpoint>) -> Self {
        Self { endpoint }
    }

    pub(crate) fn endpoint(&self) -> &Arc<Endpoint> {
        &self.endpoint
    }

    /// Returns true until the connection is cancelled or invalidated.
    pub fn is_live(&self) -> bool {
        self.endpoint.is_live()
    }

    /// Returns true while delivery is resumed.
    pub fn is_resumed(&self) -> bool {
        self.endpoint.state.lock().resumed
    }

    /// Returns true once the connection has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.endpoint.state.lock().cancelled
    }

    /// Number of requests still waiting for a reply.
    pub fn pending_replies(&self) -> usize {
        self.endpoint.state.lock().pending.len()
    }
}

impl RawConnection for SimConnection {
    fn set_event_handler(&self, handler: EventHandler) {
        self.endpoint.set_event_handler(handler);
    }

    fn resume(&self) {
        self.endpoint.resume();
    }

    fn suspend(&self) {
        self.endpoint.suspend();
    }

    fn cancel(&self) {
        self.endpoint.cancel();
    }

    fn send(&self, message: Message) {
        self.endpoint.send(message);
    }

    fn send_with_reply(&self, message: Message, queue: &SerialQueue, reply: ReplyHandler) {
        self.endpoint.send_with_reply(message, queue, reply);
    }

    fn send_barrier(&self, queue: &SerialQueue, barrier: Job) {
        self.endpoint.send_barrier(queue, barrier);
    }

    fn name(&self) -> Option<String> {
        self.endpoint.name.clone()
    }

    fn credentials(&self) -> PeerCredentials {
        self.endpoint.state.lock().peer_credentials
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Drop for SimConnection {
    fn drop(&mut self) {
        self.endpoint.cancel();
    }
}
