use std::sync::{Arc, Weak};
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use xpc_transport::{Event, Fault, Handle, PeerCredentials};

use crate::endpoint::Endpoint;
use crate::namespace::{Domain, Namespace, ServiceKey};

/// Registration parameters for a simulated service.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ListenerConfig {
    pub domain: Domain,
    /// Credentials clients observe for this service.
    pub credentials: PeerCredentials,
}

impl ListenerConfig {
    pub fn local() -> Self {
        Self {
            domain: Domain::Local,
            credentials: PeerCredentials::default(),
        }
    }

    pub fn mach() -> Self {
        Self {
            domain: Domain::Mach,
            ..Self::local()
        }
    }

    pub fn privileged_mach() -> Self {
        Self {
            domain: Domain::PrivilegedMach,
            ..Self::local()
        }
    }

    pub fn with_credentials(mut self, credentials: PeerCredentials) -> Self {
        self.credentials = credentials;
        self
    }
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self::local()
    }
}

pub(crate) struct ListenerShared {
    name: String,
    config: ListenerConfig,
    accept_tx: Sender<Handle>,
    clients: Mutex<Vec<Weak<Endpoint>>>,
}

impl ListenerShared {
    pub(crate) fn new(name: String, config: ListenerConfig) -> (Arc<Self>, Receiver<Handle>) {
        let (accept_tx, incoming) = unbounded();
        let shared = Arc::new(Self {
            name,
            config,
            accept_tx,
            clients: Mutex::new(Vec::new()),
        });
        (shared, incoming)
    }

    pub(crate) fn key(&self) -> ServiceKey {
        (self.config.domain, self.name.clone())
    }

    pub(crate) fn credentials(&self) -> PeerCredentials {
        self.config.credentials
    }

    pub(crate) fn register_client(&self, client: Weak<Endpoint>) {
        let mut clients = self.clients.lock();
        clients.retain(|c| c.strong_count() > 0);
        clients.push(client);
    }

    /// Hands a freshly paired peer handle to whoever owns the listener.
    pub(crate) fn offer(&self, peer: Handle) -> bool {
        self.accept_tx.send(peer).is_ok()
    }

    fn live_clients(&self) -> Vec<Arc<Endpoint>> {
        self.clients
            .lock()
            .iter()
            .filter_map(Weak::upgrade)
            .filter(|c| c.is_live())
            .collect()
    }
}

/// A registered simulated service.
///
/// Each client that connects produces one peer [`Handle`] on
/// [`Listener::incoming`]. Dropping the listener unregisters the service and
/// invalidates every client still connected to it.
pub struct Listener {
    shared: Arc<ListenerShared>,
    incoming: Receiver<Handle>,
    ns: Arc<Namespace>,
}

impl Listener {
    pub(crate) fn new(
        shared: Arc<ListenerShared>,
        incoming: Receiver<Handle>,
        ns: Arc<Namespace>,
    ) -> Self {
        Self {
            shared,
            incoming,
            ns,
        }
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn domain(&self) -> Domain {
        self.shared.config.domain
    }

    /// Peer handles for accepted clients, in connection order.
    pub fn incoming(&self) -> &Receiver<Handle> {
        &self.incoming
    }

    /// Waits up to `timeout` for the next client.
    pub fn accept_timeout(&self, timeout: Duration) -> Option<Handle> {
        self.incoming.recv_timeout(timeout).ok()
    }

    /// Number of clients whose connection is still usable.
    pub fn client_count(&self) -> usize {
        self.shared.live_clients().len()
    }

    /// Tells every connected client the service went away; connections stay usable.
    pub fn interrupt_clients(&self) -> usize {
        self.broadcast(Fault::CONNECTION_INTERRUPTED)
    }

    /// Tells every connected client the host is about to terminate.
    pub fn announce_termination(&self) -> usize {
        self.broadcast(Fault::TERMINATION_IMMINENT)
    }

    /// Sends an arbitrary fault to every connected client.
    pub fn broadcast(&self, fault: Fault) -> usize {
        let clients = self.shared.live_clients();
        for client in &clients {
            client.enqueue_event(Event::Fault(fault.clone()));
        }
        clients.len()
    }

    /// Unregisters the service and invalidates its clients.
    pub fn shutdown(self) {}
}

impl Drop for Listener {
    fn drop(&mut self) {
        self.ns.unregister(&self.shared);
        for client in self.shared.live_clients() {
            client.invalidate();
        }
        tracing::debug!(service = %self.shared.name, "sim service unregistered");
    }
}
