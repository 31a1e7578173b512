use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use xpc_transport::{
    Event, Handle, MachServiceFlags, PeerCredentials, Transport, TransportResult,
};

use crate::endpoint::{Endpoint, SimConnection};
use crate::error::{SimError, SimResult};
use crate::listener::{Listener, ListenerConfig, ListenerShared};

/// Namespace a service is registered in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Domain {
    /// Services visible to the caller's local domain lookup.
    Local,
    /// Global mach services.
    Mach,
    /// Global mach services reachable only through a privileged lookup.
    PrivilegedMach,
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Domain::Local => "local",
            Domain::Mach => "mach",
            Domain::PrivilegedMach => "privileged mach",
        };
        f.write_str(label)
    }
}

pub(crate) type ServiceKey = (Domain, String);

pub(crate) struct Namespace {
    services: Mutex<HashMap<ServiceKey, Arc<ListenerShared>>>,
    next_endpoint: AtomicU64,
    client_credentials: PeerCredentials,
}

impl Namespace {
    pub(crate) fn lookup(&self, key: &ServiceKey) -> Option<Arc<ListenerShared>> {
        self.services.lock().get(key).cloned()
    }

    pub(crate) fn unregister(&self, shared: &Arc<ListenerShared>) {
        let key = shared.key();
        let mut services = self.services.lock();
        if services
            .get(&key)
            .is_some_and(|current| Arc::ptr_eq(current, shared))
        {
            services.remove(&key);
        }
    }

    pub(crate) fn client_credentials(&self) -> PeerCredentials {
        self.client_credentials
    }

    pub(crate) fn next_endpoint_id(&self) -> u64 {
        self.next_endpoint.fetch_add(1, Ordering::Relaxed)
    }
}

/// Cloneable handle onto one simulated host namespace.
#[derive(Clone)]
pub struct SimTransport {
    ns: Arc<Namespace>,
}

impl Default for SimTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl SimTransport {
    /// Creates an empty namespace. Clients report this process's pid to services.
    pub fn new() -> Self {
        Self::with_client_credentials(PeerCredentials {
            pid: std::process::id() as i32,
            ..PeerCredentials::default()
        })
    }

    /// Creates an empty namespace whose clients present `credentials` to services.
    pub fn with_client_credentials(credentials: PeerCredentials) -> Self {
        Self {
            ns: Arc::new(Namespace {
                services: Mutex::new(HashMap::new()),
                next_endpoint: AtomicU64::new(1),
                client_credentials: credentials,
            }),
        }
    }

    /// Registers a service. Dropping the returned listener unregisters it.
    pub fn listen(&self, name: &str, config: ListenerConfig) -> SimResult<Listener> {
        let key = (config.domain, name.to_owned());
        let mut services = self.ns.services.lock();
        if services.contains_key(&key) {
            return Err(SimError::AlreadyRegistered {
                name: name.to_owned(),
                domain: config.domain,
            });
        }
        let (shared, incoming) = ListenerShared::new(name.to_owned(), config);
        services.insert(key, Arc::clone(&shared));
        drop(services);
        tracing::debug!(service = name, domain = %config.domain, "sim service registered");
        Ok(Listener::new(shared, incoming, Arc::clone(&self.ns)))
    }

    /// Returns true while a listener for `name` is registered in `domain`.
    pub fn is_registered(&self, domain: Domain, name: &str) -> bool {
        self.ns.lookup(&(domain, name.to_owned())).is_some()
    }

    /// Creates two handles wired to each other without any service lookup.
    pub fn anonymous_pair(&self) -> SimResult<(Handle, Handle)> {
        let creds = self.ns.client_credentials();
        let a = Endpoint::new(&self.ns, None, None)?;
        let b = Endpoint::new(&self.ns, None, None)?;
        Endpoint::link(&a, creds, &b, creds);
        Ok((
            Handle::new(SimConnection::new(a)),
            Handle::new(SimConnection::new(b)),
        ))
    }

    /// Delivers `event` to the handle's event handler as if the host produced it.
    ///
    /// Returns false when `handle` was not created by a simulated transport.
    pub fn inject(&self, handle: &Handle, event: Event) -> bool {
        match handle.downcast_ref::<SimConnection>() {
            Some(conn) => {
                conn.endpoint().enqueue_event(event);
                true
            }
            None => false,
        }
    }

    fn client(&self, domain: Domain, name: &str) -> TransportResult<Handle> {
        let endpoint = Endpoint::new(
            &self.ns,
            Some(name.to_owned()),
            Some((domain, name.to_owned())),
        )?;
        Ok(Handle::new(SimConnection::new(endpoint)))
    }
}

impl Transport for SimTransport {
    fn create_connection(&self, name: &str) -> TransportResult<Handle> {
        self.client(Domain::Local, name)
    }

    fn create_mach_service(
        &self,
        name: &str,
        flags: MachServiceFlags,
    ) -> TransportResult<Handle> {
        let domain = match flags {
            MachServiceFlags::None => Domain::Mach,
            MachServiceFlags::Privileged => Domain::PrivilegedMach,
        };
        self.client(domain, name)
    }
}
