use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use xpc_transport::{Handle, MachServiceFlags, Message, SerialQueue, Transport};

use crate::dispatch::Dispatcher;
use crate::error::{ConnectionError, ConnectionResult, ReplyError};
use crate::kind::XpcError;
use crate::options::ConnectionOptions;
use crate::properties::ConnectionProperties;
use crate::reply::Reply;

struct Bound {
    handle: Handle,
    queue: SerialQueue,
    bootstrapped: AtomicBool,
    cancelled: AtomicBool,
}

enum Binding {
    Unbound,
    Bound(Bound),
}

/// One end of an IPC connection.
///
/// Owns the transport handle, the handler registry, and a serial queue on
/// which reply continuations and barrier blocks run. Two connections are
/// equal exactly when they wrap the same transport handle.
///
/// Dropping a connection cancels its handle.
pub struct Connection {
    binding: Binding,
    active: AtomicBool,
    dispatcher: Arc<Dispatcher>,
}

impl Connection {
    /// Wraps a handle created elsewhere, typically one accepted by a listener.
    ///
    /// The connection starts inert: nothing is bound and delivery stays
    /// suspended until [`Connection::bootstrap`].
    pub fn from_handle(handle: Handle, options: ConnectionOptions) -> ConnectionResult<Self> {
        let conn = Self::bind(handle, &options, false)?;
        tracing::debug!(connection = %conn.dispatcher.label(), "wrapped existing handle");
        Ok(conn)
    }

    /// Connects to a service in the caller's local domain.
    pub fn local_service<T>(
        transport: &T,
        name: &str,
        options: ConnectionOptions,
    ) -> ConnectionResult<Self>
    where
        T: Transport + ?Sized,
    {
        let handle = transport.create_connection(name)?;
        Self::connect(handle, options)
    }

    /// Connects to a global mach service.
    pub fn mach_service<T>(
        transport: &T,
        name: &str,
        options: ConnectionOptions,
    ) -> ConnectionResult<Self>
    where
        T: Transport + ?Sized,
    {
        let handle = transport.create_mach_service(name, MachServiceFlags::None)?;
        Self::connect(handle, options)
    }

    /// Connects to a global mach service through the privileged lookup.
    pub fn privileged_mach_service<T>(
        transport: &T,
        name: &str,
        options: ConnectionOptions,
    ) -> ConnectionResult<Self>
    where
        T: Transport + ?Sized,
    {
        let handle = transport.create_mach_service(name, MachServiceFlags::Privileged)?;
        Self::connect(handle, options)
    }

    /// A connection with no transport handle. Every operation is a no-op.
    pub fn unbound(options: ConnectionOptions) -> Self {
        Self {
            binding: Binding::Unbound,
            active: AtomicBool::new(false),
            dispatcher: Arc::new(Dispatcher::new(
                options.label_for(None),
                options.log_unclassified_faults,
            )),
        }
    }

    fn bind(
        handle: Handle,
        options: &ConnectionOptions,
        bootstrapped: bool,
    ) -> ConnectionResult<Self> {
        let name = handle.name();
        let label = options.label_for(name.as_deref());
        let queue = SerialQueue::new(label.clone())?;
        Ok(Self {
            binding: Binding::Bound(Bound {
                handle,
                queue,
                bootstrapped: AtomicBool::new(bootstrapped),
                cancelled: AtomicBool::new(false),
            }),
            active: AtomicBool::new(false),
            dispatcher: Arc::new(Dispatcher::new(label, options.log_unclassified_faults)),
        })
    }

    fn connect(handle: Handle, options: ConnectionOptions) -> ConnectionResult<Self> {
        let conn = Self::bind(handle, &options, true)?;
        conn.install_dispatcher();
        if options.activate {
            conn.set_active(true);
        }
        tracing::debug!(
            connection = %conn.dispatcher.label(),
            active = options.activate,
            "connection created"
        );
        Ok(conn)
    }

    fn install_dispatcher(&self) {
        if let Binding::Bound(bound) = &self.binding {
            let handler = self.dispatcher.event_handler(bound.handle.downgrade());
            bound.handle.set_event_handler(handler);
        }
    }

    /// Binds the event dispatcher and resumes a wrapped handle.
    ///
    /// Always leaves the connection active. Fails on an unbound connection
    /// and on any connection that is already bootstrapped, which includes
    /// every connection made by the named-service constructors.
    pub fn bootstrap(&self) -> ConnectionResult<()> {
        let Binding::Bound(bound) = &self.binding else {
            return Err(ConnectionError::Unbound);
        };
        if bound.bootstrapped.swap(true, Ordering::AcqRel) {
            return Err(ConnectionError::AlreadyBootstrapped);
        }
        self.install_dispatcher();
        self.set_active(true);
        tracing::debug!(connection = %self.dispatcher.label(), "bootstrapped");
        Ok(())
    }

    /// Records the requested state and resumes or suspends the handle.
    ///
    /// Without a handle only the flag changes. It is not applied later.
    pub fn set_active(&self, active: bool) {
        self.active.store(active, Ordering::Release);
        let Binding::Bound(bound) = &self.binding else {
            return;
        };
        if bound.cancelled.load(Ordering::Acquire) {
            return;
        }
        if active {
            bound.handle.resume();
        } else {
            bound.handle.suspend();
        }
        tracing::debug!(connection = %self.dispatcher.label(), active, "activation changed");
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Service name the handle advertises; empty when there is none.
    pub fn name(&self) -> String {
        match &self.binding {
            Binding::Bound(bound) => bound.handle.name().unwrap_or_default(),
            Binding::Unbound => String::new(),
        }
    }

    /// Fresh snapshot of the peer's credentials, or `None` without a handle.
    pub fn properties(&self) -> Option<ConnectionProperties> {
        match &self.binding {
            Binding::Bound(bound) => Some(ConnectionProperties::read(&bound.handle)),
            Binding::Unbound => None,
        }
    }

    /// Appends `handler` to the list run whenever `kind` is reported.
    ///
    /// Handlers for transport faults run on the transport's delivery thread.
    /// Handlers for reply failures run on the connection's serial queue.
    pub fn handle<F>(&self, kind: XpcError, handler: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.dispatcher.registry.register(kind, handler);
    }

    /// Installs a handler for inbound messages whose `identity` field is
    /// `identity`. Returns true if an existing route was replaced.
    ///
    /// Until the first route is installed inbound messages are ignored.
    /// Afterwards, a message naming no route reports
    /// [`XpcError::UnregisteredMessage`] and, if it expects a reply, is
    /// answered with an error entry.
    pub fn route<F>(&self, identity: impl Into<String>, handler: F) -> bool
    where
        F: Fn(&Message) -> Result<Option<Message>, XpcError> + Send + Sync + 'static,
    {
        self.dispatcher.router.insert(identity.into(), Arc::new(handler))
    }

    /// Fire-and-forget send.
    pub fn send(&self, message: Message) {
        match &self.binding {
            Binding::Bound(bound) => bound.handle.send(message),
            Binding::Unbound => tracing::trace!(
                connection = %self.dispatcher.label(),
                "send on unbound connection dropped"
            ),
        }
    }

    /// Sends `message` and runs `on_reply` on the connection's serial queue
    /// when the answer, or a fault in its place, arrives.
    ///
    /// An error returned by `on_reply` is logged and reported to the
    /// handlers registered for [`ReplyError::kind`].
    pub fn send_with_reply<F>(&self, message: Message, on_reply: F)
    where
        F: FnOnce(Reply) -> Result<(), ReplyError> + Send + 'static,
    {
        let Binding::Bound(bound) = &self.binding else {
            tracing::trace!(
                connection = %self.dispatcher.label(),
                "request on unbound connection dropped"
            );
            return;
        };
        let dispatcher = Arc::clone(&self.dispatcher);
        bound.handle.send_with_reply(
            message,
            &bound.queue,
            Box::new(move |event| {
                if let Err(err) = on_reply(Reply::new(event)) {
                    dispatcher.reply_failed(err);
                }
            }),
        );
    }

    /// Runs `block` on the connection's serial queue once no message traffic
    /// is in flight on this connection.
    ///
    /// Does nothing without a handle.
    pub fn perform_with_barrier<F>(&self, block: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if let Binding::Bound(bound) = &self.binding {
            bound.handle.send_barrier(&bound.queue, Box::new(block));
        }
    }

    /// Cancels the handle. Later calls, and the cancel on drop, do nothing.
    pub fn cancel(&self) {
        if let Binding::Bound(bound) = &self.binding {
            if !bound.cancelled.swap(true, Ordering::AcqRel) {
                bound.handle.cancel();
                tracing::debug!(connection = %self.dispatcher.label(), "cancelled");
            }
        }
    }

    /// The underlying transport handle.
    pub fn raw_handle(&self) -> Option<&Handle> {
        match &self.binding {
            Binding::Bound(bound) => Some(&bound.handle),
            Binding::Unbound => None,
        }
    }

    /// Serial queue used for reply continuations and barrier blocks.
    pub fn queue(&self) -> Option<&SerialQueue> {
        match &self.binding {
            Binding::Bound(bound) => Some(&bound.queue),
            Binding::Unbound => None,
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl PartialEq for Connection {
    fn eq(&self, other: &Self) -> bool {
        match (&self.binding, &other.binding) {
            (Binding::Bound(a), Binding::Bound(b)) => a.handle == b.handle,
            (Binding::Unbound, Binding::Unbound) => true,
            _ => false,
        }
    }
}

impl Eq for Connection {}

impl Hash for Connection {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match &self.binding {
            Binding::Bound(bound) => bound.handle.hash(state),
            Binding::Unbound => 0usize.hash(state),
        }
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("label", &self.dispatcher.label())
            .field("handle", &self.raw_handle())
            .field("active", &self.is_active())
            .finish()
    }
}
