//! Connection handles and the transport entry points that create them.

use std::any::Any;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Deref;
use std::sync::{Arc, Weak};

use crate::error::TransportResult;
use crate::fault::Event;
use crate::message::Message;
use crate::queue::{Job, SerialQueue};

/// Callback bound to a handle; receives every inbound event.
pub type EventHandler = Arc<dyn Fn(Event) + Send + Sync + 'static>;

/// One-shot continuation receiving a reply message or a fault in its place.
pub type ReplyHandler = Box<dyn FnOnce(Event) + Send + 'static>;

/// Credentials of the process on the other end of a connection.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct PeerCredentials {
    pub euid: u32,
    pub egid: u32,
    pub pid: i32,
    pub asid: i32,
}

/// How a mach-service lookup is performed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum MachServiceFlags {
    #[default]
    None,
    /// Look the service up in the privileged (system) namespace.
    Privileged,
}

/// One end of a transport connection as provided by the host.
///
/// All methods are non-blocking. Faults are never returned; they arrive later
/// through the bound [`EventHandler`] or a [`ReplyHandler`].
pub trait RawConnection: Send + Sync + 'static {
    /// Binds the single event handler; a later call replaces the earlier one.
    fn set_event_handler(&self, handler: EventHandler);

    /// Starts (or restarts) delivery. Idempotent.
    fn resume(&self);

    /// Pauses delivery. Idempotent.
    fn suspend(&self);

    /// Tears the connection down and releases transport resources. Idempotent.
    fn cancel(&self);

    /// Fire-and-forget send.
    fn send(&self, message: Message);

    /// Sends `message` and later runs `reply` on `queue` with the reply or a fault.
    fn send_with_reply(&self, message: Message, queue: &SerialQueue, reply: ReplyHandler);

    /// Runs `barrier` on `queue` once no message activity is in flight on this
    /// connection, holding further activity back until it returns.
    fn send_barrier(&self, queue: &SerialQueue, barrier: Job);

    /// Name the remote end advertises, if any.
    fn name(&self) -> Option<String>;

    /// Credentials of the remote process.
    fn credentials(&self) -> PeerCredentials;

    /// Concrete-type access for transport implementations.
    fn as_any(&self) -> &dyn Any;
}

/// Shared reference to a [`RawConnection`] with identity semantics.
///
/// Two handles are equal, and hash alike, exactly when they refer to the same
/// underlying transport object.
#[derive(Clone)]
pub struct Handle(Arc<dyn RawConnection>);

impl Handle {
    pub fn new<C: RawConnection>(raw: C) -> Self {
        Self(Arc::new(raw))
    }

    pub fn from_arc(raw: Arc<dyn RawConnection>) -> Self {
        Self(raw)
    }

    /// Address of the underlying transport object.
    pub fn identity(&self) -> usize {
        Arc::as_ptr(&self.0) as *const () as usize
    }

    /// Non-owning reference that does not keep the transport object alive.
    pub fn downgrade(&self) -> WeakHandle {
        WeakHandle(Arc::downgrade(&self.0))
    }

    pub fn downcast_ref<T: RawConnection>(&self) -> Option<&T> {
        self.0.as_any().downcast_ref::<T>()
    }
}

impl Deref for Handle {
    type Target = dyn RawConnection;

    fn deref(&self) -> &Self::Target {
        &*self.0
    }
}

impl PartialEq for Handle {
    fn eq(&self, other: &Self) -> bool {
        self.identity() == other.identity()
    }
}

impl Eq for Handle {}

impl Hash for Handle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.identity().hash(state);
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handle({:#x})", self.identity())
    }
}

/// Weak counterpart of [`Handle`].
#[derive(Clone)]
pub struct WeakHandle(Weak<dyn RawConnection>);

impl WeakHandle {
    pub fn upgrade(&self) -> Option<Handle> {
        self.0.upgrade().map(Handle)
    }
}

impl fmt::Debug for WeakHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("WeakHandle")
    }
}

/// Host entry points that create connection handles.
///
/// Only local resource exhaustion fails creation. A handle for a service that
/// does not exist is still returned and reports
/// [`crate::Fault::CONNECTION_INVALID`] once resumed.
pub trait Transport: Send + Sync {
    /// Connects to a service in the caller's local domain.
    fn create_connection(&self, name: &str) -> TransportResult<Handle>;

    /// Connects to a global mach service.
    fn create_mach_service(&self, name: &str, flags: MachServiceFlags)
        -> TransportResult<Handle>;
}
