//! Transport double that records every primitive the connection layer calls.

use std::any::Any;
use std::sync::Arc;

use parking_lot::Mutex;
use xpc_transport::{
    Event, EventHandler, Handle, Job, MachServiceFlags, Message, PeerCredentials, RawConnection,
    ReplyHandler, SerialQueue, Transport, TransportResult,
};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Calls {
    pub created: Vec<String>,
    pub handlers_set: usize,
    pub resume: usize,
    pub suspend: usize,
    pub cancel: usize,
    pub sent: usize,
    pub requests: usize,
    pub barriers: usize,
}

/// Answers every request immediately with a clone of `reply`.
pub struct RecordingConnection {
    calls: Arc<Mutex<Calls>>,
    handler: Mutex<Option<EventHandler>>,
    name: Option<String>,
    reply: Event,
}

impl RecordingConnection {
    /// Calls the bound event handler on the current thread, as a transport
    /// delivery thread would.
    pub fn deliver(&self, event: Event) -> bool {
        let handler = self.handler.lock().clone();
        match handler {
            Some(handler) => {
                handler(event);
                true
            }
            None => false,
        }
    }
}

impl RawConnection for RecordingConnection {
    fn set_event_handler(&self, handler: EventHandler) {
        self.calls.lock().handlers_set += 1;
        *self.handler.lock() = Some(handler);
    }

    fn resume(&self) {
        self.calls.lock().resume += 1;
    }

    fn suspend(&self) {
        self.calls.lock().suspend += 1;
    }

    fn cancel(&self) {
        self.calls.lock().cancel += 1;
        self.handler.lock().take();
    }

    fn send(&self, _message: Message) {
        self.calls.lock().sent += 1;
    }

    fn send_with_reply(&self, _message: Message, queue: &SerialQueue, reply: ReplyHandler) {
        self.calls.lock().requests += 1;
        let event = self.reply.clone();
        queue.async_run(move || reply(event));
    }

    fn send_barrier(&self, queue: &SerialQueue, barrier: Job) {
        self.calls.lock().barriers += 1;
        queue.async_run(barrier);
    }

    fn name(&self) -> Option<String> {
        self.name.clone()
    }

    fn credentials(&self) -> PeerCredentials {
        PeerCredentials {
            euid: 501,
            egid: 20,
            pid: 4321,
            asid: 100_003,
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Hands out [`RecordingConnection`]s that share one call log.
pub struct RecordingTransport {
    calls: Arc<Mutex<Calls>>,
    reply: Event,
}

impl RecordingTransport {
    pub fn new(reply: Event) -> Self {
        Self {
            calls: Arc::default(),
            reply,
        }
    }

    pub fn calls(&self) -> Calls {
        self.calls.lock().clone()
    }

    /// A handle as if accepted from a listener; it advertises no name.
    pub fn peer(&self) -> Handle {
        self.make(None)
    }

    fn named(&self, name: &str, lookup: String) -> Handle {
        self.calls.lock().created.push(lookup);
        self.make(Some(name))
    }

    fn make(&self, name: Option<&str>) -> Handle {
        Handle::new(RecordingConnection {
            calls: Arc::clone(&self.calls),
            handler: Mutex::new(None),
            name: name.map(str::to_owned),
            reply: self.reply.clone(),
        })
    }
}

impl Transport for RecordingTransport {
    fn create_connection(&self, name: &str) -> TransportResult<Handle> {
        Ok(self.named(name, format!("local:{name}")))
    }

    fn create_mach_service(
        &self,
        name: &str,
        flags: MachServiceFlags,
    ) -> TransportResult<Handle> {
        let lookup = match flags {
            MachServiceFlags::None => format!("mach:{name}"),
            MachServiceFlags::Privileged => format!("privileged:{name}"),
        };
        Ok(self.named(name, lookup))
    }
}
