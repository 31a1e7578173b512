use std::sync::Arc;

use xpc_transport::{Event, EventHandler, Fault, Message, WeakHandle};

use crate::error::ReplyError;
use crate::kind::XpcError;
use crate::registry::HandlerRegistry;
use crate::router::{MessageRouter, Routed};

/// Per-connection state reached from transport callbacks.
///
/// The transport calls [`Dispatcher::dispatch`] for every inbound event and
/// serializes those calls per connection. Fault handlers therefore run on the
/// transport's delivery thread, not on the connection's serial queue.
pub(crate) struct Dispatcher {
    label: String,
    log_unclassified_faults: bool,
    pub(crate) registry: HandlerRegistry,
    pub(crate) router: MessageRouter,
}

impl Dispatcher {
    pub(crate) fn new(label: String, log_unclassified_faults: bool) -> Self {
        Self {
            label,
            log_unclassified_faults,
            registry: HandlerRegistry::new(),
            router: MessageRouter::default(),
        }
    }

    /// Event handler to bind on the transport handle.
    ///
    /// Holds the handle weakly; the handle owns this closure.
    pub(crate) fn event_handler(self: &Arc<Self>, handle: WeakHandle) -> EventHandler {
        let dispatcher = Arc::clone(self);
        Arc::new(move |event| dispatcher.dispatch(event, &handle))
    }

    pub(crate) fn dispatch(&self, event: Event, handle: &WeakHandle) {
        match event {
            Event::Fault(fault) => self.on_fault(&fault),
            Event::Message(message) => self.on_message(message, handle),
        }
    }

    fn on_fault(&self, fault: &Fault) {
        match XpcError::from_fault(fault) {
            Some(kind) => {
                let ran = self.registry.trigger(kind);
                tracing::trace!(
                    connection = %self.label,
                    ?kind,
                    handlers = ran,
                    "fault dispatched"
                );
            }
            None if self.log_unclassified_faults => {
                tracing::warn!(connection = %self.label, %fault, "unclassified fault dropped");
            }
            None => {}
        }
    }

    fn on_message(&self, message: Message, handle: &WeakHandle) {
        let result = match self.router.dispatch(&message) {
            Routed::Inert => {
                tracing::trace!(connection = %self.label, "message ignored; no routes");
                return;
            }
            Routed::Unregistered => {
                tracing::debug!(
                    connection = %self.label,
                    identity = message.get_str(crate::router::IDENTITY_KEY),
                    "no route for message"
                );
                self.registry.trigger(XpcError::UnregisteredMessage);
                Err(XpcError::UnregisteredMessage)
            }
            Routed::Handled(result) => result,
        };
        let Some(reply) = MessageRouter::reply_for(&message, result) else {
            return;
        };
        match handle.upgrade() {
            Some(handle) => handle.send(reply),
            None => tracing::trace!(connection = %self.label, "reply dropped; handle gone"),
        }
    }

    /// Routes a failure returned by a reply continuation.
    pub(crate) fn reply_failed(&self, err: ReplyError) {
        match err.kind() {
            Some(kind) => {
                tracing::error!(connection = %self.label, "reply handling failed: {err}");
                self.registry.trigger(kind);
            }
            None => tracing::debug!(connection = %self.label, "reply not delivered: {err}"),
        }
    }

    pub(crate) fn label(&self) -> &str {
        &self.label
    }
}
