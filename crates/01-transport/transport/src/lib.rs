//! Host transport boundary consumed by the connection layer.
//!
//! This crate describes what the platform's message-passing IPC transport
//! provides, without implementing any particular host:
//! * [`Transport`] – creates connection handles for named services.
//! * [`RawConnection`] / [`Handle`] – one end of a connection, compared by identity.
//! * [`Message`] / [`Value`] – the structured message object model.
//! * [`Fault`] / [`Event`] – what the transport delivers to an event handler.
//! * [`SerialQueue`] – FIFO single-worker execution context for replies and barriers.
//! * [`TransportError`] – small error surface for local setup failures.

mod error;
mod fault;
mod handle;
mod message;
mod queue;

pub use error::{TransportError, TransportResult};
pub use fault::{Event, Fault};
pub use handle::{
    EventHandler, Handle, MachServiceFlags, PeerCredentials, RawConnection, ReplyHandler,
    Transport, WeakHandle,
};
pub use message::{Message, ReplySlot, Value};
pub use queue::{Job, SerialQueue};
