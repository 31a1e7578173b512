//! Faults and events delivered by the transport.

use std::borrow::Cow;
use std::fmt;

use crate::message::Message;

/// Opaque error object emitted by the transport in place of a message.
///
/// Faults compare by their description key. The three associated constants
/// are the transport's well-known singletons; anything else the host produces
/// is built with [`Fault::other`].
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Fault {
    description: Cow<'static, str>,
}

impl Fault {
    /// The remote end went away; the connection may be used again.
    pub const CONNECTION_INTERRUPTED: Fault = Fault::from_static("Connection interrupted");
    /// The connection can never deliver another message.
    pub const CONNECTION_INVALID: Fault = Fault::from_static("Connection invalid");
    /// The host is about to terminate the process.
    pub const TERMINATION_IMMINENT: Fault = Fault::from_static("Termination imminent");

    /// Builds a fault from a static description.
    pub const fn from_static(description: &'static str) -> Self {
        Self {
            description: Cow::Borrowed(description),
        }
    }

    /// Builds a fault outside the well-known set.
    pub fn other(description: impl Into<String>) -> Self {
        Self {
            description: Cow::Owned(description.into()),
        }
    }

    /// Human readable description; also the fault's identity.
    pub fn description(&self) -> &str {
        &self.description
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.description)
    }
}

/// Anything the transport hands to a connection's event handler or reply handler.
#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    /// A structured message.
    Message(Message),
    /// A fault in place of a message.
    Fault(Fault),
}

impl Event {
    /// Returns true when the event carries a structured message.
    pub fn is_message(&self) -> bool {
        matches!(self, Event::Message(_))
    }

    pub fn as_fault(&self) -> Option<&Fault> {
        match self {
            Event::Fault(fault) => Some(fault),
            Event::Message(_) => None,
        }
    }

    pub fn as_message(&self) -> Option<&Message> {
        match self {
            Event::Message(message) => Some(message),
            Event::Fault(_) => None,
        }
    }
}

impl From<Message> for Event {
    fn from(message: Message) -> Self {
        Event::Message(message)
    }
}

impl From<Fault> for Event {
    fn from(fault: Fault) -> Self {
        Event::Fault(fault)
    }
}
