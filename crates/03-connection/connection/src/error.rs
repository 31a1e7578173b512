use thiserror::Error;
use xpc_transport::{Fault, TransportError};

use crate::kind::XpcError;

pub type ConnectionResult<T> = Result<T, ConnectionError>;

#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("connection has no transport handle")]
    Unbound,

    #[error("connection is already bootstrapped")]
    AlreadyBootstrapped,

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
}

/// Failure reported by a reply continuation.
///
/// The send call has already returned when a reply arrives, so these are
/// never surfaced to the caller. They are logged and routed to the handler
/// registry under [`ReplyError::kind`].
#[derive(Clone, Debug, PartialEq, Error)]
pub enum ReplyError {
    #[error("reply decoding failed: {0}")]
    Coding(String),

    #[error("invalid reply: {0}")]
    Invalid(String),

    #[error("transport fault in place of reply: {0}")]
    Transport(Fault),

    #[error("peer answered with {0}")]
    Remote(XpcError),
}

impl ReplyError {
    pub fn coding(msg: impl Into<String>) -> Self {
        ReplyError::Coding(msg.into())
    }

    pub fn invalid(msg: impl Into<String>) -> Self {
        ReplyError::Invalid(msg.into())
    }

    /// Handler kind this failure triggers, if any.
    ///
    /// Transport faults already reach the registry through the connection's
    /// event handler, and remote errors describe the peer, so neither maps.
    pub fn kind(&self) -> Option<XpcError> {
        match self {
            ReplyError::Coding(_) => Some(XpcError::CodingError),
            ReplyError::Invalid(_) => Some(XpcError::ReplyInvalid),
            ReplyError::Transport(_) | ReplyError::Remote(_) => None,
        }
    }
}
