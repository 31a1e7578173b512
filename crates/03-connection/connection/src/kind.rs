use thiserror::Error;
use xpc_transport::Fault;

/// Closed set of error kinds a connection reports to its handlers.
///
/// The first three mirror transport faults. The rest are raised locally and
/// have no transport representation, so the mapping is partial both ways.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Error)]
pub enum XpcError {
    #[error("connection interrupted")]
    ConnectionInterrupted,
    #[error("connection invalid")]
    ConnectionInvalid,
    #[error("termination imminent")]
    TerminationImminent,
    #[error("coding error")]
    CodingError,
    #[error("reply invalid")]
    ReplyInvalid,
    #[error("unregistered message")]
    UnregisteredMessage,
}

impl XpcError {
    pub const ALL: [XpcError; 6] = [
        XpcError::ConnectionInterrupted,
        XpcError::ConnectionInvalid,
        XpcError::TerminationImminent,
        XpcError::CodingError,
        XpcError::ReplyInvalid,
        XpcError::UnregisteredMessage,
    ];

    /// Classifies a transport fault. Faults outside the well-known set yield `None`.
    pub fn from_fault(fault: &Fault) -> Option<Self> {
        if *fault == Fault::CONNECTION_INTERRUPTED {
            Some(XpcError::ConnectionInterrupted)
        } else if *fault == Fault::CONNECTION_INVALID {
            Some(XpcError::ConnectionInvalid)
        } else if *fault == Fault::TERMINATION_IMMINENT {
            Some(XpcError::TerminationImminent)
        } else {
            None
        }
    }

    /// Transport singleton for this kind, if the transport has one.
    pub fn fault(self) -> Option<Fault> {
        match self {
            XpcError::ConnectionInterrupted => Some(Fault::CONNECTION_INTERRUPTED),
            XpcError::ConnectionInvalid => Some(Fault::CONNECTION_INVALID),
            XpcError::TerminationImminent => Some(Fault::TERMINATION_IMMINENT),
            XpcError::CodingError | XpcError::ReplyInvalid | XpcError::UnregisteredMessage => {
                None
            }
        }
    }

    /// Returns true for kinds that originate in the transport.
    pub fn is_transport_fault(self) -> bool {
        self.fault().is_some()
    }

    /// Stable wire code, used for error entries in routed replies.
    pub fn code(self) -> &'static str {
        match self {
            XpcError::ConnectionInterrupted => "connectionInterrupted",
            XpcError::ConnectionInvalid => "connectionInvalid",
            XpcError::TerminationImminent => "terminationImminent",
            XpcError::CodingError => "codingError",
            XpcError::ReplyInvalid => "replyInvalid",
            XpcError::UnregisteredMessage => "unregisteredMessage",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.code() == code)
    }
}
