//! Error handling helpers for the transport crate.
//!
//! The transport keeps its synchronous error surface small: faults on a live
//! connection are delivered asynchronously as [`crate::Event::Fault`], so the
//! only errors returned at call sites are local setup failures.

use std::io;

use thiserror::Error;

/// Convenience result alias for fallible transport operations.
pub type TransportResult<T, E = TransportError> = Result<T, E>;

/// Errors surfaced by low-level transport helpers.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The worker thread backing a serial queue could not be started.
    #[error("failed to spawn worker for serial queue `{label}`: {source}")]
    Spawn {
        label: String,
        #[source]
        source: io::Error,
    },
}
