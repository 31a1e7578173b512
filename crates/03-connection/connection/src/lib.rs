//! Connection layer over a message-passing IPC transport.
//!
//! A [`Connection`] owns one transport handle and translates what the
//! transport delivers into a closed error taxonomy ([`XpcError`]) reported
//! through per-kind handler lists. It offers fire-and-forget and
//! request/reply sends, a per-connection barrier, and an optional router
//! that dispatches inbound messages by their `identity` field.
//!
//! Transport faults are never returned from a call. They arrive
//! asynchronously and reach the handlers registered with
//! [`Connection::handle`]; failures inside reply continuations are routed the
//! same way.

mod connection;
mod dispatch;
mod error;
mod kind;
mod options;
mod properties;
mod registry;
mod reply;
mod router;

pub use connection::Connection;
pub use error::{ConnectionError, ConnectionResult, ReplyError};
pub use kind::XpcError;
pub use options::ConnectionOptions;
pub use properties::ConnectionProperties;
pub use registry::{ErrorHandler, HandlerRegistry};
pub use reply::Reply;
pub use router::{RouteHandler, ERROR_KEY, IDENTITY_KEY};
