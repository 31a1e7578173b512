use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use xpc_transport::Message;

use crate::kind::XpcError;

/// Message field naming the route an inbound message is addressed to.
pub const IDENTITY_KEY: &str = "identity";
/// Reply field carrying an [`XpcError::code`] when a routed request fails.
pub const ERROR_KEY: &str = "error";

/// Handles one routed message. `Ok(Some(body))` is merged into the reply;
/// `Err(kind)` is written back as an error entry.
pub type RouteHandler = Arc<dyn Fn(&Message) -> Result<Option<Message>, XpcError> + Send + Sync>;

/// Outcome of offering a message to the router.
#[derive(Debug, PartialEq)]
pub(crate) enum Routed {
    /// No route was ever registered.
    Inert,
    /// The message names no registered route.
    Unregistered,
    /// A route ran and produced this result.
    Handled(Result<Option<Message>, XpcError>),
}

/// Table of inbound message handlers keyed by [`IDENTITY_KEY`].
#[derive(Default)]
pub(crate) struct MessageRouter {
    routes: RwLock<HashMap<String, RouteHandler>>,
}

impl MessageRouter {
    /// Installs `handler` for `identity`. Returns true if it replaced a route.
    pub(crate) fn insert(&self, identity: String, handler: RouteHandler) -> bool {
        self.routes.write().insert(identity, handler).is_some()
    }

    pub(crate) fn dispatch(&self, message: &Message) -> Routed {
        let handler = {
            let routes = self.routes.read();
            if routes.is_empty() {
                return Routed::Inert;
            }
            message
                .get_str(IDENTITY_KEY)
                .and_then(|identity| routes.get(identity).cloned())
        };
        match handler {
            Some(handler) => Routed::Handled(handler(message)),
            None => Routed::Unregistered,
        }
    }

    /// Builds the answer to `request`, or `None` if the sender wants no reply.
    pub(crate) fn reply_for(
        request: &Message,
        result: Result<Option<Message>, XpcError>,
    ) -> Option<Message> {
        let mut reply = request.create_reply()?;
        match result {
            Ok(Some(body)) => reply.merge(body),
            Ok(None) => {}
            Err(kind) => {
                reply.insert(ERROR_KEY, kind.code());
            }
        }
        Some(reply)
    }
}
