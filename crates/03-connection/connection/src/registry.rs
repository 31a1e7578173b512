use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use smallvec::SmallVec;

use crate::kind::XpcError;

/// Callback run each time its error kind is reported.
pub type ErrorHandler = Arc<dyn Fn() + Send + Sync + 'static>;

type HandlerList = SmallVec<[ErrorHandler; 2]>;

/// Ordered handler lists keyed by error kind.
///
/// Registration appends. Triggering runs a snapshot of the list taken under
/// the read lock, so handlers may register more handlers while running; those
/// take effect from the next trigger.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: RwLock<HashMap<XpcError, HandlerList>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&self, kind: XpcError, handler: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.handlers
            .write()
            .entry(kind)
            .or_default()
            .push(Arc::new(handler));
    }

    /// Runs every handler registered for `kind`, in registration order.
    /// Returns how many ran.
    pub fn trigger(&self, kind: XpcError) -> usize {
        let snapshot = match self.handlers.read().get(&kind) {
            Some(list) => list.clone(),
            None => return 0,
        };
        for handler in &snapshot {
            handler();
        }
        snapshot.len()
    }

    pub fn count(&self, kind: XpcError) -> usize {
        self.handlers.read().get(&kind).map_or(0, SmallVec::len)
    }
}
