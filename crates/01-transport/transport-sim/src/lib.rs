//! In-process simulated host transport.
//!
//! [`SimTransport`] implements the [`xpc_transport::Transport`] boundary
//! entirely inside one process so the connection layer can be exercised
//! without a platform IPC service:
//! * services register a [`Listener`] in the local, mach or privileged-mach namespace;
//! * client handles look their service up on first resume and are paired with a
//!   peer handle that the listener yields from [`Listener::incoming`];
//! * every handle owns a delivery worker, so suspension, barriers and reply
//!   ordering follow the same rules a host transport enforces;
//! * faults can be injected per handle or broadcast to a listener's clients.

mod endpoint;
mod error;
mod listener;
mod namespace;

pub use endpoint::SimConnection;
pub use error::{SimError, SimResult};
pub use listener::{Listener, ListenerConfig};
pub use namespace::{Domain, SimTransport};
