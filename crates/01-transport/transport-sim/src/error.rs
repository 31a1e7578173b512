use thiserror::Error;

use xpc_transport::TransportError;

use crate::namespace::Domain;

pub type SimResult<T> = Result<T, SimError>;

#[derive(Debug, Error)]
pub enum SimError {
    #[error("service `{name}` is already registered in the {domain} namespace")]
    AlreadyRegistered { name: String, domain: Domain },

    #[error(transparent)]
    Transport(#[from] TransportError),
}
