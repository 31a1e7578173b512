use xpc_transport::{Handle, PeerCredentials};

/// Snapshot of the peer's identity at the time it was read.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ConnectionProperties {
    pub effective_uid: u32,
    pub effective_gid: u32,
    pub pid: i32,
    pub audit_session_id: i32,
}

impl ConnectionProperties {
    pub fn read(handle: &Handle) -> Self {
        handle.credentials().into()
    }
}

impl From<PeerCredentials> for ConnectionProperties {
    fn from(creds: PeerCredentials) -> Self {
        Self {
            effective_uid: creds.euid,
            effective_gid: creds.egid,
            pid: creds.pid,
            audit_session_id: creds.asid,
        }
    }
}
