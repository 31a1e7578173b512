use xpc_transport::{Event, Message};

use crate::error::ReplyError;
use crate::kind::XpcError;
use crate::router::ERROR_KEY;

/// What a reply continuation receives: the peer's answer or a fault in its place.
#[derive(Clone, Debug, PartialEq)]
pub struct Reply {
    event: Event,
}

impl Reply {
    pub(crate) fn new(event: Event) -> Self {
        Self { event }
    }

    pub fn event(&self) -> &Event {
        &self.event
    }

    pub fn into_event(self) -> Event {
        self.event
    }

    /// The reply body.
    ///
    /// Fails with [`ReplyError::Transport`] when a fault arrived instead, and
    /// with [`ReplyError::Remote`] when the peer answered with an error entry.
    pub fn message(&self) -> Result<&Message, ReplyError> {
        match &self.event {
            Event::Fault(fault) => Err(ReplyError::Transport(fault.clone())),
            Event::Message(msg) => match msg.get(ERROR_KEY) {
                None => Ok(msg),
                Some(value) => {
                    let code = value
                        .as_str()
                        .ok_or_else(|| ReplyError::invalid("error entry is not a string"))?;
                    let kind = XpcError::from_code(code).ok_or_else(|| {
                        ReplyError::invalid(format!("unknown error code `{code}`"))
                    })?;
                    Err(ReplyError::Remote(kind))
                }
            },
        }
    }

    pub fn into_message(self) -> Result<Message, ReplyError> {
        self.message()?;
        match self.event {
            Event::Message(msg) => Ok(msg),
            Event::Fault(fault) => Err(ReplyError::Transport(fault)),
        }
    }

    pub fn get_bool(&self, key: &str) -> Result<bool, ReplyError> {
        self.field(key, "bool", |m| m.get_bool(key))
    }

    pub fn get_i64(&self, key: &str) -> Result<i64, ReplyError> {
        self.field(key, "int64", |m| m.get_i64(key))
    }

    pub fn get_u64(&self, key: &str) -> Result<u64, ReplyError> {
        self.field(key, "uint64", |m| m.get_u64(key))
    }

    pub fn get_f64(&self, key: &str) -> Result<f64, ReplyError> {
        self.field(key, "double", |m| m.get_f64(key))
    }

    pub fn get_str(&self, key: &str) -> Result<&str, ReplyError> {
        self.field(key, "string", |m| m.get_str(key))
    }

    pub fn get_data(&self, key: &str) -> Result<&[u8], ReplyError> {
        self.field(key, "data", |m| m.get_data(key))
    }

    fn field<'a, T>(
        &'a self,
        key: &str,
        expected: &str,
        read: impl FnOnce(&'a Message) -> Option<T>,
    ) -> Result<T, ReplyError> {
        let msg = self.message()?;
        if !msg.contains_key(key) {
            return Err(ReplyError::coding(format!("missing field `{key}`")));
        }
        read(msg).ok_or_else(|| ReplyError::coding(format!("field `{key}` is not {expected}")))
    }
}
