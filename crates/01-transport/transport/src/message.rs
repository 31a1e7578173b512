//! Structured message object model.
//!
//! A [`Message`] is a string-keyed dictionary of [`Value`]s. Besides its
//! entries it may carry reply bookkeeping owned by the transport: a request
//! sent with a reply handler is stamped with a [`ReplySlot`], and the reply
//! built from it with [`Message::create_reply`] carries the same slot back.

use std::collections::btree_map::{self, BTreeMap};

/// Single value stored in a [`Message`].
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int64(i64),
    Uint64(u64),
    Double(f64),
    String(String),
    Data(Vec<u8>),
    Array(Vec<Value>),
    Dictionary(BTreeMap<String, Value>),
}

impl Value {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::Uint64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Double(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_data(&self) -> Option<&[u8]> {
        match self {
            Value::Data(v) => Some(v),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int64(v)
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Value::Uint64(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_owned())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Data(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::Array(v)
    }
}

/// Transport-assigned token pairing a request with its reply.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ReplySlot(u64);

impl ReplySlot {
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    pub const fn id(self) -> u64 {
        self.0
    }
}

/// Structured message exchanged over a connection.
///
/// Equality only considers the entries; reply bookkeeping is transport state.
#[derive(Clone, Debug, Default)]
pub struct Message {
    entries: BTreeMap<String, Value>,
    awaiting_reply: Option<ReplySlot>,
    in_reply_to: Option<ReplySlot>,
}

impl Message {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.entries.insert(key.into(), value.into())
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.entries.remove(key)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(Value::as_bool)
    }

    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(Value::as_i64)
    }

    pub fn get_u64(&self, key: &str) -> Option<u64> {
        self.get(key).and_then(Value::as_u64)
    }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(Value::as_f64)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    pub fn get_data(&self, key: &str) -> Option<&[u8]> {
        self.get(key).and_then(Value::as_data)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, Value> {
        self.entries.iter()
    }

    /// Copies every entry of `other` into this message, replacing duplicates.
    pub fn merge(&mut self, other: Message) {
        self.entries.extend(other.entries);
    }

    /// True when the sender registered a reply handler for this message.
    pub fn expects_reply(&self) -> bool {
        self.awaiting_reply.is_some()
    }

    /// Builds an empty reply addressed to this message's sender.
    ///
    /// Returns `None` when the sender did not ask for a reply.
    pub fn create_reply(&self) -> Option<Message> {
        self.awaiting_reply.map(|slot| Message {
            entries: BTreeMap::new(),
            awaiting_reply: None,
            in_reply_to: Some(slot),
        })
    }

    /// Slot a transport stamped on an outgoing request.
    pub fn reply_slot(&self) -> Option<ReplySlot> {
        self.awaiting_reply
    }

    /// Slot this reply answers, if it is a reply.
    pub fn in_reply_to(&self) -> Option<ReplySlot> {
        self.in_reply_to
    }

    /// Stamps the message as a request awaiting `slot`. Used by transports.
    pub fn attach_reply_slot(&mut self, slot: ReplySlot) {
        self.awaiting_reply = Some(slot);
    }
}

impl PartialEq for Message {
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries
    }
}

impl<'a> IntoIterator for &'a Message {
    type Item = (&'a String, &'a Value);
    type IntoIter = btree_map::Iter<'a, String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}
