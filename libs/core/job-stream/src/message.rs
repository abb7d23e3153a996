//! Stream entries as read back from Redis.
//!
//! A [`Message`] is one stream entry: its log-assigned ID plus the ordered
//! list of `(name, value)` fields it was appended with.

use chrono::{DateTime, Utc};

/// Raw entry shape returned by `XRANGE`, `XREADGROUP` and `XAUTOCLAIM`.
///
/// Fields are `None` when a pending entry was deleted from the stream.
pub(crate) type RawEntry = (String, Option<Vec<(String, Vec<u8>)>>);

/// Raw reply shape of `XREADGROUP`: one `(stream, entries)` pair per stream.
pub(crate) type RawReadReply = Vec<(String, Vec<RawEntry>)>;

/// A single named field of a stream entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub name: String,
    pub value: Vec<u8>,
}

impl Field {
    /// Create a new field
    pub fn new(name: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    /// Value as UTF-8 text, if it is valid UTF-8
    pub fn value_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.value).ok()
    }
}

/// One stream entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Redis stream entry ID (e.g., "1234567890123-0")
    pub id: String,

    /// Fields in the order Redis returned them
    pub fields: Vec<Field>,

    /// Number of times this entry has been delivered to a consumer of the group
    pub deliveries: u32,
}

impl Message {
    /// Create a freshly delivered message
    pub fn new(id: impl Into<String>, fields: Vec<Field>) -> Self {
        Self {
            id: id.into(),
            fields,
            deliveries: 1,
        }
    }

    /// Look up a field by name
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Look up a field value by name
    pub fn get(&self, name: &str) -> Option<&[u8]> {
        self.field(name).map(|f| f.value.as_slice())
    }

    /// Field names, in entry order
    pub fn field_names(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.name.as_str()).collect()
    }

    /// Check if this message was delivered before
    pub fn is_redelivery(&self) -> bool {
        self.deliveries > 1
    }

    /// When the entry was appended, parsed from the stream ID.
    ///
    /// Stream IDs are in format "timestamp_ms-sequence"
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.id
            .split('-')
            .next()
            .and_then(|ts| ts.parse::<i64>().ok())
            .and_then(DateTime::from_timestamp_millis)
    }

    /// How long ago the entry was appended
    pub fn age(&self) -> Option<chrono::Duration> {
        self.timestamp().map(|ts| Utc::now() - ts)
    }
}

impl From<RawEntry> for Message {
    fn from((id, fields): RawEntry) -> Self {
        let fields = fields
            .unwrap_or_default()
            .into_iter()
            .map(|(name, value)| Field { name, value })
            .collect();
        Message::new(id, fields)
    }
}

/// Flatten an `XREADGROUP` reply into messages, keeping stream order.
pub(crate) fn from_read_reply(reply: RawReadReply) -> Vec<Message> {
    reply
        .into_iter()
        .flat_map(|(_stream, entries)| entries.into_iter().map(Message::from))
        .collect()
}

/// Convert `XRANGE`/`XAUTOCLAIM` entries into messages.
pub(crate) fn from_entries(entries: Vec<RawEntry>) -> Vec<Message> {
    entries.into_iter().map(Message::from).collect()
}
