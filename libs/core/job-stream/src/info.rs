//! Typed views of `XINFO` and `XPENDING` replies.

use crate::message::Message;
use redis::Value;
use std::collections::HashMap;
use std::time::Duration;

/// Stream-level information (`XINFO STREAM`)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamInfo {
    pub key: String,
    pub length: i64,
    pub groups: i64,
    pub last_generated_id: Option<String>,
    pub first_entry_id: Option<String>,
    pub last_entry_id: Option<String>,
}

/// Consumer group information (`XINFO GROUPS`)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupInfo {
    pub name: String,
    pub consumers: i64,
    pub pending: i64,
    pub last_delivered_id: Option<String>,
    /// Entries not yet delivered to the group (Redis >= 7)
    pub lag: Option<i64>,
}

/// Consumer information (`XINFO CONSUMERS`)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConsumerInfo {
    pub name: String,
    pub pending: i64,
    pub idle: Duration,
}

/// Pending entries summary of a group (`XPENDING key group`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PendingInfo {
    pub group: String,
    pub total: i64,
    pub first_id: Option<String>,
    pub latest_id: Option<String>,
    /// Pending count per consumer
    pub consumers: Vec<(String, i64)>,
}

impl PendingInfo {
    /// Pending count for one consumer
    pub fn pending_for(&self, consumer: &str) -> i64 {
        self.consumers
            .iter()
            .find(|(name, _)| name == consumer)
            .map(|(_, count)| *count)
            .unwrap_or(0)
    }
}

/// One entry of the pending entries list (`XPENDING key group start end count`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingEntry {
    pub id: String,
    pub consumer: String,
    pub idle: Duration,
    pub deliveries: u32,
}

/// One page of an idle-claim scan (`XAUTOCLAIM`).
#[derive(Debug, Clone, Default)]
pub struct ClaimPage {
    /// Cursor for the next page; "0-0" once the scan is complete
    pub next_cursor: String,
    /// Messages now owned by the claiming consumer
    pub messages: Vec<Message>,
    /// Pending IDs whose entries no longer exist in the stream
    pub deleted_ids: Vec<String>,
}

impl ClaimPage {
    pub fn is_last(&self) -> bool {
        self.next_cursor == "0-0"
    }
}

pub(crate) type InfoMap = HashMap<String, Value>;

impl StreamInfo {
    pub(crate) fn from_map(key: &str, map: &InfoMap) -> Self {
        Self {
            key: key.to_string(),
            length: int(map, "length"),
            groups: int(map, "groups"),
            last_generated_id: text(map, "last-generated-id"),
            first_entry_id: entry_id(map, "first-entry"),
            last_entry_id: entry_id(map, "last-entry"),
        }
    }
}

impl GroupInfo {
    pub(crate) fn from_map(map: &InfoMap) -> Self {
        Self {
            name: text(map, "name").unwrap_or_default(),
            consumers: int(map, "consumers"),
            pending: int(map, "pending"),
            last_delivered_id: text(map, "last-delivered-id"),
            lag: opt_int(map, "lag"),
        }
    }
}

impl ConsumerInfo {
    pub(crate) fn from_map(map: &InfoMap) -> Self {
        Self {
            name: text(map, "name").unwrap_or_default(),
            pending: int(map, "pending"),
            idle: Duration::from_millis(u64::try_from(int(map, "idle")).unwrap_or(0)),
        }
    }
}

fn opt_int(map: &InfoMap, key: &str) -> Option<i64> {
    match map.get(key)? {
        Value::Int(n) => Some(*n),
        Value::BulkString(bytes) => std::str::from_utf8(bytes).ok()?.parse().ok(),
        Value::SimpleString(s) => s.parse().ok(),
        _ => None,
    }
}

fn int(map: &InfoMap, key: &str) -> i64 {
    opt_int(map, key).unwrap_or(0)
}

fn text(map: &InfoMap, key: &str) -> Option<String> {
    value_text(map.get(key)?)
}

fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::BulkString(bytes) => String::from_utf8(bytes.clone()).ok(),
        Value::SimpleString(s) => Some(s.clone()),
        Value::Int(n) => Some(n.to_string()),
        _ => None,
    }
}

// first-entry / last-entry are `[id, [field, value, ...]]` or nil
fn entry_id(map: &InfoMap, key: &str) -> Option<String> {
    match map.get(key)? {
        Value::Array(items) => items.first().and_then(value_text),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bulk(s: &str) -> Value {
        Value::BulkString(s.as_bytes().to_vec())
    }

    #[test]
    fn test_stream_info_from_map() {
        let mut map = InfoMap::new();
        map.insert("length".into(), Value::Int(3));
        map.insert("groups".into(), Value::Int(1));
        map.insert("last-generated-id".into(), bulk("5-0"));
        map.insert(
            "first-entry".into(),
            Value::Array(vec![bulk("1-0"), Value::Array(vec![bulk("jid"), bulk("a")])]),
        );
        map.insert("last-entry".into(), Value::Nil);

        let info = StreamInfo::from_map("jobs", &map);
        assert_eq!(info.key, "jobs");
        assert_eq!(info.length, 3);
        assert_eq!(info.groups, 1);
        assert_eq!(info.last_generated_id.as_deref(), Some("5-0"));
        assert_eq!(info.first_entry_id.as_deref(), Some("1-0"));
        assert_eq!(info.last_entry_id, None);
    }

    #[test]
    fn test_group_info_lag_is_optional() {
        let mut map = InfoMap::new();
        map.insert("name".into(), bulk("workers"));
        map.insert("pending".into(), Value::Int(2));
        map.insert("lag".into(), Value::Nil);

        let info = GroupInfo::from_map(&map);
        assert_eq!(info.name, "workers");
        assert_eq!(info.pending, 2);
        assert_eq!(info.consumers, 0);
        assert_eq!(info.lag, None);
    }

    #[test]
    fn test_consumer_info_idle() {
        let mut map = InfoMap::new();
        map.insert("name".into(), bulk("consumer-1"));
        map.insert("idle".into(), Value::Int(1500));

        let info = ConsumerInfo::from_map(&map);
        assert_eq!(info.idle, Duration::from_millis(1500));
    }

    #[test]
    fn test_pending_for_consumer() {
        let info = PendingInfo {
            group: "workers".into(),
            total: 3,
            first_id: Some("1-0".into()),
            latest_id: Some("3-0".into()),
            consumers: vec![("a".into(), 2), ("b".into(), 1)],
        };
        assert_eq!(info.pending_for("a"), 2);
        assert_eq!(info.pending_for("c"), 0);
    }
}
