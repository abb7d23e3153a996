//! Stream transport: the single point of access to Redis stream commands.
//!
//! Producer, consumer and admin roles are thin views over a shared
//! [`StreamTransport`]. The transport owns two connection managers: one for
//! ordinary commands and one reserved for blocking group reads, so a
//! `XREADGROUP ... BLOCK` never holds up acknowledgements issued concurrently
//! by workers on the same multiplexed connection.

use crate::error::StreamError;
use crate::info::{ClaimPage, ConsumerInfo, GroupInfo, InfoMap, PendingEntry, PendingInfo, StreamInfo};
use crate::message::{self, Field, Message, RawEntry, RawReadReply};
use redis::aio::{ConnectionManager, ConnectionManagerConfig};
use redis::RedisResult;
use std::time::Duration;
use tracing::{debug, info};

type PendingSummaryReply = (i64, Option<String>, Option<String>, Option<Vec<(String, i64)>>);
type ClaimReply = (String, Vec<RawEntry>, Vec<String>);

/// Connection to one stream key.
#[derive(Clone)]
pub struct StreamTransport {
    key: String,
    threshold: usize,
    trim_acked_only: bool,
    conn: ConnectionManager,
    blocking: ConnectionManager,
}

impl std::fmt::Debug for StreamTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamTransport")
            .field("key", &self.key)
            .field("threshold", &self.threshold)
            .field("trim_acked_only", &self.trim_acked_only)
            .finish_non_exhaustive()
    }
}

impl StreamTransport {
    /// Connect to Redis and verify the connection with `PING`.
    ///
    /// `threshold` is the approximate maximum stream length applied on every
    /// append; 0 disables trimming.
    pub async fn connect(
        redis_url: &str,
        key: impl Into<String>,
        threshold: usize,
    ) -> Result<Self, StreamError> {
        let client = redis::Client::open(redis_url)?;
        let conn = ConnectionManager::new(client.clone()).await?;
        // Blocking reads must outlive the default response timeout
        let blocking = ConnectionManager::new_with_config(
            client,
            ConnectionManagerConfig::new().set_response_timeout(None),
        )
        .await?;

        let transport = Self::from_managers(conn, blocking, key, threshold);
        transport.ping().await?;

        info!(stream = %transport.key, threshold, "Connected stream transport");
        Ok(transport)
    }

    /// Connect using a [`core_config::RedisConfig`].
    #[cfg(feature = "config")]
    pub async fn from_config(
        config: &core_config::RedisConfig,
        key: impl Into<String>,
        threshold: usize,
    ) -> Result<Self, StreamError> {
        Self::connect(&config.uri, key, threshold).await
    }

    /// Build a transport from existing connection managers.
    ///
    /// `blocking` should be a dedicated connection; sharing `conn` stalls
    /// other commands for the duration of every blocking read.
    pub fn from_managers(
        conn: ConnectionManager,
        blocking: ConnectionManager,
        key: impl Into<String>,
        threshold: usize,
    ) -> Self {
        Self {
            key: key.into(),
            threshold,
            trim_acked_only: false,
            conn,
            blocking,
        }
    }

    /// Another stream on the same connections.
    pub fn with_key(&self, key: impl Into<String>, threshold: usize) -> Self {
        Self {
            key: key.into(),
            threshold,
            trim_acked_only: self.trim_acked_only,
            conn: self.conn.clone(),
            blocking: self.blocking.clone(),
        }
    }

    /// Only trim entries acknowledged by every group (`XTRIM ... ACKED`, Redis >= 8.2).
    pub fn with_trim_acked_only(mut self, acked_only: bool) -> Self {
        self.trim_acked_only = acked_only;
        self
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    pub async fn ping(&self) -> Result<(), StreamError> {
        let mut conn = self.conn.clone();
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }

    /// Append one entry (`XADD`), returning its ID.
    pub async fn append(&self, fields: &[Field]) -> Result<String, StreamError> {
        if fields.is_empty() {
            return Err(StreamError::Config("an entry needs at least one field".into()));
        }

        let mut cmd = redis::cmd("XADD");
        cmd.arg(&self.key);
        if self.threshold > 0 {
            cmd.arg("MAXLEN").arg("~").arg(self.threshold);
        }
        cmd.arg("*");
        for field in fields {
            cmd.arg(&field.name).arg(field.value.as_slice());
        }

        let mut conn = self.conn.clone();
        let id: String = cmd.query_async(&mut conn).await?;

        debug!(stream = %self.key, message_id = %id, fields = fields.len(), "Appended entry");
        Ok(id)
    }

    /// Entries between `start` and `end` inclusive (`XRANGE`).
    pub async fn range(
        &self,
        start: &str,
        end: &str,
        count: Option<usize>,
    ) -> Result<Vec<Message>, StreamError> {
        let mut cmd = redis::cmd("XRANGE");
        cmd.arg(&self.key).arg(start).arg(end);
        if let Some(count) = count {
            cmd.arg("COUNT").arg(count);
        }

        let mut conn = self.conn.clone();
        let entries: Vec<RawEntry> = cmd.query_async(&mut conn).await?;
        Ok(message::from_entries(entries))
    }

    /// Read up to `count` new entries for `consumer`, blocking up to `block`.
    ///
    /// Returns an empty batch when nothing arrived before the block expired.
    /// A zero `block` does not block at all.
    pub async fn group_read(
        &self,
        group: &str,
        consumer: &str,
        count: usize,
        block: Duration,
    ) -> Result<Vec<Message>, StreamError> {
        if count == 0 {
            return Ok(vec![]);
        }

        let mut cmd = redis::cmd("XREADGROUP");
        cmd.arg("GROUP").arg(group).arg(consumer).arg("COUNT").arg(count);
        if !block.is_zero() {
            cmd.arg("BLOCK").arg(block.as_millis().max(1) as u64);
        }
        cmd.arg("STREAMS").arg(&self.key).arg(">");

        let mut conn = if block.is_zero() {
            self.conn.clone()
        } else {
            self.blocking.clone()
        };
        let result: RedisResult<Option<RawReadReply>> = cmd.query_async(&mut conn).await;

        match result {
            Ok(Some(reply)) => Ok(message::from_read_reply(reply)),
            Ok(None) => Ok(vec![]),
            Err(e) if e.is_timeout() => {
                debug!(stream = %self.key, group, consumer, "Group read timed out");
                Ok(vec![])
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Re-read entries already delivered to `consumer` but not acknowledged.
    pub async fn read_pending(
        &self,
        group: &str,
        consumer: &str,
        count: usize,
    ) -> Result<Vec<Message>, StreamError> {
        let mut conn = self.conn.clone();
        let reply: Option<RawReadReply> = redis::cmd("XREADGROUP")
            .arg("GROUP")
            .arg(group)
            .arg(consumer)
            .arg("COUNT")
            .arg(count)
            .arg("STREAMS")
            .arg(&self.key)
            .arg("0")
            .query_async(&mut conn)
            .await?;

        Ok(reply.map(message::from_read_reply).unwrap_or_default())
    }

    /// Acknowledge entries (`XACK`), returning how many were pending.
    pub async fn ack(&self, group: &str, ids: &[String]) -> Result<i64, StreamError> {
        if ids.is_empty() {
            return Err(StreamError::NoIds);
        }

        let mut conn = self.conn.clone();
        let acked: i64 = redis::cmd("XACK")
            .arg(&self.key)
            .arg(group)
            .arg(ids)
            .query_async(&mut conn)
            .await?;

        debug!(stream = %self.key, group, acked, "Acknowledged entries");
        Ok(acked)
    }

    /// Acknowledge and delete entries atomically (`MULTI; XACK; XDEL; EXEC`).
    pub async fn ack_delete(&self, group: &str, ids: &[String]) -> Result<i64, StreamError> {
        if ids.is_empty() {
            return Err(StreamError::NoIds);
        }

        let mut conn = self.conn.clone();
        let (acked, deleted): (i64, i64) = redis::pipe()
            .atomic()
            .cmd("XACK")
            .arg(&self.key)
            .arg(group)
            .arg(ids)
            .cmd("XDEL")
            .arg(&self.key)
            .arg(ids)
            .query_async(&mut conn)
            .await?;

        debug!(stream = %self.key, group, acked, deleted, "Acknowledged and deleted entries");
        Ok(acked)
    }

    /// Delete entries without touching any group (`XDEL`).
    pub async fn delete(&self, ids: &[String]) -> Result<i64, StreamError> {
        if ids.is_empty() {
            return Err(StreamError::NoIds);
        }

        let mut conn = self.conn.clone();
        let deleted: i64 = redis::cmd("XDEL")
            .arg(&self.key)
            .arg(ids)
            .query_async(&mut conn)
            .await?;
        Ok(deleted)
    }

    /// Transfer entries idle for at least `min_idle` to `consumer` (`XAUTOCLAIM`).
    pub async fn claim_idle(
        &self,
        group: &str,
        consumer: &str,
        min_idle: Duration,
        start: &str,
        count: usize,
    ) -> Result<ClaimPage, StreamError> {
        let mut conn = self.conn.clone();
        let (next_cursor, entries, deleted_ids): ClaimReply = redis::cmd("XAUTOCLAIM")
            .arg(&self.key)
            .arg(group)
            .arg(consumer)
            .arg(min_idle.as_millis() as u64)
            .arg(start)
            .arg("COUNT")
            .arg(count.max(1))
            .query_async(&mut conn)
            .await?;

        Ok(ClaimPage {
            next_cursor,
            messages: message::from_entries(entries),
            deleted_ids,
        })
    }

    /// Pending entries summary of `group` (`XPENDING key group`).
    pub async fn pending_summary(&self, group: &str) -> Result<PendingInfo, StreamError> {
        let mut conn = self.conn.clone();
        let (total, first_id, latest_id, consumers): PendingSummaryReply = redis::cmd("XPENDING")
            .arg(&self.key)
            .arg(group)
            .query_async(&mut conn)
            .await?;

        Ok(PendingInfo {
            group: group.to_string(),
            total,
            first_id,
            latest_id,
            consumers: consumers.unwrap_or_default(),
        })
    }

    /// Pending entries of `group` between `start` and `end` (extended `XPENDING`).
    pub async fn pending_entries(
        &self,
        group: &str,
        start: &str,
        end: &str,
        count: usize,
    ) -> Result<Vec<PendingEntry>, StreamError> {
        let mut conn = self.conn.clone();
        let rows: Vec<(String, String, u64, u64)> = redis::cmd("XPENDING")
            .arg(&self.key)
            .arg(group)
            .arg(start)
            .arg(end)
            .arg(count)
            .query_async(&mut conn)
            .await?;

        Ok(rows
            .into_iter()
            .map(|(id, consumer, idle_ms, deliveries)| PendingEntry {
                id,
                consumer,
                idle: Duration::from_millis(idle_ms),
                deliveries: u32::try_from(deliveries).unwrap_or(u32::MAX),
            })
            .collect())
    }

    /// Trim the stream to about `threshold` entries (`XTRIM MAXLEN ~`).
    ///
    /// Returns the number of entries removed; a zero threshold removes nothing.
    pub async fn trim_approx(&self) -> Result<i64, StreamError> {
        if self.threshold == 0 {
            return Ok(0);
        }

        let mut cmd = redis::cmd("XTRIM");
        cmd.arg(&self.key).arg("MAXLEN").arg("~").arg(self.threshold);
        if self.trim_acked_only {
            cmd.arg("ACKED");
        }

        let mut conn = self.conn.clone();
        let removed: i64 = cmd.query_async(&mut conn).await?;

        debug!(stream = %self.key, removed, "Trimmed stream");
        Ok(removed)
    }

    /// Create `group` starting at `start_id`, creating the stream if needed.
    ///
    /// An existing group is not an error.
    pub async fn create_group(&self, group: &str, start_id: &str) -> Result<(), StreamError> {
        let mut conn = self.conn.clone();
        let result: RedisResult<()> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(&self.key)
            .arg(group)
            .arg(start_id)
            .arg("MKSTREAM")
            .query_async(&mut conn)
            .await;

        match result {
            Ok(()) => {
                info!(stream = %self.key, group, start_id, "Created consumer group");
                Ok(())
            }
            Err(e) if e.code() == Some("BUSYGROUP") => {
                debug!(stream = %self.key, group, "Consumer group already exists");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Destroy `group`; returns whether it existed.
    pub async fn destroy_group(&self, group: &str) -> Result<bool, StreamError> {
        let mut conn = self.conn.clone();
        let destroyed: i64 = redis::cmd("XGROUP")
            .arg("DESTROY")
            .arg(&self.key)
            .arg(group)
            .query_async(&mut conn)
            .await?;
        Ok(destroyed > 0)
    }

    /// Remove `consumer` from `group`; returns how many pending entries it owned.
    pub async fn delete_consumer(&self, group: &str, consumer: &str) -> Result<i64, StreamError> {
        let mut conn = self.conn.clone();
        let pending: i64 = redis::cmd("XGROUP")
            .arg("DELCONSUMER")
            .arg(&self.key)
            .arg(group)
            .arg(consumer)
            .query_async(&mut conn)
            .await?;
        Ok(pending)
    }

    /// Delete the whole stream key; returns whether it existed.
    pub async fn delete_stream(&self) -> Result<bool, StreamError> {
        let mut conn = self.conn.clone();
        let removed: i64 = redis::cmd("DEL").arg(&self.key).query_async(&mut conn).await?;
        Ok(removed > 0)
    }

    /// Number of entries in the stream (`XLEN`).
    pub async fn len(&self) -> Result<i64, StreamError> {
        let mut conn = self.conn.clone();
        let len: i64 = redis::cmd("XLEN").arg(&self.key).query_async(&mut conn).await?;
        Ok(len)
    }

    pub async fn stream_info(&self) -> Result<StreamInfo, StreamError> {
        let mut conn = self.conn.clone();
        let map: InfoMap = redis::cmd("XINFO")
            .arg("STREAM")
            .arg(&self.key)
            .query_async(&mut conn)
            .await?;
        Ok(StreamInfo::from_map(&self.key, &map))
    }

    pub async fn group_info(&self) -> Result<Vec<GroupInfo>, StreamError> {
        let mut conn = self.conn.clone();
        let maps: Vec<InfoMap> = redis::cmd("XINFO")
            .arg("GROUPS")
            .arg(&self.key)
            .query_async(&mut conn)
            .await?;
        Ok(maps.iter().map(GroupInfo::from_map).collect())
    }

    pub async fn consumer_info(&self, group: &str) -> Result<Vec<ConsumerInfo>, StreamError> {
        let mut conn = self.conn.clone();
        let maps: Vec<InfoMap> = redis::cmd("XINFO")
            .arg("CONSUMERS")
            .arg(&self.key)
            .arg(group)
            .query_async(&mut conn)
            .await?;
        Ok(maps.iter().map(ConsumerInfo::from_map).collect())
    }
}
