//! Redis test infrastructure
//!
//! Provides a `TestRedis` helper that starts a Redis 8 container. Streams,
//! consumer groups and `XAUTOCLAIM` all need Redis 7 or newer.

use redis::aio::{ConnectionManager, MultiplexedConnection};
use redis::Client;
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, ImageExt};
use testcontainers_modules::redis::Redis;

/// Test Redis wrapper that ensures proper cleanup
///
/// The container is automatically stopped and removed when this struct is dropped.
///
/// # Example
///
/// ```no_run
/// use test_utils::TestRedis;
///
/// # async fn example() {
/// let redis = TestRedis::new().await;
/// let mut conn = redis.connection();
///
/// let id: String = redis::cmd("XADD")
///     .arg("jobs")
///     .arg("*")
///     .arg("jid")
///     .arg("abc")
///     .query_async(&mut conn)
///     .await
///     .unwrap();
/// assert!(id.contains('-'));
/// # }
/// ```
pub struct TestRedis {
    #[allow(dead_code)]
    container: ContainerAsync<Redis>,
    client: Client,
    connection: MultiplexedConnection,
    pub connection_string: String,
}

impl TestRedis {
    /// Create a new test Redis instance
    ///
    /// Uses Redis 8 Alpine image by default.
    pub async fn new() -> Self {
        let redis_image = Redis::default().with_tag("8-alpine");

        let container = redis_image
            .start()
            .await
            .expect("Failed to start Redis container");

        let host_port = container
            .get_host_port_ipv4(6379)
            .await
            .expect("Failed to get Redis port");

        let connection_string = format!("redis://127.0.0.1:{}", host_port);

        let client = Client::open(connection_string.clone())
            .expect("Failed to create Redis client");

        let connection = client
            .get_multiplexed_async_connection()
            .await
            .expect("Failed to connect to Redis");

        tracing::info!(port = host_port, "Test Redis ready (Redis 8-alpine)");

        Self {
            container,
            client,
            connection,
            connection_string,
        }
    }

    /// Get a cloned connection for raw commands in assertions
    pub fn connection(&self) -> MultiplexedConnection {
        self.connection.clone()
    }

    /// A fresh reconnecting connection, the kind stream transports hold
    pub async fn connection_manager(&self) -> ConnectionManager {
        ConnectionManager::new(self.client.clone())
            .await
            .expect("Failed to create connection manager")
    }

    /// Get the connection string for manual client creation
    pub fn connection_string(&self) -> &str {
        &self.connection_string
    }
}

// Container is automatically cleaned up when TestRedis is dropped
impl Drop for TestRedis {
    fn drop(&mut self) {
        tracing::debug!("Cleaning up test Redis container");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_stream_append_and_len() {
        let redis = TestRedis::new().await;
        let mut conn = redis.connection();

        for i in 0..3 {
            let _: String = redis::cmd("XADD")
                .arg("jobs")
                .arg("*")
                .arg("n")
                .arg(i)
                .query_async(&mut conn)
                .await
                .unwrap();
        }

        let len: i64 = redis::cmd("XLEN")
            .arg("jobs")
            .query_async(&mut conn)
            .await
            .unwrap();
        assert_eq!(len, 3);
    }

    #[tokio::test]
    async fn test_consumer_group_create() {
        let redis = TestRedis::new().await;
        let mut conn = redis.connection_manager().await;

        let reply: String = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg("jobs")
            .arg("workers")
            .arg("0")
            .arg("MKSTREAM")
            .query_async(&mut conn)
            .await
            .unwrap();
        assert_eq!(reply, "OK");

        // A second create reports BUSYGROUP
        let again: redis::RedisResult<String> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg("jobs")
            .arg("workers")
            .arg("0")
            .arg("MKSTREAM")
            .query_async(&mut conn)
            .await;
        let err = again.unwrap_err();
        assert_eq!(err.code(), Some("BUSYGROUP"));
    }
}
