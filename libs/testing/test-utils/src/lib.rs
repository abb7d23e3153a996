//! Shared test utilities
//!
//! This crate provides reusable test infrastructure:
//! - `TestRedis`: Redis 8 container with automatic cleanup (feature: "redis", default)
//! - `TestDataBuilder`: Deterministic stream, group and consumer names (always available)
//!
//! # Usage
//!
//! ```toml
//! [dev-dependencies]
//! test-utils = { workspace = true }
//! ```
//!
//! ```rust,ignore
//! use test_utils::{TestDataBuilder, TestRedis};
//!
//! #[tokio::test]
//! async fn my_stream_test() {
//!     let redis = TestRedis::new().await;
//!     let names = TestDataBuilder::from_test_name("my_stream_test");
//!
//!     let key = names.stream_key("jobs");
//!     let transport = StreamTransport::connect(redis.connection_string(), &key, 0).await.unwrap();
//! }
//! ```

use uuid::Uuid;

#[cfg(feature = "redis")]
mod redis;

#[cfg(feature = "redis")]
pub use redis::TestRedis;

/// Builder for test data with deterministic randomization
///
/// Names derived from the same seed are stable across runs, and names from
/// different tests never collide, so tests can share one Redis instance.
pub struct TestDataBuilder {
    seed: u64,
}

impl TestDataBuilder {
    /// Create a new builder with a seed (for deterministic tests)
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }

    /// Create from test name (generates seed from test name hash)
    ///
    /// # Example
    ///
    /// ```
    /// use test_utils::TestDataBuilder;
    ///
    /// let builder = TestDataBuilder::from_test_name("test_group_read");
    /// ```
    pub fn from_test_name(name: &str) -> Self {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};

        let mut hasher = DefaultHasher::new();
        name.hash(&mut hasher);
        Self::new(hasher.finish())
    }

    /// Deterministic UUID for the seed
    pub fn id(&self) -> Uuid {
        let bytes = self.seed.to_le_bytes();
        let mut uuid_bytes = [0u8; 16];
        uuid_bytes[..8].copy_from_slice(&bytes);
        uuid_bytes[8..16].copy_from_slice(&bytes);
        Uuid::from_bytes(uuid_bytes)
    }

    /// Generate a unique name for testing
    ///
    /// ```
    /// use test_utils::TestDataBuilder;
    ///
    /// let builder = TestDataBuilder::new(7);
    /// assert_eq!(builder.name("group", "main"), "test-group-7-main");
    /// ```
    pub fn name(&self, prefix: &str, suffix: &str) -> String {
        format!("test-{}-{}-{}", prefix, self.seed, suffix)
    }

    /// Stream key, e.g. `test:7:jobs`
    pub fn stream_key(&self, suffix: &str) -> String {
        format!("test:{}:{}", self.seed, suffix)
    }

    /// Consumer group name
    pub fn group(&self, suffix: &str) -> String {
        self.name("group", suffix)
    }

    /// Consumer name within a group
    pub fn consumer(&self, suffix: &str) -> String {
        self.name("consumer", suffix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_builder_deterministic() {
        let builder1 = TestDataBuilder::new(42);
        let builder2 = TestDataBuilder::new(42);

        assert_eq!(builder1.id(), builder2.id());
        assert_eq!(builder1.stream_key("jobs"), builder2.stream_key("jobs"));
        assert_eq!(builder1.stream_key("jobs"), "test:42:jobs");
    }

    #[test]
    fn test_data_builder_different_names() {
        let builder1 = TestDataBuilder::from_test_name("test1");
        let builder2 = TestDataBuilder::from_test_name("test2");

        assert_ne!(builder1.id(), builder2.id());
        assert_ne!(builder1.group("main"), builder2.group("main"));
    }

    #[test]
    fn test_consumer_names_differ_by_suffix() {
        let builder = TestDataBuilder::from_test_name("consumers");
        assert_ne!(builder.consumer("a"), builder.consumer("b"));
    }
}
