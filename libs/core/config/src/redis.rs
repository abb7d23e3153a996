use crate::{env_or_default, env_parse, ConfigError, FromEnv};
use std::env;

/// Redis connection configuration
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RedisConfig {
    pub uri: String,
}

impl RedisConfig {
    pub fn new(uri: impl Into<String>) -> Self {
        Self { uri: uri.into() }
    }

    /// Build a `redis://` URI from its parts.
    pub fn from_parts(host: &str, port: u16, password: Option<&str>, db: i64) -> Self {
        let auth = match password {
            Some(p) if !p.is_empty() => format!(":{}@", p),
            _ => String::new(),
        };
        Self::new(format!("redis://{}{}:{}/{}", auth, host, port, db))
    }

    /// URI with the password masked, for logging.
    pub fn redacted_uri(&self) -> String {
        match (self.uri.find("://"), self.uri.rfind('@')) {
            (Some(scheme_end), Some(at)) if at > scheme_end => {
                format!("{}://***{}", &self.uri[..scheme_end], &self.uri[at..])
            }
            _ => self.uri.clone(),
        }
    }
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self::new("redis://127.0.0.1:6379/0")
    }
}

impl FromEnv for RedisConfig {
    /// `REDIS_URL` wins; otherwise `REDIS_HOST`, `REDIS_PORT`, `REDIS_PASSWORD`
    /// and `REDIS_DB` are combined, defaulting to a local instance.
    fn from_env() -> Result<Self, ConfigError> {
        if let Ok(url) = env::var("REDIS_URL") {
            return Ok(Self::new(url));
        }

        let host = env_or_default("REDIS_HOST", "127.0.0.1");
        let port = env_parse::<u16>("REDIS_PORT", 6379)?;
        let db = env_parse::<i64>("REDIS_DB", 0)?;
        let password = env::var("REDIS_PASSWORD").ok();

        Ok(Self::from_parts(&host, port, password.as_deref(), db))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redis_config_from_url() {
        temp_env::with_vars(
            [
                ("REDIS_URL", Some("redis://prod-host:6380/2")),
                ("REDIS_HOST", Some("ignored")),
            ],
            || {
                let config = RedisConfig::from_env().unwrap();
                assert_eq!(config.uri, "redis://prod-host:6380/2");
            },
        );
    }

    #[test]
    fn test_redis_config_from_parts() {
        temp_env::with_vars(
            [
                ("REDIS_URL", None),
                ("REDIS_HOST", Some("cache")),
                ("REDIS_PORT", Some("6390")),
                ("REDIS_PASSWORD", Some("secret")),
                ("REDIS_DB", Some("3")),
            ],
            || {
                let config = RedisConfig::from_env().unwrap();
                assert_eq!(config.uri, "redis://:secret@cache:6390/3");
                assert_eq!(config.redacted_uri(), "redis://***@cache:6390/3");
            },
        );
    }

    #[test]
    fn test_redis_config_defaults() {
        temp_env::with_vars_unset(
            ["REDIS_URL", "REDIS_HOST", "REDIS_PORT", "REDIS_PASSWORD", "REDIS_DB"],
            || {
                let config = RedisConfig::from_env().unwrap();
                assert_eq!(config, RedisConfig::default());
            },
        );
    }

    #[test]
    fn test_redis_config_invalid_port() {
        temp_env::with_vars(
            [("REDIS_URL", None), ("REDIS_PORT", Some("not-a-port"))],
            || {
                let err = RedisConfig::from_env().unwrap_err();
                assert!(err.to_string().contains("REDIS_PORT"));
            },
        );
    }

    #[test]
    fn test_redacted_uri_without_password() {
        let config = RedisConfig::new("redis://localhost:6379");
        assert_eq!(config.redacted_uri(), "redis://localhost:6379");
    }
}
