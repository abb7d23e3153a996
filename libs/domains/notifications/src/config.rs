//! Sender settings for outgoing email.

use core_config::{env_or_default, env_parse, ConfigError, FromEnv};

/// Settings the notification service stamps onto every email job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailConfig {
    /// `From` address
    pub sender: String,
    /// Template revision the provider should render
    pub template_version: u32,
    pub welcome_subject: String,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            sender: "noreply@example.com".to_string(),
            template_version: 1,
            welcome_subject: "Welcome to the launch list".to_string(),
        }
    }
}

impl FromEnv for EmailConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            sender: env_or_default("EMAIL_SENDER", &defaults.sender),
            template_version: env_parse("EMAIL_TEMPLATE_VERSION", defaults.template_version)?,
            welcome_subject: env_or_default("EMAIL_WELCOME_SUBJECT", &defaults.welcome_subject),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_env_defaults() {
        temp_env::with_vars_unset(
            ["EMAIL_SENDER", "EMAIL_TEMPLATE_VERSION", "EMAIL_WELCOME_SUBJECT"],
            || {
                let config = EmailConfig::from_env().unwrap();
                assert_eq!(config, EmailConfig::default());
            },
        );
    }

    #[test]
    fn test_from_env_overrides() {
        temp_env::with_vars(
            [
                ("EMAIL_SENDER", Some("hello@launch.dev")),
                ("EMAIL_TEMPLATE_VERSION", Some("4")),
                ("EMAIL_WELCOME_SUBJECT", None),
            ],
            || {
                let config = EmailConfig::from_env().unwrap();
                assert_eq!(config.sender, "hello@launch.dev");
                assert_eq!(config.template_version, 4);
                assert_eq!(config.welcome_subject, "Welcome to the launch list");
            },
        );
    }

    #[test]
    fn test_from_env_rejects_bad_version() {
        temp_env::with_var("EMAIL_TEMPLATE_VERSION", Some("latest"), || {
            assert!(EmailConfig::from_env().is_err());
        });
    }
}
