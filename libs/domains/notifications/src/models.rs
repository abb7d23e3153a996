//! Data models for the notifications domain.

use crate::config::EmailConfig;
use crate::error::{NotificationError, NotificationResult};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Template name of the signup welcome email.
pub const WELCOME_TEMPLATE: &str = "welcome";

/// Payload of an email job as carried in the stream's `payload` field.
///
/// `to` accepts a single address or a list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailJob {
    #[serde(deserialize_with = "one_or_many")]
    pub to: Vec<String>,

    #[serde(default)]
    pub from: String,

    /// Template variables
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub data: Map<String, Value>,

    #[serde(default)]
    pub template: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub template_version: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub subject: String,
}

impl EmailJob {
    pub fn new(to: impl Into<String>, template: impl Into<String>) -> Self {
        Self {
            to: vec![to.into()],
            from: String::new(),
            data: Map::new(),
            template: template.into(),
            template_version: String::new(),
            subject: String::new(),
        }
    }

    /// Welcome email for a new signup.
    pub fn welcome(config: &EmailConfig, to: &str, name: &str) -> Self {
        Self::new(to, WELCOME_TEMPLATE)
            .with_sender(config)
            .with_subject(&config.welcome_subject)
            .with_data("name", name)
    }

    /// Stamp the sender and template version from `config`.
    pub fn with_sender(mut self, config: &EmailConfig) -> Self {
        self.from = config.sender.clone();
        self.template_version = config.template_version.to_string();
        self
    }

    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = subject.into();
        self
    }

    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    /// Check that the job can be delivered at all.
    pub fn validate(&self) -> NotificationResult<()> {
        if self.to.is_empty() {
            return Err(NotificationError::InvalidJob("no recipients".to_string()));
        }
        if let Some(bad) = self.to.iter().find(|addr| !is_plausible_address(addr)) {
            return Err(NotificationError::InvalidEmail(bad.clone()));
        }
        Ok(())
    }

    pub fn to_payload(&self) -> NotificationResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}

fn is_plausible_address(addr: &str) -> bool {
    match addr.split_once('@') {
        Some((local, domain)) => !local.is_empty() && domain.contains('.') && !addr.contains(' '),
        None => false,
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

fn one_or_many<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(addr) => vec![addr],
        OneOrMany::Many(addrs) => addrs,
    })
}
