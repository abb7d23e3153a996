//! Job ⇄ stream fields.
//!
//! The mapping is pure: no I/O, no clock. Encoding always emits the six
//! canonical fields in the same order; decoding is lenient about optional
//! routing hints and strict about the job ID, the payload and the retry limit.

use crate::error::DecodeError;
use crate::job::Job;
use crate::message::{Field, Message};
use crate::registry::MessageKey;

/// Encode a job into the canonical field list.
pub fn encode(job: &Job) -> Vec<Field> {
    vec![
        Field::new(MessageKey::Jid.as_ref(), job.jid.as_bytes()),
        Field::new(MessageKey::Kind.as_ref(), job.kind.as_bytes()),
        Field::new(MessageKey::Target.as_ref(), job.target.as_bytes()),
        Field::new(MessageKey::Source.as_ref(), job.source.as_bytes()),
        Field::new(MessageKey::RetryLimit.as_ref(), job.retry_limit.to_string()),
        Field::new(MessageKey::Payload.as_ref(), job.payload.clone()),
    ]
}

/// Decode a stream entry into a job.
pub fn decode(msg: &Message) -> Result<Job, DecodeError> {
    let payload = msg
        .get(MessageKey::Payload.as_ref())
        .or_else(|| msg.get(MessageKey::Json.as_ref()))
        .ok_or(DecodeError::MissingPayload)?;

    let jid = text(msg, MessageKey::Jid)?.ok_or(DecodeError::MissingJobId)?;

    let retry_limit = match text(msg, MessageKey::RetryLimit)? {
        Some(raw) => raw
            .parse::<i64>()
            .map_err(|_| DecodeError::InvalidRetryLimit(raw.to_string()))?,
        None => 0,
    };

    Ok(Job {
        message_id: msg.id.clone(),
        jid: jid.to_string(),
        kind: text(msg, MessageKey::Kind)?.unwrap_or_default().to_string(),
        target: text(msg, MessageKey::Target)?.unwrap_or_default().to_string(),
        source: text(msg, MessageKey::Source)?.unwrap_or_default().to_string(),
        retry_limit,
        payload: payload.to_vec(),
    })
}

fn text(msg: &Message, key: MessageKey) -> Result<Option<&str>, DecodeError> {
    msg.field(key.as_ref())
        .map(|f| {
            f.value_str()
                .ok_or_else(|| DecodeError::InvalidField(key.to_string()))
        })
        .transpose()
}
