//! Detection and removal of SNS notification wrapping.
//!
//! Stream notifications reach the queue either as the payload itself or wrapped one level
//! deep by an SNS fan-out, where the payload travels as a JSON *string*:
//! - `{"Records": [{"Sns": {"Message": "<payload json>"}}]}`
//! - `{"Type": "Notification", "Message": "<payload json>", ...}` (SNS to SQS without raw
//!   message delivery)

use serde_json::{Map, Value};
use tracing::warn;

use crate::{Error, Result};

/// Which wrapping was removed from a body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvelopeKind {
    /// `Records[].Sns.Message`
    FanOut,
    /// `{"Type": "Notification", "Message": ...}`
    Notification,
}

/// The payload candidate extracted from a queue record body.
#[derive(Debug, Clone, PartialEq)]
pub struct Unwrapped {
    pub candidate: Value,
    /// `None` when the body was the payload itself.
    pub envelope: Option<EnvelopeKind>,
}

/// Parses a raw queue record body and unwraps it.
pub fn open(body: &str) -> Result<Unwrapped> {
    let value: Value = serde_json::from_str(body)
        .map_err(|e| Error::MalformedBody(format!("body is not valid JSON: {e}")))?;
    unwrap(value)
}

/// Returns the payload candidate inside `value`, or `value` itself when it is not wrapped.
/// Only one level is removed; the inner message is used as is even if it looks like
/// another envelope.
pub fn unwrap(value: Value) -> Result<Unwrapped> {
    if let Some((inner, ignored)) = fan_out_message(&value) {
        if ignored > 0 {
            warn!(
                ignored,
                "Envelope carries more than one entry, only the first is ingested"
            );
        }
        return Ok(Unwrapped {
            candidate: parse_inner(inner)?,
            envelope: Some(EnvelopeKind::FanOut),
        });
    }

    if let Some(inner) = notification_message(&value) {
        return Ok(Unwrapped {
            candidate: parse_inner(inner)?,
            envelope: Some(EnvelopeKind::Notification),
        });
    }

    Ok(Unwrapped {
        candidate: value,
        envelope: None,
    })
}

/// The first entry's message string and how many further entries follow it.
fn fan_out_message(value: &Value) -> Option<(&str, usize)> {
    let entries = value.as_object()?.get("Records")?.as_array()?;
    let (first, rest) = entries.split_first()?;
    let sns = field(first.as_object()?, "Sns", "sns")?.as_object()?;
    let message = field(sns, "Message", "message")?.as_str()?;
    Some((message, rest.len()))
}

fn notification_message(value: &Value) -> Option<&str> {
    let object = value.as_object()?;
    if object.get("Type")?.as_str()? != "Notification" {
        return None;
    }
    object.get("Message")?.as_str()
}

fn field<'a>(object: &'a Map<String, Value>, name: &str, alias: &str) -> Option<&'a Value> {
    object.get(name).or_else(|| object.get(alias))
}

fn parse_inner(message: &str) -> Result<Value> {
    serde_json::from_str(message)
        .map_err(|e| Error::Envelope(format!("wrapped message is not valid JSON: {e}")))
}
