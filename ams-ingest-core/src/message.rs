use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One message handed to the worker by the queue runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueRecord {
    /// Unique, opaque identifier assigned by the queue.
    pub message_id: String,
    /// Opaque handle the queue uses to settle the message.
    pub receipt_handle: String,
    /// Raw body, expected to be JSON.
    pub body: String,
}

impl QueueRecord {
    pub fn new(
        message_id: impl Into<String>,
        receipt_handle: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            message_id: message_id.into(),
            receipt_handle: receipt_handle.into(),
            body: body.into(),
        }
    }
}

/// One data item of a stream dataset. `payload` is left open so new upstream fields pass
/// through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestionRecord {
    pub dataset: String,
    /// Identifies the source entity; the sink deduplicates on it.
    pub record_id: String,
    pub profile_id: String,
    /// ISO-8601 timestamp, forwarded as received.
    pub event_time: String,
    pub payload: Map<String, Value>,
}

/// Validated body of a queue record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestionPayload {
    pub dataset: String,
    pub records: Vec<IngestionRecord>,
}

/// A contiguous, non-empty run of records from one payload, sent in a single request.
/// Serializes to the wire body `{"dataset": ..., "records": [...]}`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DeliveryBatch<'a> {
    pub dataset: &'a str,
    pub records: &'a [IngestionRecord],
}

impl DeliveryBatch<'_> {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// How processing of one queue record ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeliveryOutcome {
    /// Every batch was accepted by the sink (or there was nothing to send).
    Success,
    /// The body was not JSON, could not be unwrapped, or failed schema validation.
    Invalid,
    /// The sink rejected a batch with a 4xx. Redelivery would not change that.
    ClientError,
    /// The sink stayed unreachable or kept failing after all attempts.
    RetryableError,
}

impl DeliveryOutcome {
    /// Only transient failures justify handing the message out again.
    pub fn is_retryable(self) -> bool {
        matches!(self, DeliveryOutcome::RetryableError)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DeliveryOutcome::Success => "success",
            DeliveryOutcome::Invalid => "invalid",
            DeliveryOutcome::ClientError => "client_error",
            DeliveryOutcome::RetryableError => "retryable_error",
        }
    }
}

impl fmt::Display for DeliveryOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn record_uses_camel_case_on_the_wire() {
        let record: IngestionRecord = serde_json::from_value(json!({
            "dataset": "sp-traffic",
            "recordId": "r1",
            "profileId": "p1",
            "eventTime": "2024-01-01T00:00:00Z",
            "payload": {"clicks": 3}
        }))
        .unwrap();

        assert_eq!(record.record_id, "r1");
        assert_eq!(record.profile_id, "p1");

        let wire = serde_json::to_value(&record).unwrap();
        assert_eq!(wire["recordId"], "r1");
        assert_eq!(wire["eventTime"], "2024-01-01T00:00:00Z");
        assert!(wire.get("record_id").is_none());
    }

    #[test]
    fn batch_serializes_to_wire_body() {
        let record = IngestionRecord {
            dataset: "sp-traffic".to_string(),
            record_id: "r1".to_string(),
            profile_id: "p1".to_string(),
            event_time: "2024-01-01T00:00:00Z".to_string(),
            payload: Map::new(),
        };
        let records = [record];
        let batch = DeliveryBatch {
            dataset: "sp-traffic",
            records: &records,
        };

        assert_eq!(
            serde_json::to_value(batch).unwrap(),
            json!({
                "dataset": "sp-traffic",
                "records": [{
                    "dataset": "sp-traffic",
                    "recordId": "r1",
                    "profileId": "p1",
                    "eventTime": "2024-01-01T00:00:00Z",
                    "payload": {}
                }]
            })
        );
        assert_eq!(batch.len(), 1);
        assert!(!batch.is_empty());
    }

    #[test]
    fn only_retryable_error_is_retryable() {
        assert!(DeliveryOutcome::RetryableError.is_retryable());
        assert!(!DeliveryOutcome::Success.is_retryable());
        assert!(!DeliveryOutcome::Invalid.is_retryable());
        assert!(!DeliveryOutcome::ClientError.is_retryable());
        assert_eq!(DeliveryOutcome::ClientError.to_string(), "client_error");
    }
}
