//! Translation between the Lambda SQS contract and the ingestion handler.
//!
//! A retry decision becomes either a failed invocation (the whole delivery comes back) or,
//! with partial batch responses enabled, a response naming only the failed messages.

use ams_ingest_core::handler::{BatchHandler, Decision};
use ams_ingest_core::message::QueueRecord;
use ams_ingest_core::sink::Transport;
use aws_lambda_events::sqs::{BatchItemFailure, SqsBatchResponse, SqsEvent};
use tracing::warn;

/// Raised to make the queue hand the whole delivery out again.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("{} record(s) failed with a retryable error: {}", failed.len(), failed.join(", "))]
pub struct RetryRequested {
    pub failed: Vec<String>,
}

/// Converts SQS messages to queue records. A message without an id is named
/// `unknown-<index>`; a missing body is read as empty text.
pub fn queue_records(event: SqsEvent) -> Vec<QueueRecord> {
    event
        .records
        .into_iter()
        .enumerate()
        .map(|(index, message)| {
            let message_id = message.message_id.unwrap_or_else(|| {
                warn!(index, "SQS message has no messageId");
                format!("unknown-{index}")
            });
            QueueRecord::new(
                message_id,
                message.receipt_handle.unwrap_or_default(),
                message.body.unwrap_or_default(),
            )
        })
        .collect()
}

/// Maps a decision to what the Lambda runtime expects back.
pub fn respond(
    decision: Decision,
    report_batch_item_failures: bool,
) -> Result<SqsBatchResponse, RetryRequested> {
    match decision {
        Decision::Acknowledge => Ok(SqsBatchResponse::default()),
        Decision::RetryBatch { failed } if report_batch_item_failures => {
            let mut response = SqsBatchResponse::default();
            response.batch_item_failures = failed
                .into_iter()
                .map(|id| {
                    let mut failure = BatchItemFailure::default();
                    failure.item_identifier = id;
                    failure
                })
                .collect();
            Ok(response)
        }
        Decision::RetryBatch { failed } => Err(RetryRequested { failed }),
    }
}

/// Handles one SQS invocation.
pub async fn handle<T>(
    handler: &BatchHandler<T>,
    event: SqsEvent,
    report_batch_item_failures: bool,
) -> Result<SqsBatchResponse, RetryRequested>
where
    T: Transport,
{
    let records = queue_records(event);
    let result = handler.handle(&records).await;
    respond(result.decision, report_batch_item_failures)
}
