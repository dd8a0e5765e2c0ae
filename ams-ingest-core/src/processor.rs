//! Handles a single queue record from raw body to delivered batches.

use tracing::{debug, info, warn};

use crate::batch::Batcher;
use crate::envelope;
use crate::message::{DeliveryOutcome, IngestionPayload, QueueRecord};
use crate::sink::{SinkClient, SinkError, Transport};
use crate::validate;
use crate::Error;

/// What happened to one queue record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordReport {
    pub message_id: String,
    pub outcome: DeliveryOutcome,
    /// Dataset of the payload, once it passed validation.
    pub dataset: Option<String>,
    /// Records in the payload.
    pub records: usize,
    /// Batches the payload was split into.
    pub batches: usize,
    /// Batches the sink accepted before processing stopped.
    pub batches_delivered: usize,
    /// Why the record did not succeed.
    pub detail: Option<String>,
}

impl RecordReport {
    fn invalid(record: &QueueRecord, error: &Error) -> Self {
        Self {
            message_id: record.message_id.clone(),
            outcome: DeliveryOutcome::Invalid,
            dataset: None,
            records: 0,
            batches: 0,
            batches_delivered: 0,
            detail: Some(error.to_string()),
        }
    }
}

/// Turns queue records into signed deliveries.
#[derive(Debug, Clone)]
pub struct RecordProcessor<T> {
    sink: SinkClient<T>,
    batcher: Batcher,
}

impl<T> RecordProcessor<T>
where
    T: Transport,
{
    pub fn new(sink: SinkClient<T>, batcher: Batcher) -> Self {
        Self { sink, batcher }
    }

    pub fn sink(&self) -> &SinkClient<T> {
        &self.sink
    }

    /// Processes `record` to an outcome. Never fails; every problem is folded into the
    /// returned report.
    pub async fn process(&self, record: &QueueRecord) -> RecordReport {
        let payload = match parse(record) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(
                    message_id = %record.message_id,
                    error = %e,
                    "Dropping invalid record"
                );
                return RecordReport::invalid(record, &e);
            }
        };

        self.deliver(record, &payload).await
    }

    async fn deliver(&self, record: &QueueRecord, payload: &IngestionPayload) -> RecordReport {
        let batches = self.batcher.split(payload);
        let mut report = RecordReport {
            message_id: record.message_id.clone(),
            outcome: DeliveryOutcome::Success,
            dataset: Some(payload.dataset.clone()),
            records: payload.records.len(),
            batches: batches.len(),
            batches_delivered: 0,
            detail: None,
        };

        if batches.is_empty() {
            info!(
                message_id = %record.message_id,
                dataset = %payload.dataset,
                "Payload has no records, nothing to deliver"
            );
            return report;
        }

        debug!(
            message_id = %record.message_id,
            dataset = %payload.dataset,
            records = report.records,
            batches = report.batches,
            "Delivering payload"
        );

        for (index, batch) in batches.iter().enumerate() {
            match self.sink.deliver(batch).await {
                Ok(_) => report.batches_delivered += 1,
                Err(e) => {
                    report.outcome = outcome_of(&e);
                    report.detail = Some(e.to_string());
                    warn!(
                        message_id = %record.message_id,
                        dataset = %payload.dataset,
                        batch = index,
                        skipped = report.batches - index - 1,
                        outcome = %report.outcome,
                        "Stopping delivery of remaining batches"
                    );
                    return report;
                }
            }
        }

        info!(
            message_id = %record.message_id,
            dataset = %payload.dataset,
            records = report.records,
            batches = report.batches,
            "Record delivered"
        );
        report
    }
}

/// Body → unwrapped candidate → validated payload.
fn parse(record: &QueueRecord) -> crate::Result<IngestionPayload> {
    let unwrapped = envelope::open(&record.body)?;
    if let Some(kind) = unwrapped.envelope {
        debug!(message_id = %record.message_id, envelope = ?kind, "Unwrapped notification");
    }
    Ok(validate::validate(unwrapped.candidate)?)
}

fn outcome_of(error: &SinkError) -> DeliveryOutcome {
    if error.is_retryable() {
        DeliveryOutcome::RetryableError
    } else {
        DeliveryOutcome::ClientError
    }
}
