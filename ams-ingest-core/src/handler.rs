//! Runs a whole queue delivery through the [`RecordProcessor`] and decides how the queue
//! should settle it.
//!
//! Records are processed one after another, in delivery order, and a failing record
//! never stops the ones after it. Only retryable failures make the delivery fail; invalid
//! records and sink rejections are logged and acknowledged because redelivering them
//! would fail the same way.

use tracing::{error, info};

use crate::batch::Batcher;
use crate::config::Settings;
use crate::message::{DeliveryOutcome, QueueRecord};
use crate::processor::{RecordProcessor, RecordReport};
use crate::signer::Signer;
use crate::sink::{HttpTransport, SinkClient, Transport};

/// How the queue runtime should settle a delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Every record reached a terminal outcome.
    Acknowledge,
    /// At least one record failed transiently. `failed` lists their message ids in
    /// delivery order.
    RetryBatch { failed: Vec<String> },
}

impl Decision {
    pub fn from_reports(reports: &[RecordReport]) -> Self {
        let failed: Vec<String> = reports
            .iter()
            .filter(|r| r.outcome.is_retryable())
            .map(|r| r.message_id.clone())
            .collect();
        if failed.is_empty() {
            Decision::Acknowledge
        } else {
            Decision::RetryBatch { failed }
        }
    }
}

/// Outcome counts for one delivery.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Summary {
    pub total: usize,
    pub success: usize,
    pub invalid: usize,
    pub client_error: usize,
    pub retryable: usize,
}

impl Summary {
    fn of(reports: &[RecordReport]) -> Self {
        let mut summary = Summary {
            total: reports.len(),
            ..Summary::default()
        };
        for report in reports {
            match report.outcome {
                DeliveryOutcome::Success => summary.success += 1,
                DeliveryOutcome::Invalid => summary.invalid += 1,
                DeliveryOutcome::ClientError => summary.client_error += 1,
                DeliveryOutcome::RetryableError => summary.retryable += 1,
            }
        }
        summary
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationResult {
    pub decision: Decision,
    /// One report per queue record, in delivery order.
    pub reports: Vec<RecordReport>,
}

impl InvocationResult {
    pub fn summary(&self) -> Summary {
        Summary::of(&self.reports)
    }
}

/// Entry point for one queue delivery.
#[derive(Debug, Clone)]
pub struct BatchHandler<T> {
    processor: RecordProcessor<T>,
}

impl BatchHandler<HttpTransport> {
    pub fn from_settings(settings: &Settings) -> crate::Result<Self> {
        let transport = HttpTransport::new(settings.ingest_url.clone(), settings.request_timeout)?;
        Ok(Self::new(settings, transport))
    }
}

impl<T> BatchHandler<T>
where
    T: Transport,
{
    pub fn new(settings: &Settings, transport: T) -> Self {
        let sink = SinkClient::new(
            transport,
            Signer::new(settings.signing_secret.clone()),
            settings.retry.clone(),
        );
        let batcher =
            Batcher::new(settings.batch.max_records).with_max_bytes(settings.batch.max_bytes);
        Self {
            processor: RecordProcessor::new(sink, batcher),
        }
    }

    pub fn processor(&self) -> &RecordProcessor<T> {
        &self.processor
    }

    pub async fn handle(&self, records: &[QueueRecord]) -> InvocationResult {
        let mut reports = Vec::with_capacity(records.len());
        for record in records {
            reports.push(self.processor.process(record).await);
        }

        let result = InvocationResult {
            decision: Decision::from_reports(&reports),
            reports,
        };
        log_summary(&result);
        result
    }
}

fn log_summary(result: &InvocationResult) {
    let summary = result.summary();
    let outcomes: Vec<String> = result
        .reports
        .iter()
        .map(|r| format!("{}={}", r.message_id, r.outcome))
        .collect();

    info!(
        total = summary.total,
        success = summary.success,
        invalid = summary.invalid,
        client_error = summary.client_error,
        retryable = summary.retryable,
        outcomes = ?outcomes,
        "Processed queue delivery"
    );

    if let Decision::RetryBatch { failed } = &result.decision {
        for report in result.reports.iter().filter(|r| r.outcome.is_retryable()) {
            error!(
                message_id = %report.message_id,
                dataset = report.dataset.as_deref().unwrap_or_default(),
                batches_delivered = report.batches_delivered,
                batches = report.batches,
                detail = report.detail.as_deref().unwrap_or_default(),
                "Record failed with a retryable error"
            );
        }
        error!(failed = ?failed, "Requesting redelivery of the queue delivery");
    }
}
