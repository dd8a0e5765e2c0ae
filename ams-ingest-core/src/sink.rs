//! Delivery of batches to the ingestion endpoint.
//!
//! Every batch is serialized once, signed, and sent through a [`Transport`]. Failures are
//! split by who is at fault:
//! - `4xx` means the sink looked at the request and refused it; the same bytes would be
//!   refused again, so the batch fails at once with [`SinkError::Rejected`].
//! - `5xx`, any other non-2xx status, and transport errors are transient. The batch is sent
//!   again after `min(base * 2^(attempt-1), cap)` until `max_attempts` is used up.

use std::time::Duration;

use backoff::retry::Retry;
use backoff::strategy::exponential::Exponential;
use bytes::Bytes;
use tracing::{debug, error, info, warn};

use crate::config::RetryConfig;
use crate::message::DeliveryBatch;
use crate::signer::Signer;

pub use self::http::HttpTransport;

/// reqwest backed [Transport].
mod http;

/// Status and body of a response from the sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkResponse {
    pub status: u16,
    pub body: String,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum SinkError {
    /// The sink refused the batch (4xx).
    #[error("sink rejected batch with status {status}: {body}")]
    Rejected { status: u16, body: String },

    /// The sink failed to process the batch (5xx or an unexpected status).
    #[error("sink failed with status {status}: {body}")]
    Unavailable { status: u16, body: String },

    /// The request did not complete (connect, timeout, reading the response).
    #[error("transport error: {0}")]
    Transport(String),

    /// The batch could not be turned into a request body.
    #[error("failed to encode batch: {0}")]
    Encode(String),
}

impl SinkError {
    /// Transient failures worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SinkError::Unavailable { .. } | SinkError::Transport(_))
    }
}

/// Sends one signed request body to the sink.
#[trait_variant::make(Transport: Send)]
#[allow(dead_code)]
pub trait LocalTransport {
    /// POSTs `body` with `signature` as the value of [`crate::signer::SIGNATURE_HEADER`].
    /// Any HTTP status is an `Ok`; only failures to complete the exchange are errors.
    async fn post(&self, body: Bytes, signature: &str) -> Result<SinkResponse, SinkError>;
}

/// A batch the sink accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivered {
    pub status: u16,
    /// Attempts used, including the successful one.
    pub attempts: u32,
}

/// Signs batches and delivers them with bounded retries.
#[derive(Debug, Clone)]
pub struct SinkClient<T> {
    transport: T,
    signer: Signer,
    retry: RetryConfig,
}

impl<T> SinkClient<T>
where
    T: Transport,
{
    pub fn new(transport: T, signer: Signer, retry: RetryConfig) -> Self {
        Self {
            transport,
            signer,
            retry,
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    fn schedule(&self) -> Exponential {
        let retries = self.retry.max_attempts.saturating_sub(1);
        Exponential::new(self.retry.base_backoff, self.retry.max_backoff).max_retries(retries)
    }

    /// Delivers `batch`, retrying transient failures.
    pub async fn deliver(&self, batch: &DeliveryBatch<'_>) -> Result<Delivered, SinkError> {
        let body = Bytes::from(
            serde_json::to_vec(batch).map_err(|e| SinkError::Encode(e.to_string()))?,
        );
        let signature = self.signer.sign(&body);
        let records = batch.len();

        debug!(
            dataset = batch.dataset,
            records,
            bytes = body.len(),
            "Delivering batch"
        );

        let mut attempts = 0u32;
        let result = Retry::with_notify(
            self.schedule(),
            || {
                attempts += 1;
                let body = body.clone();
                let signature = signature.as_str();
                let transport = &self.transport;
                async move { transport.post(body, signature).await.and_then(classify) }
            },
            |e: &SinkError| e.is_retryable(),
            |e: &SinkError, attempt: u32, delay: Duration| {
                warn!(
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Batch delivery failed, retrying after backoff"
                );
            },
        )
        .await;

        match result {
            Ok(response) => {
                info!(
                    dataset = batch.dataset,
                    records,
                    status = response.status,
                    attempts,
                    "Batch delivered"
                );
                debug!(response_body = %response.body, "Sink response");
                Ok(Delivered {
                    status: response.status,
                    attempts,
                })
            }
            Err(e @ SinkError::Rejected { .. }) => {
                error!(
                    dataset = batch.dataset,
                    records,
                    attempts,
                    error = %e,
                    "Sink rejected batch, it will not be retried"
                );
                Err(e)
            }
            Err(e) => {
                error!(
                    dataset = batch.dataset,
                    records,
                    attempts,
                    error = %e,
                    "Batch delivery failed after all attempts"
                );
                Err(e)
            }
        }
    }
}

/// Maps a completed exchange to success or a typed failure.
fn classify(response: SinkResponse) -> Result<SinkResponse, SinkError> {
    match response.status {
        200..=299 => Ok(response),
        400..=499 => Err(SinkError::Rejected {
            status: response.status,
            body: response.body,
        }),
        status => Err(SinkError::Unavailable {
            status,
            body: response.body,
        }),
    }
}
