//! Ingestion pipeline for Amazon Marketing Stream notifications delivered through SQS.
//!
//! One queue delivery is handled as:
//! - every record body is parsed and, when it is wrapped in an SNS notification, unwrapped
//!   ([`envelope`])
//! - the payload is checked against the ingestion schema ([`validate`])
//! - its records are split into delivery-sized chunks ([`batch`])
//! - each chunk is signed ([`signer`]) and POSTed to the ingestion endpoint with bounded
//!   retries ([`sink`])
//! - per-record outcomes are folded into a single [`handler::Decision`] telling the queue
//!   runtime whether to acknowledge the delivery or hand it out again.

pub use crate::error::{Error, Result};

mod error;

pub mod batch;
pub mod config;
pub mod envelope;
pub mod handler;
pub mod message;
pub mod processor;
pub mod signer;
pub mod sink;
pub mod validate;

#[cfg(test)]
pub(crate) mod test_utils;
