use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use bytes::Bytes;
use serde_json::Value;
use tokio::time::Instant;

use crate::config::{RetryConfig, SigningSecret};
use crate::signer::Signer;
use crate::sink::{SinkClient, SinkError, SinkResponse, Transport};

/// Transport that answers from a script and records what it was sent. Once the script
/// is used up the last entry repeats.
pub(crate) struct ScriptedTransport {
    script: Mutex<VecDeque<Result<u16, SinkError>>>,
    fallback: Result<u16, SinkError>,
    requests: Mutex<Vec<(Bytes, String)>>,
    sent_at: Mutex<Vec<Instant>>,
}

impl ScriptedTransport {
    pub(crate) fn new(script: impl IntoIterator<Item = Result<u16, SinkError>>) -> Self {
        let script: VecDeque<_> = script.into_iter().collect();
        let fallback = script.back().cloned().unwrap_or(Ok(200));
        Self {
            script: Mutex::new(script),
            fallback,
            requests: Mutex::new(Vec::new()),
            sent_at: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn statuses(statuses: impl IntoIterator<Item = u16>) -> Self {
        Self::new(statuses.into_iter().map(Ok))
    }

    pub(crate) fn always(status: u16) -> Self {
        Self::statuses([status])
    }

    pub(crate) fn requests(&self) -> Vec<(Bytes, String)> {
        self.requests.lock().unwrap().clone()
    }

    /// Request bodies parsed as JSON.
    pub(crate) fn bodies(&self) -> Vec<Value> {
        self.requests()
            .iter()
            .map(|(body, _)| serde_json::from_slice(body).unwrap())
            .collect()
    }

    /// Time between consecutive requests.
    pub(crate) fn gaps(&self) -> Vec<Duration> {
        self.sent_at
            .lock()
            .unwrap()
            .windows(2)
            .map(|w| w[1] - w[0])
            .collect()
    }
}

impl Transport for ScriptedTransport {
    async fn post(&self, body: Bytes, signature: &str) -> Result<SinkResponse, SinkError> {
        self.requests
            .lock()
            .unwrap()
            .push((body, signature.to_string()));
        self.sent_at.lock().unwrap().push(Instant::now());

        let next = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());
        next.map(|status| SinkResponse {
            status,
            body: format!(r#"{{"status":{status}}}"#),
        })
    }
}

/// Sink client over `transport` with the default retry schedule.
pub(crate) fn scripted_client(transport: ScriptedTransport) -> SinkClient<ScriptedTransport> {
    SinkClient::new(
        transport,
        Signer::new(SigningSecret::new("s3cret")),
        RetryConfig::default(),
    )
}
