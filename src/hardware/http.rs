//! HTTP backend client.
//!
//! Talks to the lab backend's REST surface:
//!
//! | Capability            | Request                                   |
//! |-----------------------|-------------------------------------------|
//! | [`StatusProvider`]    | `GET  {base}/status`                      |
//! | [`ConfigSubmitter`]   | `POST {base}/bode/config` (JSON body)     |
//! | [`MeasurementSource`] | `GET  {base}/bode/start` (Server-Sent Events) |
//!
//! The event stream never sends an end marker. Each `data:` payload is one JSON point;
//! dropping the returned [`FeedStream`] closes the HTTP connection.

use crate::config::BackendConfig;
use crate::error::{BodeError, BodeResult};
use crate::hardware::capabilities::{
    ConfigSubmitter, FeedStream, MeasurementSource, StatusProvider,
};
use crate::measurement::MeasurementPoint;
use crate::readiness::ReadinessState;
use crate::sweep_config::SweepConfig;
use crate::validation::parse_base_url;
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::ACCEPT;
use serde::Deserialize;
use std::collections::VecDeque;
use std::time::Duration;
use tracing::{debug, trace};
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
enum ConnectionStatus {
    Connected,
    Disconnected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
enum BodeStatus {
    Ready,
    NotReady,
}

/// Body of `GET /status`.
#[derive(Debug, Deserialize)]
struct StatusResponse {
    awg: ConnectionStatus,
    scope: ConnectionStatus,
    bode: BodeStatus,
}

impl From<StatusResponse> for ReadinessState {
    fn from(status: StatusResponse) -> Self {
        ReadinessState {
            generator_connected: status.awg == ConnectionStatus::Connected,
            scope_connected: status.scope == ConnectionStatus::Connected,
            sweep_ready: status.bode == BodeStatus::Ready,
        }
    }
}

/// REST/SSE client for the acquisition backend.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: reqwest::Client,
    base_url: Url,
    request_timeout: Duration,
}

impl HttpBackend {
    /// Build a client for `base_url`.
    ///
    /// `request_timeout` bounds status and configuration requests; the measurement feed is
    /// long-lived and only bounded while connecting. Endpoints are resolved below the path of
    /// `base_url`, so `http://lab/api` and `http://lab/api/` behave the same.
    pub fn new(base_url: &str, request_timeout: Duration) -> BodeResult<Self> {
        let mut base_url = parse_base_url(base_url).map_err(|reason| {
            BodeError::ConfigValidation(format!("Invalid backend base_url '{base_url}': {reason}"))
        })?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        let client = reqwest::Client::builder()
            .connect_timeout(request_timeout)
            .build()
            .map_err(|e| BodeError::Transport(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url,
            request_timeout,
        })
    }

    /// Build a client from the `[backend]` configuration section.
    pub fn from_config(config: &BackendConfig) -> BodeResult<Self> {
        Self::new(&config.base_url, config.request_timeout())
    }

    fn url(&self, endpoint: &str) -> BodeResult<Url> {
        self.base_url
            .join(endpoint)
            .map_err(|e| BodeError::Transport(format!("invalid endpoint {endpoint:?}: {e}")))
    }
}

#[async_trait]
impl StatusProvider for HttpBackend {
    async fn fetch_status(&self) -> BodeResult<ReadinessState> {
        let response = self
            .client
            .get(self.url("status")?)
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(|e| BodeError::Transport(format!("status request failed: {e}")))?;
        if !response.status().is_success() {
            return Err(BodeError::Transport(format!(
                "status request returned HTTP {}",
                response.status()
            )));
        }
        let status: StatusResponse = response
            .json()
            .await
            .map_err(|e| BodeError::Transport(format!("malformed status response: {e}")))?;
        Ok(status.into())
    }
}

#[async_trait]
impl ConfigSubmitter for HttpBackend {
    async fn submit_config(&self, config: &SweepConfig) -> BodeResult<()> {
        let response = self
            .client
            .post(self.url("bode/config")?)
            .timeout(self.request_timeout)
            .json(config)
            .send()
            .await
            .map_err(|e| BodeError::Acquisition(format!("configuration request failed: {e}")))?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(BodeError::Acquisition(format!(
                "backend rejected configuration (HTTP {status}): {body}"
            )));
        }
        debug!(url = %self.base_url, "sweep configuration accepted");
        Ok(())
    }
}

#[async_trait]
impl MeasurementSource for HttpBackend {
    async fn open_feed(&self) -> BodeResult<FeedStream> {
        let response = self
            .client
            .get(self.url("bode/start")?)
            .header(ACCEPT, "text/event-stream")
            .send()
            .await
            .map_err(|e| BodeError::Acquisition(format!("failed to open feed: {e}")))?;
        if !response.status().is_success() {
            return Err(BodeError::Acquisition(format!(
                "feed request returned HTTP {}",
                response.status()
            )));
        }

        let bytes = Box::pin(response.bytes_stream());
        let events = futures::stream::unfold(
            (bytes, SseDecoder::default(), VecDeque::<String>::new()),
            |(mut bytes, mut decoder, mut pending)| async move {
                loop {
                    if let Some(payload) = pending.pop_front() {
                        let item = parse_point(&payload);
                        return Some((item, (bytes, decoder, pending)));
                    }
                    match bytes.next().await {
                        Some(Ok(chunk)) => pending.extend(decoder.push(&chunk)),
                        Some(Err(e)) => {
                            let err = BodeError::Acquisition(format!("feed transport error: {e}"));
                            return Some((Err(err), (bytes, decoder, pending)));
                        }
                        None => return None,
                    }
                }
            },
        );
        Ok(Box::pin(events))
    }
}

fn parse_point(payload: &str) -> BodeResult<MeasurementPoint> {
    trace!(payload, "feed event");
    serde_json::from_str(payload)
        .map_err(|e| BodeError::Acquisition(format!("malformed point {payload:?}: {e}")))
}

/// Incremental Server-Sent Events decoder.
///
/// Feed it raw body chunks; it returns the `data` payload of every event completed by that
/// chunk. Multi-line data is joined with `\n`, comments and other fields are ignored.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    data: Vec<String>,
}

impl SseDecoder {
    /// Consume a chunk and return the payloads of completed events.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);
        let mut events = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line);
            let line = line.trim_end_matches(['\n', '\r']);

            if line.is_empty() {
                if !self.data.is_empty() {
                    events.push(self.data.join("\n"));
                    self.data.clear();
                }
            } else if let Some(value) = line.strip_prefix("data:") {
                self.data
                    .push(value.strip_prefix(' ').unwrap_or(value).to_string());
            }
        }
        events
    }
}
