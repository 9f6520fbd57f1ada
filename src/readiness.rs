//! Instrument readiness tracking.
//!
//! The [`ReadinessTracker`] owns the process-wide [`ReadinessState`]. It is created at startup,
//! replaced wholesale on every successful poll, and handed explicitly to whoever wants to start
//! a sweep. Subscribers receive a [`ReadinessReport`] through a `watch` channel, both on success
//! and when a poll fails (the failure only sets `last_error`; the state stays as it was).

use crate::error::{BodeError, BodeResult};
use crate::hardware::capabilities::StatusProvider;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Connection state of the generator and scope as reported by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ReadinessState {
    /// Signal generator connected.
    pub generator_connected: bool,
    /// Oscilloscope connected.
    pub scope_connected: bool,
    /// Backend reports the sweep engine ready.
    pub sweep_ready: bool,
}

impl ReadinessState {
    /// Everything connected and ready.
    pub fn all_ready() -> Self {
        Self {
            generator_connected: true,
            scope_connected: true,
            sweep_ready: true,
        }
    }

    /// Whether a sweep may be started.
    pub fn runnable(&self) -> bool {
        self.generator_connected && self.scope_connected && self.sweep_ready
    }

    /// Short description of what is missing, for `NotReady` messages.
    pub fn describe_missing(&self) -> String {
        let mut missing = Vec::new();
        if !self.generator_connected {
            missing.push("generator disconnected");
        }
        if !self.scope_connected {
            missing.push("scope disconnected");
        }
        if !self.sweep_ready {
            missing.push("sweep engine not ready");
        }
        if missing.is_empty() {
            "ready".to_string()
        } else {
            missing.join(", ")
        }
    }
}

/// What subscribers see after each poll.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReadinessReport {
    /// Last successfully fetched state.
    pub state: ReadinessState,
    /// Error of the most recent poll, cleared by the next successful one.
    pub last_error: Option<String>,
    /// Time of the last successful poll.
    pub refreshed_at: Option<DateTime<Utc>>,
}

/// Polls the instrument status provider and publishes [`ReadinessReport`]s.
pub struct ReadinessTracker {
    provider: Arc<dyn StatusProvider>,
    report: watch::Sender<ReadinessReport>,
}

impl ReadinessTracker {
    /// Create a tracker with an all-false initial state.
    pub fn new(provider: Arc<dyn StatusProvider>) -> Self {
        let (report, _) = watch::channel(ReadinessReport::default());
        Self { provider, report }
    }

    /// Last known state.
    pub fn current(&self) -> ReadinessState {
        self.report.borrow().state
    }

    /// Last published report, including the error indicator.
    pub fn report(&self) -> ReadinessReport {
        self.report.borrow().clone()
    }

    /// Receive every subsequent report.
    pub fn subscribe(&self) -> watch::Receiver<ReadinessReport> {
        self.report.subscribe()
    }

    /// Fetch status once and replace the state wholesale.
    ///
    /// On failure the previous state is kept, `last_error` is set and the error is returned
    /// as [`BodeError::Transport`].
    pub async fn refresh(&self) -> BodeResult<ReadinessState> {
        match self.provider.fetch_status().await {
            Ok(state) => {
                let previous = self.current();
                self.report.send_replace(ReadinessReport {
                    state,
                    last_error: None,
                    refreshed_at: Some(Utc::now()),
                });
                if previous != state {
                    info!(
                        generator = state.generator_connected,
                        scope = state.scope_connected,
                        ready = state.sweep_ready,
                        runnable = state.runnable(),
                        "instrument readiness changed"
                    );
                }
                Ok(state)
            }
            Err(err) => {
                let err = match err {
                    BodeError::Transport(_) => err,
                    other => BodeError::Transport(other.to_string()),
                };
                warn!(error = %err, "status poll failed, keeping last known readiness");
                let message = err.to_string();
                self.report.send_modify(|report| report.last_error = Some(message));
                Err(err)
            }
        }
    }

    /// Poll every `period` until `shutdown` fires (or its sender is dropped).
    ///
    /// The first poll happens immediately. Failures are reported through the published
    /// report and retried only at the next tick.
    pub async fn run_polling(&self, period: Duration, mut shutdown: oneshot::Receiver<()>) {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        debug!(?period, "readiness polling started");
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    // failures are already logged and published
                    let _ = self.refresh().await;
                }
                _ = &mut shutdown => break,
            }
        }
        debug!("readiness polling stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runnable_needs_all_three() {
        assert!(ReadinessState::all_ready().runnable());
        let mut state = ReadinessState::all_ready();
        state.sweep_ready = false;
        assert!(!state.runnable());
        assert_eq!(state.describe_missing(), "sweep engine not ready");
        assert_eq!(
            ReadinessState::default().describe_missing(),
            "generator disconnected, scope disconnected, sweep engine not ready"
        );
    }
}
