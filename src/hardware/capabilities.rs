//! Backend Capabilities
//!
//! The sweep controller talks to the acquisition backend through three small capability
//! traits instead of one monolithic client:
//!
//! - [`StatusProvider`] reports whether generator and scope are connected
//! - [`ConfigSubmitter`] hands a frozen [`SweepConfig`] to the backend
//! - [`MeasurementSource`] opens the push-based measurement feed
//!
//! The HTTP client implements all three; the mock backend does too, so tests can exercise
//! the whole controller without a lab bench.
//!
//! # Design Philosophy
//!
//! Each capability trait:
//! - Is async (uses #[async_trait])
//! - Is thread-safe (requires Send + Sync)
//! - Uses [`BodeResult`] so failures land in the controller's error taxonomy
//! - Focuses on ONE thing

use crate::error::BodeResult;
use crate::measurement::MeasurementPoint;
use crate::readiness::ReadinessState;
use crate::sweep_config::SweepConfig;
use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;

/// Push-based measurement feed.
///
/// The feed has no end-of-stream marker: it yields points (or an error) until the consumer
/// drops it. Dropping the stream closes the underlying connection.
pub type FeedStream = Pin<Box<dyn Stream<Item = BodeResult<MeasurementPoint>> + Send>>;

/// Capability: Instrument Status
///
/// # Contract
/// - Returns a complete snapshot, never a partial update
/// - Fails with [`crate::error::BodeError::Transport`] when the backend is unreachable
#[async_trait]
pub trait StatusProvider: Send + Sync {
    /// Fetch the current generator/scope/sweep readiness.
    async fn fetch_status(&self) -> BodeResult<ReadinessState>;
}

/// Capability: Sweep Configuration
///
/// # Contract
/// - Must complete (or fail) before the feed is opened
/// - Failures are [`crate::error::BodeError::Acquisition`]
#[async_trait]
pub trait ConfigSubmitter: Send + Sync {
    /// Submit the parameters of the next sweep.
    async fn submit_config(&self, config: &SweepConfig) -> BodeResult<()>;
}

/// Capability: Measurement Feed
///
/// # Contract
/// - Points arrive in backend order, one per swept frequency
/// - The stream never signals completion on its own; the caller closes it
#[async_trait]
pub trait MeasurementSource: Send + Sync {
    /// Open the feed for the most recently submitted configuration.
    async fn open_feed(&self) -> BodeResult<FeedStream>;
}

/// Everything a sweep needs after readiness has been established.
pub trait SweepBackend: ConfigSubmitter + MeasurementSource {}

impl<T: ConfigSubmitter + MeasurementSource> SweepBackend for T {}
