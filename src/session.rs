//! Sweep session state machine.
//!
//! A [`SweepSession`] is one run of the sweep:
//!
//! ```text
//! Idle ──start──> Configuring ──ack──> Streaming ──N points──> Completed
//!                     │   │               │  │
//!                     │   └─config error──┼──┴──feed error──> Failed
//!                     └────────cancel─────┴─────────────────> Cancelled
//! ```
//!
//! The [`SweepController`] owns at most one session, hands out monotonically increasing
//! generation tokens and routes every backend event through them, so events belonging to a
//! superseded session are dropped instead of leaking into the current one. After each
//! mutation the controller publishes an immutable [`SessionSnapshot`] on a `watch` channel
//! for renderers.
//!
//! The backend feed has no end-of-stream marker. Completion is decided here, purely by
//! count (`points.len() >= expected_count`), and the feed is closed by the session itself.

use crate::axis::{self, AxisScale};
use crate::error::{BodeError, BodeResult};
use crate::hardware::capabilities::FeedStream;
use crate::measurement::MeasurementPoint;
use crate::readiness::ReadinessState;
use crate::sweep_config::SweepConfig;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Lifecycle state of a sweep session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// No session has been started.
    Idle,
    /// Configuration submitted, waiting for the backend to acknowledge.
    Configuring,
    /// Feed open, points arriving.
    Streaming,
    /// All expected points received.
    Completed,
    /// Configuration or feed failure.
    Failed,
    /// Stopped by the user.
    Cancelled,
}

impl SessionState {
    /// `Completed`, `Failed` or `Cancelled`.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SessionState::Completed | SessionState::Failed | SessionState::Cancelled
        )
    }

    /// `Configuring` or `Streaming`.
    pub fn is_open(self) -> bool {
        matches!(self, SessionState::Configuring | SessionState::Streaming)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::Configuring => "configuring",
            SessionState::Streaming => "streaming",
            SessionState::Completed => "completed",
            SessionState::Failed => "failed",
            SessionState::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// Why a session reached its terminal state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "detail")]
pub enum TerminalReason {
    /// The configured number of points arrived.
    PointCountReached {
        /// Points accumulated (may exceed `expected` for an over-delivering feed).
        received: usize,
        /// Configured point count.
        expected: usize,
    },
    /// The backend refused the configuration or the feed could not be opened.
    ConfigRejected(String),
    /// The feed reported an error or closed early.
    FeedFailed(String),
    /// `cancel()` was called.
    CancelledByUser,
}

impl fmt::Display for TerminalReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TerminalReason::PointCountReached { received, expected } => {
                write!(f, "received {received} of {expected} points")
            }
            TerminalReason::ConfigRejected(msg) => write!(f, "configuration failed: {msg}"),
            TerminalReason::FeedFailed(msg) => write!(f, "feed failed: {msg}"),
            TerminalReason::CancelledByUser => f.write_str("cancelled by user"),
        }
    }
}

/// Owned measurement feed of one session.
///
/// Releasing drops the underlying stream, which closes the connection. A second release is a
/// no-op.
pub struct FeedHandle {
    generation: u64,
    stream: Option<FeedStream>,
}

impl FeedHandle {
    /// Wrap an opened feed for session `generation`.
    pub fn new(generation: u64, stream: FeedStream) -> Self {
        Self {
            generation,
            stream: Some(stream),
        }
    }

    /// Session this feed belongs to.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Whether the feed has not been released yet.
    pub fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    /// Close the feed. Returns `true` only for the call that actually closed it.
    pub fn release(&mut self) -> bool {
        self.stream.take().is_some()
    }

    /// Next feed event; `None` means the transport ended. Pending forever once released.
    pub async fn next_event(&mut self) -> Option<BodeResult<MeasurementPoint>> {
        match self.stream.as_mut() {
            Some(stream) => stream.next().await,
            None => std::future::pending().await,
        }
    }
}

impl fmt::Debug for FeedHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeedHandle")
            .field("generation", &self.generation)
            .field("open", &self.is_open())
            .finish()
    }
}

/// Read-only view of the controller for renderers.
///
/// Cheap to share (`Arc`), never mutated after publication.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    /// Generation of the session shown, `None` before the first start.
    pub generation: Option<u64>,
    /// Current state.
    pub state: SessionState,
    /// Frozen configuration of the session.
    pub config: Option<SweepConfig>,
    /// Points in arrival order.
    pub points: Vec<MeasurementPoint>,
    /// Configured point count.
    pub expected_count: usize,
    /// Axis scaling for `points`.
    pub axis: AxisScale,
    /// Set once the session is terminal.
    pub reason: Option<TerminalReason>,
    /// When the session was started.
    pub started_at: Option<DateTime<Utc>>,
    /// When the session became terminal.
    pub finished_at: Option<DateTime<Utc>>,
}

impl SessionSnapshot {
    /// Snapshot of a controller that never started a session.
    pub fn idle() -> Self {
        Self {
            generation: None,
            state: SessionState::Idle,
            config: None,
            points: Vec::new(),
            expected_count: 0,
            axis: AxisScale::default(),
            reason: None,
            started_at: None,
            finished_at: None,
        }
    }

    /// `(received, expected)`.
    pub fn progress(&self) -> (usize, usize) {
        (self.points.len(), self.expected_count)
    }
}

/// One sweep run: frozen config, accumulated points, state and feed ownership.
#[derive(Debug)]
pub struct SweepSession {
    generation: u64,
    config: Arc<SweepConfig>,
    points: Vec<MeasurementPoint>,
    state: SessionState,
    expected_count: usize,
    axis: AxisScale,
    feed: Option<FeedHandle>,
    feed_releases: usize,
    reason: Option<TerminalReason>,
    started_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
}

impl SweepSession {
    /// New session in `Configuring` with a private copy of `config`.
    pub fn new(generation: u64, config: SweepConfig) -> Self {
        let expected_count = config.point_count as usize;
        Self {
            generation,
            config: Arc::new(config),
            points: Vec::with_capacity(expected_count),
            state: SessionState::Configuring,
            expected_count,
            axis: AxisScale::default(),
            feed: None,
            feed_releases: 0,
            reason: None,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    /// Generation token.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Current state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Frozen configuration.
    pub fn config(&self) -> &SweepConfig {
        &self.config
    }

    /// Points in arrival order.
    pub fn points(&self) -> &[MeasurementPoint] {
        &self.points
    }

    /// Configured point count.
    pub fn expected_count(&self) -> usize {
        self.expected_count
    }

    /// Current axis scaling.
    pub fn axis(&self) -> &AxisScale {
        &self.axis
    }

    /// Terminal reason, once terminal.
    pub fn reason(&self) -> Option<&TerminalReason> {
        self.reason.as_ref()
    }

    /// How many times this session closed a feed (0 or 1).
    pub fn feed_releases(&self) -> usize {
        self.feed_releases
    }

    /// Whether the session currently holds an open feed.
    pub fn has_open_feed(&self) -> bool {
        self.feed.as_ref().is_some_and(FeedHandle::is_open)
    }

    /// Configuration acknowledged and feed opened: `Configuring → Streaming`.
    ///
    /// In any other state the feed is released immediately and `false` returned.
    pub fn attach_feed(&mut self, mut feed: FeedHandle) -> bool {
        if self.state != SessionState::Configuring {
            feed.release();
            return false;
        }
        self.feed = Some(feed);
        self.state = SessionState::Streaming;
        true
    }

    /// Append a point (arrival order) and rescale. Completes at `expected_count` points.
    ///
    /// Ignored unless `Streaming`.
    pub fn on_point_received(&mut self, point: MeasurementPoint) -> bool {
        if self.state != SessionState::Streaming {
            return false;
        }
        self.points.push(point);
        self.axis = axis::scale(&self.points);
        if self.points.len() >= self.expected_count {
            let reason = TerminalReason::PointCountReached {
                received: self.points.len(),
                expected: self.expected_count,
            };
            self.finish(SessionState::Completed, reason);
        }
        true
    }

    /// Feed failure: `Configuring|Streaming → Failed`.
    ///
    /// Returns the acquisition error to report, or `None` if the session was not open.
    pub fn on_feed_error(&mut self, message: impl Into<String>) -> Option<BodeError> {
        if !self.state.is_open() {
            return None;
        }
        let message = message.into();
        self.finish(
            SessionState::Failed,
            TerminalReason::FeedFailed(message.clone()),
        );
        Some(BodeError::Acquisition(message))
    }

    /// Configuration failure: `Configuring → Failed`.
    pub fn on_config_error(&mut self, message: impl Into<String>) -> Option<BodeError> {
        if self.state != SessionState::Configuring {
            return None;
        }
        let message = message.into();
        self.finish(
            SessionState::Failed,
            TerminalReason::ConfigRejected(message.clone()),
        );
        Some(BodeError::Acquisition(message))
    }

    /// `Configuring|Streaming → Cancelled`. No-op on a terminal session.
    pub fn cancel(&mut self) -> bool {
        if !self.state.is_open() {
            return false;
        }
        self.finish(SessionState::Cancelled, TerminalReason::CancelledByUser);
        true
    }

    /// Immutable view of the session.
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            generation: Some(self.generation),
            state: self.state,
            config: Some(SweepConfig::clone(&self.config)),
            points: self.points.clone(),
            expected_count: self.expected_count,
            axis: self.axis.clone(),
            reason: self.reason.clone(),
            started_at: Some(self.started_at),
            finished_at: self.finished_at,
        }
    }

    fn finish(&mut self, state: SessionState, reason: TerminalReason) {
        self.release_feed();
        self.state = state;
        self.reason = Some(reason);
        self.finished_at = Some(Utc::now());
    }

    fn release_feed(&mut self) {
        if let Some(mut feed) = self.feed.take() {
            if feed.release() {
                self.feed_releases += 1;
            }
        }
    }

    async fn next_feed_event(&mut self) -> Option<BodeResult<MeasurementPoint>> {
        match self.feed.as_mut() {
            Some(feed) => feed.next_event().await,
            None => std::future::pending().await,
        }
    }
}

impl Drop for SweepSession {
    fn drop(&mut self) {
        self.release_feed();
    }
}

/// Returned by [`SweepController::start`]: what the backend must be told.
#[derive(Debug, Clone)]
pub struct StartTicket {
    /// Generation of the new session.
    pub generation: u64,
    /// Frozen configuration to submit.
    pub config: Arc<SweepConfig>,
}

/// Owner of the (single) sweep session.
pub struct SweepController {
    session: Option<SweepSession>,
    last_generation: u64,
    snapshots: watch::Sender<Arc<SessionSnapshot>>,
}

impl SweepController {
    /// Controller with no session.
    pub fn new() -> Self {
        let (snapshots, _) = watch::channel(Arc::new(SessionSnapshot::idle()));
        Self {
            session: None,
            last_generation: 0,
            snapshots,
        }
    }

    /// Receive every published snapshot.
    pub fn subscribe(&self) -> watch::Receiver<Arc<SessionSnapshot>> {
        self.snapshots.subscribe()
    }

    /// Latest published snapshot.
    pub fn snapshot(&self) -> Arc<SessionSnapshot> {
        Arc::clone(&self.snapshots.borrow())
    }

    /// Current (possibly terminal) session.
    pub fn session(&self) -> Option<&SweepSession> {
        self.session.as_ref()
    }

    /// Generation of the current session.
    pub fn current_generation(&self) -> Option<u64> {
        self.session.as_ref().map(SweepSession::generation)
    }

    /// Whether a session is `Configuring` or `Streaming`.
    pub fn has_open_session(&self) -> bool {
        self.session.as_ref().is_some_and(|s| s.state().is_open())
    }

    /// Whether `start` would pass its readiness and single-session preconditions.
    ///
    /// A completed session never blocks a restart.
    pub fn can_start(&self, readiness: &ReadinessState) -> bool {
        readiness.runnable() && !self.has_open_session()
    }

    /// Begin a new session.
    ///
    /// Preconditions, checked in order and without touching existing state:
    /// instruments runnable, no open session, valid config. The previous (terminal) session
    /// is discarded and a new one enters `Configuring` with a frozen copy of `config`.
    pub fn start(
        &mut self,
        config: &SweepConfig,
        readiness: &ReadinessState,
    ) -> BodeResult<StartTicket> {
        if !readiness.runnable() {
            return Err(BodeError::NotReady(readiness.describe_missing()));
        }
        if let Some(open) = self.session.as_ref().filter(|s| s.state().is_open()) {
            return Err(BodeError::NotReady(format!(
                "sweep {} is still {}",
                open.generation(),
                open.state()
            )));
        }
        config.validate()?;

        self.session = None;
        self.last_generation += 1;
        let session = SweepSession::new(self.last_generation, config.clone());
        let ticket = StartTicket {
            generation: session.generation(),
            config: Arc::clone(&session.config),
        };
        info!(
            generation = ticket.generation,
            start_hz = config.start_freq_hz,
            stop_hz = config.stop_freq_hz,
            points = config.point_count,
            "sweep configuring"
        );
        self.session = Some(session);
        self.publish();
        Ok(ticket)
    }

    /// Backend acknowledged the configuration and the feed is open.
    ///
    /// A feed for a superseded generation is released on the spot.
    pub fn on_config_ack(&mut self, generation: u64, mut feed: FeedHandle) -> bool {
        let Some(session) = self.session_for(generation) else {
            warn!(generation, "dropping feed of superseded sweep");
            feed.release();
            return false;
        };
        let attached = session.attach_feed(feed);
        if attached {
            info!(generation, "sweep streaming");
            self.publish();
        } else {
            debug!(generation, "feed arrived after session closed");
        }
        attached
    }

    /// Configuration submission (or feed open) failed.
    pub fn on_config_error(&mut self, generation: u64, err: BodeError) -> Option<BodeError> {
        let session = self.session_for(generation)?;
        let reported = session.on_config_error(failure_message(err))?;
        error!(generation, error = %reported, "sweep configuration failed");
        self.publish();
        Some(reported)
    }

    /// A point arrived on the feed of `generation`.
    pub fn on_point_received(&mut self, generation: u64, point: MeasurementPoint) -> bool {
        let Some(session) = self.session_for(generation) else {
            debug!(generation, "ignoring point from superseded sweep");
            return false;
        };
        if !session.on_point_received(point) {
            return false;
        }
        let (received, expected) = (session.points().len(), session.expected_count());
        debug!(
            generation,
            received,
            expected,
            freq_hz = point.freq_hz,
            gain_db = point.gain_db(),
            phase_deg = point.phase_deg,
            "point received"
        );
        if session.state() == SessionState::Completed {
            info!(generation, received, expected, "sweep completed");
        }
        self.publish();
        true
    }

    /// The feed of `generation` reported an error.
    pub fn on_feed_error(&mut self, generation: u64, err: BodeError) -> Option<BodeError> {
        let session = self.session_for(generation)?;
        let reported = session.on_feed_error(failure_message(err))?;
        error!(generation, error = %reported, "sweep failed");
        self.publish();
        Some(reported)
    }

    /// Cancel the open session, if any. Idempotent.
    pub fn cancel(&mut self) -> bool {
        let Some(session) = self.session.as_mut() else {
            return false;
        };
        if !session.cancel() {
            return false;
        }
        info!(
            generation = session.generation(),
            received = session.points().len(),
            "sweep cancelled"
        );
        self.publish();
        true
    }

    /// Whether the current session holds an open feed.
    pub fn has_open_feed(&self) -> bool {
        self.session.as_ref().is_some_and(SweepSession::has_open_feed)
    }

    /// Wait for the next event on the current feed, tagged with its generation.
    ///
    /// Never resolves while no feed is open.
    pub async fn next_feed_event(&mut self) -> (u64, Option<BodeResult<MeasurementPoint>>) {
        match self.session.as_mut() {
            Some(session) if session.has_open_feed() => {
                let generation = session.generation();
                (generation, session.next_feed_event().await)
            }
            _ => std::future::pending().await,
        }
    }

    fn session_for(&mut self, generation: u64) -> Option<&mut SweepSession> {
        self.session
            .as_mut()
            .filter(|s| s.generation() == generation)
    }

    fn publish(&self) {
        let snapshot = match &self.session {
            Some(session) => session.snapshot(),
            None => SessionSnapshot::idle(),
        };
        self.snapshots.send_replace(Arc::new(snapshot));
    }
}

fn failure_message(err: BodeError) -> String {
    match err {
        BodeError::Acquisition(msg) => msg,
        other => other.to_string(),
    }
}

impl Default for SweepController {
    fn default() -> Self {
        Self::new()
    }
}
