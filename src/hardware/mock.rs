//! Mock Backend Implementation
//!
//! Provides a simulated bench for testing without physical instruments.
//! All waits use async-safe operations (tokio::time::sleep, not std::thread::sleep).
//!
//! # Simulated Device Under Test
//!
//! `MockBodeBackend` models a first-order RC low-pass filter:
//!
//! - gain  = 1 / sqrt(1 + (f / fc)^2)
//! - phase = -atan(f / fc)
//!
//! Each frequency point is built the way the real backend does it: `n_samples` noisy scope
//! readings are taken, outliers beyond the configured tolerance are rejected, and the rest
//! averaged (see [`SampleBurst`]).
//!
//! # Fault Injection
//!
//! Status polls, configuration submission and the feed can each be made to fail. The feed can
//! also be told to over-deliver points, or to end its stream early. Feed open/release counts are tracked so tests can
//! verify that every feed is closed exactly once.

use crate::error::{BodeError, BodeResult};
use crate::hardware::capabilities::{
    ConfigSubmitter, FeedStream, MeasurementSource, StatusProvider,
};
use crate::measurement::{MeasurementPoint, SampleBurst};
use crate::readiness::ReadinessState;
use crate::sweep_config::SweepConfig;
use async_trait::async_trait;
use futures::{stream, Stream, StreamExt};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::RwLock;
use tokio::time::{sleep, Duration};
use tracing::debug;

const NO_FAULT: usize = usize::MAX;

/// Linear gain and phase (degrees) of a first-order low-pass at `freq_hz`.
fn rc_lowpass(freq_hz: f64, cutoff_hz: f64) -> (f64, f64) {
    let ratio = freq_hz / cutoff_hz;
    let gain = 1.0 / (1.0 + ratio * ratio).sqrt();
    let phase = -ratio.atan().to_degrees();
    (gain, phase)
}

/// Simulated signal generator + oscilloscope + RC filter.
///
/// # Example
///
/// ```rust,ignore
/// let backend = MockBodeBackend::new().with_cutoff(1_000.0);
/// backend.submit_config(&SweepConfig::default()).await?;
/// let mut feed = backend.open_feed().await?;
/// let first = feed.next().await;
/// ```
pub struct MockBodeBackend {
    status: RwLock<ReadinessState>,
    configured: RwLock<Option<SweepConfig>>,
    fail_status: AtomicBool,
    fail_config: AtomicBool,
    fault_after: AtomicUsize,
    close_after: AtomicUsize,
    extra_points: AtomicUsize,
    submissions: AtomicUsize,
    feeds_opened: AtomicUsize,
    feeds_released: Arc<AtomicUsize>,
    cutoff_hz: f64,
    noise: f64,
    seed: u64,
    config_delay: Duration,
    point_interval: Duration,
}

impl MockBodeBackend {
    /// Bench with both instruments connected, 1 kHz cutoff, 1 % noise, no delays.
    pub fn new() -> Self {
        Self {
            status: RwLock::new(ReadinessState::all_ready()),
            configured: RwLock::new(None),
            fail_status: AtomicBool::new(false),
            fail_config: AtomicBool::new(false),
            fault_after: AtomicUsize::new(NO_FAULT),
            close_after: AtomicUsize::new(NO_FAULT),
            extra_points: AtomicUsize::new(0),
            submissions: AtomicUsize::new(0),
            feeds_opened: AtomicUsize::new(0),
            feeds_released: Arc::new(AtomicUsize::new(0)),
            cutoff_hz: 1_000.0,
            noise: 0.01,
            seed: 0x5eed,
            config_delay: Duration::ZERO,
            point_interval: Duration::ZERO,
        }
    }

    /// Set the -3 dB corner of the simulated filter.
    pub fn with_cutoff(mut self, cutoff_hz: f64) -> Self {
        self.cutoff_hz = cutoff_hz;
        self
    }

    /// Relative noise amplitude applied to every scope reading.
    ///
    /// Noise well above the sweep tolerance can leave no reading of a burst within tolerance;
    /// the feed then reports an acquisition error for that frequency and goes silent.
    pub fn with_noise(mut self, noise: f64) -> Self {
        self.noise = noise;
        self
    }

    /// Seed for the reading noise.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Time the backend takes to acknowledge a configuration.
    pub fn with_config_delay(mut self, delay: Duration) -> Self {
        self.config_delay = delay;
        self
    }

    /// Time between two delivered points.
    pub fn with_point_interval(mut self, interval: Duration) -> Self {
        self.point_interval = interval;
        self
    }

    /// Replace the reported instrument status.
    pub async fn set_status(&self, status: ReadinessState) {
        *self.status.write().await = status;
    }

    /// Make status polls fail with a transport error.
    pub fn set_status_failure(&self, fail: bool) {
        self.fail_status.store(fail, Ordering::SeqCst);
    }

    /// Make configuration submission fail.
    pub fn set_config_failure(&self, fail: bool) {
        self.fail_config.store(fail, Ordering::SeqCst);
    }

    /// Emit a feed error after `points` points (`None` disables the fault).
    pub fn fail_feed_after(&self, points: Option<usize>) {
        self.fault_after
            .store(points.unwrap_or(NO_FAULT), Ordering::SeqCst);
    }

    /// End the stream after `points` points (`None` keeps it open and quiet after the sweep).
    pub fn close_feed_after(&self, points: Option<usize>) {
        self.close_after
            .store(points.unwrap_or(NO_FAULT), Ordering::SeqCst);
    }

    /// Deliver this many points beyond the configured count.
    pub fn set_extra_points(&self, extra: usize) {
        self.extra_points.store(extra, Ordering::SeqCst);
    }

    /// Number of accepted configuration submissions.
    pub fn submissions(&self) -> usize {
        self.submissions.load(Ordering::SeqCst)
    }

    /// Number of feeds opened so far.
    pub fn feeds_opened(&self) -> usize {
        self.feeds_opened.load(Ordering::SeqCst)
    }

    /// Number of feeds dropped by their consumer so far.
    pub fn feeds_released(&self) -> usize {
        self.feeds_released.load(Ordering::SeqCst)
    }

    /// Last configuration accepted by the backend.
    pub async fn last_config(&self) -> Option<SweepConfig> {
        self.configured.read().await.clone()
    }

    /// Ideal response of the simulated filter at `freq_hz`.
    pub fn response_at(&self, freq_hz: f64) -> (f64, f64) {
        rc_lowpass(freq_hz, self.cutoff_hz)
    }
}

impl Default for MockBodeBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StatusProvider for MockBodeBackend {
    async fn fetch_status(&self) -> BodeResult<ReadinessState> {
        if self.fail_status.load(Ordering::SeqCst) {
            return Err(BodeError::Transport(
                "mock backend unreachable".to_string(),
            ));
        }
        Ok(*self.status.read().await)
    }
}

#[async_trait]
impl ConfigSubmitter for MockBodeBackend {
    async fn submit_config(&self, config: &SweepConfig) -> BodeResult<()> {
        if !self.config_delay.is_zero() {
            sleep(self.config_delay).await;
        }
        if self.fail_config.load(Ordering::SeqCst) {
            return Err(BodeError::Acquisition(
                "mock backend rejected configuration".to_string(),
            ));
        }
        debug!(
            start_hz = config.start_freq_hz,
            stop_hz = config.stop_freq_hz,
            points = config.point_count,
            "MockBodeBackend: configured"
        );
        *self.configured.write().await = Some(config.clone());
        self.submissions.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct FeedState {
    frequencies: Vec<f64>,
    next: usize,
    total: usize,
    fault_after: usize,
    samples: u32,
    amplitude: f64,
    tolerance: f64,
    cutoff_hz: f64,
    noise: f64,
    interval: Duration,
    rng: StdRng,
}

impl FeedState {
    fn measure(&mut self, freq_hz: f64) -> Option<MeasurementPoint> {
        let (gain, phase) = rc_lowpass(freq_hz, self.cutoff_hz);
        let input_rms = self.amplitude / std::f64::consts::SQRT_2;

        let mut burst = SampleBurst::default();
        for _ in 0..self.samples {
            let jitter = |rng: &mut StdRng, noise: f64| 1.0 + rng.gen_range(-noise..=noise);
            let input = input_rms * jitter(&mut self.rng, self.noise);
            let output = input_rms * gain * jitter(&mut self.rng, self.noise);
            let pha = phase + self.rng.gen_range(-self.noise..=self.noise) * 180.0;
            burst.push(input, output, pha);
        }
        burst.reduce(freq_hz, self.tolerance)
    }
}

/// Counts one release when the consumer drops the feed.
struct TrackedFeed {
    inner: FeedStream,
    released: Arc<AtomicUsize>,
}

impl Stream for TrackedFeed {
    type Item = BodeResult<MeasurementPoint>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.as_mut().poll_next(cx)
    }
}

impl Drop for TrackedFeed {
    fn drop(&mut self) {
        self.released.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl MeasurementSource for MockBodeBackend {
    async fn open_feed(&self) -> BodeResult<FeedStream> {
        let config = self
            .configured
            .read()
            .await
            .clone()
            .ok_or_else(|| BodeError::Acquisition("no sweep configured".to_string()))?;

        let frequencies = config.frequencies();
        let close_after = self.close_after.load(Ordering::SeqCst);
        let state = FeedState {
            total: (frequencies.len() + self.extra_points.load(Ordering::SeqCst)).min(close_after),
            frequencies,
            next: 0,
            fault_after: self.fault_after.load(Ordering::SeqCst),
            samples: config.samples_per_point,
            amplitude: config.amplitude,
            tolerance: config.tolerance,
            cutoff_hz: self.cutoff_hz,
            noise: self.noise,
            interval: self.point_interval,
            rng: StdRng::seed_from_u64(self.seed),
        };

        let points = stream::unfold(state, |mut state| async move {
            if state.next >= state.total || state.frequencies.is_empty() {
                return None;
            }
            if !state.interval.is_zero() {
                sleep(state.interval).await;
            }
            if state.next == state.fault_after {
                // one error, then silence
                state.total = 0;
                let err = BodeError::Acquisition("scope read timeout".to_string());
                return Some((Err(err), state));
            }
            let index = state.next.min(state.frequencies.len() - 1);
            let freq = state.frequencies[index];
            state.next += 1;
            match state.measure(freq) {
                Some(point) => Some((Ok(point), state)),
                None => {
                    state.total = 0;
                    let err = BodeError::Acquisition(format!(
                        "no readings within tolerance at {freq:.1} Hz"
                    ));
                    Some((Err(err), state))
                }
            }
        });

        self.feeds_opened.fetch_add(1, Ordering::SeqCst);
        // no end-of-stream marker: after the last point the feed just goes quiet,
        // unless told to close early
        let inner: FeedStream = if close_after == NO_FAULT {
            Box::pin(points.chain(stream::pending()))
        } else {
            Box::pin(points)
        };
        let feed = TrackedFeed {
            inner,
            released: Arc::clone(&self.feeds_released),
        };
        Ok(Box::pin(feed))
    }
}
