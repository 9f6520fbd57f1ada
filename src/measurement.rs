//! Measurement data types and per-frequency sample reduction.
//!
//! [`MeasurementPoint`] is what the feed delivers and what a session accumulates. The
//! reduction helpers turn a burst of raw scope readings taken at one frequency into a single
//! point: readings further than `tolerance × median` from the median are discarded, phase
//! readings are compared on the circle, and the survivors are averaged.

use serde::{Deserialize, Serialize};

/// One gain/phase measurement at a single frequency.
///
/// On the wire the fields are named `freq`, `gain` and `phase`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "WirePoint")]
pub struct MeasurementPoint {
    /// Measured frequency in Hz.
    #[serde(rename = "freq")]
    pub freq_hz: f64,
    /// Linear gain (output RMS / input RMS).
    #[serde(rename = "gain")]
    pub gain_linear: f64,
    /// Phase shift in degrees, in `[-180, 180]`.
    #[serde(rename = "phase")]
    pub phase_deg: f64,
}

impl MeasurementPoint {
    /// Build a point, folding the phase into `[-180, 180]`.
    pub fn new(freq_hz: f64, gain_linear: f64, phase_deg: f64) -> Self {
        Self {
            freq_hz,
            gain_linear,
            phase_deg: wrap_phase(phase_deg),
        }
    }

    /// Gain in decibels. Non-positive linear gain yields a non-finite value.
    pub fn gain_db(&self) -> f64 {
        20.0 * self.gain_linear.log10()
    }
}

#[derive(Deserialize)]
struct WirePoint {
    freq: f64,
    gain: f64,
    phase: f64,
}

impl From<WirePoint> for MeasurementPoint {
    fn from(wire: WirePoint) -> Self {
        MeasurementPoint::new(wire.freq, wire.gain, wire.phase)
    }
}

/// Fold an angle in degrees into `[-180, 180]`.
pub fn wrap_phase(phase_deg: f64) -> f64 {
    if (-180.0..=180.0).contains(&phase_deg) || !phase_deg.is_finite() {
        return phase_deg;
    }
    let wrapped = (phase_deg + 180.0).rem_euclid(360.0) - 180.0;
    if wrapped == -180.0 && phase_deg > 0.0 {
        180.0
    } else {
        wrapped
    }
}

/// Shortest unsigned distance between two angles in degrees.
fn angle_diff(a: f64, b: f64) -> f64 {
    ((a - b + 180.0).rem_euclid(360.0) - 180.0).abs()
}

fn median(data: &[f64]) -> Option<f64> {
    if data.is_empty() {
        return None;
    }
    let mut sorted = data.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

fn mean(data: &[f64]) -> f64 {
    data.iter().sum::<f64>() / data.len() as f64
}

/// Keep readings within `tolerance × median` of the median.
pub fn filter_outliers(data: &[f64], tolerance: f64) -> Vec<f64> {
    let Some(median) = median(data) else {
        return Vec::new();
    };
    data.iter()
        .copied()
        .filter(|x| (x - median).abs() < tolerance * median)
        .collect()
}

/// Keep phase readings within `tolerance × 180°` of the median, measured around the circle.
pub fn filter_phase_outliers(data: &[f64], tolerance: f64) -> Vec<f64> {
    let Some(median) = median(data) else {
        return Vec::new();
    };
    data.iter()
        .copied()
        .filter(|&x| angle_diff(x, median) < tolerance * 180.0)
        .collect()
}

/// Raw scope readings collected at one generator frequency.
#[derive(Debug, Clone, Default)]
pub struct SampleBurst {
    /// RMS of the input channel (generator side).
    pub input_rms: Vec<f64>,
    /// RMS of the output channel (device under test).
    pub output_rms: Vec<f64>,
    /// Phase between the two channels in degrees.
    pub phase_deg: Vec<f64>,
}

impl SampleBurst {
    /// Record one reading triple.
    pub fn push(&mut self, input_rms: f64, output_rms: f64, phase_deg: f64) {
        self.input_rms.push(input_rms);
        self.output_rms.push(output_rms);
        self.phase_deg.push(phase_deg);
    }

    /// Reduce the burst to a single point at `freq_hz`.
    ///
    /// Returns `None` when outlier rejection leaves any channel empty (too much noise).
    pub fn reduce(&self, freq_hz: f64, tolerance: f64) -> Option<MeasurementPoint> {
        let input = filter_outliers(&self.input_rms, tolerance);
        let output = filter_outliers(&self.output_rms, tolerance);
        let phase = filter_phase_outliers(&self.phase_deg, tolerance);
        if input.is_empty() || output.is_empty() || phase.is_empty() {
            tracing::debug!(
                freq_hz,
                input = input.len(),
                output = output.len(),
                phase = phase.len(),
                "too much noise, dropping frequency"
            );
            return None;
        }
        Some(MeasurementPoint::new(
            freq_hz,
            mean(&output) / mean(&input),
            mean(&phase),
        ))
    }
}
