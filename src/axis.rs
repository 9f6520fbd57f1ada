//! Axis scaling for the Bode plot.
//!
//! Everything here is a pure function of an immutable point slice, so the session can call
//! [`scale`] on every arrival (and renderers can call it again) without side effects.
//!
//! - Frequency ticks are whole decades with one spare decade on either side of the data.
//! - The frequency viewport is padded multiplicatively because the axis is logarithmic.
//! - The gain domain is snapped outward to multiples of 10 dB plus one extra 10 dB step.
//! - Phase is physically bounded, so its domain and ticks never change.

use crate::measurement::MeasurementPoint;
use serde::Serialize;

/// Frequency ticks used before any point has arrived.
pub const DEFAULT_FREQ_TICKS: [f64; 5] = [10.0, 100.0, 1_000.0, 10_000.0, 100_000.0];
/// Gain domain (dB) used before any point has arrived.
pub const DEFAULT_GAIN_DOMAIN: (f64, f64) = (-30.0, 40.0);
/// Fixed phase domain in degrees.
pub const PHASE_DOMAIN: (f64, f64) = (-180.0, 180.0);
/// Fixed phase ticks in degrees.
pub const PHASE_TICKS: [f64; 7] = [-180.0, -90.0, -45.0, 0.0, 45.0, 90.0, 180.0];
/// Multiplicative margin applied to the observed frequency span for the viewport.
pub const FREQ_VIEWPORT_PADDING: f64 = 1.5;

const TARGET_GAIN_TICKS: f64 = 8.0;

/// Derived display scaling for the current point set.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AxisScale {
    /// Decade gridline positions in Hz.
    pub freq_ticks: Vec<f64>,
    /// Plot viewport on the frequency axis, `(low, high)` in Hz.
    pub freq_domain: (f64, f64),
    /// Padded gain domain in dB.
    pub gain_domain: (f64, f64),
    /// Gain gridline positions in dB.
    pub gain_ticks: Vec<f64>,
    /// Always [`PHASE_DOMAIN`].
    pub phase_domain: (f64, f64),
    /// Always [`PHASE_TICKS`].
    pub phase_ticks: Vec<f64>,
}

impl Default for AxisScale {
    fn default() -> Self {
        scale(&[])
    }
}

/// Compute the full axis scale for `points`.
pub fn scale(points: &[MeasurementPoint]) -> AxisScale {
    let gain_domain = gain_domain(points);
    AxisScale {
        freq_ticks: frequency_ticks(points),
        freq_domain: frequency_domain(points),
        gain_domain,
        gain_ticks: gain_ticks(gain_domain),
        phase_domain: PHASE_DOMAIN,
        phase_ticks: PHASE_TICKS.to_vec(),
    }
}

/// Observed `(min, max)` over values that are finite, skipping everything else.
fn finite_range(values: impl Iterator<Item = f64>) -> Option<(f64, f64)> {
    values
        .filter(|v| v.is_finite())
        .fold(None, |acc, v| match acc {
            None => Some((v, v)),
            Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
        })
}

fn frequency_range(points: &[MeasurementPoint]) -> Option<(f64, f64)> {
    finite_range(points.iter().map(|p| p.freq_hz).filter(|f| *f > 0.0))
}

/// Decade-aligned frequency ticks spanning the data plus one decade each side.
pub fn frequency_ticks(points: &[MeasurementPoint]) -> Vec<f64> {
    let Some((min, max)) = frequency_range(points) else {
        return DEFAULT_FREQ_TICKS.to_vec();
    };
    let min_exp = min.log10().floor() as i32 - 1;
    let max_exp = max.log10().ceil() as i32 + 1;
    (min_exp..=max_exp).map(|exp| 10f64.powi(exp)).collect()
}

/// Frequency viewport: observed span divided/multiplied by [`FREQ_VIEWPORT_PADDING`].
pub fn frequency_domain(points: &[MeasurementPoint]) -> (f64, f64) {
    match frequency_range(points) {
        Some((min, max)) => (min / FREQ_VIEWPORT_PADDING, max * FREQ_VIEWPORT_PADDING),
        None => (DEFAULT_FREQ_TICKS[0], DEFAULT_FREQ_TICKS[DEFAULT_FREQ_TICKS.len() - 1]),
    }
}

/// Gain domain in dB, snapped outward to multiples of 10 with an extra 10 dB margin.
pub fn gain_domain(points: &[MeasurementPoint]) -> (f64, f64) {
    match finite_range(points.iter().map(MeasurementPoint::gain_db)) {
        Some((min, max)) => (
            (min / 10.0).floor() * 10.0 - 10.0,
            (max / 10.0).ceil() * 10.0 + 10.0,
        ),
        None => DEFAULT_GAIN_DOMAIN,
    }
}

/// Tick spacing targeting roughly eight ticks across `span` dB.
pub fn gain_tick_step(span: f64) -> f64 {
    let raw = span / TARGET_GAIN_TICKS;
    if raw <= 5.0 {
        5.0
    } else if raw <= 10.0 {
        10.0
    } else if raw <= 20.0 {
        20.0
    } else {
        (raw / 10.0).ceil() * 10.0
    }
}

/// Gain ticks from the low edge of `domain` up to the high edge at [`gain_tick_step`].
pub fn gain_ticks(domain: (f64, f64)) -> Vec<f64> {
    let (low, high) = domain;
    if high <= low {
        return vec![low];
    }
    let step = gain_tick_step(high - low);
    let count = ((high - low) / step).floor() as usize;
    (0..=count).map(|k| low + k as f64 * step).collect()
}

/// Whether `value` is an exact power of ten.
pub fn is_decade(value: f64) -> bool {
    if !(value.is_finite() && value > 0.0) {
        return false;
    }
    let exp = value.log10().round() as i32;
    (value - 10f64.powi(exp)).abs() <= value * 1e-9
}

/// Label for a frequency gridline: decades are labeled, everything else is blank.
pub fn frequency_tick_label(value: f64) -> String {
    if is_decade(value) {
        format_frequency(value)
    } else {
        String::new()
    }
}

/// Compact engineering rendering of a frequency (`950`, `1.0k`, `2.5M`).
pub fn format_frequency(value: f64) -> String {
    if value >= 1_000_000.0 {
        format!("{:.1}M", value / 1_000_000.0)
    } else if value >= 1_000.0 {
        format!("{:.1}k", value / 1_000.0)
    } else {
        format!("{value}")
    }
}
