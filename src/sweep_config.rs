//! Sweep parameters: the validated [`SweepConfig`] and the field-local [`SweepConfigEditor`].
//!
//! A `SweepConfig` is what gets frozen into a session and submitted to the backend. The
//! editor owns the *live* copy a user is typing into; every field is edited on its own so a
//! bad value in one box never disturbs the others. Ordering between start and stop frequency
//! is only enforced for linked range edits and, finally, when a sweep starts.

use crate::error::{BodeError, BodeResult};
use crate::validation::{is_in_range, is_positive_finite};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lowest frequency the editor accepts; also the fallback for unparsable frequency input.
pub const MIN_FREQ_HZ: f64 = 10.0;
/// Upper frequency limit of the signal generator (exclusive).
pub const MAX_FREQ_HZ: f64 = 99_999_999.0;
/// Maximum number of frequency points per sweep.
pub const MAX_POINT_COUNT: u32 = 999;
/// Maximum number of scope readings averaged per frequency point.
pub const MAX_SAMPLES_PER_POINT: u32 = 99;
/// Generator amplitude limits in volts.
pub const MIN_AMPLITUDE: f64 = 0.1;
/// See [`MIN_AMPLITUDE`].
pub const MAX_AMPLITUDE: f64 = 5.0;
/// Outlier tolerance limits (fraction of the median).
pub const MIN_TOLERANCE: f64 = 0.01;
/// See [`MIN_TOLERANCE`].
pub const MAX_TOLERANCE: f64 = 1.0;

/// Parameter set describing one sweep request.
///
/// Serialized with the field names the acquisition backend expects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepConfig {
    /// First frequency of the sweep in Hz.
    #[serde(rename = "start_freq")]
    pub start_freq_hz: f64,
    /// Last frequency of the sweep in Hz.
    #[serde(rename = "stop_freq")]
    pub stop_freq_hz: f64,
    /// Number of log-spaced frequency points.
    #[serde(rename = "num_points")]
    pub point_count: u32,
    /// Scope readings averaged per point.
    #[serde(rename = "n_samples")]
    pub samples_per_point: u32,
    /// Generator output amplitude in volts.
    pub amplitude: f64,
    /// Outlier rejection tolerance, as a fraction of the median reading.
    pub tolerance: f64,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            start_freq_hz: MIN_FREQ_HZ,
            stop_freq_hz: 100_000.0,
            point_count: 100,
            samples_per_point: 10,
            amplitude: 1.0,
            tolerance: 0.1,
        }
    }
}

impl SweepConfig {
    /// Check every invariant, reporting the first offending field.
    ///
    /// This is the gate used by session start, so it also enforces `start < stop`.
    pub fn validate(&self) -> BodeResult<()> {
        is_positive_finite(self.start_freq_hz)
            .map_err(|reason| BodeError::invalid(SweepField::StartFreq, reason))?;
        if self.start_freq_hz >= MAX_FREQ_HZ {
            return Err(BodeError::invalid(
                SweepField::StartFreq,
                format!("must be below {MAX_FREQ_HZ} Hz"),
            ));
        }

        is_positive_finite(self.stop_freq_hz)
            .map_err(|reason| BodeError::invalid(SweepField::StopFreq, reason))?;
        if self.stop_freq_hz >= MAX_FREQ_HZ {
            return Err(BodeError::invalid(
                SweepField::StopFreq,
                format!("must be below {MAX_FREQ_HZ} Hz"),
            ));
        }
        if self.stop_freq_hz <= self.start_freq_hz {
            return Err(BodeError::invalid(
                SweepField::StopFreq,
                format!(
                    "stop frequency {} Hz must exceed start frequency {} Hz",
                    self.stop_freq_hz, self.start_freq_hz
                ),
            ));
        }

        is_in_range(self.point_count, 1..=MAX_POINT_COUNT)
            .map_err(|reason| BodeError::invalid(SweepField::PointCount, reason))?;
        is_in_range(self.samples_per_point, 1..=MAX_SAMPLES_PER_POINT)
            .map_err(|reason| BodeError::invalid(SweepField::SamplesPerPoint, reason))?;

        is_positive_finite(self.amplitude)
            .and_then(|()| is_in_range(self.amplitude, MIN_AMPLITUDE..=MAX_AMPLITUDE))
            .map_err(|reason| BodeError::invalid(SweepField::Amplitude, reason))?;

        is_positive_finite(self.tolerance)
            .and_then(|()| is_in_range(self.tolerance, 0.0..=MAX_TOLERANCE))
            .map_err(|reason| BodeError::invalid(SweepField::Tolerance, reason))?;

        Ok(())
    }

    /// Log-spaced sweep frequencies, `point_count` values from start to stop inclusive.
    pub fn frequencies(&self) -> Vec<f64> {
        let n = self.point_count as usize;
        if n <= 1 {
            return vec![self.start_freq_hz; n];
        }
        let lo = self.start_freq_hz.log10();
        let hi = self.stop_freq_hz.log10();
        let step = (hi - lo) / (n - 1) as f64;
        (0..n)
            .map(|i| {
                if i == n - 1 {
                    self.stop_freq_hz
                } else {
                    10f64.powf(lo + step * i as f64)
                }
            })
            .collect()
    }

    /// Value of one field, counts widened to `f64`.
    pub fn get(&self, field: SweepField) -> f64 {
        match field {
            SweepField::StartFreq => self.start_freq_hz,
            SweepField::StopFreq => self.stop_freq_hz,
            SweepField::PointCount => f64::from(self.point_count),
            SweepField::SamplesPerPoint => f64::from(self.samples_per_point),
            SweepField::Amplitude => self.amplitude,
            SweepField::Tolerance => self.tolerance,
        }
    }
}

/// Identifies one editable sweep parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SweepField {
    /// [`SweepConfig::start_freq_hz`]
    StartFreq,
    /// [`SweepConfig::stop_freq_hz`]
    StopFreq,
    /// [`SweepConfig::point_count`]
    PointCount,
    /// [`SweepConfig::samples_per_point`]
    SamplesPerPoint,
    /// [`SweepConfig::amplitude`]
    Amplitude,
    /// [`SweepConfig::tolerance`]
    Tolerance,
}

impl SweepField {
    /// Every field, in form order.
    pub const ALL: [SweepField; 6] = [
        SweepField::StartFreq,
        SweepField::StopFreq,
        SweepField::PointCount,
        SweepField::SamplesPerPoint,
        SweepField::Amplitude,
        SweepField::Tolerance,
    ];

    /// Wire name used by the backend.
    pub fn name(self) -> &'static str {
        match self {
            SweepField::StartFreq => "start_freq",
            SweepField::StopFreq => "stop_freq",
            SweepField::PointCount => "num_points",
            SweepField::SamplesPerPoint => "n_samples",
            SweepField::Amplitude => "amplitude",
            SweepField::Tolerance => "tolerance",
        }
    }

    /// Value substituted when input for this field cannot be parsed.
    pub fn fallback(self) -> f64 {
        match self {
            SweepField::StartFreq | SweepField::StopFreq => MIN_FREQ_HZ,
            SweepField::PointCount | SweepField::SamplesPerPoint => 1.0,
            SweepField::Amplitude => MIN_AMPLITUDE,
            SweepField::Tolerance => MIN_TOLERANCE,
        }
    }

    /// Inclusive editing bounds.
    fn bounds(self) -> (f64, f64) {
        match self {
            // MAX_FREQ_HZ is exclusive; keep one hertz below it
            SweepField::StartFreq | SweepField::StopFreq => (MIN_FREQ_HZ, MAX_FREQ_HZ - 1.0),
            SweepField::PointCount => (1.0, f64::from(MAX_POINT_COUNT)),
            SweepField::SamplesPerPoint => (1.0, f64::from(MAX_SAMPLES_PER_POINT)),
            SweepField::Amplitude => (MIN_AMPLITUDE, MAX_AMPLITUDE),
            SweepField::Tolerance => (MIN_TOLERANCE, MAX_TOLERANCE),
        }
    }

    fn is_count(self) -> bool {
        matches!(self, SweepField::PointCount | SweepField::SamplesPerPoint)
    }

    fn is_frequency(self) -> bool {
        matches!(self, SweepField::StartFreq | SweepField::StopFreq)
    }

    /// Parse form input. Frequencies accept the `k`/`M` suffixes used when they are displayed.
    fn parse(self, input: &str) -> Option<f64> {
        let input = input.trim();
        let (digits, scale) = match input.chars().last() {
            Some('k' | 'K') if self.is_frequency() => (&input[..input.len() - 1], 1e3),
            Some('M') if self.is_frequency() => (&input[..input.len() - 1], 1e6),
            _ => (input, 1.0),
        };
        digits
            .trim_end()
            .parse::<f64>()
            .ok()
            .map(|value| value * scale)
            .filter(|value| value.is_finite())
    }
}

impl fmt::Display for SweepField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Result of applying a single field edit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EditOutcome {
    /// Parsed and in range; stored as given.
    Accepted,
    /// Parsed but out of range; the nearest bound was stored instead.
    Clamped {
        /// What the user asked for.
        requested: f64,
    },
    /// Could not be parsed; the field fallback was stored.
    Defaulted,
}

/// Live, user-facing sweep configuration with field-local editing.
///
/// Sessions never see this object directly: `start` takes a frozen clone.
#[derive(Debug, Clone, Default)]
pub struct SweepConfigEditor {
    config: SweepConfig,
}

impl SweepConfigEditor {
    /// Start editing from `config`.
    pub fn new(config: SweepConfig) -> Self {
        Self { config }
    }

    /// Current live values. May violate `start < stop` after independent edits.
    pub fn config(&self) -> &SweepConfig {
        &self.config
    }

    /// Apply textual input to one field, leaving all other fields untouched.
    pub fn edit(&mut self, field: SweepField, input: &str) -> EditOutcome {
        let Some(mut value) = field.parse(input) else {
            self.store(field, field.fallback());
            return EditOutcome::Defaulted;
        };

        if field.is_count() {
            value = value.round();
        }
        let (lo, hi) = field.bounds();
        let clamped = value.clamp(lo, hi);
        self.store(field, clamped);

        if clamped == value {
            EditOutcome::Accepted
        } else {
            EditOutcome::Clamped { requested: value }
        }
    }

    /// Linked dual-ended range edit. Keeps `start < stop` at all times.
    ///
    /// Reversed handles are swapped. If both collapse to the same frequency the edit is
    /// rejected and the previous range is kept.
    pub fn set_range(&mut self, start_hz: f64, stop_hz: f64) -> BodeResult<()> {
        if !start_hz.is_finite() {
            return Err(BodeError::invalid(SweepField::StartFreq, "not a number"));
        }
        if !stop_hz.is_finite() {
            return Err(BodeError::invalid(SweepField::StopFreq, "not a number"));
        }
        let (lo, hi) = SweepField::StartFreq.bounds();
        let a = start_hz.clamp(lo, hi);
        let b = stop_hz.clamp(lo, hi);
        let (start, stop) = if a <= b { (a, b) } else { (b, a) };
        if start == stop {
            return Err(BodeError::invalid(
                SweepField::StopFreq,
                "linked range must span more than one frequency",
            ));
        }
        self.config.start_freq_hz = start;
        self.config.stop_freq_hz = stop;
        Ok(())
    }

    fn store(&mut self, field: SweepField, value: f64) {
        match field {
            SweepField::StartFreq => self.config.start_freq_hz = value,
            SweepField::StopFreq => self.config.stop_freq_hz = value,
            SweepField::PointCount => self.config.point_count = value as u32,
            SweepField::SamplesPerPoint => self.config.samples_per_point = value as u32,
            SweepField::Amplitude => self.config.amplitude = value,
            SweepField::Tolerance => self.config.tolerance = value,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scenario() -> SweepConfig {
        SweepConfig {
            start_freq_hz: 100.0,
            stop_freq_hz: 100_000.0,
            point_count: 3,
            samples_per_point: 3,
            amplitude: 1.0,
            tolerance: 0.1,
        }
    }

    #[test]
    fn default_config_is_valid() {
        assert!(SweepConfig::default().validate().is_ok());
        assert!(scenario().validate().is_ok());
    }

    #[test]
    fn reversed_range_is_rejected_on_stop_field() {
        let mut config = scenario();
        config.stop_freq_hz = 50.0;
        match config.validate() {
            Err(BodeError::InvalidConfig { field, .. }) => assert_eq!(field, SweepField::StopFreq),
            other => panic!("expected InvalidConfig, got {other:?}"),
        }
    }

    #[test]
    fn zero_counts_are_rejected() {
        let mut config = scenario();
        config.point_count = 0;
        assert!(matches!(
            config.validate(),
            Err(BodeError::InvalidConfig {
                field: SweepField::PointCount,
                ..
            })
        ));

        let mut config = scenario();
        config.samples_per_point = 0;
        assert!(matches!(
            config.validate(),
            Err(BodeError::InvalidConfig {
                field: SweepField::SamplesPerPoint,
                ..
            })
        ));
    }

    #[test]
    fn zero_tolerance_is_rejected() {
        let mut config = scenario();
        config.tolerance = 0.0;
        assert!(matches!(
            config.validate(),
            Err(BodeError::InvalidConfig {
                field: SweepField::Tolerance,
                ..
            })
        ));
    }

    #[test]
    fn malformed_stop_keeps_start() {
        let mut editor = SweepConfigEditor::new(scenario());
        let outcome = editor.edit(SweepField::StopFreq, "12 kHz");
        assert_eq!(outcome, EditOutcome::Defaulted);
        assert_eq!(editor.config().stop_freq_hz, MIN_FREQ_HZ);
        assert_eq!(editor.config().start_freq_hz, 100.0);
        assert_eq!(editor.config().point_count, 3);
    }

    #[test]
    fn frequency_suffixes_are_scaled() {
        let mut editor = SweepConfigEditor::new(scenario());
        assert_eq!(editor.edit(SweepField::StopFreq, "100k"), EditOutcome::Accepted);
        assert_eq!(editor.config().stop_freq_hz, 100_000.0);
        assert_eq!(editor.edit(SweepField::StopFreq, "2.5M"), EditOutcome::Accepted);
        assert_eq!(editor.config().stop_freq_hz, 2_500_000.0);
        assert_eq!(editor.edit(SweepField::StartFreq, " 1.5 K "), EditOutcome::Accepted);
        assert_eq!(editor.config().start_freq_hz, 1_500.0);
        assert!(editor.config().validate().is_ok());

        // only frequencies carry units
        assert_eq!(editor.edit(SweepField::PointCount, "2k"), EditOutcome::Defaulted);
        assert_eq!(editor.edit(SweepField::StartFreq, "k"), EditOutcome::Defaulted);
    }

    #[test]
    fn out_of_range_values_are_clamped() {
        let mut editor = SweepConfigEditor::new(scenario());
        assert_eq!(
            editor.edit(SweepField::Amplitude, "12"),
            EditOutcome::Clamped { requested: 12.0 }
        );
        assert_eq!(editor.config().amplitude, MAX_AMPLITUDE);

        assert_eq!(
            editor.edit(SweepField::PointCount, "0"),
            EditOutcome::Clamped { requested: 0.0 }
        );
        assert_eq!(editor.config().point_count, 1);
    }

    #[test]
    fn fallbacks_per_field() {
        let mut editor = SweepConfigEditor::new(scenario());
        for field in SweepField::ALL {
            assert_eq!(editor.edit(field, ""), EditOutcome::Defaulted);
        }
        let config = editor.config();
        assert_eq!(config.start_freq_hz, 10.0);
        assert_eq!(config.stop_freq_hz, 10.0);
        assert_eq!(config.point_count, 1);
        assert_eq!(config.samples_per_point, 1);
        assert_eq!(config.amplitude, MIN_AMPLITUDE);
        assert_eq!(config.tolerance, MIN_TOLERANCE);
        // independent edits may leave the range out of order until start
        assert!(config.validate().is_err());
    }

    #[test]
    fn linked_range_orders_and_rejects_collapse() {
        let mut editor = SweepConfigEditor::new(scenario());
        editor.set_range(5_000.0, 200.0).unwrap();
        assert_eq!(editor.config().start_freq_hz, 200.0);
        assert_eq!(editor.config().stop_freq_hz, 5_000.0);

        assert!(editor.set_range(1.0, 2.0).is_err());
        assert_eq!(editor.config().start_freq_hz, 200.0);
        assert_eq!(editor.config().stop_freq_hz, 5_000.0);
    }

    #[test]
    fn frequencies_are_log_spaced() {
        let freqs = scenario().frequencies();
        assert_eq!(freqs.len(), 3);
        assert!((freqs[0] - 100.0).abs() < 1e-9);
        assert!((freqs[1] - 10_f64.powf(3.5)).abs() < 1e-6);
        assert_eq!(freqs[2], 100_000.0);
    }

    #[test]
    fn wire_names_match_backend() {
        let json = serde_json::to_value(scenario()).unwrap();
        assert_eq!(json["start_freq"], 100.0);
        assert_eq!(json["num_points"], 3);
        assert_eq!(json["n_samples"], 3);
    }
}
