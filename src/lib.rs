//! # Bode DAQ
//!
//! Acquisition controller for frequency-response (Bode) measurements. A signal generator
//! sweeps a device under test across a logarithmic set of frequencies while an oscilloscope
//! measures gain and phase at each step; a lab backend drives the instruments and this crate
//! orchestrates a sweep against it.
//!
//! ## Crate Structure
//!
//! - **`sweep_config`**: `SweepConfig`, its limits and validation, and the form-style
//!   `SweepConfigEditor` that clamps user input.
//! - **`readiness`**: `ReadinessTracker` polls instrument status and publishes
//!   `ReadinessState`.
//! - **`session`**: the sweep state machine (`SweepSession`) and its owner
//!   (`SweepController`) with generation tokens and published snapshots.
//! - **`sweep_actor`** / **`messages`**: the Tokio actor that serialises every session
//!   mutation, plus the command protocol used to drive it.
//! - **`measurement`**: `MeasurementPoint` and the per-frequency outlier reduction.
//! - **`axis`**: plot scaling (log frequency decades, auto-ranged gain, fixed phase).
//! - **`hardware`**: capability traits for the backend, the HTTP/SSE client and a mock bench.
//! - **`config`** / **`logging`** / **`error`** / **`validation`**: ambient infrastructure.

pub mod axis;
pub mod config;
pub mod error;
pub mod hardware;
pub mod logging;
pub mod measurement;
pub mod messages;
pub mod readiness;
pub mod session;
pub mod sweep_actor;
pub mod sweep_config;
pub mod validation;

pub use error::{BodeError, BodeResult};
pub use measurement::MeasurementPoint;
pub use readiness::{ReadinessState, ReadinessTracker};
pub use session::{SessionSnapshot, SessionState, SweepController, TerminalReason};
pub use sweep_actor::SweepHandle;
pub use sweep_config::{SweepConfig, SweepConfigEditor, SweepField};
