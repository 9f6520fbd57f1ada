//! Acquisition backend access.
//!
//! - [`capabilities`]: the async traits the controller depends on
//! - [`http`]: REST + Server-Sent Events client for the lab backend
//! - [`mock`]: simulated bench (RC low-pass under test) for tests and dry runs

pub mod capabilities;
pub mod http;
pub mod mock;

pub use capabilities::{
    ConfigSubmitter, FeedStream, MeasurementSource, StatusProvider, SweepBackend,
};
