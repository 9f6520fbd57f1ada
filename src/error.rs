//! Custom error types for the sweep controller.
//!
//! This module defines the primary error type, `BodeError`, shared by every layer of the
//! crate. Using the `thiserror` crate, it gives one consistent taxonomy for the failures a
//! Bode sweep can run into, from a disconnected oscilloscope to a malformed configuration file.
//!
//! ## Error Hierarchy
//!
//! - **`NotReady`**: A sweep was requested while the instruments are not runnable, or while
//!   another session is still open. Rejected synchronously, never produces a session.
//! - **`InvalidConfig`**: A sweep parameter failed validation. Carries the offending field so
//!   a form can highlight it.
//! - **`Acquisition`**: The backend refused the configuration or the measurement feed broke.
//!   Terminates the in-flight session; never retried automatically.
//! - **`Transport`**: The status poll failed. Non-fatal: readiness keeps its last known value.
//! - **`Config`** / **`ConfigValidation`**: Application configuration could not be loaded or is
//!   semantically wrong.
//! - **`Io`**: Wraps `std::io::Error`.
//! - **`ActorUnavailable`**: The sweep actor has shut down and can no longer take commands.

use crate::sweep_config::SweepField;
use thiserror::Error;

/// Convenience alias for results using the crate error type.
pub type BodeResult<T> = std::result::Result<T, BodeError>;

/// Errors produced by the sweep acquisition controller.
#[derive(Error, Debug)]
pub enum BodeError {
    /// Sweep start rejected: instruments not runnable or a session is already open.
    #[error("Sweep not ready: {0}")]
    NotReady(String),

    /// Sweep parameter failed validation.
    #[error("Invalid sweep configuration ({field}): {reason}")]
    InvalidConfig {
        /// The field that failed validation.
        field: SweepField,
        /// Human readable reason.
        reason: String,
    },

    /// Configuration submission or measurement feed failure.
    #[error("Acquisition error: {0}")]
    Acquisition(String),

    /// Status poll failure.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Application configuration could not be loaded.
    #[error("Configuration error: {0}")]
    Config(#[from] figment::Error),

    /// Application configuration loaded but is semantically invalid.
    #[error("Configuration validation error: {0}")]
    ConfigValidation(String),

    /// I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The sweep actor is no longer running.
    #[error("Sweep actor is not running")]
    ActorUnavailable,
}

impl BodeError {
    /// Shorthand for an [`BodeError::InvalidConfig`] on `field`.
    pub fn invalid(field: SweepField, reason: impl Into<String>) -> Self {
        BodeError::InvalidConfig {
            field,
            reason: reason.into(),
        }
    }

    /// Whether the error leaves the controller able to accept the next command unchanged.
    ///
    /// Transport failures and rejected start requests never touch session state.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            BodeError::NotReady(_) | BodeError::InvalidConfig { .. } | BodeError::Transport(_)
        )
    }
}
