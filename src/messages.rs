//! Message types for the sweep actor.
//!
//! Callers never touch the [`SweepController`](crate::session::SweepController) directly.
//! They send a [`SweepCommand`] over an mpsc channel and await the embedded oneshot
//! receiver:
//!
//! ```text
//! Caller                              SweepActor
//! ------                              ----------
//! 1. Create command with oneshot
//! 2. Send via mpsc channel    ------>
//!                                     3. Receive command
//!                                     4. Mutate controller, publish snapshot
//!                                     5. Send response
//! 6. Await oneshot receiver   <------
//! ```
//!
//! Each variant has a helper that builds the command and returns its receiver:
//!
//! ```rust
//! use bode_daq::messages::SweepCommand;
//!
//! let (cmd, rx) = SweepCommand::cancel();
//! // cmd_tx.send(cmd).await?;
//! // let cancelled = rx.await?;
//! ```

use crate::error::BodeResult;
use crate::readiness::ReadinessState;
use crate::session::{SessionSnapshot, StartTicket};
use crate::sweep_config::SweepConfig;
use std::sync::Arc;
use tokio::sync::oneshot;

/// Commands accepted by [`SweepActor`](crate::sweep_actor::SweepActor).
#[derive(Debug)]
pub enum SweepCommand {
    /// Start a new sweep session.
    ///
    /// # Response
    ///
    /// - `Ok(ticket)`: session entered `Configuring`; submission runs in the background
    /// - `Err(NotReady)`: instruments not runnable, or a session is still open
    /// - `Err(InvalidConfig)`: `config` failed validation
    Start {
        /// Configuration to freeze into the session.
        config: SweepConfig,
        /// Readiness the caller observed.
        readiness: ReadinessState,
        /// Response channel.
        response: oneshot::Sender<BodeResult<StartTicket>>,
    },

    /// Cancel the open session.
    ///
    /// # Response
    ///
    /// `true` if a session was cancelled, `false` if none was open.
    Cancel {
        /// Response channel.
        response: oneshot::Sender<bool>,
    },

    /// Fetch the latest snapshot.
    Snapshot {
        /// Response channel.
        response: oneshot::Sender<Arc<SessionSnapshot>>,
    },

    /// Cancel any open session and stop the actor.
    Shutdown {
        /// Acknowledged after cleanup.
        response: oneshot::Sender<()>,
    },
}

impl SweepCommand {
    /// Helper to create a Start command
    pub fn start(
        config: SweepConfig,
        readiness: ReadinessState,
    ) -> (Self, oneshot::Receiver<BodeResult<StartTicket>>) {
        let (tx, rx) = oneshot::channel();
        (
            Self::Start {
                config,
                readiness,
                response: tx,
            },
            rx,
        )
    }

    /// Helper to create a Cancel command
    pub fn cancel() -> (Self, oneshot::Receiver<bool>) {
        let (tx, rx) = oneshot::channel();
        (Self::Cancel { response: tx }, rx)
    }

    /// Helper to create a Snapshot command
    pub fn snapshot() -> (Self, oneshot::Receiver<Arc<SessionSnapshot>>) {
        let (tx, rx) = oneshot::channel();
        (Self::Snapshot { response: tx }, rx)
    }

    /// Helper to create a Shutdown command
    pub fn shutdown() -> (Self, oneshot::Receiver<()>) {
        let (tx, rx) = oneshot::channel();
        (Self::Shutdown { response: tx }, rx)
    }
}
