//! Actor that owns the sweep controller.
//!
//! All session mutations happen sequentially inside [`SweepActor::run`], which multiplexes
//! three event sources with `tokio::select!`:
//!
//! 1. [`SweepCommand`]s from callers (start, cancel, snapshot, shutdown)
//! 2. Configuration acknowledgements from the background submission task
//! 3. Events of the currently open measurement feed
//!
//! Submitting the configuration and opening the feed run in a spawned task, so a cancel can
//! be processed while the backend is still configuring. The task reports back with the
//! session's generation; a late acknowledgement for a cancelled or superseded session has its
//! feed released immediately.
//!
//! # Example
//!
//! ```no_run
//! use bode_daq::hardware::mock::MockBodeBackend;
//! use bode_daq::readiness::ReadinessState;
//! use bode_daq::sweep_actor::SweepHandle;
//! use bode_daq::sweep_config::SweepConfig;
//! use std::sync::Arc;
//!
//! # async fn example() -> bode_daq::error::BodeResult<()> {
//! let (sweep, _task) = SweepHandle::spawn(Arc::new(MockBodeBackend::new()));
//! let ticket = sweep
//!     .start(SweepConfig::default(), ReadinessState::all_ready())
//!     .await?;
//! let done = sweep.wait_until_terminal(ticket.generation).await?;
//! println!("{} points", done.points.len());
//! sweep.shutdown().await?;
//! # Ok(())
//! # }
//! ```

use crate::error::{BodeError, BodeResult};
use crate::hardware::capabilities::{FeedStream, SweepBackend};
use crate::measurement::MeasurementPoint;
use crate::messages::SweepCommand;
use crate::readiness::ReadinessState;
use crate::session::{FeedHandle, SessionSnapshot, StartTicket, SweepController};
use crate::sweep_config::SweepConfig;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Command channel capacity used by [`SweepHandle::spawn`].
pub const COMMAND_CHANNEL_CAPACITY: usize = 32;

/// Outcome of the background configuration task.
struct ConfigAck {
    generation: u64,
    result: BodeResult<FeedStream>,
}

/// Owns the [`SweepController`] and the backend.
pub struct SweepActor {
    controller: SweepController,
    backend: Arc<dyn SweepBackend>,
    acks_tx: mpsc::UnboundedSender<ConfigAck>,
    acks_rx: mpsc::UnboundedReceiver<ConfigAck>,
    pending: Option<JoinHandle<()>>,
}

impl SweepActor {
    /// Create the actor. This does not start its event loop; call [`run`](Self::run).
    pub fn new(backend: Arc<dyn SweepBackend>) -> Self {
        let (acks_tx, acks_rx) = mpsc::unbounded_channel();
        Self {
            controller: SweepController::new(),
            backend,
            acks_tx,
            acks_rx,
            pending: None,
        }
    }

    /// Snapshot receiver, valid for the lifetime of the actor.
    pub fn subscribe(&self) -> watch::Receiver<Arc<SessionSnapshot>> {
        self.controller.subscribe()
    }

    /// Run the event loop until a `Shutdown` command arrives or every sender is dropped.
    pub async fn run(mut self, mut commands: mpsc::Receiver<SweepCommand>) {
        info!("SweepActor started");
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(SweepCommand::Start { config, readiness, response }) => {
                        let result = self.start(config, &readiness);
                        let _ = response.send(result);
                    }
                    Some(SweepCommand::Cancel { response }) => {
                        let cancelled = self.controller.cancel();
                        let _ = response.send(cancelled);
                    }
                    Some(SweepCommand::Snapshot { response }) => {
                        let _ = response.send(self.controller.snapshot());
                    }
                    Some(SweepCommand::Shutdown { response }) => {
                        info!("Shutdown command received");
                        self.shutdown();
                        let _ = response.send(());
                        break;
                    }
                    None => {
                        debug!("all sweep handles dropped");
                        self.shutdown();
                        break;
                    }
                },

                Some(ack) = self.acks_rx.recv() => self.on_config_ack(ack),

                (generation, event) = self.controller.next_feed_event() => {
                    self.on_feed_event(generation, event);
                }
            }
        }
        info!("SweepActor stopped");
    }

    fn start(&mut self, config: SweepConfig, readiness: &ReadinessState) -> BodeResult<StartTicket> {
        let ticket = self.controller.start(&config, readiness)?;

        // a submission still in flight belongs to a session that is already terminal
        if let Some(task) = self.pending.take() {
            task.abort();
        }

        let backend = Arc::clone(&self.backend);
        let acks = self.acks_tx.clone();
        let job = ticket.clone();
        self.pending = Some(tokio::spawn(async move {
            let result = match backend.submit_config(&job.config).await {
                Ok(()) => backend.open_feed().await,
                Err(err) => Err(err),
            };
            let _ = acks.send(ConfigAck {
                generation: job.generation,
                result,
            });
        }));
        Ok(ticket)
    }

    fn on_config_ack(&mut self, ack: ConfigAck) {
        if self.controller.current_generation() == Some(ack.generation) {
            self.pending = None;
        }
        match ack.result {
            Ok(stream) => {
                self.controller
                    .on_config_ack(ack.generation, FeedHandle::new(ack.generation, stream));
            }
            Err(err) => {
                self.controller.on_config_error(ack.generation, err);
            }
        }
    }

    fn on_feed_event(&mut self, generation: u64, event: Option<BodeResult<MeasurementPoint>>) {
        match event {
            Some(Ok(point)) => {
                self.controller.on_point_received(generation, point);
            }
            Some(Err(err)) => {
                self.controller.on_feed_error(generation, err);
            }
            None => {
                let (received, expected) = self.controller.snapshot().progress();
                let err = BodeError::Acquisition(format!(
                    "feed closed after {received} of {expected} points"
                ));
                self.controller.on_feed_error(generation, err);
            }
        }
    }

    fn shutdown(&mut self) {
        self.controller.cancel();
        if let Some(task) = self.pending.take() {
            task.abort();
        }
    }
}

/// Cloneable front end of a running [`SweepActor`].
#[derive(Clone)]
pub struct SweepHandle {
    commands: mpsc::Sender<SweepCommand>,
    snapshots: watch::Receiver<Arc<SessionSnapshot>>,
}

impl SweepHandle {
    /// Spawn a [`SweepActor`] on the current runtime.
    pub fn spawn(backend: Arc<dyn SweepBackend>) -> (Self, JoinHandle<()>) {
        let actor = SweepActor::new(backend);
        let snapshots = actor.subscribe();
        let (commands, rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        let task = tokio::spawn(actor.run(rx));
        (
            Self {
                commands,
                snapshots,
            },
            task,
        )
    }

    async fn request<T>(&self, (command, rx): (SweepCommand, oneshot::Receiver<T>)) -> BodeResult<T> {
        self.commands
            .send(command)
            .await
            .map_err(|_| BodeError::ActorUnavailable)?;
        rx.await.map_err(|_| BodeError::ActorUnavailable)
    }

    /// Start a sweep with `config`, given the caller's view of instrument readiness.
    pub async fn start(
        &self,
        config: SweepConfig,
        readiness: ReadinessState,
    ) -> BodeResult<StartTicket> {
        self.request(SweepCommand::start(config, readiness)).await?
    }

    /// Cancel the open session. `Ok(false)` if nothing was open.
    pub async fn cancel(&self) -> BodeResult<bool> {
        self.request(SweepCommand::cancel()).await
    }

    /// Latest snapshot, as seen by the actor.
    pub async fn snapshot(&self) -> BodeResult<Arc<SessionSnapshot>> {
        self.request(SweepCommand::snapshot()).await
    }

    /// Observe every published snapshot.
    pub fn subscribe(&self) -> watch::Receiver<Arc<SessionSnapshot>> {
        self.snapshots.clone()
    }

    /// Wait until session `generation` is terminal (or has been superseded).
    pub async fn wait_until_terminal(&self, generation: u64) -> BodeResult<Arc<SessionSnapshot>> {
        let mut rx = self.snapshots.clone();
        let snapshot = rx
            .wait_for(|s| match s.generation {
                Some(g) if g == generation => s.state.is_terminal(),
                Some(g) => g > generation,
                None => false,
            })
            .await
            .map_err(|_| BodeError::ActorUnavailable)?;
        Ok(Arc::clone(&snapshot))
    }

    /// Cancel any open session and stop the actor.
    pub async fn shutdown(&self) -> BodeResult<()> {
        self.request(SweepCommand::shutdown()).await
    }
}
