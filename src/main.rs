//! CLI entry point for bode-daq
//!
//! Provides a command-line interface for:
//! - Checking instrument readiness once (`status`)
//! - Following readiness as the backend polls it (`watch`)
//! - Running a Bode sweep and printing the result table (`run`)
//!
//! # Usage
//!
//! ```bash
//! bode-daq status
//! bode-daq run --start 100 --stop 100k --points 50
//! bode-daq run --mock --points 20 --json
//! ```
//!
//! `--mock` swaps the lab backend for a simulated RC low-pass bench.

use anyhow::{bail, Result};
use bode_daq::axis::{self, format_frequency};
use bode_daq::config::AppConfig;
use bode_daq::hardware::http::HttpBackend;
use bode_daq::hardware::mock::MockBodeBackend;
use bode_daq::hardware::{StatusProvider, SweepBackend};
use bode_daq::logging;
use bode_daq::readiness::{ReadinessReport, ReadinessTracker};
use bode_daq::session::{SessionSnapshot, SessionState};
use bode_daq::sweep_actor::SweepHandle;
use bode_daq::sweep_config::{EditOutcome, SweepConfigEditor, SweepField};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "bode-daq")]
#[command(about = "Bode sweep acquisition controller", long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(long, global = true, default_value = AppConfig::DEFAULT_PATH)]
    config: PathBuf,

    /// Use the simulated bench instead of the lab backend
    #[arg(long, global = true)]
    mock: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Query instrument readiness once
    Status,

    /// Poll instrument readiness until Ctrl+C
    Watch,

    /// Run one sweep and print the measured response
    Run(RunArgs),
}

/// Sweep overrides. Values are taken as typed and clamped like the config form does.
#[derive(Args)]
struct RunArgs {
    /// Start frequency in Hz
    #[arg(long)]
    start: Option<String>,

    /// Stop frequency in Hz
    #[arg(long)]
    stop: Option<String>,

    /// Number of frequency points
    #[arg(long)]
    points: Option<String>,

    /// Scope samples per point
    #[arg(long)]
    samples: Option<String>,

    /// Generator amplitude in volts
    #[arg(long)]
    amplitude: Option<String>,

    /// Outlier tolerance (fraction)
    #[arg(long)]
    tolerance: Option<String>,

    /// Print the final snapshot as JSON instead of a table
    #[arg(long)]
    json: bool,
}

impl RunArgs {
    fn overrides(&self) -> [(SweepField, Option<&str>); 6] {
        [
            (SweepField::StartFreq, self.start.as_deref()),
            (SweepField::StopFreq, self.stop.as_deref()),
            (SweepField::PointCount, self.points.as_deref()),
            (SweepField::SamplesPerPoint, self.samples.as_deref()),
            (SweepField::Amplitude, self.amplitude.as_deref()),
            (SweepField::Tolerance, self.tolerance.as_deref()),
        ]
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = AppConfig::load_from(&cli.config)?;
    config.validate()?;
    logging::init_from_config(&config)?;
    info!(name = %config.application.name, backend = %config.backend.base_url, mock = cli.mock, "starting");

    let (status, backend) = backends(&config, cli.mock)?;
    match cli.command {
        Commands::Status => show_status(status).await,
        Commands::Watch => watch_status(&config, status).await,
        Commands::Run(args) => run_sweep(&config, &args, status, backend).await,
    }
}

fn backends(
    config: &AppConfig,
    mock: bool,
) -> Result<(Arc<dyn StatusProvider>, Arc<dyn SweepBackend>)> {
    if mock {
        let bench = Arc::new(MockBodeBackend::new().with_point_interval(Duration::from_millis(20)));
        let status: Arc<dyn StatusProvider> = bench.clone();
        let backend: Arc<dyn SweepBackend> = bench;
        Ok((status, backend))
    } else {
        let client = Arc::new(HttpBackend::from_config(&config.backend)?);
        let status: Arc<dyn StatusProvider> = client.clone();
        let backend: Arc<dyn SweepBackend> = client;
        Ok((status, backend))
    }
}

async fn show_status(status: Arc<dyn StatusProvider>) -> Result<()> {
    let tracker = ReadinessTracker::new(status);
    let result = tracker.refresh().await;
    print_report(&tracker.report());
    result?;
    Ok(())
}

async fn watch_status(config: &AppConfig, status: Arc<dyn StatusProvider>) -> Result<()> {
    let tracker = Arc::new(ReadinessTracker::new(status));
    let mut reports = tracker.subscribe();
    let (stop_tx, stop_rx) = oneshot::channel();

    let poller = {
        let tracker = Arc::clone(&tracker);
        let period = config.backend.poll_interval();
        tokio::spawn(async move { tracker.run_polling(period, stop_rx).await })
    };

    println!("Polling every {}s, Ctrl+C to stop", config.backend.status_poll_interval_secs);
    loop {
        tokio::select! {
            changed = reports.changed() => {
                if changed.is_err() {
                    break;
                }
                let report = reports.borrow_and_update().clone();
                print_report(&report);
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    let _ = stop_tx.send(());
    poller.await?;
    Ok(())
}

fn print_report(report: &ReadinessReport) {
    let connected = |ok: bool| if ok { "connected" } else { "disconnected" };
    let state = report.state;
    println!(
        "generator: {:<12}  scope: {:<12}  sweep: {}",
        connected(state.generator_connected),
        connected(state.scope_connected),
        if state.sweep_ready { "ready" } else { "not ready" }
    );
    if let Some(err) = &report.last_error {
        println!("  last poll failed: {err}");
    }
}

async fn run_sweep(
    config: &AppConfig,
    args: &RunArgs,
    status: Arc<dyn StatusProvider>,
    backend: Arc<dyn SweepBackend>,
) -> Result<()> {
    let mut editor = SweepConfigEditor::new(config.sweep.clone());
    for (field, input) in args.overrides() {
        let Some(input) = input else { continue };
        match editor.edit(field, input) {
            EditOutcome::Accepted => {}
            EditOutcome::Clamped { requested } => {
                warn!(%field, requested, value = editor.config().get(field), "value clamped")
            }
            EditOutcome::Defaulted => {
                warn!(%field, input, value = editor.config().get(field), "not a number, using default")
            }
        }
    }

    let tracker = ReadinessTracker::new(status);
    if let Err(err) = tracker.refresh().await {
        bail!("cannot determine instrument readiness: {err}");
    }

    let (sweep, actor) = SweepHandle::spawn(backend);
    let ticket = sweep
        .start(editor.config().clone(), tracker.current())
        .await?;
    let generation = ticket.generation;

    let printer = {
        let mut updates = sweep.subscribe();
        let quiet = args.json;
        tokio::spawn(async move {
            let mut shown = 0;
            while updates.changed().await.is_ok() {
                let snapshot = Arc::clone(&updates.borrow_and_update());
                if snapshot.generation != Some(generation) {
                    continue;
                }
                if !quiet {
                    for point in snapshot.points.iter().skip(shown) {
                        shown += 1;
                        println!(
                            "[{shown:>3}/{}] {:>8} Hz  {:>8.2} dB  {:>8.2}°",
                            snapshot.expected_count,
                            format_frequency(point.freq_hz),
                            point.gain_db(),
                            point.phase_deg
                        );
                    }
                }
                if snapshot.state.is_terminal() {
                    break;
                }
            }
        })
    };

    let done = tokio::select! {
        done = sweep.wait_until_terminal(generation) => done?,
        _ = tokio::signal::ctrl_c() => {
            sweep.cancel().await?;
            sweep.wait_until_terminal(generation).await?
        }
    };
    let _ = printer.await;
    sweep.shutdown().await?;
    actor.await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&*done)?);
    } else {
        print_summary(&done);
    }

    match done.state {
        SessionState::Completed | SessionState::Cancelled => Ok(()),
        _ => bail!(
            "sweep {}: {}",
            done.state,
            done.reason
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_default()
        ),
    }
}

fn print_summary(snapshot: &SessionSnapshot) {
    println!();
    println!("{:>12}  {:>10}  {:>10}", "freq (Hz)", "gain (dB)", "phase (°)");
    for point in &snapshot.points {
        println!(
            "{:>12}  {:>10.2}  {:>10.2}",
            format_frequency(point.freq_hz),
            point.gain_db(),
            point.phase_deg
        );
    }

    let scale = &snapshot.axis;
    let decades: Vec<String> = scale
        .freq_ticks
        .iter()
        .map(|&f| axis::frequency_tick_label(f))
        .filter(|label| !label.is_empty())
        .collect();
    println!();
    println!("frequency axis: {}", decades.join(" "));
    println!(
        "gain axis:      {} .. {} dB",
        scale.gain_domain.0, scale.gain_domain.1
    );
    if let Some(reason) = &snapshot.reason {
        println!("result:         {} ({reason})", snapshot.state);
    }
}
