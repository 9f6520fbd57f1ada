//! End-to-end sweeps through the actor against the mock bench.

use bode_daq::error::BodeError;
use bode_daq::hardware::mock::MockBodeBackend;
use bode_daq::readiness::{ReadinessState, ReadinessTracker};
use bode_daq::session::{SessionState, TerminalReason};
use bode_daq::sweep_actor::SweepHandle;
use bode_daq::sweep_config::SweepConfig;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout};

const TEST_TIMEOUT: Duration = Duration::from_secs(5);

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

async fn wait_for_release(mock: &MockBodeBackend, count: usize) {
    timeout(TEST_TIMEOUT, async {
        while mock.feeds_released() < count {
            sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("feed was never released");
}

#[tokio::test]
async fn test_sweep_runs_to_completion() {
    let mock = Arc::new(MockBodeBackend::new());
    let (sweep, task) = SweepHandle::spawn(mock.clone());

    let ticket = sweep
        .start(scenario(), ReadinessState::all_ready())
        .await
        .unwrap();
    let done = timeout(TEST_TIMEOUT, sweep.wait_until_terminal(ticket.generation))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(done.state, SessionState::Completed);
    assert_eq!(done.points.len(), 3);
    assert!((done.points[0].freq_hz - 100.0).abs() < 1e-9);
    assert_eq!(done.points[2].freq_hz, 100_000.0);
    assert!(done.points[0].gain_db() > done.points[2].gain_db());
    assert!(done.finished_at.is_some());

    assert_eq!(mock.submissions(), 1);
    assert_eq!(mock.last_config().await, Some(scenario()));
    assert_eq!(mock.feeds_opened(), 1);
    assert_eq!(mock.feeds_released(), 1);

    sweep.shutdown().await.unwrap();
    task.await.unwrap();
}

#[tokio::test]
async fn test_readiness_from_tracker_gates_start() {
    let mock = Arc::new(MockBodeBackend::new());
    let tracker = ReadinessTracker::new(mock.clone());
    let (sweep, _task) = SweepHandle::spawn(mock.clone());

    let mut status = ReadinessState::all_ready();
    status.generator_connected = false;
    mock.set_status(status).await;
    tracker.refresh().await.unwrap();

    let result = sweep.start(scenario(), tracker.current()).await;
    assert!(matches!(result, Err(BodeError::NotReady(_))));
    assert_eq!(sweep.snapshot().await.unwrap().state, SessionState::Idle);

    mock.set_status(ReadinessState::all_ready()).await;
    tracker.refresh().await.unwrap();
    assert!(sweep.start(scenario(), tracker.current()).await.is_ok());
}

#[tokio::test]
async fn test_cancel_while_configuring_releases_late_feed() {
    let mock = Arc::new(MockBodeBackend::new().with_config_delay(Duration::from_millis(50)));
    let (sweep, _task) = SweepHandle::spawn(mock.clone());

    let ticket = sweep
        .start(scenario(), ReadinessState::all_ready())
        .await
        .unwrap();
    assert_eq!(
        sweep.snapshot().await.unwrap().state,
        SessionState::Configuring
    );
    assert!(sweep.cancel().await.unwrap());
    assert!(!sweep.cancel().await.unwrap());

    // the backend still acknowledges; the feed it opens must be closed straight away
    wait_for_release(&mock, 1).await;
    assert_eq!(mock.feeds_opened(), 1);

    let snapshot = sweep.snapshot().await.unwrap();
    assert_eq!(snapshot.generation, Some(ticket.generation));
    assert_eq!(snapshot.state, SessionState::Cancelled);
    assert!(snapshot.points.is_empty());
}

#[tokio::test]
async fn test_cancel_while_streaming() {
    let mock = Arc::new(MockBodeBackend::new().with_point_interval(Duration::from_millis(10)));
    let (sweep, _task) = SweepHandle::spawn(mock.clone());
    let config = SweepConfig {
        point_count: 200,
        ..scenario()
    };

    sweep
        .start(config, ReadinessState::all_ready())
        .await
        .unwrap();
    let mut updates = sweep.subscribe();
    timeout(TEST_TIMEOUT, updates.wait_for(|s| s.points.len() >= 2))
        .await
        .unwrap()
        .unwrap();

    assert!(sweep.cancel().await.unwrap());
    let cancelled = sweep.snapshot().await.unwrap();
    assert_eq!(cancelled.state, SessionState::Cancelled);
    assert_eq!(cancelled.reason, Some(TerminalReason::CancelledByUser));
    assert_eq!(mock.feeds_released(), 1);

    // nothing arrives after cancellation
    sleep(Duration::from_millis(50)).await;
    let later = sweep.snapshot().await.unwrap();
    assert_eq!(later.points, cancelled.points);
}

#[tokio::test]
async fn test_feed_fault_fails_session() {
    let mock = Arc::new(MockBodeBackend::new());
    mock.fail_feed_after(Some(1));
    let (sweep, _task) = SweepHandle::spawn(mock.clone());

    let config = SweepConfig {
        point_count: 5,
        ..scenario()
    };
    let ticket = sweep
        .start(config, ReadinessState::all_ready())
        .await
        .unwrap();
    let done = timeout(TEST_TIMEOUT, sweep.wait_until_terminal(ticket.generation))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(done.state, SessionState::Failed);
    assert_eq!(done.points.len(), 1);
    assert_eq!(
        done.reason,
        Some(TerminalReason::FeedFailed("scope read timeout".to_string()))
    );
    assert_eq!(mock.feeds_released(), 1);
}

#[tokio::test]
async fn test_early_end_of_feed_fails_session() {
    let mock = Arc::new(MockBodeBackend::new());
    mock.close_feed_after(Some(1));
    let (sweep, _task) = SweepHandle::spawn(mock.clone());

    let ticket = sweep
        .start(scenario(), ReadinessState::all_ready())
        .await
        .unwrap();
    let done = timeout(TEST_TIMEOUT, sweep.wait_until_terminal(ticket.generation))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(done.state, SessionState::Failed);
    assert_eq!(done.points.len(), 1);
    assert_eq!(
        done.reason,
        Some(TerminalReason::FeedFailed(
            "feed closed after 1 of 3 points".to_string()
        ))
    );
    assert_eq!(mock.feeds_released(), 1);
}

#[tokio::test]
async fn test_noisy_bench_fails_instead_of_stalling() {
    // +-90 % reading noise against a 1 % tolerance: pairs of readings essentially never agree
    let mock = Arc::new(MockBodeBackend::new().with_noise(0.9));
    let (sweep, _task) = SweepHandle::spawn(mock.clone());
    let config = SweepConfig {
        samples_per_point: 2,
        tolerance: 0.01,
        ..scenario()
    };

    let ticket = sweep
        .start(config, ReadinessState::all_ready())
        .await
        .unwrap();
    let done = timeout(TEST_TIMEOUT, sweep.wait_until_terminal(ticket.generation))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(done.state, SessionState::Failed);
    match &done.reason {
        Some(TerminalReason::FeedFailed(message)) => {
            assert!(message.contains("within tolerance"), "{message}");
        }
        other => panic!("expected feed failure, got {other:?}"),
    }
    assert_eq!(mock.feeds_released(), 1);
}

#[tokio::test]
async fn test_config_rejection_fails_session() {
    let mock = Arc::new(MockBodeBackend::new());
    mock.set_config_failure(true);
    let (sweep, _task) = SweepHandle::spawn(mock.clone());

    let ticket = sweep
        .start(scenario(), ReadinessState::all_ready())
        .await
        .unwrap();
    let done = timeout(TEST_TIMEOUT, sweep.wait_until_terminal(ticket.generation))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(done.state, SessionState::Failed);
    assert!(matches!(done.reason, Some(TerminalReason::ConfigRejected(_))));
    assert_eq!(mock.feeds_opened(), 0);
}

#[tokio::test]
async fn test_over_delivery_still_completes() {
    let mock = Arc::new(MockBodeBackend::new());
    mock.set_extra_points(4);
    let (sweep, _task) = SweepHandle::spawn(mock.clone());

    let ticket = sweep
        .start(scenario(), ReadinessState::all_ready())
        .await
        .unwrap();
    let done = timeout(TEST_TIMEOUT, sweep.wait_until_terminal(ticket.generation))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(done.state, SessionState::Completed);
    assert_eq!(done.points.len(), 3);
    assert_eq!(mock.feeds_released(), 1);
}

#[tokio::test]
async fn test_second_start_rejected_while_open() {
    let mock = Arc::new(MockBodeBackend::new().with_config_delay(Duration::from_millis(100)));
    let (sweep, _task) = SweepHandle::spawn(mock.clone());

    let first = sweep
        .start(scenario(), ReadinessState::all_ready())
        .await
        .unwrap();
    let second = sweep.start(scenario(), ReadinessState::all_ready()).await;
    assert!(matches!(second, Err(BodeError::NotReady(_))));
    assert_eq!(
        sweep.snapshot().await.unwrap().generation,
        Some(first.generation)
    );
}

#[tokio::test]
async fn test_restart_after_completion() {
    let mock = Arc::new(MockBodeBackend::new());
    let (sweep, _task) = SweepHandle::spawn(mock.clone());

    for run in 1..=2u64 {
        let ticket = sweep
            .start(scenario(), ReadinessState::all_ready())
            .await
            .unwrap();
        assert_eq!(ticket.generation, run);
        let done = timeout(TEST_TIMEOUT, sweep.wait_until_terminal(ticket.generation))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(done.state, SessionState::Completed);
        assert_eq!(done.points.len(), 3);
    }
    assert_eq!(mock.submissions(), 2);
    assert_eq!(mock.feeds_released(), 2);
}

#[tokio::test]
async fn test_handle_after_shutdown_reports_unavailable() {
    let mock = Arc::new(MockBodeBackend::new());
    let (sweep, task) = SweepHandle::spawn(mock);

    sweep.shutdown().await.unwrap();
    task.await.unwrap();

    assert!(matches!(
        sweep.start(scenario(), ReadinessState::all_ready()).await,
        Err(BodeError::ActorUnavailable)
    ));
    assert!(matches!(
        sweep.cancel().await,
        Err(BodeError::ActorUnavailable)
    ));
}
