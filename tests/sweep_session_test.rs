//! Session state machine driven directly through the controller.

use bode_daq::error::BodeError;
use bode_daq::hardware::mock::MockBodeBackend;
use bode_daq::hardware::{ConfigSubmitter, MeasurementSource};
use bode_daq::measurement::MeasurementPoint;
use bode_daq::readiness::ReadinessState;
use bode_daq::session::{FeedHandle, SessionState, SweepController, TerminalReason};
use bode_daq::sweep_config::SweepConfig;
use futures::stream;

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

fn idle_feed(generation: u64) -> FeedHandle {
    FeedHandle::new(generation, Box::pin(stream::pending()))
}

fn point(freq_hz: f64) -> MeasurementPoint {
    MeasurementPoint::new(freq_hz, 0.5, -30.0)
}

/// Controller with one session already streaming on an idle feed.
fn streaming(config: &SweepConfig) -> (SweepController, u64) {
    let mut controller = SweepController::new();
    let ticket = controller
        .start(config, &ReadinessState::all_ready())
        .unwrap();
    assert!(controller.on_config_ack(ticket.generation, idle_feed(ticket.generation)));
    (controller, ticket.generation)
}

#[tokio::test]
async fn test_scenario_streams_then_completes_and_releases_feed_once() {
    let backend = MockBodeBackend::new();
    let mut controller = SweepController::new();
    let config = scenario();

    let ticket = controller
        .start(&config, &ReadinessState::all_ready())
        .unwrap();
    assert_eq!(controller.snapshot().state, SessionState::Configuring);

    backend.submit_config(&ticket.config).await.unwrap();
    let feed = backend.open_feed().await.unwrap();
    controller.on_config_ack(ticket.generation, FeedHandle::new(ticket.generation, feed));
    assert_eq!(controller.snapshot().state, SessionState::Streaming);

    for expected_len in 1..=3 {
        let (generation, event) = controller.next_feed_event().await;
        assert_eq!(generation, ticket.generation);
        let point = event.unwrap().unwrap();
        controller.on_point_received(generation, point);

        let snapshot = controller.snapshot();
        assert_eq!(snapshot.points.len(), expected_len);
        if expected_len < 3 {
            assert_eq!(snapshot.state, SessionState::Streaming);
        } else {
            assert_eq!(snapshot.state, SessionState::Completed);
        }
    }

    assert_eq!(backend.feeds_opened(), 1);
    assert_eq!(backend.feeds_released(), 1);
    let session = controller.session().unwrap();
    assert_eq!(session.feed_releases(), 1);
    assert!(!controller.has_open_feed());

    // cancelling a completed session must not release anything again
    assert!(!controller.cancel());
    assert_eq!(backend.feeds_released(), 1);
}

#[test]
fn test_completion_exactly_at_point_count() {
    let config = SweepConfig {
        point_count: 5,
        ..scenario()
    };
    let (mut controller, generation) = streaming(&config);
    for i in 0..4 {
        controller.on_point_received(generation, point(100.0 * (i + 1) as f64));
        assert_eq!(controller.snapshot().state, SessionState::Streaming);
    }
    controller.on_point_received(generation, point(1_000.0));
    let snapshot = controller.snapshot();
    assert_eq!(snapshot.state, SessionState::Completed);
    assert_eq!(
        snapshot.reason,
        Some(TerminalReason::PointCountReached {
            received: 5,
            expected: 5
        })
    );
}

#[test]
fn test_cancel_is_idempotent_and_freezes_points() {
    let (mut controller, generation) = streaming(&scenario());
    controller.on_point_received(generation, point(100.0));

    assert!(controller.cancel());
    let after_first = controller.snapshot();
    assert_eq!(after_first.state, SessionState::Cancelled);
    assert_eq!(after_first.reason, Some(TerminalReason::CancelledByUser));

    assert!(!controller.cancel());
    assert!(!controller.on_point_received(generation, point(1_000.0)));
    assert!(controller
        .on_feed_error(generation, BodeError::Acquisition("late".into()))
        .is_none());

    let after_second = controller.snapshot();
    assert_eq!(after_second.state, SessionState::Cancelled);
    assert_eq!(after_second.points, after_first.points);
    assert_eq!(controller.session().unwrap().feed_releases(), 1);
}

#[test]
fn test_start_when_not_runnable_changes_nothing() {
    let (mut controller, generation) = streaming(&scenario());
    controller.on_point_received(generation, point(100.0));
    controller.cancel();
    let before = controller.snapshot();

    let mut readiness = ReadinessState::all_ready();
    readiness.scope_connected = false;
    let result = controller.start(&scenario(), &readiness);

    assert!(matches!(result, Err(BodeError::NotReady(_))));
    let after = controller.snapshot();
    assert_eq!(after.generation, before.generation);
    assert_eq!(after.state, SessionState::Cancelled);
    assert_eq!(after.points, before.points);
}

#[test]
fn test_start_without_any_session_when_not_runnable() {
    let mut controller = SweepController::new();
    let result = controller.start(&scenario(), &ReadinessState::default());
    assert!(matches!(result, Err(BodeError::NotReady(_))));
    assert!(controller.session().is_none());
    assert_eq!(controller.snapshot().state, SessionState::Idle);
}

#[test]
fn test_invalid_config_creates_no_session() {
    let mut controller = SweepController::new();
    let config = SweepConfig {
        stop_freq_hz: 50.0,
        ..scenario()
    };
    let result = controller.start(&config, &ReadinessState::all_ready());
    assert!(matches!(result, Err(BodeError::InvalidConfig { .. })));
    assert!(controller.session().is_none());
}

#[test]
fn test_arrival_order_is_preserved() {
    let (mut controller, generation) = streaming(&scenario());
    for freq in [500.0, 50.0, 5_000.0] {
        controller.on_point_received(generation, point(freq));
    }
    let freqs: Vec<f64> = controller
        .snapshot()
        .points
        .iter()
        .map(|p| p.freq_hz)
        .collect();
    assert_eq!(freqs, vec![500.0, 50.0, 5_000.0]);
}

#[test]
fn test_stale_generation_events_are_ignored() {
    let (mut controller, first) = streaming(&scenario());
    controller.on_point_received(first, point(100.0));
    controller.cancel();

    let second = controller
        .start(&scenario(), &ReadinessState::all_ready())
        .unwrap()
        .generation;
    assert!(second > first);

    assert!(!controller.on_point_received(first, point(200.0)));
    assert!(!controller.on_config_ack(first, idle_feed(first)));
    assert!(controller
        .on_config_error(first, BodeError::Acquisition("old".into()))
        .is_none());

    let snapshot = controller.snapshot();
    assert_eq!(snapshot.generation, Some(second));
    assert_eq!(snapshot.state, SessionState::Configuring);
    assert!(snapshot.points.is_empty());
}

#[test]
fn test_restart_after_completion() {
    let config = SweepConfig {
        point_count: 1,
        ..scenario()
    };
    let (mut controller, generation) = streaming(&config);
    controller.on_point_received(generation, point(100.0));
    assert_eq!(controller.snapshot().state, SessionState::Completed);
    assert!(controller.can_start(&ReadinessState::all_ready()));

    let ticket = controller
        .start(&config, &ReadinessState::all_ready())
        .unwrap();
    assert_eq!(ticket.generation, generation + 1);
    assert!(controller.snapshot().points.is_empty());
}

#[test]
fn test_config_rejection_fails_session() {
    let mut controller = SweepController::new();
    let ticket = controller
        .start(&scenario(), &ReadinessState::all_ready())
        .unwrap();
    let err = controller
        .on_config_error(
            ticket.generation,
            BodeError::Acquisition("scope busy".into()),
        )
        .unwrap();
    assert!(matches!(err, BodeError::Acquisition(ref msg) if msg == "scope busy"));

    let snapshot = controller.snapshot();
    assert_eq!(snapshot.state, SessionState::Failed);
    assert_eq!(
        snapshot.reason,
        Some(TerminalReason::ConfigRejected("scope busy".into()))
    );
}

#[test]
fn test_frozen_config_survives_caller_edits() {
    let mut config = scenario();
    let mut controller = SweepController::new();
    controller
        .start(&config, &ReadinessState::all_ready())
        .unwrap();
    config.point_count = 900;
    let snapshot = controller.snapshot();
    assert_ne!(snapshot.expected_count, config.point_count as usize);
    assert_eq!(snapshot.expected_count, 3);
    assert_eq!(snapshot.config.as_ref().unwrap().point_count, 3);
}
