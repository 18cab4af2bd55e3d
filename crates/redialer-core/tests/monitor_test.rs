//! Integration tests for the async monitor.
//!
//! All tests run on a paused clock; `advance` moves time and a `status()`
//! round-trip guarantees the monitor task has handled everything sent
//! before it.

use std::sync::Arc;
use std::time::Duration;

use redialer_core::{
    CallState, Command, CoreError, Event, Monitor, MonitorHandle, Phase, RecordingSink,
    RedialMode, Settings, TargetNumber,
};
use tokio::time;

fn settings(debounce_ms: u64) -> Settings {
    Settings::new(TargetNumber::parse("+15550100").unwrap())
        .with_debounce(Duration::from_millis(debounce_ms))
        .with_alert_delay(Duration::from_millis(240_000))
}

fn start(settings: Settings, sink: &Arc<RecordingSink>) -> (Monitor, MonitorHandle) {
    let mut monitor = Monitor::new();
    monitor.configure(settings).unwrap();
    let handle = monitor.start(sink.clone()).unwrap();
    (monitor, handle)
}

async fn advance_ms(ms: u64) {
    time::advance(Duration::from_millis(ms)).await;
}

fn plays(sink: &RecordingSink) -> usize {
    sink.count(|c| matches!(c, Command::PlayAlert))
}

fn dials(sink: &RecordingSink) -> usize {
    sink.count(|c| matches!(c, Command::Dial { .. }))
}

#[tokio::test(start_paused = true)]
async fn short_connection_never_alerts() {
    let sink = Arc::new(RecordingSink::new());
    let (mut monitor, handle) = start(settings(3000), &sink);

    handle.on_call_state_changed(CallState::Connected).unwrap();
    handle.status().await.unwrap();
    advance_ms(1000).await;
    handle.on_call_state_changed(CallState::Idle).unwrap();
    let status = handle.status().await.unwrap();
    assert!(!status.alert_armed);

    advance_ms(600_000).await;
    handle.status().await.unwrap();
    assert_eq!(plays(&sink), 0);
    assert_eq!(dials(&sink), 1);

    monitor.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn long_connection_alerts_exactly_at_delay() {
    let sink = Arc::new(RecordingSink::new());
    let (mut monitor, handle) = start(settings(0), &sink);

    handle.on_call_state_changed(CallState::Connected).unwrap();
    let status = handle.status().await.unwrap();
    assert_eq!(status.phase, Phase::Connected);
    assert_eq!(status.alert_remaining_ms, Some(240_000));

    advance_ms(239_999).await;
    handle.status().await.unwrap();
    assert_eq!(plays(&sink), 0);

    advance_ms(1).await;
    let status = handle.status().await.unwrap();
    assert_eq!(plays(&sink), 1);
    assert!(status.alert_active);

    advance_ms(600_000).await;
    handle.status().await.unwrap();
    assert_eq!(plays(&sink), 1);

    monitor.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn debounced_connection_alerts_after_window_plus_delay() {
    let sink = Arc::new(RecordingSink::new());
    let (mut monitor, handle) = start(settings(3000), &sink);

    handle.on_call_state_changed(CallState::Connected).unwrap();
    handle.status().await.unwrap();
    advance_ms(3000).await;
    let status = handle.status().await.unwrap();
    assert_eq!(status.phase, Phase::Connected);

    advance_ms(239_999).await;
    handle.status().await.unwrap();
    assert_eq!(plays(&sink), 0);
    advance_ms(1).await;
    handle.status().await.unwrap();
    assert_eq!(plays(&sink), 1);

    monitor.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn repeated_idle_dials_once() {
    let sink = Arc::new(RecordingSink::new());
    let (mut monitor, handle) = start(settings(3000), &sink);

    for state in [
        CallState::Connected,
        CallState::Idle,
        CallState::Idle,
        CallState::Idle,
    ] {
        handle.on_call_state_changed(state).unwrap();
    }
    let status = handle.status().await.unwrap();

    assert_eq!(dials(&sink), 1);
    assert_eq!(status.dials_issued, 1);
    assert_eq!(
        sink.commands(),
        vec![Command::Dial {
            number: TargetNumber::parse("+15550100").unwrap()
        }]
    );

    monitor.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn redial_loop_repeats_per_call() {
    let sink = Arc::new(RecordingSink::new());
    let (mut monitor, handle) = start(settings(0), &sink);

    for _ in 0..3 {
        handle.on_call_state_changed(CallState::Connected).unwrap();
        advance_ms(30_000).await;
        handle.on_call_state_changed(CallState::Idle).unwrap();
        handle.status().await.unwrap();
    }
    assert_eq!(dials(&sink), 3);

    monitor.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn reconnect_restarts_countdown() {
    let sink = Arc::new(RecordingSink::new());
    let (mut monitor, handle) = start(settings(0), &sink);

    handle.on_call_state_changed(CallState::Connected).unwrap();
    handle.status().await.unwrap();
    advance_ms(200_000).await;
    handle.on_call_state_changed(CallState::Ringing).unwrap();
    handle.on_call_state_changed(CallState::Connected).unwrap();
    handle.status().await.unwrap();

    advance_ms(40_000).await;
    handle.status().await.unwrap();
    assert_eq!(plays(&sink), 0, "no alert at t=240s");

    advance_ms(200_000).await;
    handle.status().await.unwrap();
    assert_eq!(plays(&sink), 1, "alert at t=440s");

    monitor.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn unanswered_call_respects_mode() {
    let strict_sink = Arc::new(RecordingSink::new());
    let (mut strict, handle) = start(settings(0), &strict_sink);
    handle.on_call_state_changed(CallState::Ringing).unwrap();
    handle.on_call_state_changed(CallState::Idle).unwrap();
    handle.status().await.unwrap();
    assert_eq!(dials(&strict_sink), 0);
    strict.stop().await.unwrap();

    let eager_sink = Arc::new(RecordingSink::new());
    let (mut eager, handle) = start(settings(0).with_mode(RedialMode::AnyIdle), &eager_sink);
    handle.on_call_state_changed(CallState::Ringing).unwrap();
    handle.on_call_state_changed(CallState::Idle).unwrap();
    handle.status().await.unwrap();
    assert_eq!(dials(&eager_sink), 1);
    eager.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn stop_alert_silences_once() {
    let sink = Arc::new(RecordingSink::new());
    let (mut monitor, handle) = start(settings(0), &sink);

    handle.stop_alert().unwrap();
    handle.on_call_state_changed(CallState::Connected).unwrap();
    handle.status().await.unwrap();
    advance_ms(240_000).await;
    handle.stop_alert().unwrap();
    handle.stop_alert().unwrap();
    let status = handle.status().await.unwrap();

    assert!(!status.alert_active);
    assert_eq!(
        sink.commands(),
        vec![Command::PlayAlert, Command::StopAlert]
    );

    monitor.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn stop_discards_later_notifications() {
    let sink = Arc::new(RecordingSink::new());
    let (mut monitor, handle) = start(settings(0), &sink);

    handle.on_call_state_changed(CallState::Connected).unwrap();
    handle.status().await.unwrap();
    monitor.stop().await.unwrap();
    assert!(!monitor.is_running());

    assert!(matches!(
        handle.on_call_state_changed(CallState::Idle),
        Err(CoreError::NotRunning)
    ));
    assert!(matches!(handle.on_state_code(0), Err(CoreError::NotRunning)));
    assert!(matches!(handle.stop_alert(), Err(CoreError::NotRunning)));
    assert!(matches!(handle.status().await, Err(CoreError::NotRunning)));

    advance_ms(600_000).await;
    assert!(sink.commands().is_empty());

    // Stopping twice is harmless.
    monitor.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn stop_drops_queued_notifications() {
    let sink = Arc::new(RecordingSink::new());
    let (mut monitor, handle) = start(settings(0), &sink);
    let mut events = handle.subscribe();

    // Queued but not yet handled when stop arrives.
    handle.on_call_state_changed(CallState::Connected).unwrap();
    handle.on_call_state_changed(CallState::Idle).unwrap();
    monitor.stop().await.unwrap();

    assert!(sink.commands().is_empty());
    while let Ok(event) = events.try_recv() {
        assert!(
            !matches!(event, Event::StateObserved { .. }),
            "queued notification was handled: {event:?}"
        );
    }
}

#[tokio::test(start_paused = true)]
async fn dropping_monitor_ends_session() {
    let sink = Arc::new(RecordingSink::new());
    let (monitor, handle) = start(settings(0), &sink);

    drop(monitor);
    time::sleep(Duration::from_millis(1)).await;

    assert!(!handle.is_running());
    assert!(matches!(
        handle.on_call_state_changed(CallState::Connected),
        Err(CoreError::NotRunning)
    ));
}

#[tokio::test(start_paused = true)]
async fn stop_releases_sounding_alert() {
    let sink = Arc::new(RecordingSink::new());
    let (mut monitor, handle) = start(settings(0), &sink);

    handle.on_call_state_changed(CallState::Connected).unwrap();
    handle.status().await.unwrap();
    advance_ms(240_000).await;
    handle.status().await.unwrap();
    monitor.stop().await.unwrap();

    assert_eq!(sink.commands(), vec![Command::PlayAlert, Command::StopAlert]);
}

#[tokio::test(start_paused = true)]
async fn double_start_is_rejected() {
    let sink = Arc::new(RecordingSink::new());
    let (mut monitor, handle) = start(settings(0), &sink);

    assert!(matches!(
        monitor.start(sink.clone()),
        Err(CoreError::AlreadyRunning)
    ));
    assert!(matches!(
        monitor.configure(settings(0)),
        Err(CoreError::AlreadyRunning)
    ));

    // The original session keeps working.
    handle.on_call_state_changed(CallState::Connected).unwrap();
    handle.on_call_state_changed(CallState::Idle).unwrap();
    handle.status().await.unwrap();
    assert_eq!(dials(&sink), 1);

    monitor.stop().await.unwrap();

    // A fresh session may start after stop.
    let handle = monitor.start(sink.clone()).unwrap();
    assert!(handle.is_running());
    monitor.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn start_requires_configuration() {
    let mut monitor = Monitor::new();
    let sink = Arc::new(RecordingSink::new());
    assert!(matches!(monitor.start(sink), Err(CoreError::NotConfigured)));
}

#[tokio::test(start_paused = true)]
async fn dial_on_start_calls_immediately() {
    let sink = Arc::new(RecordingSink::new());
    let (mut monitor, handle) = start(settings(0).with_dial_on_start(true), &sink);

    handle.status().await.unwrap();
    assert_eq!(dials(&sink), 1);

    monitor.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn unknown_code_is_reported_and_ignored() {
    let sink = Arc::new(RecordingSink::new());
    let (mut monitor, handle) = start(settings(0), &sink);
    let mut events = handle.subscribe();

    handle.on_state_code(2).unwrap();
    handle.on_state_code(9).unwrap();
    let status = handle.status().await.unwrap();
    assert_eq!(status.phase, Phase::Connected);

    let mut rejected = None;
    while let Ok(event) = events.try_recv() {
        if let Event::StateCodeRejected { code, .. } = event {
            rejected = Some(code);
        }
    }
    assert_eq!(rejected, Some(9));

    monitor.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn sink_failure_is_reported_not_retried() {
    let sink = Arc::new(RecordingSink::rejecting_dials());
    let (mut monitor, handle) = start(settings(0), &sink);
    let mut events = handle.subscribe();

    handle.on_call_state_changed(CallState::Connected).unwrap();
    handle.on_call_state_changed(CallState::Idle).unwrap();
    let status = handle.status().await.unwrap();
    assert_eq!(status.phase, Phase::Idle);

    advance_ms(60_000).await;
    handle.status().await.unwrap();
    assert_eq!(dials(&sink), 1);

    let mut failures = 0;
    while let Ok(event) = events.try_recv() {
        if let Event::CommandFailed { command, .. } = event {
            assert!(matches!(command, Command::Dial { .. }));
            failures += 1;
        }
    }
    assert_eq!(failures, 1);

    monitor.stop().await.unwrap();
}
