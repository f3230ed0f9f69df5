//! Actuation lifecycle tests against the mock device backend
//!
//! Time is paused, so timed auto-stops land exactly on their deadline.

use haptic_bind::backend::{ConnectionStatus, DeviceCall, DeviceEvent, MockDeviceBackend};
use haptic_bind::input::{ControllerInputKind, InputIdentity, KeyCode, MouseInputKind};
use haptic_bind::mapping::{Binding, DeviceAction};
use haptic_bind::ActuationCoordinator;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::time::{sleep, Instant};

fn init_logging() {
    let _ = env_logger::builder()
        .is_test(true)
        .filter_level(log::LevelFilter::Debug)
        .try_init();
}

fn setup() -> (Arc<MockDeviceBackend>, ActuationCoordinator) {
    init_logging();
    let backend = Arc::new(MockDeviceBackend::new());
    let coordinator = ActuationCoordinator::new(backend.clone(), Handle::current(), 20);
    (backend, coordinator)
}

/// Let device workers drain their queues
async fn settle() {
    sleep(Duration::from_millis(1)).await;
}

fn is_set(call: &DeviceCall, device: &str, expected: f64) -> bool {
    matches!(call, DeviceCall::SetIntensity { device: d, intensity, .. }
        if d == device && (intensity - expected).abs() < 1e-9)
}

fn is_stop(call: &DeviceCall, device: &str) -> bool {
    matches!(call, DeviceCall::Stop { device: d, .. } if d == device)
}

#[tokio::test(start_paused = true)]
async fn hold_sets_then_stops_on_release() {
    let (backend, coordinator) = setup();
    let binding = Binding::new(InputIdentity::Key(KeyCode::SPACE), vec![DeviceAction::hold("D", 0.7)]);

    coordinator.trigger(&binding);
    assert!(coordinator.is_holding("D"));
    assert_eq!(coordinator.pending_auto_stops(), 0);

    sleep(Duration::from_secs(5)).await;
    assert_eq!(backend.calls().len(), 1);

    coordinator.release(&binding);
    settle().await;

    let calls = backend.calls();
    assert_eq!(calls.len(), 2);
    assert!(is_set(&calls[0], "D", 0.7));
    assert!(is_stop(&calls[1], "D"));
    assert!(coordinator.active_holds().is_empty());
}

#[tokio::test(start_paused = true)]
async fn timed_stops_after_duration_without_release() {
    let (backend, coordinator) = setup();
    let binding = Binding::new(InputIdentity::Key(KeyCode::F1), vec![DeviceAction::timed("D", 0.5, 1000)]);

    let start = Instant::now();
    coordinator.trigger(&binding);
    assert_eq!(coordinator.pending_auto_stops(), 1);

    sleep(Duration::from_millis(999)).await;
    assert_eq!(backend.calls().len(), 1);

    sleep(Duration::from_millis(2)).await;
    let calls = backend.calls();
    assert_eq!(calls.len(), 2);
    assert!(is_set(&calls[0], "D", 0.5));
    assert!(is_stop(&calls[1], "D"));
    assert_eq!(calls[0].at(), start);
    assert_eq!(calls[1].at() - start, Duration::from_millis(1000));
    assert_eq!(coordinator.pending_auto_stops(), 0);
}

#[tokio::test(start_paused = true)]
async fn controller_press_pulses_vibro1_and_early_release_is_ignored() {
    let (backend, coordinator) = setup();
    let binding = Binding::new(
        InputIdentity::controller(0, ControllerInputKind::ButtonA),
        vec![DeviceAction::timed("Vibro1", 0.5, 500)],
    );

    let start = Instant::now();
    coordinator.trigger(&binding);
    sleep(Duration::from_millis(100)).await;
    coordinator.release(&binding);

    sleep(Duration::from_millis(100)).await;
    assert_eq!(backend.calls_for("Vibro1").len(), 1);

    sleep(Duration::from_millis(400)).await;
    let calls = backend.calls_for("Vibro1");
    assert_eq!(calls.len(), 2);
    assert!(is_set(&calls[0], "Vibro1", 0.5));
    assert!(is_stop(&calls[1], "Vibro1"));
    assert_eq!(calls[1].at() - start, Duration::from_millis(500));
}

#[tokio::test(start_paused = true)]
async fn zero_duration_timed_never_auto_stops() {
    let (backend, coordinator) = setup();
    let binding = Binding::new(InputIdentity::Key(KeyCode::F12), vec![DeviceAction::timed("D", 0.4, 0)]);

    coordinator.trigger(&binding);
    assert_eq!(coordinator.pending_auto_stops(), 0);

    sleep(Duration::from_secs(60)).await;
    let calls = backend.calls();
    assert_eq!(calls.len(), 1);
    assert!(is_set(&calls[0], "D", 0.4));
}

#[tokio::test(start_paused = true)]
async fn wheel_hold_is_zero_duration() {
    let (backend, coordinator) = setup();
    let binding = Binding::new(InputIdentity::Mouse(MouseInputKind::WheelDown), vec![DeviceAction::hold("D", 0.5)]);

    // A wheel tick delivers both edges back to back
    coordinator.trigger(&binding);
    coordinator.release(&binding);
    settle().await;

    let calls = backend.calls();
    assert_eq!(calls.len(), 2);
    assert!(is_set(&calls[0], "D", 0.5));
    assert!(is_stop(&calls[1], "D"));
    assert_eq!(calls[0].at(), calls[1].at());
}

#[tokio::test(start_paused = true)]
async fn disconnect_during_hold_drops_session_without_stop() {
    let (backend, coordinator) = setup();
    let binding = Binding::new(InputIdentity::Key(KeyCode::SPACE), vec![DeviceAction::hold("D", 0.5)]);

    coordinator.trigger(&binding);
    settle().await;
    coordinator.on_device_event(&DeviceEvent::DeviceRemoved("D".into()));
    assert!(!coordinator.is_holding("D"));

    coordinator.release(&binding);
    settle().await;

    let calls = backend.calls();
    assert_eq!(calls.len(), 1);
    assert!(is_set(&calls[0], "D", 0.5));
}

#[tokio::test(start_paused = true)]
async fn server_disconnect_clears_everything() {
    let (backend, coordinator) = setup();
    coordinator.trigger(&Binding::new(
        InputIdentity::Key(KeyCode::SPACE),
        vec![DeviceAction::hold("A", 0.5), DeviceAction::timed("B", 0.5, 300)],
    ));
    assert_eq!(coordinator.active_holds(), vec!["A".to_string()]);
    assert_eq!(coordinator.pending_auto_stops(), 1);

    coordinator.on_device_event(&DeviceEvent::ConnectionChanged(ConnectionStatus::Disconnected));
    assert!(coordinator.active_holds().is_empty());
    assert_eq!(coordinator.pending_auto_stops(), 0);

    sleep(Duration::from_millis(500)).await;
    assert!(backend.calls().iter().all(|call| matches!(call, DeviceCall::SetIntensity { .. })));
}

#[tokio::test(start_paused = true)]
async fn failing_device_does_not_block_siblings() {
    let (backend, coordinator) = setup();
    backend.fail_device("Broken");
    let binding = Binding::new(
        InputIdentity::Key(KeyCode::ENTER),
        vec![
            DeviceAction::timed("Broken", 0.5, 100),
            DeviceAction::timed("Healthy", 0.5, 100),
            DeviceAction::hold("Broken", 0.2),
        ],
    );

    coordinator.trigger(&binding);
    sleep(Duration::from_millis(150)).await;
    coordinator.release(&binding);
    settle().await;

    assert!(backend.calls_for("Broken").is_empty());
    let healthy = backend.calls_for("Healthy");
    assert_eq!(healthy.len(), 2);
    assert!(is_stop(&healthy[1], "Healthy"));
    assert!(!coordinator.is_holding("Broken"));

    // The coordinator keeps working afterwards
    coordinator.trigger(&Binding::new(InputIdentity::Key(KeyCode::TAB), vec![DeviceAction::hold("Healthy", 1.0)]));
    settle().await;
    assert!(is_set(backend.calls_for("Healthy").last().unwrap(), "Healthy", 1.0));
}

#[tokio::test(start_paused = true)]
async fn stop_all_reaches_every_known_device() {
    init_logging();
    let backend = Arc::new(MockDeviceBackend::with_devices(["Idle", "Busy"]));
    let coordinator = ActuationCoordinator::new(backend.clone(), Handle::current(), 20);

    coordinator.trigger(&Binding::new(
        InputIdentity::Key(KeyCode::SPACE),
        vec![DeviceAction::hold("Busy", 0.5), DeviceAction::timed("Other", 0.5, 1000)],
    ));
    coordinator.stop_all();
    assert!(coordinator.active_holds().is_empty());
    assert_eq!(coordinator.pending_auto_stops(), 0);

    sleep(Duration::from_secs(2)).await;
    for device in ["Idle", "Busy", "Other"] {
        let calls = backend.calls_for(device);
        assert!(is_stop(calls.last().unwrap(), device), "{device} was not stopped");
    }
    // The cancelled auto-stop never fires a second stop
    assert_eq!(backend.calls_for("Other").len(), 2);
}

#[tokio::test(start_paused = true)]
async fn shutdown_stops_devices_and_transport() {
    let (backend, coordinator) = setup();
    coordinator.trigger(&Binding::new(InputIdentity::Key(KeyCode::SPACE), vec![DeviceAction::hold("D", 0.5)]));

    coordinator.shutdown().await;

    let calls = backend.calls();
    assert!(is_set(&calls[0], "D", 0.5));
    assert!(is_stop(&calls[1], "D"));
    assert!(matches!(calls.last(), Some(DeviceCall::StopAll { .. })));
}
