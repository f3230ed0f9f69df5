//! Actuation coordinator
//!
//! Turns Triggered/Released bindings into device commands. The delivering
//! input thread only enqueues: each device has one worker task that runs its
//! commands in order, so a hold's stop can never overtake its set, and a slow
//! or failing device never stalls another.

use crate::actuation::intensity::quantize;
use crate::backend::{ConnectionStatus, DeviceBackend, DeviceEvent};
use crate::mapping::binding::{ActuationMode, Binding};
use futures::future::join_all;
use log::{debug, info, trace, warn};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy)]
enum DeviceCommand {
    SetIntensity(f64),
    Stop,
}

struct DeviceWorker {
    commands: mpsc::UnboundedSender<DeviceCommand>,
    task: JoinHandle<()>,
}

#[derive(Default)]
struct CoordinatorState {
    /// Devices with an active hold session
    holds: HashSet<String>,
    /// Pending timed auto-stops keyed by (device, activation id)
    auto_stops: HashMap<(String, u64), CancellationToken>,
    workers: HashMap<String, DeviceWorker>,
}

struct Inner {
    backend: Arc<dyn DeviceBackend>,
    runtime: Handle,
    intensity_steps: u32,
    next_activation: AtomicU64,
    state: Mutex<CoordinatorState>,
}

impl Inner {
    fn state(&self) -> MutexGuard<'_, CoordinatorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn enqueue(&self, state: &mut CoordinatorState, device: &str, command: DeviceCommand) {
        let command = match state.workers.get(device) {
            Some(worker) => match worker.commands.send(command) {
                Ok(()) => return,
                // Worker is gone (its task panicked); replace it
                Err(mpsc::error::SendError(command)) => command,
            },
            None => command,
        };

        let worker = self.spawn_worker(device);
        if worker.commands.send(command).is_err() {
            warn!("Device worker for '{}' refused a command", device);
        }
        state.workers.insert(device.to_string(), worker);
    }

    fn spawn_worker(&self, device: &str) -> DeviceWorker {
        let (commands, mut rx) = mpsc::unbounded_channel();
        let backend = Arc::clone(&self.backend);
        let device = device.to_string();

        let task = self.runtime.spawn(async move {
            trace!("Device worker for '{}' started", device);
            while let Some(command) = rx.recv().await {
                let result = match command {
                    DeviceCommand::SetIntensity(intensity) => {
                        trace!("→ {} set {:.2}", device, intensity);
                        backend.set_intensity(&device, intensity).await
                    }
                    DeviceCommand::Stop => {
                        trace!("→ {} stop", device);
                        backend.stop(&device).await
                    }
                };
                if let Err(e) = result {
                    warn!("Device command {:?} for '{}' failed: {}", command, device, e);
                }
            }
            trace!("Device worker for '{}' exited", device);
        });

        DeviceWorker { commands, task }
    }

    fn schedule_auto_stop(self: &Arc<Self>, state: &mut CoordinatorState, device: &str, deadline: Instant) {
        let activation = self.next_activation.fetch_add(1, Ordering::Relaxed);
        let token = CancellationToken::new();
        state.auto_stops.insert((device.to_string(), activation), token.clone());

        let inner = Arc::clone(self);
        let device = device.to_string();
        self.runtime.spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {
                    trace!("Auto-stop for '{}' (activation {}) cancelled", device, activation);
                }
                _ = sleep_until(deadline) => inner.fire_auto_stop(&device, activation),
            }
        });
    }

    fn fire_auto_stop(&self, device: &str, activation: u64) {
        let mut state = self.state();
        if state.auto_stops.remove(&(device.to_string(), activation)).is_some() {
            debug!("Auto-stop '{}' (activation {})", device, activation);
            self.enqueue(&mut state, device, DeviceCommand::Stop);
        }
    }
}

/// Dispatches bindings to devices and tracks hold sessions.
///
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct ActuationCoordinator {
    inner: Arc<Inner>,
}

impl ActuationCoordinator {
    /// `runtime` hosts the device workers and auto-stop timers; the
    /// coordinator itself may be driven from any thread.
    pub fn new(backend: Arc<dyn DeviceBackend>, runtime: Handle, intensity_steps: u32) -> Self {
        Self {
            inner: Arc::new(Inner {
                backend,
                runtime,
                intensity_steps,
                next_activation: AtomicU64::new(0),
                state: Mutex::new(CoordinatorState::default()),
            }),
        }
    }

    pub fn backend(&self) -> &Arc<dyn DeviceBackend> {
        &self.inner.backend
    }

    /// Start every action of a triggered binding.
    ///
    /// Timed actions stop on their own `duration_ms` after this call
    /// (a duration of 0 never auto-stops). Hold actions open a hold session
    /// on their device; triggering again re-issues the intensity.
    pub fn trigger(&self, binding: &Binding) {
        let _runtime = self.inner.runtime.enter();
        let issued = Instant::now();
        let mut state = self.inner.state();

        for action in &binding.actions {
            let device = action.device_name.as_str();
            let intensity = quantize(action.intensity, self.inner.intensity_steps);

            match action.mode {
                ActuationMode::Timed => {
                    debug!("{}: {} at {:.2} for {}ms", binding.input, device, intensity, action.duration_ms);
                    self.inner.enqueue(&mut state, device, DeviceCommand::SetIntensity(intensity));
                    if action.duration_ms > 0 {
                        let deadline = issued + Duration::from_millis(action.duration_ms);
                        self.inner.schedule_auto_stop(&mut state, device, deadline);
                    }
                }
                ActuationMode::Hold => {
                    if state.holds.insert(device.to_string()) {
                        debug!("{}: hold {} at {:.2}", binding.input, device, intensity);
                    } else {
                        debug!("{}: hold {} re-issued at {:.2}", binding.input, device, intensity);
                    }
                    self.inner.enqueue(&mut state, device, DeviceCommand::SetIntensity(intensity));
                }
            }
        }
    }

    /// End the hold sessions of a released binding. Timed actions ignore release.
    pub fn release(&self, binding: &Binding) {
        let mut state = self.inner.state();

        for action in binding.actions.iter().filter(|a| a.is_hold()) {
            let device = action.device_name.as_str();
            if state.holds.remove(device) {
                debug!("{}: release hold on {}", binding.input, device);
                self.inner.enqueue(&mut state, device, DeviceCommand::Stop);
            } else {
                trace!("{}: no hold session on {}", binding.input, device);
            }
        }
    }

    /// React to transport changes. Sessions are dropped without sending
    /// `stop`; the device is no longer reachable. Its worker finishes what
    /// is queued and exits, so later stop-alls skip it.
    pub fn on_device_event(&self, event: &DeviceEvent) {
        let mut state = self.inner.state();

        match event {
            DeviceEvent::DeviceRemoved(device) => {
                if state.holds.remove(device) {
                    info!("Device '{}' removed, hold session dropped", device);
                }
                state.workers.remove(device);
                state.auto_stops.retain(|(name, _), token| {
                    if name == device {
                        token.cancel();
                        false
                    } else {
                        true
                    }
                });
            }
            DeviceEvent::ConnectionChanged(ConnectionStatus::Disconnected) => {
                info!(
                    "Device server disconnected, dropping {} hold session(s) and {} pending auto-stop(s)",
                    state.holds.len(),
                    state.auto_stops.len()
                );
                state.holds.clear();
                state.workers.clear();
                for (_, token) in state.auto_stops.drain() {
                    token.cancel();
                }
            }
            other => debug!("Device event: {:?}", other),
        }
    }

    /// Stop every known device and forget all sessions and pending auto-stops.
    pub fn stop_all(&self) {
        let listed = self.inner.backend.list_devices();
        let mut state = self.inner.state();

        let mut devices: HashSet<String> = listed.into_iter().collect();
        devices.extend(state.workers.keys().cloned());
        devices.extend(state.holds.drain());

        for (_, token) in state.auto_stops.drain() {
            token.cancel();
        }

        info!("Stopping {} device(s)", devices.len());
        for device in &devices {
            self.inner.enqueue(&mut state, device, DeviceCommand::Stop);
        }
    }

    /// Stop everything, drain the device workers, then ask the transport to
    /// stop all devices.
    pub async fn shutdown(&self) {
        self.stop_all();

        let workers: Vec<DeviceWorker> = {
            let mut state = self.inner.state();
            state.workers.drain().map(|(_, worker)| worker).collect()
        };
        let tasks = workers.into_iter().map(|worker| {
            drop(worker.commands);
            worker.task
        });
        for result in join_all(tasks).await {
            if let Err(e) = result {
                warn!("Device worker ended abnormally: {}", e);
            }
        }

        if let Err(e) = self.inner.backend.stop_all().await {
            warn!("Final stop-all failed: {}", e);
        }
        info!("Actuation coordinator shut down");
    }

    pub fn is_holding(&self, device: &str) -> bool {
        self.inner.state().holds.contains(device)
    }

    /// Devices with an active hold session, sorted.
    pub fn active_holds(&self) -> Vec<String> {
        let mut holds: Vec<String> = self.inner.state().holds.iter().cloned().collect();
        holds.sort();
        holds
    }

    pub fn pending_auto_stops(&self) -> usize {
        self.inner.state().auto_stops.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{DeviceCall, MockDeviceBackend};
    use crate::input::{InputIdentity, KeyCode};
    use crate::mapping::binding::DeviceAction;

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    fn setup() -> (Arc<MockDeviceBackend>, ActuationCoordinator) {
        let backend = Arc::new(MockDeviceBackend::new());
        let coordinator = ActuationCoordinator::new(backend.clone(), Handle::current(), 20);
        (backend, coordinator)
    }

    fn key(actions: Vec<DeviceAction>) -> Binding {
        Binding::new(InputIdentity::Key(KeyCode::SPACE), actions)
    }

    #[tokio::test(start_paused = true)]
    async fn intensity_is_quantized() {
        let (backend, coordinator) = setup();
        coordinator.trigger(&key(vec![DeviceAction::timed("D", 0.03, 0)]));
        settle().await;

        let calls = backend.calls();
        assert!(matches!(&calls[..], [DeviceCall::SetIntensity { intensity, .. }] if (*intensity - 0.05).abs() < 1e-9));
        assert_eq!(coordinator.pending_auto_stops(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn retrigger_hold_keeps_one_session() {
        let (backend, coordinator) = setup();
        coordinator.trigger(&key(vec![DeviceAction::hold("D", 0.3)]));
        coordinator.trigger(&key(vec![DeviceAction::hold("D", 0.8)]));
        assert_eq!(coordinator.active_holds(), vec!["D".to_string()]);

        coordinator.release(&key(vec![DeviceAction::hold("D", 0.8)]));
        coordinator.release(&key(vec![DeviceAction::hold("D", 0.8)]));
        settle().await;

        let calls = backend.calls_for("D");
        assert_eq!(calls.len(), 3);
        assert!(matches!(&calls[1], DeviceCall::SetIntensity { intensity, .. } if (*intensity - 0.8).abs() < 1e-9));
        assert!(matches!(calls[2], DeviceCall::Stop { .. }));
        assert!(!coordinator.is_holding("D"));
    }

    #[tokio::test(start_paused = true)]
    async fn removed_device_cancels_its_auto_stop() {
        let (backend, coordinator) = setup();
        coordinator.trigger(&key(vec![DeviceAction::timed("A", 0.5, 200), DeviceAction::timed("B", 0.5, 200)]));
        assert_eq!(coordinator.pending_auto_stops(), 2);

        coordinator.on_device_event(&DeviceEvent::DeviceRemoved("A".into()));
        assert_eq!(coordinator.pending_auto_stops(), 1);

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(backend.calls_for("A").len(), 1);
        assert_eq!(backend.calls_for("B").len(), 2);
        assert_eq!(coordinator.pending_auto_stops(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_all_skips_removed_devices() {
        let backend = Arc::new(MockDeviceBackend::with_devices(["A", "B"]));
        let coordinator = ActuationCoordinator::new(backend.clone(), Handle::current(), 20);
        coordinator.trigger(&key(vec![DeviceAction::hold("A", 0.5), DeviceAction::hold("B", 0.5)]));
        settle().await;

        backend.remove_device("A");
        coordinator.on_device_event(&DeviceEvent::DeviceRemoved("A".into()));
        coordinator.stop_all();
        settle().await;

        assert_eq!(backend.rejected(), 0);
        assert_eq!(backend.calls_for("A").len(), 1);
        assert!(matches!(backend.calls_for("B").last(), Some(DeviceCall::Stop { .. })));
    }
}
