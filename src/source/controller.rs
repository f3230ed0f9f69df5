//! Controller source
//!
//! A poller thread reads every controller slot at a fixed period and diffs
//! each snapshot against the previous one. Digital buttons, triggers and
//! stick directions all become pseudo-buttons with press/release edges.
//! All slots are processed under one lock per tick, with the registry held
//! for the whole tick. A held input releases the binding it triggered.

use super::gamepad::{capture_input, GamepadSnapshot, GamepadSource};
use super::{emit, BindingEvent, EventSink, SourceError};
use crate::input::{ControllerInputKind, InputIdentity, InputSource, MAX_CONTROLLERS};
use crate::mapping::config::ControllerSettings;
use crate::mapping::{AxisThresholds, Binding, BindingError, BindingRegistry};
use log::{debug, info, trace};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

const SLOTS: usize = MAX_CONTROLLERS as usize;

#[derive(Default)]
struct PollState {
    previous: [Option<GamepadSnapshot>; SLOTS],
    pressed: HashMap<InputIdentity, Option<Arc<Binding>>>,
}

struct ControllerInner {
    registry: BindingRegistry,
    gamepads: Arc<dyn GamepadSource>,
    thresholds: AxisThresholds,
    capture_thresholds: AxisThresholds,
    poll_interval: Duration,
    state: Mutex<PollState>,
    active: AtomicBool,
    sink: EventSink,
}

impl ControllerInner {
    fn state(&self) -> MutexGuard<'_, PollState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn press(&self, state: &mut PollState, bindings: &HashMap<InputIdentity, Arc<Binding>>, id: InputIdentity) {
        if state.pressed.contains_key(&id) {
            return;
        }
        let binding = bindings.get(&id).cloned();
        state.pressed.insert(id, binding.clone());
        if let Some(binding) = binding {
            debug!("{} pressed → {}", id, binding.description());
            emit(&self.sink, BindingEvent::Triggered { source: InputSource::Controller, binding });
        }
    }

    fn release(&self, state: &mut PollState, id: InputIdentity) {
        if let Some(Some(binding)) = state.pressed.remove(&id) {
            debug!("{} released", id);
            emit(&self.sink, BindingEvent::Released { source: InputSource::Controller, binding });
        }
    }

    fn poll_once(&self) {
        let bindings = self.registry.read();
        let mut state = self.state();

        for index in 0..MAX_CONTROLLERS {
            let slot = usize::from(index);
            let current = self.gamepads.read(index);

            match (state.previous[slot], current) {
                (None, None) => {}
                (None, Some(_)) => info!("Controller {} connected", index + 1),
                (Some(_), None) => {
                    info!("Controller {} disconnected", index + 1);
                    let held: Vec<InputIdentity> = state
                        .pressed
                        .keys()
                        .filter(|id| id.controller_index() == Some(index))
                        .copied()
                        .collect();
                    for id in held {
                        self.release(&mut state, id);
                    }
                }
                (Some(previous), Some(current)) if previous != current => {
                    for kind in ControllerInputKind::ALL {
                        let was = previous.is_active(kind, &self.thresholds);
                        let now = current.is_active(kind, &self.thresholds);
                        let id = InputIdentity::controller(index, kind);
                        match (was, now) {
                            (false, true) => self.press(&mut state, &bindings, id),
                            (true, false) => self.release(&mut state, id),
                            _ => {}
                        }
                    }
                }
                (Some(_), Some(_)) => {}
            }

            state.previous[slot] = current;
        }
    }

    fn baseline(&self) {
        let mut state = self.state();
        for index in 0..MAX_CONTROLLERS {
            state.previous[usize::from(index)] = self.gamepads.read(index);
        }
        state.pressed.clear();
    }
}

/// Controller bindings and the poller that drives them
pub struct ControllerService {
    inner: Arc<ControllerInner>,
    poller: Mutex<Option<JoinHandle<()>>>,
}

impl ControllerService {
    pub fn new(gamepads: Arc<dyn GamepadSource>, settings: &ControllerSettings, sink: EventSink) -> Self {
        Self {
            inner: Arc::new(ControllerInner {
                registry: BindingRegistry::new(InputSource::Controller),
                gamepads,
                thresholds: settings.polling,
                capture_thresholds: settings.capture,
                poll_interval: settings.poll_interval(),
                state: Mutex::new(PollState::default()),
                active: AtomicBool::new(false),
                sink,
            }),
            poller: Mutex::new(None),
        }
    }

    fn poller(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.poller.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Take the current controller state as the baseline and start polling.
    /// Inputs already held at this point do not fire. Idempotent.
    pub fn start(&self) -> Result<(), SourceError> {
        let mut poller = self.poller();
        if self.inner.active.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        self.inner.baseline();

        let inner = Arc::clone(&self.inner);
        let spawned = thread::Builder::new()
            .name("controller-poller".to_string())
            .spawn(move || {
                info!("Controller poller started ({:?} period)", inner.poll_interval);
                let mut next_tick = Instant::now() + inner.poll_interval;

                while inner.active.load(Ordering::SeqCst) {
                    inner.poll_once();

                    let now = Instant::now();
                    if next_tick > now {
                        thread::sleep(next_tick - now);
                    } else {
                        trace!("Controller poll overran its period");
                        next_tick = now;
                    }
                    next_tick += inner.poll_interval;
                }

                info!("Controller poller exited");
            });

        match spawned {
            Ok(handle) => {
                *poller = Some(handle);
                Ok(())
            }
            Err(e) => {
                self.inner.active.store(false, Ordering::SeqCst);
                Err(SourceError::Unavailable(format!("controller poller thread: {e}")))
            }
        }
    }

    /// Stop polling and forget held inputs. Idempotent.
    pub fn stop(&self) {
        let mut poller = self.poller();
        if !self.inner.active.swap(false, Ordering::SeqCst) {
            return;
        }

        if let Some(handle) = poller.take() {
            if handle.thread().id() != thread::current().id() && handle.join().is_err() {
                debug!("Controller poller panicked");
            }
        }
        self.inner.state().pressed.clear();
        info!("Controller source stopped");
    }

    pub fn is_active(&self) -> bool {
        self.inner.active.load(Ordering::SeqCst)
    }

    /// Run one polling tick on the calling thread.
    ///
    /// A controller seen for the first time is baselined without firing; a
    /// controller that vanished releases everything it held.
    pub fn poll_once(&self) {
        self.inner.poll_once();
    }

    /// First controller input currently held on any slot, using the capture
    /// thresholds.
    pub fn capture(&self) -> Option<InputIdentity> {
        (0..MAX_CONTROLLERS).find_map(|index| {
            let snapshot = self.inner.gamepads.read(index)?;
            capture_input(&snapshot, &self.inner.capture_thresholds)
                .map(|kind| InputIdentity::controller(index, kind))
        })
    }

    /// Slots that currently report a controller
    pub fn connected_controllers(&self) -> Vec<u8> {
        (0..MAX_CONTROLLERS)
            .filter(|index| self.inner.gamepads.read(*index).is_some())
            .collect()
    }

    pub fn is_pressed(&self, id: &InputIdentity) -> bool {
        self.inner.state().pressed.contains_key(id)
    }

    pub fn add_binding(&self, binding: Binding) -> Result<Option<Arc<Binding>>, BindingError> {
        self.inner.registry.set(binding)
    }

    pub fn remove_binding(&self, input: &InputIdentity) -> Option<Arc<Binding>> {
        self.inner.registry.remove(input)
    }

    pub fn clear_bindings(&self) {
        self.inner.registry.clear();
    }

    pub fn list_bindings(&self) -> Vec<Arc<Binding>> {
        self.inner.registry.snapshot()
    }

    pub fn registry(&self) -> &BindingRegistry {
        &self.inner.registry
    }
}

impl Drop for ControllerService {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::DeviceAction;
    use crate::source::SimulatedGamepads;
    use crossbeam_channel::Receiver;

    fn service(pads: &SimulatedGamepads, kinds: &[(u8, ControllerInputKind)]) -> (ControllerService, Receiver<BindingEvent>) {
        let (sink, events) = crossbeam_channel::unbounded();
        let service = ControllerService::new(Arc::new(pads.clone()), &ControllerSettings::default(), sink);
        for (index, kind) in kinds {
            service
                .add_binding(Binding::new(
                    InputIdentity::controller(*index, *kind),
                    vec![DeviceAction::timed("Vibro1", 0.5, 500)],
                ))
                .unwrap();
        }
        (service, events)
    }

    fn drain(events: &Receiver<BindingEvent>) -> Vec<(bool, InputIdentity)> {
        events
            .try_iter()
            .filter_map(|event| match event {
                BindingEvent::Triggered { binding, .. } => Some((true, binding.input)),
                BindingEvent::Released { binding, .. } => Some((false, binding.input)),
                BindingEvent::ToggleRequested => None,
            })
            .collect()
    }

    #[test]
    fn button_edges() {
        let pads = SimulatedGamepads::new();
        pads.set(0, GamepadSnapshot::default());
        let (service, events) = service(&pads, &[(0, ControllerInputKind::ButtonA)]);
        service.poll_once();

        let a = InputIdentity::controller(0, ControllerInputKind::ButtonA);
        pads.set(0, GamepadSnapshot::default().with_button(ControllerInputKind::ButtonA));
        service.poll_once();
        service.poll_once();
        assert_eq!(drain(&events), vec![(true, a)]);
        assert!(service.is_pressed(&a));

        pads.set(0, GamepadSnapshot::default());
        service.poll_once();
        assert_eq!(drain(&events), vec![(false, a)]);
    }

    #[test]
    fn axis_inside_threshold_is_silent() {
        let pads = SimulatedGamepads::new();
        pads.set(1, GamepadSnapshot::default());
        let (service, events) = service(
            &pads,
            &[(1, ControllerInputKind::RightTrigger), (1, ControllerInputKind::LeftStickLeft)],
        );
        service.poll_once();

        for value in [-16384i16, -100, 0, 100, 16384] {
            pads.update(1, |snap| {
                snap.left_thumb_x = value;
                snap.right_trigger = 128;
            });
            service.poll_once();
        }
        assert!(drain(&events).is_empty());

        pads.update(1, |snap| snap.left_thumb_x = -20000);
        service.poll_once();
        pads.update(1, |snap| snap.left_thumb_x = -25000);
        service.poll_once();
        assert_eq!(
            drain(&events),
            vec![(true, InputIdentity::controller(1, ControllerInputKind::LeftStickLeft))]
        );
    }

    #[test]
    fn controllers_are_independent() {
        let pads = SimulatedGamepads::new();
        pads.set(0, GamepadSnapshot::default());
        pads.set(1, GamepadSnapshot::default());
        let (service, events) = service(&pads, &[(1, ControllerInputKind::ButtonA)]);
        service.poll_once();

        pads.set(0, GamepadSnapshot::default().with_button(ControllerInputKind::ButtonA));
        service.poll_once();
        assert!(drain(&events).is_empty());

        pads.set(1, GamepadSnapshot::default().with_button(ControllerInputKind::ButtonA));
        service.poll_once();
        assert_eq!(
            drain(&events),
            vec![(true, InputIdentity::controller(1, ControllerInputKind::ButtonA))]
        );
    }

    #[test]
    fn held_at_start_does_not_fire() {
        let pads = SimulatedGamepads::new();
        pads.set(0, GamepadSnapshot::default().with_button(ControllerInputKind::ButtonB));
        let (service, events) = service(&pads, &[(0, ControllerInputKind::ButtonB)]);
        service.start().unwrap();
        service.stop();

        // Newly connected pad holding a button is baselined too
        pads.set(2, GamepadSnapshot::default().with_button(ControllerInputKind::ButtonB));
        service.poll_once();
        pads.set(0, GamepadSnapshot::default());
        service.poll_once();
        assert!(drain(&events).is_empty());
    }

    #[test]
    fn unplug_releases_held_inputs() {
        let pads = SimulatedGamepads::new();
        pads.set(3, GamepadSnapshot::default());
        let (service, events) = service(&pads, &[(3, ControllerInputKind::Start)]);
        service.poll_once();

        pads.set(3, GamepadSnapshot::default().with_button(ControllerInputKind::Start));
        service.poll_once();
        pads.disconnect(3);
        service.poll_once();

        let start = InputIdentity::controller(3, ControllerInputKind::Start);
        assert_eq!(drain(&events), vec![(true, start), (false, start)]);
        assert!(service.connected_controllers().is_empty());
    }

    #[test]
    fn capture_scans_slots_in_order() {
        let pads = SimulatedGamepads::new();
        let (service, _events) = service(&pads, &[]);
        assert_eq!(service.capture(), None);

        pads.set(1, GamepadSnapshot { left_trigger: 70, ..Default::default() });
        pads.set(2, GamepadSnapshot::default().with_button(ControllerInputKind::ButtonY));
        assert_eq!(
            service.capture(),
            Some(InputIdentity::controller(1, ControllerInputKind::LeftTrigger))
        );
        assert_eq!(service.connected_controllers(), vec![1, 2]);
    }

    #[test]
    fn trigger_and_stick_edges_both_ways() {
        let pads = SimulatedGamepads::new();
        pads.set(0, GamepadSnapshot::default());
        let (service, events) = service(
            &pads,
            &[(0, ControllerInputKind::RightTrigger), (0, ControllerInputKind::LeftStickLeft)],
        );
        service.poll_once();

        let trigger = InputIdentity::controller(0, ControllerInputKind::RightTrigger);
        for value in [200u8, 255, 0] {
            pads.update(0, |snap| snap.right_trigger = value);
            service.poll_once();
        }
        assert_eq!(drain(&events), vec![(true, trigger), (false, trigger)]);

        let stick = InputIdentity::controller(0, ControllerInputKind::LeftStickLeft);
        for value in [-25000i16, -30000, 0] {
            pads.update(0, |snap| snap.left_thumb_x = value);
            service.poll_once();
        }
        assert_eq!(drain(&events), vec![(true, stick), (false, stick)]);
    }

    #[test]
    fn release_uses_binding_that_fired() {
        let pads = SimulatedGamepads::new();
        pads.set(0, GamepadSnapshot::default());
        let a = InputIdentity::controller(0, ControllerInputKind::ButtonA);
        let x = InputIdentity::controller(0, ControllerInputKind::ButtonX);
        let (service, events) = service(&pads, &[(0, ControllerInputKind::ButtonA)]);
        service.poll_once();

        pads.set(
            0,
            GamepadSnapshot::default()
                .with_button(ControllerInputKind::ButtonA)
                .with_button(ControllerInputKind::ButtonX),
        );
        service.poll_once();
        service.clear_bindings();
        service.add_binding(Binding::new(x, vec![DeviceAction::hold("Vibro2", 1.0)])).unwrap();
        pads.set(0, GamepadSnapshot::default());
        service.poll_once();

        let received: Vec<_> = events.try_iter().collect();
        assert_eq!(received.len(), 2);
        match &received[1] {
            BindingEvent::Released { binding, .. } => {
                assert_eq!(binding.input, a);
                assert_eq!(binding.actions[0].device_name, "Vibro1");
            }
            other => panic!("expected a release, got {:?}", other),
        }
    }

    #[test]
    fn tick_waits_for_registry_writers() {
        let pads = SimulatedGamepads::new();
        pads.set(0, GamepadSnapshot::default());
        let (service, events) = service(&pads, &[]);
        let service = Arc::new(service);
        service.poll_once();
        pads.set(0, GamepadSnapshot::default().with_button(ControllerInputKind::ButtonA));

        let guard = service.registry().read();
        let ticker = {
            let service = Arc::clone(&service);
            thread::spawn(move || service.poll_once())
        };
        thread::sleep(Duration::from_millis(50));
        assert!(!ticker.is_finished());

        drop(guard);
        ticker.join().unwrap();
        assert!(service.is_pressed(&InputIdentity::controller(0, ControllerInputKind::ButtonA)));
        assert!(drain(&events).is_empty());
    }
}
