//! High-level haptic binding manager
//!
//! Wires the three input sources to the actuation coordinator. Sources push
//! [`BindingEvent`]s onto one channel; a dispatch thread hands them to the
//! coordinator and republishes them as [`Notification`]s for the
//! application. Device list and connection changes are forwarded from the
//! backend to the coordinator by a task on the tokio runtime.

use crate::actuation::ActuationCoordinator;
use crate::backend::DeviceBackend;
use crate::input::InputSource;
use crate::mapping::{Binding, BindingError, Config, ConfigError, ProfileData};
use crate::source::{
    BindingEvent, ControllerService, GamepadSource, InputHook, KeyboardService, MouseService, RawKeyEvent,
    RawMouseEvent, SourceError,
};
use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use log::{debug, info, trace, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;

/// What the application sees
#[derive(Debug, Clone)]
pub enum Notification {
    Triggered { source: InputSource, binding: Arc<Binding> },
    Released { source: InputSource, binding: Arc<Binding> },
    /// The toggle key switched every source on or off
    SourcesToggled { active: bool },
}

/// The three source services, shared with the dispatch thread
#[derive(Clone)]
struct Sources {
    keyboard: Arc<KeyboardService>,
    mouse: Arc<MouseService>,
    controller: Arc<ControllerService>,
}

impl Sources {
    fn any_active(&self) -> bool {
        self.keyboard.is_active() || self.mouse.is_active() || self.controller.is_active()
    }

    /// Start every source. A source that fails stays off; the others still
    /// start. The first failure is returned.
    fn start_all(&self) -> Result<(), SourceError> {
        let results = [
            ("keyboard", self.keyboard.start()),
            ("mouse", self.mouse.start()),
            ("controller", self.controller.start()),
        ];

        let mut first_error = None;
        for (name, result) in results {
            if let Err(e) = result {
                warn!("Failed to start {} source: {}", name, e);
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    fn stop_all(&self) {
        self.keyboard.stop();
        self.mouse.stop();
        self.controller.stop();
    }

    /// If any source is active stop them all, otherwise start them all.
    /// Returns whether sources are active afterwards.
    fn toggle(&self) -> bool {
        if self.any_active() {
            info!("Toggling input sources off");
            self.stop_all();
            false
        } else {
            info!("Toggling input sources on");
            if let Err(e) = self.start_all() {
                warn!("Toggle could not start every source: {}", e);
            }
            self.any_active()
        }
    }

    fn clear_bindings(&self) {
        self.keyboard.clear_bindings();
        self.mouse.clear_bindings();
        self.controller.clear_bindings();
    }

    fn add_binding(&self, binding: Binding) -> Result<Option<Arc<Binding>>, BindingError> {
        match binding.input.source() {
            InputSource::Keyboard => self.keyboard.add_binding(binding),
            InputSource::Mouse => self.mouse.add_binding(binding),
            InputSource::Controller => self.controller.add_binding(binding),
        }
    }
}

fn notify(sender: &Sender<Notification>, notification: Notification) {
    match sender.try_send(notification) {
        Ok(()) => {}
        Err(TrySendError::Full(dropped)) => trace!("Notification queue full, dropped {:?}", dropped),
        Err(TrySendError::Disconnected(_)) => {}
    }
}

fn dispatch(coordinator: &ActuationCoordinator, notifications: &Sender<Notification>, event: BindingEvent) {
    match event {
        BindingEvent::Triggered { source, binding } => {
            coordinator.trigger(&binding);
            notify(notifications, Notification::Triggered { source, binding });
        }
        BindingEvent::Released { source, binding } => {
            coordinator.release(&binding);
            notify(notifications, Notification::Released { source, binding });
        }
        BindingEvent::ToggleRequested => debug!("Toggle request ignored while stopping"),
    }
}

/// Manager for input sources, bindings and device actuation
pub struct HapticManager {
    sources: Sources,
    coordinator: ActuationCoordinator,
    runtime: Handle,
    event_receiver: Receiver<BindingEvent>,
    notification_sender: Sender<Notification>,
    notification_receiver: Receiver<Notification>,
    /// Running flag
    running: Arc<AtomicBool>,
    dispatcher: Option<JoinHandle<()>>,
    device_events: Option<CancellationToken>,
}

impl HapticManager {
    /// Create a manager. Nothing runs until [`HapticManager::start`].
    ///
    /// `runtime` hosts device commands and timers; the manager's own threads
    /// are plain OS threads.
    pub fn new(
        config: &Config,
        backend: Arc<dyn DeviceBackend>,
        keyboard_hook: Box<dyn InputHook<RawKeyEvent>>,
        mouse_hook: Box<dyn InputHook<RawMouseEvent>>,
        gamepads: Arc<dyn GamepadSource>,
        runtime: Handle,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let toggle_key = config.toggle_key()?;

        let (event_sender, event_receiver) = unbounded();
        let (notification_sender, notification_receiver) = bounded(config.settings.notification_capacity);

        let sources = Sources {
            keyboard: Arc::new(KeyboardService::new(keyboard_hook, toggle_key, event_sender.clone())),
            mouse: Arc::new(MouseService::new(mouse_hook, event_sender.clone())),
            controller: Arc::new(ControllerService::new(gamepads, &config.controller, event_sender)),
        };

        let coordinator = ActuationCoordinator::new(backend, runtime.clone(), config.actuation.intensity_steps);

        Ok(Self {
            sources,
            coordinator,
            runtime,
            event_receiver,
            notification_sender,
            notification_receiver,
            running: Arc::new(AtomicBool::new(false)),
            dispatcher: None,
            device_events: None,
        })
    }

    /// Start dispatching and all three sources.
    ///
    /// A source that cannot start is reported here; the rest keep running.
    pub fn start(&mut self) -> Result<(), SourceError> {
        if !self.running.swap(true, Ordering::SeqCst) {
            info!("Starting haptic manager...");
            self.start_dispatcher()?;
            self.start_device_events();
        }

        self.sources.start_all()?;
        info!("✓ Manager started");
        Ok(())
    }

    /// Stop dispatching and all sources. Hold sessions and pending timed
    /// stops are left to the coordinator.
    ///
    /// The dispatcher is joined before the sources stop, so a toggle request
    /// already in flight cannot start them again.
    pub fn stop(&mut self) {
        let was_running = self.running.swap(false, Ordering::SeqCst);
        if was_running {
            info!("Stopping haptic manager...");
            if let Some(token) = self.device_events.take() {
                token.cancel();
            }
            if let Some(dispatcher) = self.dispatcher.take() {
                if dispatcher.join().is_err() {
                    warn!("Dispatch thread panicked");
                }
            }
        }

        self.sources.stop_all();

        // Finish what the sources delivered so no release is lost
        for event in self.event_receiver.try_iter() {
            dispatch(&self.coordinator, &self.notification_sender, event);
        }
    }

    /// Stop everything and silence every device.
    pub async fn shutdown(&mut self) {
        self.stop();
        self.coordinator.shutdown().await;
        info!("Haptic manager shut down");
    }

    /// Check if the manager is running
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn start_dispatcher(&mut self) -> Result<(), SourceError> {
        let receiver = self.event_receiver.clone();
        let sources = self.sources.clone();
        let coordinator = self.coordinator.clone();
        let notifications = self.notification_sender.clone();
        let running = Arc::clone(&self.running);

        let handle = thread::Builder::new()
            .name("dispatcher".to_string())
            .spawn(move || {
                info!("Dispatch thread started");

                while running.load(Ordering::SeqCst) {
                    match receiver.recv_timeout(Duration::from_millis(16)) {
                        Ok(BindingEvent::ToggleRequested) => {
                            let active = sources.toggle();
                            notify(&notifications, Notification::SourcesToggled { active });
                        }
                        Ok(event) => dispatch(&coordinator, &notifications, event),
                        Err(RecvTimeoutError::Timeout) => continue,
                        Err(RecvTimeoutError::Disconnected) => {
                            warn!("Event channel disconnected");
                            break;
                        }
                    }
                }

                info!("Dispatch thread stopped");
            })
            .map_err(|e| {
                self.running.store(false, Ordering::SeqCst);
                SourceError::Unavailable(format!("dispatch thread: {e}"))
            })?;

        self.dispatcher = Some(handle);
        Ok(())
    }

    fn start_device_events(&mut self) {
        let token = CancellationToken::new();
        let cancelled = token.clone();
        let coordinator = self.coordinator.clone();
        let mut events = coordinator.backend().subscribe();

        self.runtime.spawn(async move {
            loop {
                tokio::select! {
                    _ = cancelled.cancelled() => break,
                    received = events.recv() => match received {
                        Ok(event) => coordinator.on_device_event(&event),
                        Err(RecvError::Lagged(missed)) => warn!("Missed {} device events", missed),
                        Err(RecvError::Closed) => break,
                    },
                }
            }
            debug!("Device event forwarding stopped");
        });

        self.device_events = Some(token);
    }

    /// If any source is active stop them all, otherwise start them all.
    /// Returns whether sources are active afterwards. Does nothing while the
    /// manager is stopped.
    pub fn toggle_sources(&self) -> bool {
        if !self.is_running() {
            warn!("Toggle ignored: manager is not running");
            return false;
        }
        let active = self.sources.toggle();
        notify(&self.notification_sender, Notification::SourcesToggled { active });
        active
    }

    /// Stop every device and drop all hold sessions.
    pub fn stop_all(&self) {
        self.coordinator.stop_all();
    }

    /// Triggered/Released notifications. When nobody reads them the oldest
    /// stay queued and new ones are dropped.
    pub fn notifications(&self) -> &Receiver<Notification> {
        &self.notification_receiver
    }

    /// Replace every binding with the profile's.
    ///
    /// The profile is checked in full first; on error the current bindings
    /// are left untouched.
    pub fn load_profile(&self, profile: &ProfileData) -> Result<(), BindingError> {
        profile.validate_unique()?;
        let bindings = profile.bindings()?;

        self.sources.clear_bindings();
        let count = bindings.len();
        for binding in bindings {
            self.sources.add_binding(binding)?;
        }
        info!("Loaded profile '{}' ({} bindings)", profile.name, count);
        Ok(())
    }

    /// Current bindings of every source as a profile
    pub fn snapshot_profile(&self, name: &str) -> ProfileData {
        let mut bindings = self.sources.keyboard.list_bindings();
        bindings.extend(self.sources.mouse.list_bindings());
        bindings.extend(self.sources.controller.list_bindings());
        bindings.sort_by_key(|binding| binding.input.to_token());

        ProfileData::from_bindings(name, bindings.iter().map(Arc::as_ref))
    }

    pub fn keyboard(&self) -> &KeyboardService {
        &self.sources.keyboard
    }

    pub fn mouse(&self) -> &MouseService {
        &self.sources.mouse
    }

    pub fn controller(&self) -> &ControllerService {
        &self.sources.controller
    }

    pub fn coordinator(&self) -> &ActuationCoordinator {
        &self.coordinator
    }
}

impl Drop for HapticManager {
    fn drop(&mut self) {
        if self.running.load(Ordering::SeqCst) {
            info!("Shutting down haptic manager (Drop trait)...");
        }
        self.stop();
    }
}
