//! Mouse source
//!
//! Buttons use the same up/down machine as keys. Wheel ticks have no
//! physical release, so a bound wheel direction emits Triggered immediately
//! followed by Released. A held button releases the binding it triggered,
//! whatever the registry holds by then.

use super::{emit, BindingEvent, EventSink, InputHook, SourceError};
use crate::input::{InputIdentity, InputSource, MouseInputKind};
use crate::mapping::{Binding, BindingError, BindingRegistry};
use log::{debug, info, trace};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
    X1,
    X2,
}

impl From<MouseButton> for MouseInputKind {
    fn from(button: MouseButton) -> Self {
        match button {
            MouseButton::Left => MouseInputKind::LeftClick,
            MouseButton::Right => MouseInputKind::RightClick,
            MouseButton::Middle => MouseInputKind::MiddleClick,
            MouseButton::X1 => MouseInputKind::SideButton1,
            MouseButton::X2 => MouseInputKind::SideButton2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawMouseEvent {
    ButtonDown(MouseButton),
    ButtonUp(MouseButton),
    /// Positive is away from the user
    Wheel { delta: i32 },
}

struct MouseInner {
    registry: BindingRegistry,
    pressed: Mutex<HashMap<MouseInputKind, Option<Arc<Binding>>>>,
    active: AtomicBool,
    sink: EventSink,
}

impl MouseInner {
    fn pressed(&self) -> MutexGuard<'_, HashMap<MouseInputKind, Option<Arc<Binding>>>> {
        self.pressed.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lookup(&self, kind: MouseInputKind) -> Option<Arc<Binding>> {
        self.registry.lookup(&InputIdentity::Mouse(kind))
    }

    fn handle_raw(&self, event: RawMouseEvent) {
        if !self.active.load(Ordering::SeqCst) {
            return;
        }

        match event {
            RawMouseEvent::ButtonDown(button) => {
                let kind = MouseInputKind::from(button);
                let mut pressed = self.pressed();
                if pressed.contains_key(&kind) {
                    return;
                }
                let binding = self.lookup(kind);
                pressed.insert(kind, binding.clone());
                if let Some(binding) = binding {
                    debug!("Mouse {:?} pressed → {}", button, binding.description());
                    emit(&self.sink, BindingEvent::Triggered { source: InputSource::Mouse, binding });
                }
            }
            RawMouseEvent::ButtonUp(button) => {
                let kind = MouseInputKind::from(button);
                let mut pressed = self.pressed();
                if let Some(Some(binding)) = pressed.remove(&kind) {
                    debug!("Mouse {:?} released", button);
                    emit(&self.sink, BindingEvent::Released { source: InputSource::Mouse, binding });
                }
            }
            RawMouseEvent::Wheel { delta } => {
                let kind = match delta {
                    0 => {
                        trace!("Zero wheel delta ignored");
                        return;
                    }
                    d if d > 0 => MouseInputKind::WheelUp,
                    _ => MouseInputKind::WheelDown,
                };
                if let Some(binding) = self.lookup(kind) {
                    debug!("Mouse {:?} → {}", kind, binding.description());
                    emit(
                        &self.sink,
                        BindingEvent::Triggered { source: InputSource::Mouse, binding: Arc::clone(&binding) },
                    );
                    emit(&self.sink, BindingEvent::Released { source: InputSource::Mouse, binding });
                }
            }
        }
    }
}

/// Mouse bindings and the mouse hook that drives them
pub struct MouseService {
    inner: Arc<MouseInner>,
    hook: Mutex<Box<dyn InputHook<RawMouseEvent>>>,
}

impl MouseService {
    pub fn new(hook: Box<dyn InputHook<RawMouseEvent>>, sink: EventSink) -> Self {
        Self {
            inner: Arc::new(MouseInner {
                registry: BindingRegistry::new(InputSource::Mouse),
                pressed: Mutex::new(HashMap::new()),
                active: AtomicBool::new(false),
                sink,
            }),
            hook: Mutex::new(hook),
        }
    }

    fn hook(&self) -> MutexGuard<'_, Box<dyn InputHook<RawMouseEvent>>> {
        self.hook.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn start(&self) -> Result<(), SourceError> {
        let mut hook = self.hook();
        if self.inner.active.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let inner = Arc::clone(&self.inner);
        if let Err(e) = hook.start(Box::new(move |event| inner.handle_raw(event))) {
            self.inner.active.store(false, Ordering::SeqCst);
            return Err(e);
        }

        info!("Mouse source started ({} bindings)", self.inner.registry.len());
        Ok(())
    }

    pub fn stop(&self) {
        let mut hook = self.hook();
        if !self.inner.active.swap(false, Ordering::SeqCst) {
            return;
        }

        hook.stop();
        self.inner.pressed().clear();
        info!("Mouse source stopped");
    }

    pub fn is_active(&self) -> bool {
        self.inner.active.load(Ordering::SeqCst)
    }

    pub fn handle_raw(&self, event: RawMouseEvent) {
        self.inner.handle_raw(event);
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

impl Drop for MouseService {
    fn drop(&mut self) {
        self.stop();
    }
}
