//! Keyboard source
//!
//! Edge-detects raw key events from a hook. Auto-repeat downs are swallowed
//! by the pressed set, and spurious ups (a key that went down before the
//! source started) are ignored. The reserved toggle key never reaches the
//! registry.
//!
//! Each pressed key remembers the binding it triggered, if any. The release
//! carries that same binding, so rebinding a held key cannot redirect or
//! lose its stop.

use super::{emit, BindingEvent, EventSink, InputHook, SourceError};
use crate::input::{InputIdentity, InputSource, KeyCode};
use crate::mapping::{Binding, BindingError, BindingRegistry};
use log::{debug, info, warn};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawKeyEvent {
    Down(KeyCode),
    Up(KeyCode),
}

struct KeyboardInner {
    registry: BindingRegistry,
    toggle_key: KeyCode,
    pressed: Mutex<HashMap<KeyCode, Option<Arc<Binding>>>>,
    active: AtomicBool,
    sink: EventSink,
}

impl KeyboardInner {
    fn pressed(&self) -> MutexGuard<'_, HashMap<KeyCode, Option<Arc<Binding>>>> {
        self.pressed.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn handle_raw(&self, event: RawKeyEvent) {
        if !self.active.load(Ordering::SeqCst) {
            return;
        }

        match event {
            RawKeyEvent::Down(code) => {
                let mut pressed = self.pressed();
                if pressed.contains_key(&code) {
                    return;
                }
                if code == self.toggle_key {
                    pressed.insert(code, None);
                    info!("Toggle key {} pressed", code);
                    emit(&self.sink, BindingEvent::ToggleRequested);
                    return;
                }
                let binding = self.registry.lookup(&InputIdentity::Key(code));
                pressed.insert(code, binding.clone());
                if let Some(binding) = binding {
                    debug!("Key {} pressed → {}", code, binding.description());
                    emit(&self.sink, BindingEvent::Triggered { source: InputSource::Keyboard, binding });
                }
            }
            RawKeyEvent::Up(code) => {
                let mut pressed = self.pressed();
                if let Some(Some(binding)) = pressed.remove(&code) {
                    debug!("Key {} released", code);
                    emit(&self.sink, BindingEvent::Released { source: InputSource::Keyboard, binding });
                }
            }
        }
    }
}

/// Keyboard bindings and the key hook that drives them
pub struct KeyboardService {
    inner: Arc<KeyboardInner>,
    hook: Mutex<Box<dyn InputHook<RawKeyEvent>>>,
}

impl KeyboardService {
    pub fn new(hook: Box<dyn InputHook<RawKeyEvent>>, toggle_key: KeyCode, sink: EventSink) -> Self {
        Self {
            inner: Arc::new(KeyboardInner {
                registry: BindingRegistry::new(InputSource::Keyboard),
                toggle_key,
                pressed: Mutex::new(HashMap::new()),
                active: AtomicBool::new(false),
                sink,
            }),
            hook: Mutex::new(hook),
        }
    }

    fn hook(&self) -> MutexGuard<'_, Box<dyn InputHook<RawKeyEvent>>> {
        self.hook.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Install the hook and begin delivering events. Idempotent.
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

        info!("Keyboard source started ({} bindings)", self.inner.registry.len());
        Ok(())
    }

    /// Remove the hook and forget pressed keys. Idempotent.
    pub fn stop(&self) {
        let mut hook = self.hook();
        if !self.inner.active.swap(false, Ordering::SeqCst) {
            return;
        }

        hook.stop();
        self.inner.pressed().clear();
        info!("Keyboard source stopped");
    }

    pub fn is_active(&self) -> bool {
        self.inner.active.load(Ordering::SeqCst)
    }

    /// Feed one raw event, as the hook does.
    pub fn handle_raw(&self, event: RawKeyEvent) {
        self.inner.handle_raw(event);
    }

    pub fn toggle_key(&self) -> KeyCode {
        self.inner.toggle_key
    }

    pub fn is_pressed(&self, code: KeyCode) -> bool {
        self.inner.pressed().contains_key(&code)
    }

    pub fn add_binding(&self, binding: Binding) -> Result<Option<Arc<Binding>>, BindingError> {
        if binding.input == InputIdentity::Key(self.inner.toggle_key) {
            warn!("{} is the toggle key; its binding will never fire", self.inner.toggle_key);
        }
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

impl Drop for KeyboardService {
    fn drop(&mut self) {
        self.stop();
    }
}
