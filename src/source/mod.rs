//! Input sources
//!
//! Each source service owns its binding registry and an edge detector, and
//! turns raw hardware state into [`BindingEvent`]s. Keyboard and mouse are
//! push-model and read from an injected [`InputHook`]; controllers are polled.

pub mod controller;
pub mod gamepad;
pub mod keyboard;
pub mod mouse;

pub use controller::ControllerService;
pub use gamepad::{capture_input, GamepadSnapshot, GamepadSource, SimulatedGamepads};
#[cfg(windows)]
pub use gamepad::XInputGamepads;
pub use keyboard::{KeyboardService, RawKeyEvent};
pub use mouse::{MouseButton, MouseService, RawMouseEvent};

use crate::input::InputSource;
use crate::mapping::Binding;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use log::{debug, trace};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Input source unavailable: {0}")]
    Unavailable(String),
}

/// What a source reports for a bound input
#[derive(Debug, Clone)]
pub enum BindingEvent {
    Triggered { source: InputSource, binding: Arc<Binding> },
    Released { source: InputSource, binding: Arc<Binding> },
    /// The reserved toggle key went down
    ToggleRequested,
}

/// Where a source delivers its events
pub type EventSink = Sender<BindingEvent>;

/// Process-wide raw input hook owned by one source service.
///
/// `start` begins delivering raw events to `deliver` from the hook's own
/// thread; `stop` halts delivery. Both must tolerate being called twice.
pub trait InputHook<E>: Send {
    fn start(&mut self, deliver: Box<dyn FnMut(E) + Send>) -> Result<(), SourceError>;

    fn stop(&mut self);
}

/// Hook fed from a channel, for tests, demos and console drivers
pub struct ChannelHook<E> {
    name: String,
    receiver: Receiver<E>,
    running: Option<Arc<AtomicBool>>,
    thread: Option<JoinHandle<()>>,
}

impl<E: Send + 'static> ChannelHook<E> {
    /// Create a hook and the sender that feeds it.
    pub fn new(name: impl Into<String>) -> (Sender<E>, Self) {
        let (sender, receiver) = crossbeam_channel::unbounded();
        (sender, Self::from_receiver(name, receiver))
    }

    pub fn from_receiver(name: impl Into<String>, receiver: Receiver<E>) -> Self {
        Self {
            name: name.into(),
            receiver,
            running: None,
            thread: None,
        }
    }
}

impl<E: Send + 'static> InputHook<E> for ChannelHook<E> {
    fn start(&mut self, mut deliver: Box<dyn FnMut(E) + Send>) -> Result<(), SourceError> {
        if self.thread.is_some() {
            return Ok(());
        }

        let running = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&running);
        let receiver = self.receiver.clone();
        let name = self.name.clone();

        let thread = thread::Builder::new()
            .name(self.name.clone())
            .spawn(move || {
                debug!("{} hook started", name);
                while flag.load(Ordering::SeqCst) {
                    match receiver.recv_timeout(Duration::from_millis(16)) {
                        Ok(event) => deliver(event),
                        Err(RecvTimeoutError::Timeout) => continue,
                        Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                debug!("{} hook exited", name);
            })
            .map_err(|e| SourceError::Unavailable(format!("{} hook thread: {}", self.name, e)))?;

        self.running = Some(running);
        self.thread = Some(thread);
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(running) = self.running.take() {
            running.store(false, Ordering::SeqCst);
        }
        if let Some(thread) = self.thread.take() {
            if thread.thread().id() == thread::current().id() {
                trace!("{} hook stopped from its own thread", self.name);
            } else if thread.join().is_err() {
                debug!("{} hook thread panicked", self.name);
            }
        }
    }
}

impl<E> Drop for ChannelHook<E> {
    fn drop(&mut self) {
        if let Some(running) = self.running.take() {
            running.store(false, Ordering::SeqCst);
        }
    }
}

pub(crate) fn emit(sink: &EventSink, event: BindingEvent) {
    if sink.send(event).is_err() {
        trace!("Event dispatcher is gone, event dropped");
    }
}
