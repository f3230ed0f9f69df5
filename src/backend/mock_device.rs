//! Mock device backend for testing.
//!
//! This backend logs device commands instead of sending them to real
//! hardware, and records each successful command with the (tokio) time it
//! ran so tests can check ordering and timing.

use super::{BackendError, ConnectionStatus, DeviceBackend, DeviceEvent};
use async_trait::async_trait;
use log::info;
use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::broadcast;
use tokio::time::Instant;

/// A command the mock accepted
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceCall {
    SetIntensity { device: String, intensity: f64, at: Instant },
    Stop { device: String, at: Instant },
    StopAll { at: Instant },
}

impl DeviceCall {
    pub fn device(&self) -> Option<&str> {
        match self {
            DeviceCall::SetIntensity { device, .. } | DeviceCall::Stop { device, .. } => Some(device),
            DeviceCall::StopAll { .. } => None,
        }
    }

    pub fn at(&self) -> Instant {
        match self {
            DeviceCall::SetIntensity { at, .. } | DeviceCall::Stop { at, .. } | DeviceCall::StopAll { at } => *at,
        }
    }
}

#[derive(Debug)]
struct MockState {
    connected: bool,
    /// Known devices. Empty means "accept any name".
    devices: Vec<String>,
    removed: HashSet<String>,
    failing: HashSet<String>,
    calls: Vec<DeviceCall>,
    rejected: usize,
}

/// Mock backend that logs commands instead of actuating devices.
#[derive(Debug)]
pub struct MockDeviceBackend {
    state: Mutex<MockState>,
    events: broadcast::Sender<DeviceEvent>,
}

impl MockDeviceBackend {
    /// Create a connected mock that accepts any device name.
    pub fn new() -> Self {
        Self::with_devices(Vec::<String>::new())
    }

    /// Create a connected mock with a fixed device list.
    pub fn with_devices<I, S>(devices: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let (events, _) = broadcast::channel(64);
        Self {
            state: Mutex::new(MockState {
                connected: true,
                devices: devices.into_iter().map(Into::into).collect(),
                removed: HashSet::new(),
                failing: HashSet::new(),
                calls: Vec::new(),
                rejected: 0,
            }),
            events,
        }
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make every command to `device` fail with `CommandFailed`.
    pub fn fail_device(&self, device: &str) {
        self.state().failing.insert(device.to_string());
    }

    /// Simulate a device dropping off the network.
    pub fn remove_device(&self, device: &str) {
        {
            let mut state = self.state();
            state.devices.retain(|d| d != device);
            state.removed.insert(device.to_string());
        }
        info!("[MOCK DEVICE] Removed: {}", device);
        let _ = self.events.send(DeviceEvent::DeviceRemoved(device.to_string()));
    }

    /// Simulate a device (re)appearing.
    pub fn add_device(&self, device: &str) {
        {
            let mut state = self.state();
            state.removed.remove(device);
            if !state.devices.iter().any(|d| d == device) {
                state.devices.push(device.to_string());
            }
        }
        info!("[MOCK DEVICE] Added: {}", device);
        let _ = self.events.send(DeviceEvent::DeviceAdded(device.to_string()));
    }

    /// Every command accepted so far, in execution order.
    pub fn calls(&self) -> Vec<DeviceCall> {
        self.state().calls.clone()
    }

    /// Accepted commands addressed to one device.
    pub fn calls_for(&self, device: &str) -> Vec<DeviceCall> {
        self.state()
            .calls
            .iter()
            .filter(|call| call.device() == Some(device))
            .cloned()
            .collect()
    }

    /// Commands refused so far
    pub fn rejected(&self) -> usize {
        self.state().rejected
    }

    pub fn clear_calls(&self) {
        self.state().calls.clear();
    }

    pub fn is_connected(&self) -> bool {
        self.state().connected
    }

    fn check(state: &mut MockState, device: &str) -> Result<(), BackendError> {
        let result = Self::accepts(state, device);
        if result.is_err() {
            state.rejected += 1;
        }
        result
    }

    fn accepts(state: &MockState, device: &str) -> Result<(), BackendError> {
        if !state.connected {
            return Err(BackendError::NotConnected);
        }
        if state.removed.contains(device) {
            return Err(BackendError::DeviceNotFound(device.to_string()));
        }
        if state.failing.contains(device) {
            return Err(BackendError::CommandFailed(format!("{device} rejected the command")));
        }
        Ok(())
    }
}

impl Default for MockDeviceBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DeviceBackend for MockDeviceBackend {
    async fn connect(&self) -> Result<(), BackendError> {
        self.state().connected = true;
        info!("[MOCK DEVICE] Connected");
        let _ = self.events.send(DeviceEvent::ConnectionChanged(ConnectionStatus::Connected));
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), BackendError> {
        self.state().connected = false;
        info!("[MOCK DEVICE] Disconnected");
        let _ = self.events.send(DeviceEvent::ConnectionChanged(ConnectionStatus::Disconnected));
        Ok(())
    }

    fn list_devices(&self) -> Vec<String> {
        let state = self.state();
        if state.connected {
            state.devices.clone()
        } else {
            Vec::new()
        }
    }

    async fn set_intensity(&self, device: &str, intensity: f64) -> Result<(), BackendError> {
        let mut state = self.state();
        Self::check(&mut state, device)?;
        info!("[MOCK DEVICE] {} intensity {:.2}", device, intensity);
        state.calls.push(DeviceCall::SetIntensity {
            device: device.to_string(),
            intensity,
            at: Instant::now(),
        });
        Ok(())
    }

    async fn stop(&self, device: &str) -> Result<(), BackendError> {
        let mut state = self.state();
        Self::check(&mut state, device)?;
        info!("[MOCK DEVICE] {} STOP", device);
        state.calls.push(DeviceCall::Stop {
            device: device.to_string(),
            at: Instant::now(),
        });
        Ok(())
    }

    async fn stop_all(&self) -> Result<(), BackendError> {
        let mut state = self.state();
        if !state.connected {
            return Err(BackendError::NotConnected);
        }
        info!("[MOCK DEVICE] STOP ALL");
        state.calls.push(DeviceCall::StopAll { at: Instant::now() });
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<DeviceEvent> {
        self.events.subscribe()
    }
}
