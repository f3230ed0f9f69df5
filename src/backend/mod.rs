//! Device actuation interface
//!
//! The transport that reaches the physical haptic devices is an external
//! collaborator. This module fixes its interface: named devices, an async
//! "set vibration intensity" / "stop" primitive per device, and a stream of
//! device-list and connection changes.

pub mod mock_device;

pub use mock_device::{DeviceCall, MockDeviceBackend};

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::broadcast;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("Not connected to the device server")]
    NotConnected,

    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Device command failed: {0}")]
    CommandFailed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Connected,
    Disconnected,
}

/// Changes reported by the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceEvent {
    DeviceAdded(String),
    DeviceRemoved(String),
    ConnectionChanged(ConnectionStatus),
}

/// Unified backend interface for haptic devices
#[async_trait]
pub trait DeviceBackend: Send + Sync {
    async fn connect(&self) -> Result<(), BackendError>;

    async fn disconnect(&self) -> Result<(), BackendError>;

    /// Names of the devices currently reachable
    fn list_devices(&self) -> Vec<String>;

    /// Set vibration intensity in [0, 1] on one device
    async fn set_intensity(&self, device: &str, intensity: f64) -> Result<(), BackendError>;

    /// Stop one device
    async fn stop(&self, device: &str) -> Result<(), BackendError>;

    /// Stop every device the transport knows about
    async fn stop_all(&self) -> Result<(), BackendError>;

    /// Subscribe to device list and connection changes
    fn subscribe(&self) -> broadcast::Receiver<DeviceEvent>;
}
