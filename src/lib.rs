//! haptic-bind: input bindings to networked haptic devices
//!
//! Keyboard, mouse and controller inputs are edge-detected, looked up in
//! per-source binding registries, and turned into timed or held vibration
//! commands on named devices.

pub mod actuation;
pub mod backend;
pub mod input;
pub mod manager;
pub mod mapping;
pub mod source;

// Re-export commonly used items
pub use actuation::ActuationCoordinator;
pub use backend::{DeviceBackend, MockDeviceBackend};
pub use input::{ControllerInputKind, InputIdentity, KeyCode, MouseInputKind};
pub use manager::{HapticManager, Notification};
pub use mapping::{Binding, Config, DeviceAction, ProfileData};
pub use source::{ChannelHook, GamepadSnapshot, SimulatedGamepads};
