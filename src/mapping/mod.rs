//! Mapping module - bindings, their registries, and engine configuration

pub mod binding;
pub mod config;
pub mod registry;

pub use binding::{
    ActuationMode, Binding, BindingData, BindingError, DeviceAction, DeviceActionData, ProfileData,
};
pub use config::{AxisThresholds, Config, ConfigError};
pub use registry::BindingRegistry;
