//! Configuration loader and validator
//!
//! Loads engine settings from TOML files in the configs/ directory. Bindings
//! themselves live in profiles (see [`crate::mapping::binding::ProfileData`]).

use crate::input::KeyCode;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings
    #[serde(default)]
    pub settings: Settings,

    /// Controller polling
    #[serde(default)]
    pub controller: ControllerSettings,

    /// Device command shaping
    #[serde(default)]
    pub actuation: ActuationSettings,
}

/// General settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Reserved key that toggles all sources on/off
    #[serde(default = "default_toggle_key")]
    pub toggle_key: String,

    /// Buffered Triggered/Released notifications before new ones are dropped
    #[serde(default = "default_notification_capacity")]
    pub notification_capacity: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            toggle_key: default_toggle_key(),
            notification_capacity: default_notification_capacity(),
        }
    }
}

fn default_toggle_key() -> String { "f8".to_string() }
fn default_notification_capacity() -> usize { 256 }

/// Thresholds that turn analog axes into pressed/released pseudo-buttons.
///
/// A trigger is down while its value is strictly above `trigger_threshold`;
/// a stick direction is down while the axis is strictly beyond
/// `±stick_threshold`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AxisThresholds {
    pub trigger_threshold: u8,
    pub stick_threshold: i16,
}

impl AxisThresholds {
    /// Background poller: about half travel
    pub const POLLING: AxisThresholds = AxisThresholds {
        trigger_threshold: 128,
        stick_threshold: 16384,
    };

    /// Interactive capture: a lighter touch is enough to pick an input
    pub const CAPTURE: AxisThresholds = AxisThresholds {
        trigger_threshold: 64,
        stick_threshold: 8192,
    };
}

/// Controller polling settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerSettings {
    /// Tick period of the poller (16 ms is ~60 Hz)
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    #[serde(default = "default_polling_thresholds")]
    pub polling: AxisThresholds,

    #[serde(default = "default_capture_thresholds")]
    pub capture: AxisThresholds,
}

impl ControllerSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            polling: AxisThresholds::POLLING,
            capture: AxisThresholds::CAPTURE,
        }
    }
}

fn default_poll_interval_ms() -> u64 { 16 }
fn default_polling_thresholds() -> AxisThresholds { AxisThresholds::POLLING }
fn default_capture_thresholds() -> AxisThresholds { AxisThresholds::CAPTURE }

/// Device command settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActuationSettings {
    /// Discrete intensity levels supported by the hardware
    #[serde(default = "default_intensity_steps")]
    pub intensity_steps: u32,
}

impl Default for ActuationSettings {
    fn default() -> Self {
        Self {
            intensity_steps: default_intensity_steps(),
        }
    }
}

fn default_intensity_steps() -> u32 { 20 }

impl Config {
    /// Load configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_ref = path.as_ref();
        info!("Loading configuration from: {}", path_ref.display());

        let content = std::fs::read_to_string(path_ref)?;
        let config = Self::from_toml(&content)?;

        info!("✓ Config validation passed");
        Ok(config)
    }

    /// Load default configuration from configs/default.toml
    pub fn load_default() -> Result<Self, ConfigError> {
        Self::load("configs/default.toml")
    }

    /// Parse and validate configuration text
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;

        debug!("  - Toggle key: '{}'", config.settings.toggle_key);
        debug!("  - Poll interval: {}ms", config.controller.poll_interval_ms);
        debug!("  - Intensity steps: {}", config.actuation.intensity_steps);

        config.validate()?;
        Ok(config)
    }

    /// The reserved toggle key as a key code
    pub fn toggle_key(&self) -> Result<KeyCode, ConfigError> {
        KeyCode::parse(&self.settings.toggle_key).ok_or_else(|| {
            ConfigError::Invalid(format!(
                "Invalid toggle_key '{}': not a known key name",
                self.settings.toggle_key
            ))
        })
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.toggle_key()?;

        if self.settings.notification_capacity == 0 {
            return Err(ConfigError::Invalid(
                "notification_capacity must be at least 1".into()
            ));
        }

        if !(1..=1000).contains(&self.controller.poll_interval_ms) {
            return Err(ConfigError::Invalid(
                "poll_interval_ms must be between 1 and 1000".into()
            ));
        }

        for (name, thresholds) in [
            ("controller.polling", &self.controller.polling),
            ("controller.capture", &self.controller.capture),
        ] {
            if thresholds.stick_threshold <= 0 {
                return Err(ConfigError::Invalid(format!(
                    "{name}.stick_threshold must be positive"
                )));
            }
        }

        if self.actuation.intensity_steps == 0 {
            return Err(ConfigError::Invalid(
                "intensity_steps must be at least 1".into()
            ));
        }

        Ok(())
    }
}
