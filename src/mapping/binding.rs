//! Bindings: which devices to actuate, how hard, and for how long
//!
//! A [`Binding`] ties one [`InputIdentity`] to an ordered list of
//! [`DeviceAction`]s. The serializable [`BindingData`] / [`ProfileData`]
//! types mirror the shape profiles are stored in.

use crate::input::{InputIdentity, InputSource};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BindingError {
    #[error("Invalid input identity: {0}")]
    InvalidIdentity(String),

    #[error("Intensity {intensity} for device '{device}' must be between 0.0 and 1.0")]
    InvalidIntensity { device: String, intensity: f64 },

    #[error("{input} belongs to the {actual} source, not {expected}")]
    WrongSource {
        input: String,
        expected: InputSource,
        actual: InputSource,
    },

    #[error("A binding for '{0}' already exists")]
    DuplicateBindingRejected(String),

    #[error("Failed to parse profile data: {0}")]
    Json(#[from] serde_json::Error),
}

/// Temporal mode of a device action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActuationMode {
    /// Self-stops after `duration_ms`
    Timed,
    /// Runs until the triggering input is released
    Hold,
}

/// One device's target within a binding
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceAction {
    pub device_name: String,
    /// 0.0 to 1.0
    pub intensity: f64,
    /// Ignored for [`ActuationMode::Hold`]; 0 means no auto-stop
    pub duration_ms: u64,
    pub mode: ActuationMode,
}

impl DeviceAction {
    pub fn timed(device_name: impl Into<String>, intensity: f64, duration_ms: u64) -> Self {
        Self {
            device_name: device_name.into(),
            intensity,
            duration_ms,
            mode: ActuationMode::Timed,
        }
    }

    pub fn hold(device_name: impl Into<String>, intensity: f64) -> Self {
        Self {
            device_name: device_name.into(),
            intensity,
            duration_ms: 0,
            mode: ActuationMode::Hold,
        }
    }

    pub fn is_hold(&self) -> bool {
        self.mode == ActuationMode::Hold
    }

    pub fn validate(&self) -> Result<(), BindingError> {
        if !(0.0..=1.0).contains(&self.intensity) {
            return Err(BindingError::InvalidIntensity {
                device: self.device_name.clone(),
                intensity: self.intensity,
            });
        }
        Ok(())
    }
}

impl fmt::Display for DeviceAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.mode {
            ActuationMode::Hold => write!(f, "{} ({}, Hold Mode)", self.device_name, percent(self.intensity)),
            ActuationMode::Timed => write!(
                f,
                "{} ({}, {}ms)",
                self.device_name,
                percent(self.intensity),
                self.duration_ms
            ),
        }
    }
}

fn percent(intensity: f64) -> String {
    format!("{:.0}%", intensity * 100.0)
}

/// An input and the device actions it fires.
#[derive(Debug, Clone, PartialEq)]
pub struct Binding {
    pub input: InputIdentity,
    pub actions: Vec<DeviceAction>,
    description: String,
}

impl Binding {
    pub fn new(input: InputIdentity, actions: Vec<DeviceAction>) -> Self {
        let description = describe(&input, &actions);
        Self {
            input,
            actions,
            description,
        }
    }

    /// Display string derived from the input and its actions.
    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn has_hold_actions(&self) -> bool {
        self.actions.iter().any(DeviceAction::is_hold)
    }

    /// Check the identity is producible and every intensity is in range.
    pub fn validate(&self) -> Result<(), BindingError> {
        if !self.input.is_valid() {
            return Err(BindingError::InvalidIdentity(self.input.to_token()));
        }
        self.actions.iter().try_for_each(DeviceAction::validate)
    }

    pub fn to_data(&self) -> BindingData {
        BindingData {
            input: self.input.to_token(),
            description: self.description.clone(),
            device_bindings: self.actions.iter().map(DeviceActionData::from).collect(),
        }
    }

    /// Rebuild a binding from its persisted form. The stored description is
    /// discarded and re-derived.
    pub fn from_data(data: &BindingData) -> Result<Self, BindingError> {
        let input: InputIdentity = data
            .input
            .parse()
            .map_err(BindingError::InvalidIdentity)?;
        let actions = data.device_bindings.iter().map(DeviceAction::from).collect();
        let binding = Binding::new(input, actions);
        binding.validate()?;
        Ok(binding)
    }
}

impl fmt::Display for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.description)
    }
}

fn describe(input: &InputIdentity, actions: &[DeviceAction]) -> String {
    match actions {
        [] => format!("{input} → No devices"),
        [single] => format!("{input} → {single}"),
        _ => {
            let hold = actions.iter().filter(|a| a.is_hold()).count();
            let timed = actions.len() - hold;
            let mode = match (hold, timed) {
                (0, _) => "Timed".to_string(),
                (_, 0) => "Hold Mode".to_string(),
                (h, t) => format!("Mixed: {h} hold, {t} timed"),
            };
            format!("{input} → {} devices ({mode})", actions.len())
        }
    }
}

/// Persisted form of a device action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceActionData {
    pub device_name: String,
    pub intensity: f64,
    #[serde(default)]
    pub duration_ms: u64,
    #[serde(default)]
    pub is_hold_mode: bool,
}

impl From<&DeviceAction> for DeviceActionData {
    fn from(action: &DeviceAction) -> Self {
        Self {
            device_name: action.device_name.clone(),
            intensity: action.intensity,
            duration_ms: action.duration_ms,
            is_hold_mode: action.is_hold(),
        }
    }
}

impl From<&DeviceActionData> for DeviceAction {
    fn from(data: &DeviceActionData) -> Self {
        Self {
            device_name: data.device_name.clone(),
            intensity: data.intensity,
            duration_ms: data.duration_ms,
            mode: if data.is_hold_mode {
                ActuationMode::Hold
            } else {
                ActuationMode::Timed
            },
        }
    }
}

/// Persisted form of a binding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BindingData {
    /// Identity token, e.g. `controller:0:ButtonA`
    pub input: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub device_bindings: Vec<DeviceActionData>,
}

/// Persisted bindings for all three sources
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileData {
    pub name: String,
    #[serde(default)]
    pub key_bindings: Vec<BindingData>,
    #[serde(default)]
    pub mouse_bindings: Vec<BindingData>,
    #[serde(default)]
    pub controller_bindings: Vec<BindingData>,
}

impl ProfileData {
    pub fn from_json(json: &str) -> Result<Self, BindingError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String, BindingError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse every binding in the profile, checking that each list only holds
    /// identities of its own source.
    pub fn bindings(&self) -> Result<Vec<Binding>, BindingError> {
        let lists = [
            (InputSource::Keyboard, &self.key_bindings),
            (InputSource::Mouse, &self.mouse_bindings),
            (InputSource::Controller, &self.controller_bindings),
        ];

        let mut bindings = Vec::new();
        for (expected, list) in lists {
            for data in list {
                let binding = Binding::from_data(data)?;
                let actual = binding.input.source();
                if actual != expected {
                    return Err(BindingError::WrongSource {
                        input: binding.input.to_token(),
                        expected,
                        actual,
                    });
                }
                bindings.push(binding);
            }
        }
        Ok(bindings)
    }

    /// Reject profiles that bind the same input twice.
    pub fn validate_unique(&self) -> Result<(), BindingError> {
        let mut seen = HashSet::new();
        for binding in self.bindings()? {
            if !seen.insert(binding.input) {
                return Err(BindingError::DuplicateBindingRejected(binding.input.to_string()));
            }
        }
        Ok(())
    }

    /// Build a profile from bindings of any source.
    pub fn from_bindings<'a>(name: impl Into<String>, bindings: impl IntoIterator<Item = &'a Binding>) -> Self {
        let mut profile = ProfileData {
            name: name.into(),
            ..ProfileData::default()
        };
        for binding in bindings {
            let list = match binding.input.source() {
                InputSource::Keyboard => &mut profile.key_bindings,
                InputSource::Mouse => &mut profile.mouse_bindings,
                InputSource::Controller => &mut profile.controller_bindings,
            };
            list.push(binding.to_data());
        }
        profile
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::{ControllerInputKind, KeyCode, MouseInputKind};

    #[test]
    fn description_single_timed() {
        let binding = Binding::new(
            InputIdentity::Key(KeyCode::SPACE),
            vec![DeviceAction::timed("Vibro1", 0.5, 1000)],
        );
        assert_eq!(binding.description(), "Space → Vibro1 (50%, 1000ms)");
    }

    #[test]
    fn description_single_hold() {
        let binding = Binding::new(
            InputIdentity::Mouse(MouseInputKind::LeftClick),
            vec![DeviceAction::hold("Vibro1", 0.25)],
        );
        assert_eq!(binding.description(), "Left Click → Vibro1 (25%, Hold Mode)");
    }

    #[test]
    fn description_multiple_devices() {
        let input = InputIdentity::controller(0, ControllerInputKind::ButtonA);

        let mixed = Binding::new(
            input,
            vec![
                DeviceAction::hold("A", 0.5),
                DeviceAction::timed("B", 0.5, 200),
                DeviceAction::timed("C", 0.5, 200),
            ],
        );
        assert_eq!(
            mixed.description(),
            "Controller 1 - A Button → 3 devices (Mixed: 1 hold, 2 timed)"
        );

        let timed = Binding::new(
            input,
            vec![DeviceAction::timed("A", 0.5, 100), DeviceAction::timed("B", 0.5, 100)],
        );
        assert_eq!(timed.description(), "Controller 1 - A Button → 2 devices (Timed)");

        let empty = Binding::new(input, vec![]);
        assert_eq!(empty.description(), "Controller 1 - A Button → No devices");
    }

    #[test]
    fn validate_rejects_out_of_range_intensity() {
        let binding = Binding::new(
            InputIdentity::Key(KeyCode::F1),
            vec![DeviceAction::timed("Vibro1", 1.5, 100)],
        );
        assert!(matches!(binding.validate(), Err(BindingError::InvalidIntensity { .. })));
    }

    #[test]
    fn profile_json_shape() {
        let json = r#"{
            "name": "Default",
            "controllerBindings": [
                {
                    "input": "controller:0:ButtonA",
                    "description": "stale text",
                    "deviceBindings": [
                        { "deviceName": "Vibro1", "intensity": 0.5, "durationMs": 500, "isHoldMode": false }
                    ]
                }
            ]
        }"#;

        let profile = ProfileData::from_json(json).unwrap();
        let bindings = profile.bindings().unwrap();
        assert_eq!(bindings.len(), 1);
        assert_eq!(bindings[0].actions, vec![DeviceAction::timed("Vibro1", 0.5, 500)]);
        assert_eq!(bindings[0].description(), "Controller 1 - A Button → Vibro1 (50%, 500ms)");
    }

    #[test]
    fn profile_rejects_identity_in_wrong_list() {
        let profile = ProfileData {
            name: "bad".into(),
            key_bindings: vec![BindingData {
                input: "mouse:LeftClick".into(),
                description: String::new(),
                device_bindings: vec![],
            }],
            ..ProfileData::default()
        };
        assert!(matches!(profile.bindings(), Err(BindingError::WrongSource { .. })));
    }

    #[test]
    fn profile_duplicate_detection() {
        let binding = Binding::new(InputIdentity::Key(KeyCode::F1), vec![DeviceAction::hold("A", 0.5)]);
        let profile = ProfileData::from_bindings("dup", [&binding, &binding]);
        assert!(matches!(
            profile.validate_unique(),
            Err(BindingError::DuplicateBindingRejected(_))
        ));

        let single = ProfileData::from_bindings("ok", [&binding]);
        assert!(single.validate_unique().is_ok());
    }
}
