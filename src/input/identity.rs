//! Input identity model
//!
//! An [`InputIdentity`] names one logical input: a key, a mouse button or wheel
//! direction, or a digital/analog input on one of up to four controllers.
//! Identities are plain values used as map keys and set members.

use crate::input::keys::KeyCode;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Number of controller slots polled by the controller source.
pub const MAX_CONTROLLERS: u8 = 4;

/// Which source service owns an identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputSource {
    Keyboard,
    Mouse,
    Controller,
}

impl fmt::Display for InputSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            InputSource::Keyboard => "keyboard",
            InputSource::Mouse => "mouse",
            InputSource::Controller => "controller",
        })
    }
}

/// Mouse inputs that can be bound
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MouseInputKind {
    LeftClick,
    RightClick,
    MiddleClick,
    WheelUp,
    WheelDown,
    SideButton1,
    SideButton2,
}

impl MouseInputKind {
    pub const ALL: [MouseInputKind; 7] = [
        MouseInputKind::LeftClick,
        MouseInputKind::RightClick,
        MouseInputKind::MiddleClick,
        MouseInputKind::WheelUp,
        MouseInputKind::WheelDown,
        MouseInputKind::SideButton1,
        MouseInputKind::SideButton2,
    ];

    /// Wheel directions have no physical release.
    pub fn is_wheel(self) -> bool {
        matches!(self, MouseInputKind::WheelUp | MouseInputKind::WheelDown)
    }

    /// Stable token used in persisted bindings.
    pub fn token(self) -> &'static str {
        match self {
            MouseInputKind::LeftClick => "LeftClick",
            MouseInputKind::RightClick => "RightClick",
            MouseInputKind::MiddleClick => "MiddleClick",
            MouseInputKind::WheelUp => "WheelUp",
            MouseInputKind::WheelDown => "WheelDown",
            MouseInputKind::SideButton1 => "SideButton1",
            MouseInputKind::SideButton2 => "SideButton2",
        }
    }

    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            // XButton1/XButton2 is how older profiles spell the side buttons
            "XButton1" => Some(MouseInputKind::SideButton1),
            "XButton2" => Some(MouseInputKind::SideButton2),
            _ => Self::ALL.into_iter().find(|kind| kind.token() == token),
        }
    }

    fn label(self) -> &'static str {
        match self {
            MouseInputKind::LeftClick => "Left Click",
            MouseInputKind::RightClick => "Right Click",
            MouseInputKind::MiddleClick => "Middle Click",
            MouseInputKind::WheelUp => "Wheel Up",
            MouseInputKind::WheelDown => "Wheel Down",
            MouseInputKind::SideButton1 => "Side Button 1",
            MouseInputKind::SideButton2 => "Side Button 2",
        }
    }
}

/// Controller inputs: digital buttons, triggers and stick directions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ControllerInputKind {
    // Digital buttons
    ButtonA,
    ButtonB,
    ButtonX,
    ButtonY,
    LeftBumper,
    RightBumper,
    Back,
    Start,
    Guide,
    LeftStickClick,
    RightStickClick,
    DPadUp,
    DPadDown,
    DPadLeft,
    DPadRight,

    // Analog triggers
    LeftTrigger,
    RightTrigger,

    // Stick directions
    LeftStickUp,
    LeftStickDown,
    LeftStickLeft,
    LeftStickRight,
    RightStickUp,
    RightStickDown,
    RightStickLeft,
    RightStickRight,
}

/// Analog axis a directional pseudo-button reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StickAxis {
    LeftX,
    LeftY,
    RightX,
    RightY,
}

/// How a controller input is derived from a raw gamepad snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerSignal {
    /// Bit in the digital button mask
    Button(u16),
    LeftTrigger,
    RightTrigger,
    /// Axis deflection; `positive` selects the direction
    Stick { axis: StickAxis, positive: bool },
}

impl ControllerInputKind {
    /// Every controller input in detection priority order
    /// (buttons, then triggers, then stick directions).
    pub const ALL: [ControllerInputKind; 25] = [
        ControllerInputKind::ButtonA,
        ControllerInputKind::ButtonB,
        ControllerInputKind::ButtonX,
        ControllerInputKind::ButtonY,
        ControllerInputKind::LeftBumper,
        ControllerInputKind::RightBumper,
        ControllerInputKind::Back,
        ControllerInputKind::Start,
        ControllerInputKind::Guide,
        ControllerInputKind::LeftStickClick,
        ControllerInputKind::RightStickClick,
        ControllerInputKind::DPadUp,
        ControllerInputKind::DPadDown,
        ControllerInputKind::DPadLeft,
        ControllerInputKind::DPadRight,
        ControllerInputKind::LeftTrigger,
        ControllerInputKind::RightTrigger,
        ControllerInputKind::LeftStickUp,
        ControllerInputKind::LeftStickDown,
        ControllerInputKind::LeftStickLeft,
        ControllerInputKind::LeftStickRight,
        ControllerInputKind::RightStickUp,
        ControllerInputKind::RightStickDown,
        ControllerInputKind::RightStickLeft,
        ControllerInputKind::RightStickRight,
    ];

    /// XInput-compatible button bits and axis bindings.
    pub fn signal(self) -> ControllerSignal {
        use ControllerInputKind::*;
        match self {
            DPadUp => ControllerSignal::Button(0x0001),
            DPadDown => ControllerSignal::Button(0x0002),
            DPadLeft => ControllerSignal::Button(0x0004),
            DPadRight => ControllerSignal::Button(0x0008),
            Start => ControllerSignal::Button(0x0010),
            Back => ControllerSignal::Button(0x0020),
            LeftStickClick => ControllerSignal::Button(0x0040),
            RightStickClick => ControllerSignal::Button(0x0080),
            LeftBumper => ControllerSignal::Button(0x0100),
            RightBumper => ControllerSignal::Button(0x0200),
            Guide => ControllerSignal::Button(0x0400),
            ButtonA => ControllerSignal::Button(0x1000),
            ButtonB => ControllerSignal::Button(0x2000),
            ButtonX => ControllerSignal::Button(0x4000),
            ButtonY => ControllerSignal::Button(0x8000),

            LeftTrigger => ControllerSignal::LeftTrigger,
            RightTrigger => ControllerSignal::RightTrigger,

            LeftStickUp => ControllerSignal::Stick { axis: StickAxis::LeftY, positive: true },
            LeftStickDown => ControllerSignal::Stick { axis: StickAxis::LeftY, positive: false },
            LeftStickLeft => ControllerSignal::Stick { axis: StickAxis::LeftX, positive: false },
            LeftStickRight => ControllerSignal::Stick { axis: StickAxis::LeftX, positive: true },
            RightStickUp => ControllerSignal::Stick { axis: StickAxis::RightY, positive: true },
            RightStickDown => ControllerSignal::Stick { axis: StickAxis::RightY, positive: false },
            RightStickLeft => ControllerSignal::Stick { axis: StickAxis::RightX, positive: false },
            RightStickRight => ControllerSignal::Stick { axis: StickAxis::RightX, positive: true },
        }
    }

    /// Stable token used in persisted bindings.
    pub fn token(self) -> &'static str {
        use ControllerInputKind::*;
        match self {
            ButtonA => "ButtonA",
            ButtonB => "ButtonB",
            ButtonX => "ButtonX",
            ButtonY => "ButtonY",
            LeftBumper => "LeftBumper",
            RightBumper => "RightBumper",
            Back => "Back",
            Start => "Start",
            Guide => "Guide",
            LeftStickClick => "LeftStickClick",
            RightStickClick => "RightStickClick",
            DPadUp => "DPadUp",
            DPadDown => "DPadDown",
            DPadLeft => "DPadLeft",
            DPadRight => "DPadRight",
            LeftTrigger => "LeftTrigger",
            RightTrigger => "RightTrigger",
            LeftStickUp => "LeftStickUp",
            LeftStickDown => "LeftStickDown",
            LeftStickLeft => "LeftStickLeft",
            LeftStickRight => "LeftStickRight",
            RightStickUp => "RightStickUp",
            RightStickDown => "RightStickDown",
            RightStickLeft => "RightStickLeft",
            RightStickRight => "RightStickRight",
        }
    }

    pub fn from_token(token: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.token() == token)
    }

    fn label(self) -> &'static str {
        use ControllerInputKind::*;
        match self {
            ButtonA => "A Button",
            ButtonB => "B Button",
            ButtonX => "X Button",
            ButtonY => "Y Button",
            LeftBumper => "Left Bumper",
            RightBumper => "Right Bumper",
            Back => "Back Button",
            Start => "Start Button",
            Guide => "Guide Button",
            LeftStickClick => "Left Stick Click",
            RightStickClick => "Right Stick Click",
            DPadUp => "D-Pad Up",
            DPadDown => "D-Pad Down",
            DPadLeft => "D-Pad Left",
            DPadRight => "D-Pad Right",
            LeftTrigger => "Left Trigger",
            RightTrigger => "Right Trigger",
            LeftStickUp => "Left Stick Up",
            LeftStickDown => "Left Stick Down",
            LeftStickLeft => "Left Stick Left",
            LeftStickRight => "Left Stick Right",
            RightStickUp => "Right Stick Up",
            RightStickDown => "Right Stick Down",
            RightStickLeft => "Right Stick Left",
            RightStickRight => "Right Stick Right",
        }
    }
}

/// One logical, bindable input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InputIdentity {
    Key(KeyCode),
    Mouse(MouseInputKind),
    Controller { index: u8, kind: ControllerInputKind },
}

impl InputIdentity {
    pub fn controller(index: u8, kind: ControllerInputKind) -> Self {
        InputIdentity::Controller { index, kind }
    }

    /// Controller slot, for controller identities.
    pub fn controller_index(&self) -> Option<u8> {
        match self {
            InputIdentity::Controller { index, .. } => Some(*index),
            _ => None,
        }
    }

    /// The source service that owns this identity.
    pub fn source(&self) -> InputSource {
        match self {
            InputIdentity::Key(_) => InputSource::Keyboard,
            InputIdentity::Mouse(_) => InputSource::Mouse,
            InputIdentity::Controller { .. } => InputSource::Controller,
        }
    }

    /// True for identities a source can actually produce.
    pub fn is_valid(&self) -> bool {
        match self {
            InputIdentity::Controller { index, .. } => *index < MAX_CONTROLLERS,
            _ => true,
        }
    }

    /// Wheel identities are pressed and released in the same instant.
    pub fn is_wheel(&self) -> bool {
        matches!(self, InputIdentity::Mouse(kind) if kind.is_wheel())
    }

    /// Persisted form: `key:F8`, `mouse:WheelUp`, `controller:0:ButtonA`.
    pub fn to_token(&self) -> String {
        match self {
            InputIdentity::Key(code) => format!("key:{code}"),
            InputIdentity::Mouse(kind) => format!("mouse:{}", kind.token()),
            InputIdentity::Controller { index, kind } => {
                format!("controller:{}:{}", index, kind.token())
            }
        }
    }
}

impl fmt::Display for InputIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputIdentity::Key(code) => write!(f, "{code}"),
            InputIdentity::Mouse(kind) => f.write_str(kind.label()),
            InputIdentity::Controller { index, kind } => {
                write!(f, "Controller {} - {}", u32::from(*index) + 1, kind.label())
            }
        }
    }
}

impl FromStr for InputIdentity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (prefix, rest) = s
            .split_once(':')
            .ok_or_else(|| format!("missing source prefix in '{s}'"))?;

        match prefix {
            "key" => KeyCode::parse(rest)
                .map(InputIdentity::Key)
                .ok_or_else(|| format!("unsupported key: '{rest}'")),
            "mouse" => MouseInputKind::from_token(rest)
                .map(InputIdentity::Mouse)
                .ok_or_else(|| format!("unknown mouse input: '{rest}'")),
            "controller" => {
                let (index, kind) = rest
                    .split_once(':')
                    .ok_or_else(|| format!("missing controller index in '{s}'"))?;
                let index: u8 = index
                    .parse()
                    .map_err(|_| format!("invalid controller index: '{index}'"))?;
                if index >= MAX_CONTROLLERS {
                    return Err(format!("controller index {index} out of range 0..{MAX_CONTROLLERS}"));
                }
                let kind = ControllerInputKind::from_token(kind)
                    .ok_or_else(|| format!("unknown controller input: '{kind}'"))?;
                Ok(InputIdentity::Controller { index, kind })
            }
            other => Err(format!("unknown input source '{other}'")),
        }
    }
}
