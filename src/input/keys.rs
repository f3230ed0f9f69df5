//! Host key codes.
//!
//! Key codes live in the Windows virtual-key space, which is what global
//! keyboard hooks report. Names are parsed case-insensitively and accept the
//! same aliases users already type in mapping files (`esc`, `kp+`, `lshift`).
//!
//! # Supported Names
//!
//! - Letters `a-z`, top-row digits `0-9`, function keys `f1`-`f24`
//! - Modifiers: `shift`, `ctrl`, `alt` and their left/right variants
//! - Arrows, numpad, navigation and editing keys, common punctuation
//!
//! Codes without a name render as `vk_0xNN` and parse back from that form.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A key code from the host's virtual-key space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeyCode(pub u32);

impl KeyCode {
    pub const BACKSPACE: KeyCode = KeyCode(0x08);
    pub const TAB: KeyCode = KeyCode(0x09);
    pub const ENTER: KeyCode = KeyCode(0x0D);
    pub const ESCAPE: KeyCode = KeyCode(0x1B);
    pub const SPACE: KeyCode = KeyCode(0x20);
    pub const F1: KeyCode = KeyCode(0x70);
    pub const F8: KeyCode = KeyCode(0x77);
    pub const F12: KeyCode = KeyCode(0x7B);

    /// Key code for an ASCII letter or digit (`'a'`, `'Q'`, `'7'`).
    pub fn from_char(c: char) -> Option<Self> {
        let upper = c.to_ascii_uppercase();
        if upper.is_ascii_uppercase() || upper.is_ascii_digit() {
            Some(KeyCode(upper as u32))
        } else {
            None
        }
    }

    /// Canonical display name, if this code has one.
    pub fn name(self) -> Option<&'static str> {
        let code = self.0;
        let name = match code {
            0x41..=0x5A => LETTERS[(code - 0x41) as usize],
            0x30..=0x39 => DIGITS[(code - 0x30) as usize],
            0x70..=0x87 => FUNCTION_KEYS[(code - 0x70) as usize],
            0x60..=0x69 => NUMPAD_DIGITS[(code - 0x60) as usize],

            0x10 => "Shift",
            0x11 => "Ctrl",
            0x12 => "Alt",
            0xA0 => "LeftShift",
            0xA1 => "RightShift",
            0xA2 => "LeftCtrl",
            0xA3 => "RightCtrl",
            0xA4 => "LeftAlt",
            0xA5 => "RightAlt",

            0x25 => "Left",
            0x26 => "Up",
            0x27 => "Right",
            0x28 => "Down",

            0x6A => "NumpadMultiply",
            0x6B => "NumpadAdd",
            0x6D => "NumpadSubtract",
            0x6E => "NumpadDecimal",
            0x6F => "NumpadDivide",

            0x08 => "Backspace",
            0x09 => "Tab",
            0x0D => "Enter",
            0x13 => "Pause",
            0x14 => "CapsLock",
            0x1B => "Escape",
            0x20 => "Space",
            0x21 => "PageUp",
            0x22 => "PageDown",
            0x23 => "End",
            0x24 => "Home",
            0x2C => "PrintScreen",
            0x2D => "Insert",
            0x2E => "Delete",

            0xBA => "Semicolon",
            0xBB => "Equals",
            0xBC => "Comma",
            0xBD => "Minus",
            0xBE => "Period",
            0xBF => "Slash",
            0xC0 => "Grave",
            0xDB => "LeftBracket",
            0xDC => "Backslash",
            0xDD => "RightBracket",
            0xDE => "Apostrophe",

            _ => return None,
        };
        Some(name)
    }

    /// Parse a key name (case-insensitive, aliases allowed).
    pub fn parse(name: &str) -> Option<Self> {
        let n = name.trim().to_ascii_lowercase();

        if n.chars().count() == 1 {
            if let Some(code) = n.chars().next().and_then(Self::from_char) {
                return Some(code);
            }
        }

        if let Some(hex) = n.strip_prefix("vk_0x") {
            return u32::from_str_radix(hex, 16).ok().map(KeyCode);
        }

        if let Some(num) = n.strip_prefix('f') {
            if let Ok(index) = num.parse::<u32>() {
                return (1..=24).contains(&index).then(|| KeyCode(0x6F + index));
            }
        }

        if let Some(num) = n.strip_prefix("numpad").or_else(|| n.strip_prefix("kp")) {
            if let Ok(digit) = num.parse::<u32>() {
                return (digit <= 9).then(|| KeyCode(0x60 + digit));
            }
        }

        let code = match n.as_str() {
            // Modifiers
            "shift" => 0x10,
            "ctrl" | "control" => 0x11,
            "alt" | "menu" => 0x12,
            "leftshift" | "lshift" => 0xA0,
            "rightshift" | "rshift" => 0xA1,
            "leftctrl" | "lctrl" | "leftcontrol" => 0xA2,
            "rightctrl" | "rctrl" | "rightcontrol" => 0xA3,
            "leftalt" | "lalt" => 0xA4,
            "rightalt" | "ralt" => 0xA5,

            // Arrow keys
            "left" | "leftarrow" => 0x25,
            "up" | "uparrow" => 0x26,
            "right" | "rightarrow" => 0x27,
            "down" | "downarrow" => 0x28,

            // Numpad operators
            "numpadmultiply" | "kpmultiply" | "kp*" => 0x6A,
            "numpadadd" | "kpadd" | "kp+" => 0x6B,
            "numpadsubtract" | "kpsubtract" | "kp-" => 0x6D,
            "numpaddecimal" | "kpdecimal" | "kp." => 0x6E,
            "numpaddivide" | "kpdivide" | "kp/" => 0x6F,

            // Special keys
            "backspace" | "back" => 0x08,
            "tab" => 0x09,
            "enter" | "return" => 0x0D,
            "pause" => 0x13,
            "capslock" | "caps" => 0x14,
            "escape" | "esc" => 0x1B,
            "space" | "spacebar" => 0x20,
            "pageup" | "pgup" => 0x21,
            "pagedown" | "pgdown" => 0x22,
            "end" => 0x23,
            "home" => 0x24,
            "printscreen" | "prtsc" => 0x2C,
            "insert" | "ins" => 0x2D,
            "delete" | "del" => 0x2E,

            // Punctuation and symbols
            "semicolon" | ";" => 0xBA,
            "equals" | "=" => 0xBB,
            "comma" | "," => 0xBC,
            "minus" | "-" => 0xBD,
            "period" | "." => 0xBE,
            "slash" | "/" => 0xBF,
            "grave" | "`" => 0xC0,
            "leftbracket" | "[" => 0xDB,
            "backslash" | "\\" => 0xDC,
            "rightbracket" | "]" => 0xDD,
            "apostrophe" | "quote" | "'" => 0xDE,

            _ => return None,
        };
        Some(KeyCode(code))
    }
}

const LETTERS: [&str; 26] = [
    "A", "B", "C", "D", "E", "F", "G", "H", "I", "J", "K", "L", "M",
    "N", "O", "P", "Q", "R", "S", "T", "U", "V", "W", "X", "Y", "Z",
];

const DIGITS: [&str; 10] = ["0", "1", "2", "3", "4", "5", "6", "7", "8", "9"];

const FUNCTION_KEYS: [&str; 24] = [
    "F1", "F2", "F3", "F4", "F5", "F6", "F7", "F8", "F9", "F10", "F11", "F12",
    "F13", "F14", "F15", "F16", "F17", "F18", "F19", "F20", "F21", "F22", "F23", "F24",
];

const NUMPAD_DIGITS: [&str; 10] = [
    "Numpad0", "Numpad1", "Numpad2", "Numpad3", "Numpad4",
    "Numpad5", "Numpad6", "Numpad7", "Numpad8", "Numpad9",
];

impl fmt::Display for KeyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => f.write_str(name),
            None => write!(f, "vk_0x{:02X}", self.0),
        }
    }
}

impl FromStr for KeyCode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        KeyCode::parse(s).ok_or_else(|| format!("unsupported key: '{s}'"))
    }
}
