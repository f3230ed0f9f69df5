//! Gamepad state and where it comes from
//!
//! A [`GamepadSnapshot`] is one reading of an XInput-style controller. The
//! controller source asks a [`GamepadSource`] for a snapshot of each slot
//! every tick.

use crate::input::{ControllerInputKind, ControllerSignal, StickAxis, MAX_CONTROLLERS};
use crate::mapping::AxisThresholds;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// One reading of a controller
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GamepadSnapshot {
    /// XInput button bitmask
    pub buttons: u16,
    pub left_trigger: u8,
    pub right_trigger: u8,
    pub left_thumb_x: i16,
    pub left_thumb_y: i16,
    pub right_thumb_x: i16,
    pub right_thumb_y: i16,
}

impl GamepadSnapshot {
    pub fn axis(&self, axis: StickAxis) -> i16 {
        match axis {
            StickAxis::LeftX => self.left_thumb_x,
            StickAxis::LeftY => self.left_thumb_y,
            StickAxis::RightX => self.right_thumb_x,
            StickAxis::RightY => self.right_thumb_y,
        }
    }

    /// Whether `kind` counts as held down. Analog inputs must be strictly
    /// beyond their threshold.
    pub fn is_active(&self, kind: ControllerInputKind, thresholds: &AxisThresholds) -> bool {
        match kind.signal() {
            ControllerSignal::Button(mask) => self.buttons & mask != 0,
            ControllerSignal::LeftTrigger => self.left_trigger > thresholds.trigger_threshold,
            ControllerSignal::RightTrigger => self.right_trigger > thresholds.trigger_threshold,
            ControllerSignal::Stick { axis, positive } => {
                let value = i32::from(self.axis(axis));
                let threshold = i32::from(thresholds.stick_threshold);
                if positive {
                    value > threshold
                } else {
                    value < -threshold
                }
            }
        }
    }

    /// Every active input, in detection priority order
    pub fn active_inputs<'a>(
        &'a self,
        thresholds: &'a AxisThresholds,
    ) -> impl Iterator<Item = ControllerInputKind> + 'a {
        ControllerInputKind::ALL
            .into_iter()
            .filter(move |kind| self.is_active(*kind, thresholds))
    }

    /// Set the bit of a digital input. No-op for analog inputs.
    pub fn with_button(mut self, kind: ControllerInputKind) -> Self {
        if let ControllerSignal::Button(mask) = kind.signal() {
            self.buttons |= mask;
        }
        self
    }
}

/// First active input: buttons, then triggers, then stick directions.
///
/// Used to pick an input interactively, usually with the lighter
/// [`AxisThresholds::CAPTURE`] thresholds.
pub fn capture_input(snapshot: &GamepadSnapshot, thresholds: &AxisThresholds) -> Option<ControllerInputKind> {
    snapshot.active_inputs(thresholds).next()
}

/// Reads controller slots
pub trait GamepadSource: Send + Sync {
    /// Current state of slot `index`, or `None` when nothing is connected.
    fn read(&self, index: u8) -> Option<GamepadSnapshot>;
}

/// In-memory controller slots, driven by tests and demos
#[derive(Debug, Clone, Default)]
pub struct SimulatedGamepads {
    slots: Arc<Mutex<[Option<GamepadSnapshot>; MAX_CONTROLLERS as usize]>>,
}

impl SimulatedGamepads {
    pub fn new() -> Self {
        Self::default()
    }

    fn slots(&self) -> MutexGuard<'_, [Option<GamepadSnapshot>; MAX_CONTROLLERS as usize]> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Connect (or update) slot `index`. Out-of-range slots are ignored.
    pub fn set(&self, index: u8, snapshot: GamepadSnapshot) {
        if let Some(slot) = self.slots().get_mut(usize::from(index)) {
            *slot = Some(snapshot);
        }
    }

    pub fn disconnect(&self, index: u8) {
        if let Some(slot) = self.slots().get_mut(usize::from(index)) {
            *slot = None;
        }
    }

    /// Edit a connected slot in place.
    pub fn update(&self, index: u8, edit: impl FnOnce(&mut GamepadSnapshot)) {
        if let Some(Some(snapshot)) = self.slots().get_mut(usize::from(index)) {
            edit(snapshot);
        }
    }
}

impl GamepadSource for SimulatedGamepads {
    fn read(&self, index: u8) -> Option<GamepadSnapshot> {
        self.slots().get(usize::from(index)).copied().flatten()
    }
}

/// Controllers read through XInput
#[cfg(windows)]
#[derive(Debug, Clone, Copy, Default)]
pub struct XInputGamepads;

#[cfg(windows)]
impl GamepadSource for XInputGamepads {
    fn read(&self, index: u8) -> Option<GamepadSnapshot> {
        use windows::Win32::UI::Input::XboxController::{XInputGetState, XINPUT_STATE};

        let mut state = XINPUT_STATE::default();
        // XInputGetState returns ERROR_SUCCESS (0) for a connected slot
        let result = unsafe { XInputGetState(u32::from(index), &mut state) };
        if result != 0 {
            return None;
        }

        let pad = state.Gamepad;
        Some(GamepadSnapshot {
            buttons: pad.wButtons.0,
            left_trigger: pad.bLeftTrigger,
            right_trigger: pad.bRightTrigger,
            left_thumb_x: pad.sThumbLX,
            left_thumb_y: pad.sThumbLY,
            right_thumb_x: pad.sThumbRX,
            right_thumb_y: pad.sThumbRY,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thresholds_are_strict() {
        let thresholds = AxisThresholds::POLLING;
        let mut snap = GamepadSnapshot {
            left_trigger: 128,
            left_thumb_x: 16384,
            left_thumb_y: -16384,
            ..Default::default()
        };
        assert!(!snap.is_active(ControllerInputKind::LeftTrigger, &thresholds));
        assert!(!snap.is_active(ControllerInputKind::LeftStickRight, &thresholds));
        assert!(!snap.is_active(ControllerInputKind::LeftStickDown, &thresholds));

        snap.left_trigger = 129;
        snap.left_thumb_x = 16385;
        snap.left_thumb_y = -16385;
        assert!(snap.is_active(ControllerInputKind::LeftTrigger, &thresholds));
        assert!(snap.is_active(ControllerInputKind::LeftStickRight, &thresholds));
        assert!(snap.is_active(ControllerInputKind::LeftStickDown, &thresholds));
        assert!(!snap.is_active(ControllerInputKind::LeftStickUp, &thresholds));
    }

    #[test]
    fn diagonal_activates_two_directions() {
        let snap = GamepadSnapshot {
            right_thumb_x: -30000,
            right_thumb_y: 30000,
            ..Default::default()
        };
        let active: Vec<_> = snap.active_inputs(&AxisThresholds::POLLING).collect();
        assert_eq!(
            active,
            vec![ControllerInputKind::RightStickUp, ControllerInputKind::RightStickLeft]
        );
    }

    #[test]
    fn capture_prefers_buttons_then_triggers() {
        let thresholds = AxisThresholds::CAPTURE;
        let mut snap = GamepadSnapshot {
            right_trigger: 100,
            left_thumb_y: 9000,
            ..Default::default()
        };
        // 100 is below the poller threshold but above the capture one
        assert_eq!(capture_input(&snap, &thresholds), Some(ControllerInputKind::RightTrigger));
        assert_eq!(capture_input(&snap, &AxisThresholds::POLLING), None);

        snap = snap.with_button(ControllerInputKind::DPadLeft);
        assert_eq!(capture_input(&snap, &thresholds), Some(ControllerInputKind::DPadLeft));

        assert_eq!(capture_input(&GamepadSnapshot::default(), &thresholds), None);
    }

    #[test]
    fn simulated_slots() {
        let pads = SimulatedGamepads::new();
        assert!(pads.read(0).is_none());

        pads.set(2, GamepadSnapshot::default());
        pads.update(2, |snap| snap.left_trigger = 255);
        assert_eq!(pads.read(2).map(|s| s.left_trigger), Some(255));

        pads.set(9, GamepadSnapshot::default());
        assert!(pads.read(9).is_none());

        pads.disconnect(2);
        assert!(pads.read(2).is_none());
    }
}
