//! Input identity model - what a binding is attached to

pub mod identity;
pub mod keys;

pub use identity::{
    ControllerInputKind, ControllerSignal, InputIdentity, InputSource, MouseInputKind, StickAxis,
    MAX_CONTROLLERS,
};
pub use keys::KeyCode;
