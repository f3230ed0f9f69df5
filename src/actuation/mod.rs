//! Actuation - from triggered bindings to device commands

pub mod coordinator;
pub mod intensity;

pub use coordinator::ActuationCoordinator;
pub use intensity::quantize;
