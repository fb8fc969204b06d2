//! Application layer: mapping parsed RTL-TCP commands onto the device.

pub mod translate;

pub use translate::apply_command;
