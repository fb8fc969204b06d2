//! Domain layer: pure configuration types with no I/O dependencies.

pub mod config;

pub use config::BridgeConfig;
