//! # ecrf-bridge
//!
//! RTL-TCP server that exposes an EvilCrow RF v2 attached over USB serial as
//! if it were an RTL-SDR dongle, so stock SDR tools (URH, gqrx, ...) can tune
//! it and record from it without device-specific support.
//!
//! The CC1101 on the EvilCrow does not produce raw I/Q data. It reports bytes
//! that its internal demodulator has already extracted, and only when a signal
//! is present. The bridge therefore synthesises a continuous pseudo-I/Q feed:
//! each real device byte `b` is sent as the pair `(I=b, Q=127)`, and silence
//! pairs `(127, 127)` are emitted at a fixed cadence whenever the device has
//! nothing to say. Signal-presence timing survives; spectral fidelity does not.
//!
//! Layering follows the usual split:
//!
//! - `domain` – configuration, no I/O.
//! - `application` – translation of parsed RTL-TCP commands onto the device.
//! - `infrastructure` – the serial device session, the drop-oldest sample
//!   queue, the sample streamer, and the TCP server.

pub mod application;
pub mod domain;
pub mod infrastructure;

pub use domain::BridgeConfig;
pub use infrastructure::device_session::{DeviceError, DeviceSession};
pub use infrastructure::server::{BridgeError, BridgeServer};
