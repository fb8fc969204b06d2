//! # ecrf-core
//!
//! Protocol library for the EvilCrow RF v2 RTL-TCP bridge.
//!
//! The bridge sits between two very different protocols and this crate
//! defines both of them:
//!
//! - **`protocol`** – The client-facing RTL-TCP wire protocol: the fixed
//!   12-byte dongle-info record sent after accept, and the 5-byte binary
//!   command frames (opcode + big-endian u32 parameter) sent by SDR tools
//!   such as URH or gqrx.
//!
//! - **`device`** – The device-facing serial protocol: newline-terminated
//!   ASCII commands (`set_freq 433920000`, `rx_start`, ...) understood by the
//!   EvilCrow firmware, plus classification of the line-oriented responses
//!   it produces during the connect handshake.
//!
//! This crate performs no I/O and has no dependency on tokio or sockets, so
//! every encode/decode path is testable without hardware or a network.

pub mod device;
pub mod protocol;

// Re-export the most-used types at the crate root so callers can write
// `ecrf_core::ControlCommand` instead of the longer module path.
pub use device::{contains_identity_marker, contains_success, DeviceCommand};
pub use protocol::codec::{decode_frame, parse_frames};
pub use protocol::messages::{ControlCommand, DongleInfo, ProtocolError, FRAME_LEN};
