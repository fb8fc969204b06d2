//! Client-facing RTL-TCP protocol: command frames and the dongle-info record.

pub mod codec;
pub mod messages;

pub use codec::{decode_frame, parse_frames};
pub use messages::*;
