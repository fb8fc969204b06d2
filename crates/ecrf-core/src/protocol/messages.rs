//! RTL-TCP protocol types: control commands and the dongle-info handshake.
//!
//! The RTL-TCP protocol has no version negotiation and no acknowledgment
//! frames. The server writes a fixed 12-byte [`DongleInfo`] record once after
//! accept and then streams unsigned 8-bit I/Q pairs; the client may send
//! 5-byte command frames at any time.

use thiserror::Error;

// ── Protocol constants ────────────────────────────────────────────────────────

/// Size in bytes of one client command frame: 1 opcode byte + 4 parameter bytes.
pub const FRAME_LEN: usize = 5;

/// Size in bytes of the dongle-info record sent after accept.
pub const DONGLE_INFO_LEN: usize = 12;

/// Magic bytes at the start of the dongle-info record.
pub const DONGLE_MAGIC: [u8; 4] = *b"RTL0";

// ── Command opcodes ───────────────────────────────────────────────────────────

/// Opcode byte values defined by rtl_tcp that this bridge understands.
///
/// rtl_tcp defines further opcodes (frequency correction, IF gain, AGC
/// modes, ...); the bridge treats all of them as [`ControlCommand::Unknown`]
/// because the CC1101 has no corresponding hardware control.
pub mod opcode {
    pub const SET_FREQUENCY: u8 = 0x01;
    pub const SET_SAMPLE_RATE: u8 = 0x02;
    pub const SET_GAIN: u8 = 0x04;
    pub const SET_GAIN_MODE: u8 = 0x05;
}

// ── Control commands ──────────────────────────────────────────────────────────

/// A decoded RTL-TCP client command.
///
/// Decoding is total: every 5-byte frame maps to exactly one variant, with
/// unrecognized opcodes captured as [`ControlCommand::Unknown`] rather than
/// rejected. No command, known or unknown, may terminate a client session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCommand {
    /// Tune to the given center frequency in Hz (opcode 0x01, raw parameter).
    SetFrequency(u32),
    /// Set the sample rate in Hz (opcode 0x02, raw parameter).
    SetSampleRate(u32),
    /// Set the tuner gain in dB (opcode 0x04).
    ///
    /// The wire parameter is in tenths of a dB; the decoder divides by 10,
    /// so a frame parameter of `150` yields `SetGain(15)`.
    SetGain(u32),
    /// Select manual (`true`) or automatic (`false`) gain mode (opcode 0x05).
    ///
    /// Accepted and ignored: the CC1101 always runs its own AGC.
    SetGainMode(bool),
    /// Any opcode the bridge does not handle. Logged and dropped.
    Unknown { opcode: u8, param: u32 },
}

// ── Dongle-info handshake record ──────────────────────────────────────────────

/// The fixed 12-byte record written to every client immediately after accept.
///
/// Layout: `"RTL0"` magic, big-endian u32 tuner type, big-endian u32 gain
/// count. The bridge advertises tuner type 1 and a single gain stage; these
/// are nominal values that let stock RTL-TCP clients proceed, not a real
/// tuner description.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DongleInfo {
    pub tuner_type: u32,
    pub gain_count: u32,
}

impl DongleInfo {
    /// The record the bridge sends: tuner type 1, one gain stage.
    pub const BRIDGE: DongleInfo = DongleInfo {
        tuner_type: 1,
        gain_count: 1,
    };

    /// Encodes the record into its 12-byte wire form.
    pub fn encode(&self) -> [u8; DONGLE_INFO_LEN] {
        let mut buf = [0u8; DONGLE_INFO_LEN];
        buf[..4].copy_from_slice(&DONGLE_MAGIC);
        buf[4..8].copy_from_slice(&self.tuner_type.to_be_bytes());
        buf[8..12].copy_from_slice(&self.gain_count.to_be_bytes());
        buf
    }

    /// Decodes a dongle-info record from the beginning of `bytes`.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::InsufficientData`] if fewer than 12 bytes are
    /// available, or [`ProtocolError::BadMagic`] if the record does not start
    /// with `"RTL0"`.
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        if bytes.len() < DONGLE_INFO_LEN {
            return Err(ProtocolError::InsufficientData {
                needed: DONGLE_INFO_LEN,
                available: bytes.len(),
            });
        }
        if bytes[..4] != DONGLE_MAGIC {
            return Err(ProtocolError::BadMagic([
                bytes[0], bytes[1], bytes[2], bytes[3],
            ]));
        }
        Ok(DongleInfo {
            tuner_type: u32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]),
            gain_count: u32::from_be_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]),
        })
    }
}

// ── Errors ────────────────────────────────────────────────────────────────────

/// Errors decoding the server-side handshake record.
///
/// Client command frames never produce an error: trailing partial frames are
/// tolerated and unknown opcodes decode to [`ControlCommand::Unknown`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("insufficient data: need {needed} bytes, got {available}")]
    InsufficientData { needed: usize, available: usize },

    #[error("bad dongle-info magic: {0:02X?} (expected \"RTL0\")")]
    BadMagic([u8; 4]),
}

// ── Tests ─────────────────────────────────────────────────────────────────────
