//! The EvilCrow firmware's serial command set.
//!
//! The firmware speaks newline-terminated ASCII over USB serial at 115200
//! baud. Commands are fire-and-forget during steady state; the firmware's
//! `HACKRF_SUCCESS` / `HACKRF_ERROR` reply lines are only examined during the
//! initial connect handshake, where the board identity response must contain
//! the `HACKRF` marker.

use std::fmt;

/// Case-insensitive marker the board identity response must contain.
pub const IDENTITY_MARKER: &str = "HACKRF";

/// A command in the device's textual serial protocol.
///
/// [`DeviceCommand::encode_line`] produces the exact newline-terminated line
/// the firmware expects; no other formatting path exists, so the serial
/// vocabulary is defined in one place.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceCommand {
    /// Switch the firmware into SDR mode (no app/phone interaction needed).
    SdrEnable,
    /// Leave SDR mode, returning the firmware to its idle state.
    SdrDisable,
    /// Query the board identity; the response must contain `HACKRF`.
    BoardIdRead,
    /// Tune the CC1101 to the given frequency in Hz.
    SetFrequency(u32),
    /// Set the demodulator data rate in Hz.
    SetSampleRate(u32),
    /// Set the receive gain in dB.
    SetGain(u32),
    /// Start streaming demodulated FIFO bytes over serial.
    RxStart,
    /// Stop streaming.
    RxStop,
}

impl DeviceCommand {
    /// Encodes the command as the newline-terminated ASCII line the firmware
    /// parses, e.g. `"set_freq 433920000\n"`.
    pub fn encode_line(&self) -> String {
        format!("{self}\n")
    }
}

impl fmt::Display for DeviceCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceCommand::SdrEnable => write!(f, "sdr_enable"),
            DeviceCommand::SdrDisable => write!(f, "sdr_disable"),
            DeviceCommand::BoardIdRead => write!(f, "board_id_read"),
            DeviceCommand::SetFrequency(hz) => write!(f, "set_freq {hz}"),
            DeviceCommand::SetSampleRate(hz) => write!(f, "set_sample_rate {hz}"),
            DeviceCommand::SetGain(db) => write!(f, "set_gain {db}"),
            DeviceCommand::RxStart => write!(f, "rx_start"),
            DeviceCommand::RxStop => write!(f, "rx_stop"),
        }
    }
}

/// True if a response line indicates success (`HACKRF_SUCCESS`, or any line
/// containing `SUCCESS` regardless of case).
pub fn contains_success(response: &str) -> bool {
    response.to_ascii_uppercase().contains("SUCCESS")
}

/// True if a response contains the board identity marker, regardless of case.
///
/// Used once per connect to verify the attached device actually runs the
/// EvilCrow SDR firmware rather than being some other USB-UART device.
pub fn contains_identity_marker(response: &str) -> bool {
    response.to_ascii_uppercase().contains(IDENTITY_MARKER)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
