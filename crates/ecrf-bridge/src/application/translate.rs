//! Translation of RTL-TCP control commands to device configuration calls.
//!
//! This is the whole of the bridge's command semantics: three tunable
//! parameters, one accepted no-op, and a logged drop for everything else.
//! The RTL-TCP protocol has no acknowledgment frames, so nothing is written
//! back to the client and no command can fail the session.

use tracing::{debug, warn};

use ecrf_core::ControlCommand;

use crate::infrastructure::device_session::DeviceSession;

/// Applies one parsed client command to the device session.
///
/// Total: every variant is handled and none returns an error. Unknown
/// opcodes and the gain-mode toggle are logged and otherwise ignored, which
/// matches how a real rtl_tcp server behaves toward clients.
pub async fn apply_command(device: &DeviceSession, cmd: ControlCommand) {
    match cmd {
        ControlCommand::SetFrequency(hz) => device.set_frequency(hz).await,
        ControlCommand::SetSampleRate(hz) => device.set_sample_rate(hz).await,
        // Already divided down to whole dB by the frame decoder.
        ControlCommand::SetGain(db) => device.set_gain(db).await,
        ControlCommand::SetGainMode(manual) => {
            // The CC1101 always runs its own AGC; accept and ignore.
            debug!(manual, "gain mode request ignored (CC1101 is AGC-only)");
        }
        ControlCommand::Unknown { opcode, param } => {
            warn!(
                opcode = format_args!("0x{opcode:02X}"),
                param, "unknown RTL-TCP opcode dropped"
            );
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
