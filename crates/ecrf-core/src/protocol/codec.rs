//! Decoder for RTL-TCP client command frames.
//!
//! Wire format, per frame:
//! ```text
//! [opcode:1][param:4]
//! ```
//! The parameter is an unsigned 32-bit big-endian integer. There is no
//! framing beyond the fixed length and no checksum; the client simply writes
//! frames back-to-back onto the TCP stream.
//!
//! Because TCP has no message boundaries, a single `read()` may deliver any
//! number of complete frames plus a partial one. [`parse_frames`] consumes
//! the complete frames and silently discards the partial tail; a partial
//! frame is an artifact of stream segmentation, not corruption.

use crate::protocol::messages::{opcode, ControlCommand, FRAME_LEN};

/// Decodes a single complete 5-byte command frame.
///
/// Decoding is total: unknown opcodes yield [`ControlCommand::Unknown`], and
/// the gain parameter (tenths of a dB on the wire) is divided down to whole
/// dB here so the rest of the bridge only ever sees dB values.
pub fn decode_frame(frame: [u8; FRAME_LEN]) -> ControlCommand {
    let param = u32::from_be_bytes([frame[1], frame[2], frame[3], frame[4]]);
    match frame[0] {
        opcode::SET_FREQUENCY => ControlCommand::SetFrequency(param),
        opcode::SET_SAMPLE_RATE => ControlCommand::SetSampleRate(param),
        opcode::SET_GAIN => ControlCommand::SetGain(param / 10),
        opcode::SET_GAIN_MODE => ControlCommand::SetGainMode(param != 0),
        other => ControlCommand::Unknown {
            opcode: other,
            param,
        },
    }
}

/// Splits `buf` into complete 5-byte frames and decodes each one.
///
/// A trailing remainder of fewer than 5 bytes is discarded without error.
/// A buffer of N complete frames plus a 3-byte tail therefore yields exactly
/// N commands; the tail is never mis-parsed into a further frame.
pub fn parse_frames(buf: &[u8]) -> Vec<ControlCommand> {
    buf.chunks_exact(FRAME_LEN)
        .map(|chunk| {
            // chunks_exact guarantees the length, so the conversion cannot fail.
            let frame: [u8; FRAME_LEN] = chunk.try_into().unwrap();
            decode_frame(frame)
        })
        .collect()
}

// ── Tests ─────────────────────────────────────────────────────────────────────
