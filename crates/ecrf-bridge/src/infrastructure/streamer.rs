//! The per-client sample streamer.
//!
//! Writes a continuous pseudo-I/Q byte stream to the connected client. Real
//! device bytes are expanded one-to-one into `(I=b, Q=127)` pairs; when the
//! queue is empty a fixed-size silence buffer of `(127, 127)` pairs is sent
//! followed by a fixed pause, so the client's notion of elapsed time at the
//! configured sample rate stays roughly coherent between bursts. The pacing
//! is deliberately coarse: exact timing fidelity is not a goal.
//!
//! The streamer is the only writer on the client socket. It enables device
//! streaming on entry and disables it on the way out; the idempotent flag
//! swap inside [`DeviceSession::stop_streaming`] guarantees `rx_stop` hits
//! the device exactly once per session however the loop ends.

use std::sync::Arc;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::domain::BridgeConfig;
use crate::infrastructure::device_session::DeviceSession;

/// Neutral sample value: the midpoint of the unsigned 8-bit range, which
/// RTL-TCP clients interpret as zero amplitude.
pub const IQ_CENTER: u8 = 127;

/// Expands demodulated device bytes into pseudo-I/Q pairs.
///
/// Each input byte becomes `(I = byte, Q = IQ_CENTER)`. The CC1101 has no
/// quadrature output, so Q carries the fixed neutral value.
pub fn expand_iq(raw: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(raw.len() * 2);
    for &b in raw {
        out.push(b);
        out.push(IQ_CENTER);
    }
    out
}

/// Builds a buffer of `samples` silence pairs, every byte [`IQ_CENTER`].
pub fn silence_buffer(samples: usize) -> Vec<u8> {
    vec![IQ_CENTER; samples * 2]
}

/// Runs the sample-write loop until cancelled or the client socket fails.
///
/// `writer` is the write half of the client socket; the streamer owns it and
/// drops it on exit, so a later session can never receive this session's
/// bytes.
pub async fn run_streamer<W>(
    mut writer: W,
    device: Arc<DeviceSession>,
    cancel: CancellationToken,
    config: Arc<BridgeConfig>,
) where
    W: AsyncWrite + Unpin,
{
    device.start_streaming().await;
    let queue = device.queue();
    let silence = silence_buffer(config.silence_samples);

    let mut sample_count: u64 = 0;
    let mut last_log = Instant::now();

    loop {
        if cancel.is_cancelled() {
            break;
        }

        let chunk = queue.pop();
        let (out, idle) = match &chunk {
            Some(raw) => {
                sample_count += raw.len() as u64;
                (expand_iq(raw), false)
            }
            None => (silence.clone(), true),
        };

        let write = async {
            writer.write_all(&out).await?;
            writer.flush().await
        };
        tokio::select! {
            result = write => {
                if let Err(e) = result {
                    debug!(error = %e, "client write failed; ending sample stream");
                    break;
                }
            }
            _ = cancel.cancelled() => break,
        }

        if idle {
            // Fixed-interval silence keeps the apparent cadence constant.
            tokio::select! {
                _ = sleep(config.silence_interval) => {}
                _ = cancel.cancelled() => break,
            }
        }

        if last_log.elapsed() >= config.stats_interval {
            info!(samples = sample_count, "cumulative device samples streamed");
            last_log = Instant::now();
        }
    }

    device.stop_streaming().await;
    info!(samples = sample_count, "sample stream stopped");
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_iq_interleaves_fixed_quadrature() {
        let out = expand_iq(&[0x00, 0x80, 0xFF]);
        assert_eq!(out, vec![0x00, 127, 0x80, 127, 0xFF, 127]);
    }

    #[test]
    fn test_expand_iq_doubles_length() {
        let out = expand_iq(&[1; 512]);
        assert_eq!(out.len(), 1024);
    }

    #[test]
    fn test_expand_iq_empty_input() {
        assert!(expand_iq(&[]).is_empty());
    }

    #[test]
    fn test_silence_buffer_is_all_center_bytes() {
        // An idle streamer iteration must emit nothing but 127s.
        let buf = silence_buffer(64);
        assert_eq!(buf.len(), 128);
        assert!(buf.iter().all(|&b| b == IQ_CENTER));
    }

    #[test]
    fn test_silence_buffer_zero_samples() {
        assert!(silence_buffer(0).is_empty());
    }
}
