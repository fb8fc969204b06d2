//! The serial session with the EvilCrow device.
//!
//! [`DeviceSession`] owns the serial link for the lifetime of the process.
//! `connect` performs the one and only response-parsing exchange with the
//! firmware: enable SDR mode, verify the board identity, apply tuner
//! defaults. After that every command is fire-and-forget and the read side
//! of the link belongs exclusively to the background drain loop, which moves
//! demodulated FIFO bytes into the drop-oldest [`ChunkQueue`].
//!
//! The session is independent of any client: clients come and go while the
//! drain loop keeps running, and the streaming flag decides whether drained
//! bytes are queued as sample data or discarded as command chatter.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use ecrf_core::device::{contains_identity_marker, contains_success, DeviceCommand};

use crate::domain::BridgeConfig;
use crate::infrastructure::chunk_queue::ChunkQueue;

/// Any async byte link to the device. The real link is a
/// `tokio_serial::SerialStream`; tests use `tokio::io::duplex` pipes.
pub trait DeviceLink: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> DeviceLink for T {}

/// Errors from the device session.
///
/// Only the connect-time identity failure is fatal; steady-state serial
/// hiccups are logged and skipped without surfacing here.
#[derive(Debug, Error)]
pub enum DeviceError {
    /// The board did not identify as an EvilCrow SDR after one retry.
    /// Usually means wrong port or firmware without `sdr_enable` support.
    #[error("device did not identify as EvilCrow SDR (response: {response:?})")]
    Identity { response: String },

    /// Serial I/O failed during the connect handshake.
    #[error("serial I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Last values written to the tuner, observable for diagnostics and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TunerState {
    pub frequency_hz: u32,
    pub sample_rate_hz: u32,
    pub gain_db: u32,
}

/// A connected EvilCrow serial session.
///
/// Created once at bridge startup and shared (`Arc`) with the server and the
/// per-client streamer; outlives every client connection.
pub struct DeviceSession {
    writer: tokio::sync::Mutex<Box<dyn AsyncWrite + Send + Unpin>>,
    state: std::sync::Mutex<TunerState>,
    streaming: Arc<AtomicBool>,
    queue: Arc<ChunkQueue>,
    drain_cancel: CancellationToken,
    drain_task: std::sync::Mutex<Option<JoinHandle<()>>>,
    rx_start_settle: Duration,
}

impl DeviceSession {
    /// Connects over `link`: waits out the device's boot settle delay,
    /// flushes stale input, enables SDR mode, verifies the board identity
    /// (one retry), applies tuner defaults, and starts the drain loop.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::Identity`] if the identity marker never shows
    /// up, or [`DeviceError::Io`] if the link fails during the handshake.
    /// Either is fatal: the bridge must not start serving clients against a
    /// device it cannot verify.
    pub async fn connect<L>(mut link: L, config: &BridgeConfig) -> Result<Arc<Self>, DeviceError>
    where
        L: DeviceLink + 'static,
    {
        // The ESP32 resets when the host opens the USB serial port.
        sleep(config.settle_delay).await;
        discard_input(&mut link, config.input_flush_window).await;

        info!("enabling SDR mode");
        write_command(&mut link, DeviceCommand::SdrEnable).await?;
        let response = read_for(&mut link, config.enable_response_window).await;
        if contains_success(&response) {
            info!("SDR mode enabled");
        } else {
            warn!(
                response = response.trim(),
                "sdr_enable did not report success; trying board_id_read anyway"
            );
        }

        // Identity check, with exactly one retry before giving up.
        let mut last_response = String::new();
        let mut verified = false;
        for attempt in 1..=2 {
            write_command(&mut link, DeviceCommand::BoardIdRead).await?;
            last_response = read_for(&mut link, config.identity_response_window).await;
            if contains_identity_marker(&last_response) {
                verified = true;
                break;
            }
            warn!(
                attempt,
                response = last_response.trim(),
                "board identity not recognized"
            );
        }
        if !verified {
            return Err(DeviceError::Identity {
                response: last_response.trim().to_string(),
            });
        }
        info!("device connected and SDR mode verified");

        let (reader, writer) = tokio::io::split(link);
        let streaming = Arc::new(AtomicBool::new(false));
        let queue = Arc::new(ChunkQueue::new(config.queue_capacity));
        let drain_cancel = CancellationToken::new();

        let drain_task = tokio::spawn(drain_loop(
            reader,
            Arc::clone(&queue),
            Arc::clone(&streaming),
            drain_cancel.clone(),
            config.read_chunk_size,
        ));

        let session = Arc::new(Self {
            writer: tokio::sync::Mutex::new(Box::new(writer)),
            state: std::sync::Mutex::new(TunerState {
                frequency_hz: config.default_frequency_hz,
                sample_rate_hz: config.default_sample_rate_hz,
                gain_db: config.default_gain_db,
            }),
            streaming,
            queue,
            drain_cancel,
            drain_task: std::sync::Mutex::new(Some(drain_task)),
            rx_start_settle: config.rx_start_settle,
        });

        // Apply tuner defaults. Responses land in the drain loop and are
        // discarded there because streaming is not yet enabled.
        session.set_frequency(config.default_frequency_hz).await;
        session.set_sample_rate(config.default_sample_rate_hz).await;
        session.set_gain(config.default_gain_db).await;

        Ok(session)
    }

    /// The queue the drain loop fills and the streamer empties.
    pub fn queue(&self) -> Arc<ChunkQueue> {
        Arc::clone(&self.queue)
    }

    /// Snapshot of the last tuner values written.
    pub fn tuner_state(&self) -> TunerState {
        *self.state.lock().unwrap()
    }

    /// True while `rx_start` is in effect.
    pub fn is_streaming(&self) -> bool {
        self.streaming.load(Ordering::Relaxed)
    }

    /// Tunes the device. Fire-and-forget: a write failure is logged as a
    /// transient fault and the cached state is left unchanged.
    pub async fn set_frequency(&self, hz: u32) {
        info!(hz, mhz = hz as f64 / 1e6, "set frequency");
        if self.send(DeviceCommand::SetFrequency(hz)).await {
            self.state.lock().unwrap().frequency_hz = hz;
        }
    }

    /// Sets the demodulator data rate. Fire-and-forget.
    pub async fn set_sample_rate(&self, hz: u32) {
        info!(hz, "set sample rate");
        if self.send(DeviceCommand::SetSampleRate(hz)).await {
            self.state.lock().unwrap().sample_rate_hz = hz;
        }
    }

    /// Sets the receive gain in dB. Fire-and-forget.
    pub async fn set_gain(&self, db: u32) {
        info!(db, "set gain");
        if self.send(DeviceCommand::SetGain(db)).await {
            self.state.lock().unwrap().gain_db = db;
        }
    }

    /// Issues `rx_start` and, after a short settle so the firmware's
    /// acknowledgment is not mistaken for sample data, marks the drain loop
    /// as streaming. No-op when already streaming.
    pub async fn start_streaming(&self) {
        if self.streaming.load(Ordering::Relaxed) {
            return;
        }
        info!("starting device RX stream");
        self.send(DeviceCommand::RxStart).await;
        sleep(self.rx_start_settle).await;
        self.queue.clear();
        self.streaming.store(true, Ordering::Relaxed);
    }

    /// Clears the streaming flag and issues `rx_stop`.
    ///
    /// The flag swap makes this idempotent: per streaming session, `rx_stop`
    /// goes to the device exactly once no matter how many teardown paths run.
    pub async fn stop_streaming(&self) {
        if !self.streaming.swap(false, Ordering::Relaxed) {
            return;
        }
        info!("stopping device RX stream");
        self.send(DeviceCommand::RxStop).await;
    }

    /// Shuts the session down: stop streaming, leave SDR mode, stop the
    /// drain loop. Every step is best-effort; a failure in one never skips
    /// the ones after it.
    pub async fn close(&self) {
        self.stop_streaming().await;
        if !self.send(DeviceCommand::SdrDisable).await {
            warn!("sdr_disable not delivered during close");
        }
        self.drain_cancel.cancel();
        let task = self.drain_task.lock().unwrap().take();
        if let Some(task) = task {
            if timeout(Duration::from_secs(2), task).await.is_err() {
                warn!("drain loop did not stop within 2s");
            }
        }
        info!("device session closed");
    }

    /// Writes one command line. Returns `true` on success; failures are
    /// logged as transient and swallowed so a single serial hiccup does not
    /// end the session.
    async fn send(&self, cmd: DeviceCommand) -> bool {
        let mut writer = self.writer.lock().await;
        let line = cmd.encode_line();
        let result = async {
            writer.write_all(line.as_bytes()).await?;
            writer.flush().await
        }
        .await;
        match result {
            Ok(()) => true,
            Err(e) => {
                warn!(command = %cmd, error = %e, "serial write failed; command skipped");
                false
            }
        }
    }
}

// ── Drain loop ────────────────────────────────────────────────────────────────

/// Long-lived reader of the device's serial output.
///
/// While streaming is enabled, reads go into the queue as sample chunks;
/// otherwise they are command responses (or boot noise) and are discarded.
/// Read errors are transient: logged, then retried after a short pause.
async fn drain_loop<R>(
    mut reader: R,
    queue: Arc<ChunkQueue>,
    streaming: Arc<AtomicBool>,
    cancel: CancellationToken,
    chunk_size: usize,
) where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; chunk_size];
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("drain loop cancelled");
                break;
            }
            result = reader.read(&mut buf) => match result {
                Ok(0) => {
                    warn!("serial link closed (EOF); drain loop ending");
                    break;
                }
                Ok(n) => {
                    if streaming.load(Ordering::Relaxed) {
                        if queue.push(buf[..n].to_vec()) {
                            debug!(evicted_total = queue.evicted_count(), "sample queue overflow; oldest chunk dropped");
                        }
                    }
                    // Not streaming: command chatter, dropped on the floor.
                }
                Err(e) => {
                    warn!(error = %e, "transient serial read error");
                    sleep(Duration::from_millis(100)).await;
                }
            }
        }
    }
}

// ── Link helpers ──────────────────────────────────────────────────────────────

async fn write_command<L: DeviceLink>(link: &mut L, cmd: DeviceCommand) -> Result<(), DeviceError> {
    link.write_all(cmd.encode_line().as_bytes()).await?;
    link.flush().await?;
    Ok(())
}

/// Collects whatever the device says within `window` and returns it as text.
/// Equivalent to the classic "sleep, then read what's buffered" pattern, but
/// without blocking a thread.
async fn read_for<R: AsyncRead + Unpin>(link: &mut R, window: Duration) -> String {
    let mut collected = Vec::new();
    let mut buf = [0u8; 256];
    let deadline = Instant::now() + window;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            break;
        }
        match timeout(remaining, link.read(&mut buf)).await {
            Ok(Ok(0)) => break,
            Ok(Ok(n)) => collected.extend_from_slice(&buf[..n]),
            Ok(Err(_)) | Err(_) => break,
        }
    }
    String::from_utf8_lossy(&collected).into_owned()
}

/// Discards any bytes already buffered on the link (boot banners, stale
/// responses from a previous run).
async fn discard_input<R: AsyncRead + Unpin>(link: &mut R, window: Duration) {
    let discarded = read_for(link, window).await;
    if !discarded.is_empty() {
        debug!(bytes = discarded.len(), "discarded stale serial input");
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_read_for_collects_bytes_within_window() {
        let (mut a, mut b) = tokio::io::duplex(256);
        a.write_all(b"HACKRF_SUCCESS\n").await.unwrap();
        let text = read_for(&mut b, Duration::from_millis(50)).await;
        assert_eq!(text, "HACKRF_SUCCESS\n");
    }

    #[tokio::test]
    async fn test_read_for_returns_empty_on_silence() {
        let (_a, mut b) = tokio::io::duplex(256);
        let text = read_for(&mut b, Duration::from_millis(10)).await;
        assert!(text.is_empty());
    }

    #[tokio::test]
    async fn test_drain_loop_queues_only_while_streaming() {
        let (mut device_side, host_side) = tokio::io::duplex(1024);
        let queue = Arc::new(ChunkQueue::new(8));
        let streaming = Arc::new(AtomicBool::new(false));
        let cancel = CancellationToken::new();

        let task = tokio::spawn(drain_loop(
            host_side,
            Arc::clone(&queue),
            Arc::clone(&streaming),
            cancel.clone(),
            512,
        ));

        // Not streaming: bytes are command chatter and must be discarded.
        device_side.write_all(b"HACKRF_SUCCESS\n").await.unwrap();
        sleep(Duration::from_millis(30)).await;
        assert!(queue.is_empty());

        // Streaming: bytes are sample data and must be queued.
        streaming.store(true, Ordering::Relaxed);
        device_side.write_all(&[0xAA, 0xBB, 0xCC]).await.unwrap();
        sleep(Duration::from_millis(30)).await;
        assert_eq!(queue.pop(), Some(vec![0xAA, 0xBB, 0xCC]));

        cancel.cancel();
        timeout(Duration::from_millis(200), task)
            .await
            .expect("drain loop must observe cancellation promptly")
            .unwrap();
    }

    #[tokio::test]
    async fn test_drain_loop_exits_on_eof() {
        let (device_side, host_side) = tokio::io::duplex(64);
        let queue = Arc::new(ChunkQueue::new(2));
        let task = tokio::spawn(drain_loop(
            host_side,
            queue,
            Arc::new(AtomicBool::new(true)),
            CancellationToken::new(),
            64,
        ));
        drop(device_side);
        timeout(Duration::from_millis(200), task)
            .await
            .expect("EOF must end the drain loop")
            .unwrap();
    }
}
