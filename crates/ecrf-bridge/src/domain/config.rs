//! Bridge configuration.
//!
//! [`BridgeConfig`] is the single source of truth for all runtime settings.
//! The infrastructure layer populates it from CLI arguments; tests construct
//! it directly with shortened delays so the device handshake completes in
//! milliseconds instead of seconds.

use std::net::SocketAddr;
use std::time::Duration;

/// All runtime configuration for the bridge.
///
/// Build one at startup, wrap it in an `Arc`, and share it across the server,
/// the device session, and the per-client streamer tasks.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Address the RTL-TCP listener binds to. Default `127.0.0.1:1234`,
    /// the port stock rtl_tcp clients expect.
    pub tcp_bind_addr: SocketAddr,

    /// Serial port of the EvilCrow (`/dev/ttyUSB0`, `COM8`, ...).
    pub serial_port: String,

    /// Serial baud rate; must match the firmware's 115200.
    pub baud_rate: u32,

    /// Pause after opening the serial port before talking to the device.
    /// The ESP32 resets on USB open and needs time to boot.
    pub settle_delay: Duration,

    /// Window spent discarding stale serial input after the settle delay.
    pub input_flush_window: Duration,

    /// How long to collect the `sdr_enable` response before inspecting it.
    pub enable_response_window: Duration,

    /// How long to collect the `board_id_read` response before inspecting it.
    pub identity_response_window: Duration,

    /// Pause after `rx_start` before treating serial bytes as sample data,
    /// so the firmware's command acknowledgment is not streamed to the client.
    pub rx_start_settle: Duration,

    /// Tuner defaults applied right after a successful connect.
    pub default_frequency_hz: u32,
    pub default_sample_rate_hz: u32,
    pub default_gain_db: u32,

    /// Capacity of the drop-oldest queue between the drain loop and the
    /// streamer, in chunks. Freshness beats completeness: a slow client
    /// loses the oldest bursts, never the newest.
    pub queue_capacity: usize,

    /// Maximum bytes pulled from the serial port per drain-loop read.
    pub read_chunk_size: usize,

    /// Number of `(127, 127)` pairs in one synthesized silence buffer.
    pub silence_samples: usize,

    /// Pause after writing a silence buffer, fixing the idle sample cadence.
    pub silence_interval: Duration,

    /// Bounded poll timeout for the client command-read loop, so the loop
    /// observes cancellation even when the client sends nothing.
    pub command_poll_timeout: Duration,

    /// Bounded poll timeout for the accept loop, so the server observes an
    /// external shutdown request while idle.
    pub accept_poll_timeout: Duration,

    /// Maximum wait for the streamer task to finish during session teardown.
    pub drain_join_timeout: Duration,

    /// Interval between cumulative sample-count log lines.
    pub stats_interval: Duration,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            // Known-valid literal, so parse cannot fail.
            tcp_bind_addr: "127.0.0.1:1234".parse().unwrap(),
            serial_port: String::new(),
            baud_rate: 115_200,
            settle_delay: Duration::from_millis(1500),
            input_flush_window: Duration::from_millis(100),
            enable_response_window: Duration::from_millis(500),
            identity_response_window: Duration::from_millis(300),
            rx_start_settle: Duration::from_millis(200),
            default_frequency_hz: 433_920_000,
            default_sample_rate_hz: 250_000,
            default_gain_db: 15,
            queue_capacity: 64,
            read_chunk_size: 512,
            silence_samples: 64,
            silence_interval: Duration::from_millis(5),
            command_poll_timeout: Duration::from_millis(500),
            accept_poll_timeout: Duration::from_secs(1),
            drain_join_timeout: Duration::from_secs(2),
            stats_interval: Duration::from_secs(5),
        }
    }
}

impl BridgeConfig {
    /// A configuration with all device and streaming delays shrunk so tests
    /// run in milliseconds. Wire-visible values are unchanged.
    pub fn fast_for_tests() -> Self {
        Self {
            tcp_bind_addr: "127.0.0.1:0".parse().unwrap(),
            settle_delay: Duration::from_millis(5),
            input_flush_window: Duration::from_millis(5),
            enable_response_window: Duration::from_millis(50),
            identity_response_window: Duration::from_millis(50),
            rx_start_settle: Duration::from_millis(10),
            silence_interval: Duration::from_millis(1),
            command_poll_timeout: Duration::from_millis(20),
            accept_poll_timeout: Duration::from_millis(50),
            drain_join_timeout: Duration::from_millis(500),
            ..Self::default()
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
