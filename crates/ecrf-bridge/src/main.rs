//! EvilCrow RF narrowband bridge — entry point.
//!
//! This binary connects to an EvilCrow RF v2 over USB serial and exposes its
//! narrowband receiver as an RTL-TCP server, so off-the-shelf SDR clients
//! (URH, SDR#, anything that speaks rtl_tcp) can tune and record from it
//! without knowing anything about the device's serial command set.
//!
//! # Usage
//!
//! ```text
//! ecrf-bridge [OPTIONS]
//!
//! Options:
//!   --port <PATH>      Serial port of the device (auto-detected when omitted)
//!   --baud <RATE>      Serial baud rate [default: 115200]
//!   --bind <ADDR>      IP address for the RTL-TCP listener [default: 127.0.0.1]
//!   --tcp-port <PORT>  RTL-TCP listener port [default: 1234]
//! ```
//!
//! # Environment variable overrides
//!
//! CLI arguments take precedence when both are present.
//!
//! | Variable         | Default     | Description                 |
//! |------------------|-------------|-----------------------------|
//! | `ECRF_PORT`      | auto-detect | Serial port path            |
//! | `ECRF_BAUD`      | `115200`    | Serial baud rate            |
//! | `ECRF_BIND`      | `127.0.0.1` | RTL-TCP bind address        |
//! | `ECRF_TCP_PORT`  | `1234`      | RTL-TCP listener port       |
//!
//! # Architecture overview
//!
//! ```text
//! SDR client  (rtl_tcp protocol over TCP, port 1234)
//!       ↕
//! ecrf-bridge  ← this process
//!   domain/          BridgeConfig
//!   application/     Translate rtl_tcp commands → serial commands
//!   infrastructure/
//!     server/          RTL-TCP listener, one client at a time
//!     streamer/        Pseudo-I/Q synthesis and sample writes
//!     device_session/  Serial handshake, drain loop, tuner state
//!       ↕
//! EvilCrow RF v2  (newline commands over USB serial, 115200 baud)
//! ```

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio_serial::{SerialPortBuilderExt, SerialPortType};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use ecrf_bridge::domain::BridgeConfig;
use ecrf_bridge::infrastructure::device_session::DeviceSession;
use ecrf_bridge::infrastructure::server::BridgeServer;

// ── CLI argument definitions ──────────────────────────────────────────────────

/// RTL-TCP bridge for the EvilCrow RF v2 narrowband receiver.
#[derive(Debug, Parser)]
#[command(
    name = "ecrf-bridge",
    about = "Expose an EvilCrow RF v2 as an rtl_tcp-compatible SDR server",
    version
)]
struct Cli {
    /// Serial port of the EvilCrow (e.g. `/dev/ttyUSB0`, `COM8`).
    ///
    /// When omitted, the connected serial ports are scanned and the first
    /// one that looks like a USB-serial adapter is used.
    #[arg(long, env = "ECRF_PORT")]
    port: Option<String>,

    /// Serial baud rate. Must match the device firmware.
    #[arg(long, default_value_t = 115_200, env = "ECRF_BAUD")]
    baud: u32,

    /// IP address to bind the RTL-TCP listener to.
    ///
    /// Use `0.0.0.0` to accept clients from the LAN, or `127.0.0.1` to
    /// accept only local connections.
    #[arg(long, default_value = "127.0.0.1", env = "ECRF_BIND")]
    bind: String,

    /// RTL-TCP listener port. 1234 is what stock rtl_tcp clients expect.
    #[arg(long, default_value_t = 1234, env = "ECRF_TCP_PORT")]
    tcp_port: u16,
}

impl Cli {
    /// Converts the parsed CLI arguments into a [`BridgeConfig`], resolving
    /// the serial port by auto-detection when `--port` was not given.
    ///
    /// # Errors
    ///
    /// Returns an error if `--bind` is not a valid IP address, or if no
    /// serial port was given and none could be detected.
    fn into_bridge_config(self) -> anyhow::Result<BridgeConfig> {
        let tcp_bind_addr: SocketAddr = format!("{}:{}", self.bind, self.tcp_port)
            .parse()
            .with_context(|| format!("invalid bind address: '{}:{}'", self.bind, self.tcp_port))?;

        let serial_port = match self.port {
            Some(port) => port,
            None => detect_serial_port().context(
                "no serial port given (--port) and auto-detection found none",
            )?,
        };

        Ok(BridgeConfig {
            tcp_bind_addr,
            serial_port,
            baud_rate: self.baud,
            ..BridgeConfig::default()
        })
    }
}

/// Scans the system's serial ports for one that looks like the EvilCrow.
///
/// The board enumerates through a CP210x or CH340-family USB-serial chip, so
/// USB ports whose product string names one of those is preferred. Falls
/// back to any USB serial port, then to the first port of any kind.
fn detect_serial_port() -> Option<String> {
    let ports = tokio_serial::available_ports().ok()?;
    if ports.is_empty() {
        return None;
    }
    for p in &ports {
        debug!(port = %p.port_name, "found serial port");
    }

    // Silicon Labs CP210x VID, the chip on most EvilCrow RF v2 boards.
    const VID_SILABS: u16 = 0x10C4;
    const KNOWN_CHIPS: [&str; 4] = ["cp210", "ch340", "ch9102", "ftdi"];

    let usb_match = ports.iter().find(|p| match &p.port_type {
        SerialPortType::UsbPort(usb) => {
            usb.vid == VID_SILABS
                || usb
                    .product
                    .as_deref()
                    .map(|s| {
                        let s = s.to_ascii_lowercase();
                        KNOWN_CHIPS.iter().any(|chip| s.contains(chip))
                    })
                    .unwrap_or(false)
        }
        _ => false,
    });
    let any_usb = ports
        .iter()
        .find(|p| matches!(p.port_type, SerialPortType::UsbPort(_)));

    usb_match
        .or(any_usb)
        .or_else(|| ports.first())
        .map(|p| p.port_name.clone())
}

// ── Entry point ───────────────────────────────────────────────────────────────

/// Program entry point.
///
/// # What happens at startup
///
/// 1. `tracing_subscriber` is initialised; the log level is controlled by
///    the `RUST_LOG` environment variable (e.g. `RUST_LOG=debug`).
/// 2. CLI arguments are parsed with `clap` into a [`Cli`] struct, and the
///    serial port is auto-detected if `--port` was not given.
/// 3. The serial port is opened and the device handshake runs (enable the
///    SDR module, verify the identity response, apply tuner defaults). A
///    failed handshake is fatal.
/// 4. The RTL-TCP listener is bound. A bind failure is fatal.
/// 5. A Ctrl+C handler is spawned; it cancels the shutdown token, which the
///    accept loop observes within one poll interval.
/// 6. [`BridgeServer::run`] serves clients until shutdown, after which the
///    device is stopped and disabled.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = Arc::new(cli.into_bridge_config()?);

    info!(
        "EvilCrow RF bridge starting — serial={} @ {} baud, rtl_tcp={}",
        config.serial_port, config.baud_rate, config.tcp_bind_addr
    );

    // ── Device handshake ──────────────────────────────────────────────────────
    let link = tokio_serial::new(&config.serial_port, config.baud_rate)
        .open_native_async()
        .with_context(|| format!("failed to open serial port '{}'", config.serial_port))?;
    let device = DeviceSession::connect(link, &config)
        .await
        .context("device handshake failed")?;

    // ── RTL-TCP listener ──────────────────────────────────────────────────────
    let server = BridgeServer::bind(Arc::clone(&config), Arc::clone(&device))
        .await
        .context("failed to start RTL-TCP server")?;

    // ── Graceful shutdown ─────────────────────────────────────────────────────
    let shutdown = CancellationToken::new();
    let shutdown_signal = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("received Ctrl+C — initiating graceful shutdown");
                shutdown_signal.cancel();
            }
            Err(e) => {
                tracing::error!("failed to listen for Ctrl+C signal: {e}");
            }
        }
    });

    // ── Main server loop ──────────────────────────────────────────────────────
    server.run(shutdown).await;

    // Stop streaming and disable the SDR module so the board is left idle.
    device.close().await;

    info!("EvilCrow RF bridge stopped");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
