//! The RTL-TCP server: accept loop and per-client session lifecycle.
//!
//! The bridge serves one client at a time. The lifecycle is a small state
//! machine:
//!
//! ```text
//! Idle → AwaitingClient → Handshaking → Active → Draining → AwaitingClient …
//!                                                              ↘ Shutdown
//! ```
//!
//! - `Idle → AwaitingClient` happens in [`BridgeServer::bind`]; the caller
//!   has already connected the device, and a bind failure is fatal.
//! - On accept the socket gets `TCP_NODELAY` and the fixed 12-byte
//!   dongle-info record, then two loops run concurrently: the command-read
//!   loop (in the accept task) and the sample streamer (spawned).
//! - `Draining` cancels both loops cooperatively, waits a bounded time for
//!   the streamer to finish, and returns to accepting. Connection attempts
//!   made while a client was active have been waiting in the OS backlog and
//!   are picked up now.
//!
//! Per-client failures never escape the session: whatever happens, the
//! server ends up back in `AwaitingClient`.

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use ecrf_core::{parse_frames, DongleInfo};

use crate::application::apply_command;
use crate::domain::BridgeConfig;
use crate::infrastructure::device_session::DeviceSession;
use crate::infrastructure::streamer::run_streamer;

/// Fatal server errors. Anything per-client is handled inside the session.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("bind failed on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
}

/// Lifecycle state, used for log lines only; the control flow of
/// [`BridgeServer::run`] is the real state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ServerState {
    AwaitingClient,
    Handshaking,
    Active,
    Draining,
    Shutdown,
}

impl fmt::Display for ServerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ServerState::AwaitingClient => "awaiting-client",
            ServerState::Handshaking => "handshaking",
            ServerState::Active => "active",
            ServerState::Draining => "draining",
            ServerState::Shutdown => "shutdown",
        };
        f.write_str(name)
    }
}

/// The TCP listener plus everything a client session needs.
pub struct BridgeServer {
    listener: TcpListener,
    local_addr: SocketAddr,
    device: Arc<DeviceSession>,
    config: Arc<BridgeConfig>,
}

impl BridgeServer {
    /// Binds the RTL-TCP listener. The device session must already be
    /// connected; together with this bind that completes startup.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Bind`] when the port is unavailable. Fatal:
    /// the bridge never starts accepting.
    pub async fn bind(
        config: Arc<BridgeConfig>,
        device: Arc<DeviceSession>,
    ) -> Result<Self, BridgeError> {
        let addr = config.tcp_bind_addr;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| BridgeError::Bind { addr, source })?;
        // With port 0 the OS picks the port; report the real one.
        let local_addr = listener.local_addr().map_err(|source| BridgeError::Bind {
            addr,
            source,
        })?;
        info!(%local_addr, "RTL-TCP server listening");
        Ok(Self {
            listener,
            local_addr,
            device,
            config,
        })
    }

    /// The bound address, with the OS-assigned port when binding to port 0.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accepts and serves clients, one at a time, until `shutdown` fires.
    ///
    /// The accept call is polled with a bounded timeout so an external
    /// shutdown request is observed within one interval even while idle.
    pub async fn run(&self, shutdown: CancellationToken) {
        info!(state = %ServerState::AwaitingClient, "ready for a client");
        loop {
            if shutdown.is_cancelled() {
                break;
            }
            match timeout(self.config.accept_poll_timeout, self.listener.accept()).await {
                Err(_) => continue, // poll timeout; re-check shutdown
                Ok(Err(e)) => {
                    // Transient accept failure (fd exhaustion etc.); back off
                    // briefly so a persistent one cannot spin the loop hot.
                    warn!(error = %e, "accept failed");
                    tokio::select! {
                        _ = sleep(Duration::from_millis(100)) => {}
                        _ = shutdown.cancelled() => {}
                    }
                }
                Ok(Ok((stream, peer))) => {
                    info!(%peer, state = %ServerState::Handshaking, "client connected");
                    self.serve_client(stream, peer, &shutdown).await;
                    info!(state = %ServerState::AwaitingClient, "ready for next client");
                }
            }
        }

        info!(state = %ServerState::Shutdown, "server stopping");
        // Ordered best-effort teardown; the device session itself is closed
        // by the caller that created it.
        self.device.stop_streaming().await;
    }

    /// Runs one complete client session: handshake, concurrent command and
    /// streamer loops, then the Draining teardown. Never returns an error;
    /// all failures end the session and are absorbed here.
    async fn serve_client(&self, mut stream: TcpStream, peer: SocketAddr, shutdown: &CancellationToken) {
        if let Err(e) = stream.set_nodelay(true) {
            debug!(error = %e, "could not enable TCP_NODELAY");
        }

        // Handshake: the fixed 12-byte dongle-info record, before anything else.
        if let Err(e) = stream.write_all(&DongleInfo::BRIDGE.encode()).await {
            warn!(%peer, error = %e, "handshake write failed");
            return;
        }
        debug!(%peer, "sent dongle-info handshake (12 bytes)");

        let (read_half, write_half) = stream.into_split();
        let session_cancel = shutdown.child_token();
        let mut streamer = tokio::spawn(run_streamer(
            write_half,
            Arc::clone(&self.device),
            session_cancel.clone(),
            Arc::clone(&self.config),
        ));

        info!(%peer, state = %ServerState::Active, "session running");
        self.command_loop(read_half, peer, &session_cancel, &streamer).await;

        // Draining: cancel both loops, bounded wait for the streamer, then
        // drop the socket halves and go back to accepting.
        info!(%peer, state = %ServerState::Draining, "tearing down session");
        session_cancel.cancel();
        match timeout(self.config.drain_join_timeout, &mut streamer).await {
            Ok(_) => debug!(%peer, "streamer joined"),
            Err(_) => {
                warn!(%peer, "streamer did not stop within join timeout; aborting task");
                streamer.abort();
                // The abort may have pre-empted the streamer's own stop call;
                // the flag swap inside stop_streaming keeps this one-shot.
                self.device.stop_streaming().await;
            }
        }
    }

    /// Reads 5-byte command frames until the client disconnects, the socket
    /// errors, the streamer exits, or the session is cancelled.
    ///
    /// The read is polled with a bounded timeout so cancellation and a
    /// finished streamer are both observed within one interval. Frames are
    /// parsed per read buffer; a trailing partial frame is discarded, which
    /// is how rtl_tcp treats stream segmentation as well.
    async fn command_loop(
        &self,
        mut read_half: OwnedReadHalf,
        peer: SocketAddr,
        cancel: &CancellationToken,
        streamer: &tokio::task::JoinHandle<()>,
    ) {
        use tokio::io::AsyncReadExt;

        let mut buf = vec![0u8; 1024];
        loop {
            if streamer.is_finished() {
                debug!(%peer, "streamer exited; ending command loop");
                break;
            }
            tokio::select! {
                _ = cancel.cancelled() => break,
                result = timeout(self.config.command_poll_timeout, read_half.read(&mut buf)) => {
                    match result {
                        Err(_) => continue, // poll timeout; re-check streamer/cancel
                        Ok(Ok(0)) => {
                            info!(%peer, "client disconnected");
                            break;
                        }
                        Ok(Ok(n)) => {
                            for cmd in parse_frames(&buf[..n]) {
                                apply_command(&self.device, cmd).await;
                            }
                        }
                        Ok(Err(e)) => {
                            // Reset/broken pipe: a normal way for a session to end.
                            info!(%peer, error = %e, "client socket error");
                            break;
                        }
                    }
                }
            }
        }
    }
}
