//! Shared test fixture: an in-process fake EvilCrow on a duplex pipe.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream};
use tokio::sync::mpsc;

/// Identity string a healthy board reports to `board_id_read`.
pub const GOOD_IDENTITY: &str = "EvilCrow RF v2 (HACKRF compatible)\n";

/// Handle to a fake device task. The device answers every command line with
/// `HACKRF_SUCCESS`, answers `board_id_read` with a configurable identity
/// string, records every line it receives, and writes arbitrary bytes onto
/// the link when asked (standing in for demodulator output).
pub struct FakeDevice {
    lines: Arc<Mutex<Vec<String>>>,
    inject: mpsc::Sender<Vec<u8>>,
}

impl FakeDevice {
    /// Spawns a fake device that identifies as an EvilCrow. Returns the host
    /// side of the link (what the bridge opens as its serial port) and the
    /// control handle.
    pub fn spawn() -> (DuplexStream, Self) {
        Self::spawn_with_identity(GOOD_IDENTITY)
    }

    /// Spawns a fake device with a custom `board_id_read` response, for
    /// exercising the identity-verification failure path.
    pub fn spawn_with_identity(identity: &str) -> (DuplexStream, Self) {
        let (host_side, device_side) = tokio::io::duplex(4096);
        let (read_half, mut write_half) = tokio::io::split(device_side);
        let lines = Arc::new(Mutex::new(Vec::new()));
        let (inject_tx, mut inject_rx) = mpsc::channel::<Vec<u8>>(16);

        let identity = identity.to_string();
        let recorded = Arc::clone(&lines);
        tokio::spawn(async move {
            let mut reader = BufReader::new(read_half).lines();
            loop {
                tokio::select! {
                    line = reader.next_line() => {
                        let Ok(Some(line)) = line else { break };
                        recorded.lock().unwrap().push(line.clone());
                        let reply = if line == "board_id_read" {
                            identity.clone()
                        } else {
                            "HACKRF_SUCCESS\n".to_string()
                        };
                        if write_half.write_all(reply.as_bytes()).await.is_err() {
                            break;
                        }
                    }
                    bytes = inject_rx.recv() => {
                        let Some(bytes) = bytes else { break };
                        if write_half.write_all(&bytes).await.is_err() {
                            break;
                        }
                    }
                }
            }
        });

        (
            host_side,
            Self {
                lines,
                inject: inject_tx,
            },
        )
    }

    /// Every command line received so far, in order.
    pub fn received_lines(&self) -> Vec<String> {
        self.lines.lock().unwrap().clone()
    }

    /// How many times `line` has been received.
    pub fn count_of(&self, line: &str) -> usize {
        self.lines
            .lock()
            .unwrap()
            .iter()
            .filter(|l| l.as_str() == line)
            .count()
    }

    /// Writes raw bytes onto the link, as the demodulator would while a
    /// transmission is on the air.
    pub async fn emit(&self, bytes: &[u8]) {
        self.inject
            .send(bytes.to_vec())
            .await
            .expect("fake device task gone");
    }
}
