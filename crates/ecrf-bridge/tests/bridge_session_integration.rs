//! End-to-end tests over real TCP sockets: a fake EvilCrow on one side, a
//! raw rtl_tcp client on the other, the full bridge in between.

mod common;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;

use ecrf_bridge::{BridgeConfig, BridgeServer, DeviceSession};

use common::FakeDevice;

/// The exact dongle-info record every client must receive first:
/// `"RTL0"`, tuner type 1, gain count 1, all big-endian.
const HANDSHAKE: [u8; 12] = [
    0x52, 0x54, 0x4C, 0x30, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01,
];

struct Bridge {
    addr: SocketAddr,
    device: Arc<DeviceSession>,
    fake: FakeDevice,
    shutdown: CancellationToken,
    server_task: JoinHandle<()>,
}

impl Bridge {
    /// Connects a fake device, binds the server on an ephemeral port, and
    /// starts the accept loop.
    async fn start() -> Self {
        let config = Arc::new(BridgeConfig::fast_for_tests());
        let (link, fake) = FakeDevice::spawn();
        let device = DeviceSession::connect(link, &config).await.unwrap();
        let server = BridgeServer::bind(Arc::clone(&config), Arc::clone(&device))
            .await
            .unwrap();
        let addr = server.local_addr();
        let shutdown = CancellationToken::new();
        let run_token = shutdown.clone();
        let server_task = tokio::spawn(async move { server.run(run_token).await });
        Self {
            addr,
            device,
            fake,
            shutdown,
            server_task,
        }
    }

    async fn connect_client(&self) -> TcpStream {
        TcpStream::connect(self.addr).await.unwrap()
    }

    /// Waits until the device-side streaming flag is set, so bytes emitted by
    /// the fake device afterwards cannot be swallowed by the rx_start settle.
    async fn wait_streaming(&self) {
        timeout(Duration::from_secs(2), async {
            while !self.device.is_streaming() {
                sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("streamer never reached the streaming state");
    }

    async fn stop(self) {
        self.shutdown.cancel();
        timeout(Duration::from_secs(2), self.server_task)
            .await
            .expect("server did not shut down")
            .unwrap();
        self.device.close().await;
    }
}

#[tokio::test]
async fn test_client_receives_dongle_info_handshake() {
    let bridge = Bridge::start().await;

    let mut client = bridge.connect_client().await;
    let mut buf = [0u8; 12];
    timeout(Duration::from_secs(2), client.read_exact(&mut buf))
        .await
        .expect("handshake timed out")
        .unwrap();
    assert_eq!(buf, HANDSHAKE);

    drop(client);
    bridge.stop().await;
}

#[tokio::test]
async fn test_idle_stream_is_silence() {
    let bridge = Bridge::start().await;

    let mut client = bridge.connect_client().await;
    let mut handshake = [0u8; 12];
    client.read_exact(&mut handshake).await.unwrap();

    // With nothing on the air the stream must be nothing but center bytes.
    let mut buf = [0u8; 256];
    timeout(Duration::from_secs(2), client.read_exact(&mut buf))
        .await
        .expect("silence stream timed out")
        .unwrap();
    assert!(buf.iter().all(|&b| b == 127));

    drop(client);
    bridge.stop().await;
}

#[tokio::test]
async fn test_device_bytes_reach_client_as_iq_pairs() {
    let bridge = Bridge::start().await;

    let mut client = bridge.connect_client().await;
    let mut handshake = [0u8; 12];
    client.read_exact(&mut handshake).await.unwrap();
    bridge.wait_streaming().await;

    bridge.fake.emit(&[0xAB]).await;

    // Scan the stream for the first non-silence byte; it must be the device
    // byte with the fixed neutral quadrature right behind it.
    let found = timeout(Duration::from_secs(2), async {
        let mut buf = [0u8; 256];
        loop {
            let n = client.read(&mut buf).await.unwrap();
            assert!(n > 0, "stream ended before the device byte showed up");
            if let Some(i) = buf[..n].iter().position(|&b| b != 127) {
                assert_eq!(buf[i], 0xAB);
                if i + 1 < n {
                    assert_eq!(buf[i + 1], 127);
                }
                return true;
            }
        }
    })
    .await
    .expect("device byte never appeared in the client stream");
    assert!(found);

    drop(client);
    bridge.stop().await;
}

#[tokio::test]
async fn test_set_frequency_frame_reaches_device() {
    let bridge = Bridge::start().await;

    let mut client = bridge.connect_client().await;
    let mut handshake = [0u8; 12];
    client.read_exact(&mut handshake).await.unwrap();

    // 0x01 = set frequency, param big-endian: 868_000_000 Hz.
    let frame = [0x01, 0x33, 0xBC, 0xA1, 0x00];
    client.write_all(&frame).await.unwrap();

    timeout(Duration::from_secs(2), async {
        while bridge.fake.count_of("set_freq 868000000") == 0 {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("set_freq never reached the device");

    drop(client);
    bridge.stop().await;
}

#[tokio::test]
async fn test_gain_frame_is_translated_from_tenths() {
    let bridge = Bridge::start().await;

    let mut client = bridge.connect_client().await;
    let mut handshake = [0u8; 12];
    client.read_exact(&mut handshake).await.unwrap();

    // 0x04 = set gain, param 300 tenths of a dB → 30 dB on the device.
    let frame = [0x04, 0x00, 0x00, 0x01, 0x2C];
    client.write_all(&frame).await.unwrap();

    timeout(Duration::from_secs(2), async {
        while bridge.fake.count_of("set_gain 30") == 0 {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("set_gain never reached the device");

    drop(client);
    bridge.stop().await;
}

#[tokio::test]
async fn test_second_client_waits_until_first_leaves() {
    let bridge = Bridge::start().await;

    let mut first = bridge.connect_client().await;
    let mut handshake = [0u8; 12];
    first.read_exact(&mut handshake).await.unwrap();

    // The second connection sits in the accept backlog: no handshake yet.
    let mut second = bridge.connect_client().await;
    let mut probe = [0u8; 12];
    let premature = timeout(Duration::from_millis(200), second.read_exact(&mut probe)).await;
    assert!(premature.is_err(), "second client served while first active");

    // First client leaves; the second must now be picked up and served.
    drop(first);
    timeout(Duration::from_secs(2), second.read_exact(&mut probe))
        .await
        .expect("second client was never served")
        .unwrap();
    assert_eq!(probe, HANDSHAKE);

    drop(second);
    bridge.stop().await;
}

#[tokio::test]
async fn test_disconnect_stops_rx_exactly_once() {
    let bridge = Bridge::start().await;

    let mut client = bridge.connect_client().await;
    let mut handshake = [0u8; 12];
    client.read_exact(&mut handshake).await.unwrap();
    bridge.wait_streaming().await;

    drop(client);
    timeout(Duration::from_secs(2), async {
        while bridge.device.is_streaming() {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("session never drained after disconnect");
    sleep(Duration::from_millis(50)).await;

    assert_eq!(bridge.fake.count_of("rx_start"), 1);
    assert_eq!(bridge.fake.count_of("rx_stop"), 1);

    bridge.stop().await;
}

#[tokio::test]
async fn test_each_session_restarts_the_rx_stream() {
    let bridge = Bridge::start().await;

    for _ in 0..2 {
        let mut client = bridge.connect_client().await;
        let mut handshake = [0u8; 12];
        client.read_exact(&mut handshake).await.unwrap();
        bridge.wait_streaming().await;
        drop(client);
        timeout(Duration::from_secs(2), async {
            while bridge.device.is_streaming() {
                sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("session never drained");
    }
    sleep(Duration::from_millis(50)).await;

    assert_eq!(bridge.fake.count_of("rx_start"), 2);
    assert_eq!(bridge.fake.count_of("rx_stop"), 2);

    bridge.stop().await;
}
