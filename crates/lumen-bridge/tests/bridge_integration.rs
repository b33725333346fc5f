//! End-to-end integration tests for the assembled bridge.
//!
//! # Purpose
//!
//! These tests run the whole bridge — connection pool, event stream,
//! throttled queue, correlation engine, readiness barrier — against two real
//! loopback TCP listeners playing the gateway's command and event ports, and
//! a recording stand-in for the broker link.  They verify the flows a
//! deployment actually exercises:
//!
//! - A level line on the event stream is republished retained on the level
//!   topic.
//! - A `set` message from the broker arrives at the command port as an
//!   absolute `RAMP`.
//! - An `adjust` message triggers a `GET`, and the gateway's reply produces
//!   the relative `RAMP`.
//! - Flipping the shutdown watch makes `run` return and close the sockets.
//!
//! # Fake gateway
//!
//! The command listener echoes nothing by itself; tests that need a reply
//! write it explicitly through the accepted socket.  The event listener only
//! ever writes.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};
use tokio::time::timeout;

use lumen_bridge::application::Bridge;
use lumen_bridge::domain::BridgeConfig;
use lumen_bridge::infrastructure::{BrokerEvent, BrokerLink};

// ── Recording broker ──────────────────────────────────────────────────────────

/// Broker link that records every publish for later assertions.
struct RecordingBroker {
    published: Mutex<Vec<(String, String, bool)>>,
}

impl RecordingBroker {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            published: Mutex::new(Vec::new()),
        })
    }

    fn published(&self) -> Vec<(String, String, bool)> {
        self.published.lock().unwrap().clone()
    }
}

#[async_trait]
impl BrokerLink for RecordingBroker {
    async fn publish(&self, topic: &str, payload: &[u8], retain: bool) -> anyhow::Result<()> {
        self.published.lock().unwrap().push((
            topic.to_string(),
            String::from_utf8_lossy(payload).into_owned(),
            retain,
        ));
        Ok(())
    }
}

// ── Fake gateway ──────────────────────────────────────────────────────────────

/// One accepted gateway connection: its write half plus the lines it has
/// received so far.
struct GatewayPort {
    addr: SocketAddr,
    lines_rx: mpsc::UnboundedReceiver<String>,
    write_tx: mpsc::UnboundedSender<String>,
}

impl GatewayPort {
    /// Binds a listener that serves every accepted connection: received
    /// lines go out on `lines_rx`, and anything sent to `write_tx` is
    /// written back with a trailing newline.
    async fn bind() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr");
        let (lines_tx, lines_rx) = mpsc::unbounded_channel();
        let (write_tx, write_rx) = mpsc::unbounded_channel::<String>();
        let write_rx = Arc::new(tokio::sync::Mutex::new(write_rx));

        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                let (read_half, mut write_half) = socket.into_split();
                let lines_tx = lines_tx.clone();
                tokio::spawn(async move {
                    let mut lines = BufReader::new(read_half).lines();
                    while let Ok(Some(line)) = lines.next_line().await {
                        if lines_tx.send(line).is_err() {
                            return;
                        }
                    }
                });
                let write_rx = Arc::clone(&write_rx);
                tokio::spawn(async move {
                    // Only one writer drains the channel at a time; newer
                    // connections take over when the previous socket dies.
                    let mut rx = write_rx.lock().await;
                    while let Some(line) = rx.recv().await {
                        if write_half.write_all(format!("{line}\n").as_bytes()).await.is_err() {
                            return;
                        }
                    }
                });
            }
        });

        Self {
            addr,
            lines_rx,
            write_tx,
        }
    }

    async fn next_line(&mut self) -> String {
        timeout(Duration::from_secs(2), self.lines_rx.recv())
            .await
            .expect("timed out waiting for a gateway line")
            .expect("gateway line channel closed")
    }

    fn send(&self, line: &str) {
        self.write_tx.send(line.to_string()).expect("gateway send");
    }
}

/// Running bridge plus the handles a test drives it with.
struct Harness {
    command: GatewayPort,
    event: GatewayPort,
    broker: Arc<RecordingBroker>,
    broker_tx: mpsc::Sender<BrokerEvent>,
    shutdown_tx: watch::Sender<bool>,
    run_handle: tokio::task::JoinHandle<anyhow::Result<()>>,
}

/// Boots a bridge against two fresh fake gateway ports.
async fn start_bridge() -> Harness {
    start_bridge_with(Duration::from_millis(5)).await
}

/// Same, with an explicit command queue interval for timing-sensitive tests.
async fn start_bridge_with(queue_interval: Duration) -> Harness {
    let command = GatewayPort::bind().await;
    let event = GatewayPort::bind().await;

    let config = BridgeConfig {
        command_addr: command.addr,
        event_addr: event.addr,
        pool_size: 1,
        min_healthy: 1,
        reconnect_base: Duration::from_millis(20),
        reconnect_max: Duration::from_millis(100),
        queue_interval,
        queue_max_size: 100,
        correlation_timeout: Duration::from_secs(2),
        ready_debounce: Duration::from_secs(10),
        topic_prefix: "lumen".to_string(),
    };

    let broker = RecordingBroker::new();
    let (bridge, mut ready_rx) = Bridge::new(config, broker.clone());
    let (broker_tx, broker_rx) = mpsc::channel(16);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let run_handle = tokio::spawn(bridge.run(broker_rx, shutdown_rx));

    // Commands fail fast while nothing is connected, so park until the
    // readiness barrier reports all three links up.
    broker_tx
        .send(BrokerEvent::Connected)
        .await
        .expect("broker connected event");
    timeout(Duration::from_secs(2), ready_rx.recv())
        .await
        .expect("bridge never became ready")
        .expect("ready channel closed");

    Harness {
        command,
        event,
        broker,
        broker_tx,
        shutdown_tx,
        run_handle,
    }
}

/// Polls until `cond` holds or the deadline passes.
async fn wait_until(mut cond: impl FnMut() -> bool) {
    for _ in 0..400 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached within deadline");
}

// ── Tests ─────────────────────────────────────────────────────────────────────

/// An unsolicited level broadcast on the event port ends up as a retained
/// publish on the level topic with both raw and percent readings.
#[tokio::test]
async fn test_event_stream_level_is_republished_retained() {
    // Arrange
    let harness = start_bridge().await;

    // Act — the gateway announces a level on the event stream
    harness.event.send("4/21/1 level=255");
    wait_until(|| !harness.broker.published().is_empty()).await;

    // Assert
    let published = harness.broker.published();
    let (topic, payload, retain) = &published[0];
    assert_eq!(topic, "lumen/4/21/1/level");
    assert!(payload.contains("\"level\":255"));
    assert!(payload.contains("\"percent\":100"));
    assert!(retain);

    harness.shutdown_tx.send(true).expect("shutdown");
}

/// A broker `set` message becomes an absolute `RAMP` on the command port.
#[tokio::test]
async fn test_broker_set_reaches_the_command_port() {
    // Arrange
    let mut harness = start_bridge().await;

    // Act — 100% maps to raw 255
    harness
        .broker_tx
        .send(BrokerEvent::Message {
            topic: "lumen/4/21/2/set".to_string(),
            payload: b"100".to_vec(),
        })
        .await
        .expect("broker send");

    // Assert
    assert_eq!(harness.command.next_line().await, "RAMP 4/21/2 255");

    harness.shutdown_tx.send(true).expect("shutdown");
}

/// A broker `adjust` message first queries the level, then ramps relative to
/// the gateway's reply.
#[tokio::test]
async fn test_broker_adjust_round_trips_through_the_gateway() {
    // Arrange
    let mut harness = start_bridge().await;

    // Act — adjust by -30 against a reported level of 100
    harness
        .broker_tx
        .send(BrokerEvent::Message {
            topic: "lumen/4/21/3/adjust".to_string(),
            payload: b"-30".to_vec(),
        })
        .await
        .expect("broker send");
    assert_eq!(harness.command.next_line().await, "GET 4/21/3");
    harness.command.send("300 4/21/3: level=100");

    // Assert — the relative ramp lands, and the reply itself was republished
    assert_eq!(harness.command.next_line().await, "RAMP 4/21/3 70");
    let published = harness.broker.published();
    assert!(published
        .iter()
        .any(|(topic, _, _)| topic == "lumen/4/21/3/level"));

    harness.shutdown_tx.send(true).expect("shutdown");
}

/// Queued commands respect the configured spacing: the first goes out
/// immediately, later ones are throttled.
#[tokio::test]
async fn test_commands_are_spaced_by_the_queue_interval() {
    // Arrange — an interval far above loopback latency so the gap between
    // the two received lines can only come from the throttle
    let mut harness = start_bridge_with(Duration::from_millis(150)).await;

    // Act — two back-to-back sets
    for n in 0..2 {
        harness
            .broker_tx
            .send(BrokerEvent::Message {
                topic: "lumen/4/21/4/set".to_string(),
                payload: format!("{}", (n + 1) * 10).into_bytes(),
            })
            .await
            .expect("broker send");
    }
    harness.command.next_line().await;
    let first_arrived = std::time::Instant::now();
    harness.command.next_line().await;
    let gap = first_arrived.elapsed();

    // Assert — the second line trailed the first by roughly one interval
    assert!(gap >= Duration::from_millis(100), "gap was {gap:?}");

    harness.shutdown_tx.send(true).expect("shutdown");
}

/// Flipping the shutdown watch ends `run` cleanly.
#[tokio::test]
async fn test_shutdown_watch_stops_the_bridge() {
    // Arrange
    let harness = start_bridge().await;

    // Act
    harness.shutdown_tx.send(true).expect("shutdown");
    let result = timeout(Duration::from_secs(2), harness.run_handle)
        .await
        .expect("run did not return after shutdown")
        .expect("run task panicked");

    // Assert
    assert!(result.is_ok());
}
