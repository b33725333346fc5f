//! Integration tests for the gateway connection pool.
//!
//! # Purpose
//!
//! These tests exercise the `ConnectionPool` through its *public* API against
//! a real TCP listener on a loopback ephemeral port.  They verify:
//!
//! - The happy path: the pool connects, reports started, and delivers
//!   newline-terminated commands to the server.
//! - Inbound traffic: lines written by the server surface as `PoolEvent::Line`
//!   tagged with the originating slot.
//! - The error paths: `execute` fails fast with `NoHealthyConnection` when
//!   nothing is connected, and with `PoolStopped` after `stop()`.
//! - Recovery: a dropped connection produces a disconnect event and the slot
//!   reconnects on its own.
//!
//! # Test server
//!
//! Each test spawns a minimal accept loop that forwards everything it reads,
//! line by line, into an `mpsc` channel.  No assertions run inside spawned
//! tasks; the test body owns all the checks.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::timeout;

use lumen_bridge::domain::ExecuteError;
use lumen_bridge::infrastructure::{ConnectionPool, PoolConfig, PoolEvent};

// ── Helpers ───────────────────────────────────────────────────────────────────

/// Pool settings tuned for tests: fast reconnects, one required connection.
fn test_pool_config(addr: SocketAddr, size: usize) -> PoolConfig {
    PoolConfig {
        addr,
        size,
        min_healthy: 1,
        reconnect_base: Duration::from_millis(20),
        reconnect_max: Duration::from_millis(100),
    }
}

/// Binds a loopback listener and forwards every received line to the
/// returned channel, tagged with a per-connection sequence number.
async fn spawn_line_server() -> (SocketAddr, mpsc::UnboundedReceiver<(usize, String)>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        let mut conn_seq = 0usize;
        while let Ok((socket, _)) = listener.accept().await {
            let conn = conn_seq;
            conn_seq += 1;
            let tx = tx.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(socket).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    if tx.send((conn, line)).is_err() {
                        return;
                    }
                }
            });
        }
    });

    (addr, rx)
}

/// Waits for the next event, panicking after two seconds.
async fn next_event(rx: &mut mpsc::Receiver<PoolEvent>) -> PoolEvent {
    timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("timed out waiting for pool event")
        .expect("pool event channel closed")
}

// ── Startup and outbound path ─────────────────────────────────────────────────

/// The pool connects all slots and `started` resolves once the minimum
/// healthy count is reached.
#[tokio::test]
async fn test_pool_connects_and_reports_started() {
    // Arrange
    let (addr, _server_rx) = spawn_line_server().await;
    let pool = ConnectionPool::new(test_pool_config(addr, 3));

    // Act
    let mut events = pool.start();
    timeout(Duration::from_secs(2), pool.started())
        .await
        .expect("pool never reported started");

    // Assert — all three slots eventually connect
    let mut connected = 0;
    while connected < 3 {
        if let PoolEvent::SlotConnected { .. } = next_event(&mut events).await {
            connected += 1;
        }
    }
    assert_eq!(pool.healthy_count(), 3);

    pool.stop();
}

/// `execute` writes one newline-terminated command that the server receives
/// verbatim.
#[tokio::test]
async fn test_execute_delivers_line_to_server() {
    // Arrange
    let (addr, mut server_rx) = spawn_line_server().await;
    let pool = ConnectionPool::new(test_pool_config(addr, 1));
    let _events = pool.start();
    timeout(Duration::from_secs(2), pool.started())
        .await
        .expect("pool never started");

    // Act
    let slot = pool.execute("RAMP 4/21/7 128").await.expect("execute");

    // Assert
    let (_conn, line) = timeout(Duration::from_secs(2), server_rx.recv())
        .await
        .expect("server saw no line")
        .expect("server channel closed");
    assert_eq!(line, "RAMP 4/21/7 128");
    assert_eq!(slot, 0);

    pool.stop();
}

/// Repeated `execute` calls all reach the server, spread over the pooled
/// connections.
#[tokio::test]
async fn test_repeated_execute_uses_the_pool() {
    // Arrange
    let (addr, mut server_rx) = spawn_line_server().await;
    let pool = ConnectionPool::new(PoolConfig {
        min_healthy: 2,
        ..test_pool_config(addr, 2)
    });
    let _events = pool.start();
    timeout(Duration::from_secs(2), pool.started())
        .await
        .expect("pool never started");

    // Act
    for n in 0..4 {
        pool.execute(&format!("GET 4/21/{n}")).await.expect("execute");
    }

    // Assert — all four lines arrive, across more than one connection
    let mut received = Vec::new();
    let mut conns = std::collections::HashSet::new();
    for _ in 0..4 {
        let (conn, line) = timeout(Duration::from_secs(2), server_rx.recv())
            .await
            .expect("server saw too few lines")
            .expect("server channel closed");
        conns.insert(conn);
        received.push(line);
    }
    received.sort();
    assert_eq!(received, ["GET 4/21/0", "GET 4/21/1", "GET 4/21/2", "GET 4/21/3"]);
    assert!(conns.len() > 1, "round-robin must touch both connections");

    pool.stop();
}

// ── Inbound path ──────────────────────────────────────────────────────────────

/// Lines written by the server surface as `PoolEvent::Line` with the slot
/// index attached.
#[tokio::test]
async fn test_server_lines_surface_as_pool_events() {
    // Arrange — a server that greets every connection with two lines
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let _ = socket.write_all(b"300 4/21/7: level=128\n4/21/8 level=0\n").await;
                // Keep the socket open so the pool does not reconnect.
                tokio::time::sleep(Duration::from_secs(5)).await;
            });
        }
    });
    let pool = ConnectionPool::new(test_pool_config(addr, 1));

    // Act
    let mut events = pool.start();

    // Assert — connect event, then both lines tagged with slot 0
    let mut lines = Vec::new();
    while lines.len() < 2 {
        match next_event(&mut events).await {
            PoolEvent::Line { slot, line } => {
                assert_eq!(slot, 0);
                lines.push(line);
            }
            PoolEvent::SlotConnected { .. } => {}
            other => panic!("unexpected event: {other:?}"),
        }
    }
    assert_eq!(lines, ["300 4/21/7: level=128", "4/21/8 level=0"]);

    pool.stop();
}

// ── Failure paths ─────────────────────────────────────────────────────────────

/// With no healthy connection, `execute` fails immediately instead of
/// queueing or retrying.
#[tokio::test]
async fn test_execute_fails_fast_without_connections() {
    // Arrange — grab a port, then close it so connects are refused
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    drop(listener);
    let pool = ConnectionPool::new(test_pool_config(addr, 2));
    let _events = pool.start();

    // Act — no waiting; the call must not block on reconnect attempts
    let result = timeout(Duration::from_millis(200), pool.execute("GET 4/21/7"))
        .await
        .expect("execute must not block");

    // Assert
    assert_eq!(result, Err(ExecuteError::NoHealthyConnection));

    pool.stop();
}

/// After `stop`, `execute` reports `PoolStopped` and `stop` stays idempotent.
#[tokio::test]
async fn test_execute_after_stop_reports_pool_stopped() {
    // Arrange
    let (addr, _server_rx) = spawn_line_server().await;
    let pool = ConnectionPool::new(test_pool_config(addr, 1));
    let _events = pool.start();
    timeout(Duration::from_secs(2), pool.started())
        .await
        .expect("pool never started");

    // Act
    pool.stop();
    pool.stop(); // second call is a no-op

    // Assert
    assert_eq!(pool.execute("GET 4/21/7").await, Err(ExecuteError::PoolStopped));
}

/// With one slot permanently refused, every `execute` still dispatches via
/// the healthy slot.
#[tokio::test]
async fn test_failover_routes_every_execute_via_the_healthy_slot() {
    // Arrange — accept exactly one connection, then refuse all others
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    let (tx, mut server_rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        let (socket, _) = listener.accept().await.expect("first accept");
        drop(listener); // later connects are refused; the second slot never heals
        let mut lines = BufReader::new(socket).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if tx.send(line).is_err() {
                return;
            }
        }
    });
    let pool = ConnectionPool::new(test_pool_config(addr, 2));
    let _events = pool.start();
    timeout(Duration::from_secs(2), pool.started())
        .await
        .expect("pool never started");

    // Act — more commands than slots
    for n in 0..5 {
        pool.execute(&format!("GET 4/21/{n}")).await.expect("execute");
    }

    // Assert — every line made it through the one live connection
    let mut received = Vec::new();
    for _ in 0..5 {
        let line = timeout(Duration::from_secs(2), server_rx.recv())
            .await
            .expect("server saw too few lines")
            .expect("server channel closed");
        received.push(line);
    }
    assert_eq!(
        received,
        ["GET 4/21/0", "GET 4/21/1", "GET 4/21/2", "GET 4/21/3", "GET 4/21/4"]
    );
    assert_eq!(pool.healthy_count(), 1);

    pool.stop();
}

/// A dropped server connection produces a disconnect event and the slot
/// reconnects by itself.
#[tokio::test]
async fn test_slot_reconnects_after_server_drop() {
    // Arrange — a server that closes its first connection immediately
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        let mut first = true;
        loop {
            let Ok((socket, _)) = listener.accept().await else {
                return;
            };
            if first {
                first = false;
                drop(socket); // force a disconnect on the pool side
            } else {
                keep_open(socket);
            }
        }
    });
    let pool = ConnectionPool::new(test_pool_config(addr, 1));

    // Act
    let mut events = pool.start();

    // Assert — connected, dropped, connected again
    let mut saw_disconnect = false;
    let mut connects = 0;
    while connects < 2 {
        match next_event(&mut events).await {
            PoolEvent::SlotConnected { slot } => {
                assert_eq!(slot, 0);
                connects += 1;
            }
            PoolEvent::SlotDisconnected { slot } => {
                assert_eq!(slot, 0);
                saw_disconnect = true;
            }
            PoolEvent::Line { .. } => {}
        }
    }
    assert!(saw_disconnect, "the dropped connection must be reported");

    pool.stop();
}

/// Parks a socket in a task so the peer sees it stay open.
fn keep_open(socket: TcpStream) {
    tokio::spawn(async move {
        let _socket = socket;
        tokio::time::sleep(Duration::from_secs(5)).await;
    });
}
