//! Pooled TCP connections to the gateway.
//!
//! The gateway's command port drops sessions under load and after idle
//! periods, so the bridge keeps a small pool of persistent connections
//! (default 3) and reconnects each one independently with exponential
//! backoff.  Commands dispatch over whichever connection is currently
//! healthy; inbound bytes are framed per connection and tagged with the
//! originating slot so the consumer can keep per-slot state keyed by a
//! stable integer index rather than by connection identity.
//!
//! # Slot lifecycle
//!
//! Each slot runs one owning task: connect → publish `SlotConnected` → read
//! lines until the socket dies → publish `SlotDisconnected` → back off →
//! retry, forever, until the pool stops.  The slot's [`LineFramer`] is
//! created per established socket and dropped with it, so stale partial-line
//! bytes from a dead socket can never leak into its replacement.
//!
//! # Dispatch
//!
//! [`ConnectionPool::execute`] makes exactly one attempt: it round-robins
//! over the healthy slots, writes the line, and returns.  With no healthy
//! slot it fails fast with [`ExecuteError::NoHealthyConnection`] instead of
//! blocking the caller on a reconnect cycle — callers own their retry
//! policy.  A single slot's repeated failures never take down the pool.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use lumen_core::LineFramer;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch, Mutex};
use tracing::{debug, info, warn};

use crate::domain::ExecuteError;

/// Configuration for one connection pool.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// The gateway port this pool connects to.
    pub addr: SocketAddr,
    /// Number of pooled connections.
    pub size: usize,
    /// Healthy connections required before [`ConnectionPool::started`]
    /// resolves.
    pub min_healthy: usize,
    /// First reconnect delay; doubles per consecutive failure.
    pub reconnect_base: Duration,
    /// Upper bound on the reconnect delay.
    pub reconnect_max: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:20023".parse().unwrap(),
            size: 3,
            min_healthy: 1,
            reconnect_base: Duration::from_secs(1),
            reconnect_max: Duration::from_secs(30),
        }
    }
}

/// Connection state of one pool slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    Disconnected,
    Connecting,
    Connected,
}

/// Events emitted by the pool to its consumer.
///
/// Lines carry the originating slot index so the consumer can keep any
/// per-connection state keyed by a stable integer that survives reconnects.
#[derive(Debug, PartialEq, Eq)]
pub enum PoolEvent {
    /// One complete, trimmed line arrived on `slot`.
    Line { slot: usize, line: String },
    /// `slot` established a connection.
    SlotConnected { slot: usize },
    /// `slot` lost its connection; its framer has been discarded.
    SlotDisconnected { slot: usize },
}

/// Per-slot state shared between the slot task and `execute`.
struct Slot {
    /// Write half of the current socket, present only while connected.
    writer: Mutex<Option<tokio::net::tcp::OwnedWriteHalf>>,
    /// Consecutive connect failures, for logs and backoff diagnostics.
    failures: AtomicU32,
}

struct PoolShared {
    config: PoolConfig,
    slots: Vec<Slot>,
    /// One entry per slot; a single mutex keeps the healthy count consistent.
    states: StdMutex<Vec<SlotState>>,
    healthy_tx: watch::Sender<usize>,
    healthy_rx: watch::Receiver<usize>,
    /// Round-robin cursor for `execute`.
    cursor: AtomicUsize,
    stop_tx: watch::Sender<bool>,
    stop_rx: watch::Receiver<bool>,
}

impl PoolShared {
    /// Records a slot state change and republishes the healthy count.
    fn set_slot_state(&self, slot: usize, new_state: SlotState) {
        let mut states = self.states.lock().expect("pool state mutex poisoned");
        states[slot] = new_state;
        let healthy = states
            .iter()
            .filter(|s| **s == SlotState::Connected)
            .count();
        let _ = self.healthy_tx.send(healthy);
    }
}

/// A pool of persistent, independently-reconnecting gateway connections.
pub struct ConnectionPool {
    shared: Arc<PoolShared>,
}

impl ConnectionPool {
    /// Creates a stopped pool.  No sockets are opened until [`start`].
    ///
    /// [`start`]: ConnectionPool::start
    pub fn new(config: PoolConfig) -> Self {
        let size = config.size.max(1);
        let slots = (0..size)
            .map(|_| Slot {
                writer: Mutex::new(None),
                failures: AtomicU32::new(0),
            })
            .collect();
        let (healthy_tx, healthy_rx) = watch::channel(0usize);
        let (stop_tx, stop_rx) = watch::channel(false);
        Self {
            shared: Arc::new(PoolShared {
                config: PoolConfig { size, ..config },
                slots,
                states: StdMutex::new(vec![SlotState::Disconnected; size]),
                healthy_tx,
                healthy_rx,
                cursor: AtomicUsize::new(0),
                stop_tx,
                stop_rx,
            }),
        }
    }

    /// Spawns one owning task per slot and returns the inbound event stream.
    ///
    /// Call once per pool; the returned receiver delivers framed lines and
    /// slot state changes until the pool stops.
    pub fn start(&self) -> mpsc::Receiver<PoolEvent> {
        let (event_tx, event_rx) = mpsc::channel(256);
        info!(
            addr = %self.shared.config.addr,
            size = self.shared.config.size,
            "starting connection pool"
        );
        for slot in 0..self.shared.config.size {
            let shared = Arc::clone(&self.shared);
            let events = event_tx.clone();
            let stop = self.shared.stop_rx.clone();
            tokio::spawn(run_slot(shared, slot, events, stop));
        }
        event_rx
    }

    /// Resolves once at least `min_healthy` slots are connected.
    ///
    /// Returns immediately if the pool is already past the threshold, and
    /// also resolves (without the threshold) if the pool is stopped while
    /// waiting, so callers never hang on a dead pool.
    pub async fn started(&self) {
        let mut healthy = self.shared.healthy_rx.clone();
        let mut stop = self.shared.stop_rx.clone();
        loop {
            if *healthy.borrow() >= self.shared.config.min_healthy || *stop.borrow() {
                return;
            }
            tokio::select! {
                changed = healthy.changed() => {
                    if changed.is_err() {
                        return;
                    }
                }
                _ = stop.changed() => return,
            }
        }
    }

    /// Number of currently connected slots.
    pub fn healthy_count(&self) -> usize {
        *self.shared.healthy_rx.borrow()
    }

    /// Writes `line` (plus the delimiter) on one healthy connection.
    ///
    /// Exactly one attempt: round-robins over healthy slots, writes, and
    /// returns the slot index used.  Never waits for a reconnect.
    ///
    /// # Errors
    ///
    /// - [`ExecuteError::PoolStopped`] after [`stop`](ConnectionPool::stop).
    /// - [`ExecuteError::NoHealthyConnection`] when no slot is connected.
    /// - [`ExecuteError::WriteFailed`] when the chosen socket rejected the
    ///   write; the slot is marked unhealthy and will reconnect on its own.
    pub async fn execute(&self, line: &str) -> Result<usize, ExecuteError> {
        if *self.shared.stop_rx.borrow() {
            return Err(ExecuteError::PoolStopped);
        }

        let size = self.shared.config.size;
        let start = self.shared.cursor.fetch_add(1, Ordering::Relaxed);
        let framed = format!("{line}\n");

        for offset in 0..size {
            let slot = (start + offset) % size;
            {
                let states = self.shared.states.lock().expect("pool state mutex poisoned");
                if states[slot] != SlotState::Connected {
                    continue;
                }
            }

            let mut writer = self.shared.slots[slot].writer.lock().await;
            let Some(w) = writer.as_mut() else {
                // Lost the race with a disconnecting slot task; try the next.
                continue;
            };
            return match w.write_all(framed.as_bytes()).await {
                Ok(()) => {
                    debug!(slot, line, "command dispatched");
                    Ok(slot)
                }
                Err(e) => {
                    warn!(slot, error = %e, "write failed; marking slot unhealthy");
                    *writer = None;
                    drop(writer);
                    self.shared.set_slot_state(slot, SlotState::Disconnected);
                    Err(ExecuteError::WriteFailed {
                        slot,
                        message: e.to_string(),
                    })
                }
            };
        }

        Err(ExecuteError::NoHealthyConnection)
    }

    /// Stops the pool: slot tasks exit, sockets close, health state clears.
    ///
    /// Idempotent and safe to call at any time, including mid-retry.
    pub fn stop(&self) {
        if self.shared.stop_tx.send_replace(true) {
            return; // already stopped
        }
        info!(addr = %self.shared.config.addr, "stopping connection pool");
    }
}

/// Computes the reconnect delay for a given consecutive-failure count.
fn backoff_delay(base: Duration, max: Duration, failures: u32) -> Duration {
    let exp = failures.min(16); // 2^16 * any sane base already exceeds max
    base.saturating_mul(1u32 << exp).min(max)
}

/// One slot's connect/read/retry loop.  Owns the slot's socket and framer.
async fn run_slot(
    shared: Arc<PoolShared>,
    slot: usize,
    events: mpsc::Sender<PoolEvent>,
    mut stop: watch::Receiver<bool>,
) {
    loop {
        if *stop.borrow() {
            break;
        }

        shared.set_slot_state(slot, SlotState::Connecting);
        debug!(slot, addr = %shared.config.addr, "connecting");

        let connect = tokio::select! {
            result = TcpStream::connect(shared.config.addr) => Some(result),
            _ = stop.changed() => None,
        };

        match connect {
            Some(Ok(stream)) => {
                shared.slots[slot].failures.store(0, Ordering::Relaxed);
                let (read_half, write_half) = stream.into_split();
                {
                    let mut writer = shared.slots[slot].writer.lock().await;
                    *writer = Some(write_half);
                }
                shared.set_slot_state(slot, SlotState::Connected);
                info!(slot, addr = %shared.config.addr, "connection established");
                if events.send(PoolEvent::SlotConnected { slot }).await.is_err() {
                    break; // consumer gone; pool is shutting down
                }

                read_lines(slot, read_half, &events, &mut stop).await;

                // The socket is gone; drop the write half with it.
                {
                    let mut writer = shared.slots[slot].writer.lock().await;
                    *writer = None;
                }
                shared.set_slot_state(slot, SlotState::Disconnected);
                let _ = events.send(PoolEvent::SlotDisconnected { slot }).await;
            }
            Some(Err(e)) => {
                let failures = shared.slots[slot].failures.fetch_add(1, Ordering::Relaxed) + 1;
                shared.set_slot_state(slot, SlotState::Disconnected);
                warn!(slot, error = %e, failures, "connect failed");
            }
            None => break, // stop signalled during connect
        }

        if *stop.borrow() {
            break;
        }
        let delay = backoff_delay(
            shared.config.reconnect_base,
            shared.config.reconnect_max,
            shared.slots[slot].failures.load(Ordering::Relaxed),
        );
        debug!(slot, delay_ms = delay.as_millis() as u64, "backing off before reconnect");
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = stop.changed() => {}
        }
    }

    // Leave nothing behind: a stopping slot clears its writer and health.
    {
        let mut writer = shared.slots[slot].writer.lock().await;
        *writer = None;
    }
    shared.set_slot_state(slot, SlotState::Disconnected);
    debug!(slot, "slot task exited");
}

/// Reads and frames inbound bytes until the socket dies or the pool stops.
///
/// The framer lives exactly as long as this socket: created here, dropped
/// here.  A trailing partial line at disconnect is discarded.
async fn read_lines(
    slot: usize,
    mut read_half: tokio::net::tcp::OwnedReadHalf,
    events: &mpsc::Sender<PoolEvent>,
    stop: &mut watch::Receiver<bool>,
) {
    let mut framer = LineFramer::new();
    let mut read_buf = vec![0u8; 4096];

    loop {
        let n = tokio::select! {
            result = read_half.read(&mut read_buf) => match result {
                Ok(0) => {
                    debug!(slot, "gateway closed the connection");
                    break;
                }
                Ok(n) => n,
                Err(e) => {
                    warn!(slot, error = %e, "read failed");
                    break;
                }
            },
            _ = stop.changed() => break,
        };

        // Collect first: the framer callback is synchronous, the channel
        // send is not.
        let mut lines = Vec::new();
        framer.process_data(&read_buf[..n], |line| lines.push(line.to_string()));
        for line in lines {
            if events.send(PoolEvent::Line { slot, line }).await.is_err() {
                return;
            }
        }
    }

    let discarded = framer.close();
    if discarded > 0 {
        debug!(slot, discarded, "partial line discarded with dead socket");
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
