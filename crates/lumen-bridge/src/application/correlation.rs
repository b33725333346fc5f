//! Correlation of relative commands over a protocol without transaction IDs.
//!
//! The gateway has no way to say "reply 1234 answers request 1234".  A
//! relative command ("adjust 4/21/7 by +10") therefore cannot be computed
//! locally: the bridge must first learn the current level, and the only
//! sources are an address-keyed status reply to a `GET` and the unrelated,
//! asynchronous event-stream broadcasts — both funneled into
//! [`CorrelationEngine::on_level_update`].
//!
//! # Algorithm
//!
//! For an adjust on address A: register a one-shot waiter under A, enqueue
//! `GET A`, and when *any* level update for A arrives, compute
//! `clamp(current + step, 0, 255)` and enqueue `RAMP A <new>`.  The waiter
//! self-discards on fire.
//!
//! # Known race (kept by design)
//!
//! Two adjusts for the same address issued before the first `GET` reply both
//! resolve against that same first reply — the second computation may use a
//! stale level.  The protocol offers no transaction ID to disambiguate, so
//! this is an accepted property of the design, documented rather than
//! silently patched.  Waiters that never fire are reclaimed by a timeout:
//! logged and dropped, no `RAMP` is sent from a guess.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use lumen_core::clamp_level;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::domain::Command;
use crate::infrastructure::ThrottledQueue;

/// Resolves relative level commands via one-shot, address-keyed waiters.
pub struct CorrelationEngine {
    /// Pending one-shot waiters per address.  All waiters for an address
    /// drain on the first level update for it (see the module-level race
    /// note).
    waiters: Mutex<HashMap<String, Vec<oneshot::Sender<u8>>>>,
    /// The outbound command queue shared with the rest of the bridge.
    commands: ThrottledQueue<Command>,
    /// How long a waiter may stay pending before it is reclaimed.
    timeout: Duration,
}

impl CorrelationEngine {
    pub fn new(commands: ThrottledQueue<Command>, timeout: Duration) -> Arc<Self> {
        Arc::new(Self {
            waiters: Mutex::new(HashMap::new()),
            commands,
            timeout,
        })
    }

    /// Feeds one level reading into the engine.
    ///
    /// Every waiter currently registered for `address` fires with `level`
    /// and is removed.  Updates for addresses with no waiters are ignored —
    /// the event stream broadcasts far more than the engine ever asks about.
    pub fn on_level_update(&self, address: &str, level: u8) {
        let fired = {
            let mut waiters = self.waiters.lock().expect("waiter map poisoned");
            waiters.remove(address)
        };
        if let Some(senders) = fired {
            debug!(address, level, waiters = senders.len(), "level update resolves waiters");
            for tx in senders {
                let _ = tx.send(level);
            }
        }
    }

    /// Issues a relative adjustment: `GET` now, `RAMP` once the level is known.
    ///
    /// Returns immediately; the continuation runs on its own task.  The new
    /// level is clamped to the raw `0..=255` range.
    pub fn adjust(self: &Arc<Self>, address: &str, step: i32) {
        let (tx, rx) = oneshot::channel();
        {
            let mut waiters = self.waiters.lock().expect("waiter map poisoned");
            waiters.entry(address.to_string()).or_default().push(tx);
        }

        debug!(address, step, "querying current level for relative command");
        self.commands.add(Command::new(format!("GET {address}")));

        let engine = Arc::clone(self);
        let address = address.to_string();
        tokio::spawn(async move {
            match tokio::time::timeout(engine.timeout, rx).await {
                Ok(Ok(current)) => {
                    let new_level = clamp_level(current as i32 + step);
                    debug!(
                        address = %address,
                        current,
                        step,
                        new_level,
                        "relative command resolved"
                    );
                    engine
                        .commands
                        .add(Command::new(format!("RAMP {address} {new_level}")));
                }
                Ok(Err(_)) => {
                    // The engine dropped the sender (shutdown); nothing to do.
                    debug!(address = %address, "waiter cancelled");
                }
                Err(_) => {
                    warn!(
                        address = %address,
                        step,
                        "no level reading before timeout; dropping relative command"
                    );
                    engine.reap_closed_waiters(&address);
                }
            }
        });
    }

    /// Number of waiters currently pending for `address`.
    pub fn pending_waiters(&self, address: &str) -> usize {
        self.waiters
            .lock()
            .expect("waiter map poisoned")
            .get(address)
            .map_or(0, Vec::len)
    }

    /// Drops senders whose receivers are gone (timed-out continuations).
    fn reap_closed_waiters(&self, address: &str) {
        let mut waiters = self.waiters.lock().expect("waiter map poisoned");
        if let Some(senders) = waiters.get_mut(address) {
            senders.retain(|tx| !tx.is_closed());
            if senders.is_empty() {
                waiters.remove(address);
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
