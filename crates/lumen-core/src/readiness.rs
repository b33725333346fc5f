//! Startup readiness barrier over the bridge's three independent links.
//!
//! The bridge only counts as operational when the broker session, the command
//! connection pool, and the event stream are all up — each connects and
//! reconnects on its own schedule.  Expensive startup work (bulk state sync,
//! discovery re-publication) must run when everything is connected, but *not*
//! once per flap when a link bounces.
//!
//! [`ReadinessBarrier`] is a pure state machine: it consumes connect/close
//! signals with an explicit `Instant` and reports transitions.  It performs no
//! I/O and owns no timers, which keeps the debounce behavior deterministic
//! under test.

use std::time::{Duration, Instant};

/// Default debounce window between `BecameReady` signals.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_secs(10);

/// The three independently-connecting links the barrier gates on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Link {
    /// The pub/sub broker session.
    Broker,
    /// The pooled command-port connections (healthy ≥ configured minimum).
    CommandPool,
    /// The unsolicited event-stream connection.
    EventStream,
}

/// The outcome of feeding one connect/close signal into the barrier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// All three links are up and the debounce window allows a signal.
    /// Fired exactly once per qualifying all-true transition.
    BecameReady,
    /// At least one link dropped while the barrier was ready.
    LostReady,
    /// Nothing the caller needs to act on.
    NoChange,
}

/// Synchronizes startup behavior on three independent link states.
///
/// Any link going down flips overall readiness false immediately.  All three
/// coming up fires [`Transition::BecameReady`] — but a fresh all-true within
/// the debounce window of the previous signal is suppressed, so flapping
/// reconnects cannot re-trigger expensive startup actions.
#[derive(Debug)]
pub struct ReadinessBarrier {
    broker: bool,
    command_pool: bool,
    event_stream: bool,
    ready: bool,
    last_signal_at: Option<Instant>,
    debounce: Duration,
}

impl ReadinessBarrier {
    /// Creates a barrier with all links down.
    pub fn new(debounce: Duration) -> Self {
        Self {
            broker: false,
            command_pool: false,
            event_stream: false,
            ready: false,
            last_signal_at: None,
            debounce,
        }
    }

    /// True when all three links are currently up.
    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// Current state of one link.
    pub fn is_connected(&self, link: Link) -> bool {
        match link {
            Link::Broker => self.broker,
            Link::CommandPool => self.command_pool,
            Link::EventStream => self.event_stream,
        }
    }

    /// Feeds one connect/close signal, evaluated at `now`.
    ///
    /// Returns [`Transition::BecameReady`] only on an all-true transition at
    /// least one debounce window after the previous signal (the first ever
    /// always fires).  A suppressed transition still marks the barrier ready;
    /// it fires again only after readiness is lost, the window elapses, and a
    /// fresh all-true transition occurs.
    pub fn set_connected(&mut self, link: Link, connected: bool, now: Instant) -> Transition {
        match link {
            Link::Broker => self.broker = connected,
            Link::CommandPool => self.command_pool = connected,
            Link::EventStream => self.event_stream = connected,
        }

        let all_up = self.broker && self.command_pool && self.event_stream;
        if all_up && !self.ready {
            self.ready = true;
            let fire = match self.last_signal_at {
                None => true,
                Some(at) => now.duration_since(at) >= self.debounce,
            };
            if fire {
                self.last_signal_at = Some(now);
                Transition::BecameReady
            } else {
                Transition::NoChange
            }
        } else if !all_up && self.ready {
            self.ready = false;
            Transition::LostReady
        } else {
            Transition::NoChange
        }
    }
}

impl Default for ReadinessBarrier {
    fn default() -> Self {
        Self::new(DEFAULT_DEBOUNCE)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
