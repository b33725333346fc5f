//! Bounded, rate-limited FIFO scheduler for side-effecting operations.
//!
//! The gateway's command port tolerates very little burst load, so every
//! outbound command goes through a [`ThrottledQueue`] that serializes
//! dispatches at a minimum interval.  The first item added to an idle queue
//! dispatches immediately — the common interactive case pays zero added
//! latency — and only sustained bursts are spaced out.
//!
//! # Backpressure
//!
//! The queue is bounded (default 1000 items, 0 = unbounded).  At capacity the
//! *oldest* item is evicted and a drop counter increments; drops are logged at
//! the first and every 100th occurrence so a runaway producer cannot flood the
//! log.  Everything else is strict FIFO.
//!
//! # Drain task lifecycle
//!
//! An idle queue owns no task and no timer.  The add that makes the queue
//! non-empty spawns a drain task; the task pops one item per interval tick
//! and exits as soon as the queue is empty.  `clear()` bumps a generation
//! counter, which any in-flight drain task observes on its next lock and
//! stops, leaving no dangling timers.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::{debug, warn};

/// Processes one queue item.  Implementations are shared across dispatches.
///
/// A returned error is logged together with the queue name; the queue always
/// continues with the next item.
#[async_trait]
pub trait QueueProcessor<T>: Send + Sync {
    async fn process(&self, item: T) -> anyhow::Result<()>;
}

/// One queued payload plus its enqueue timestamp.
struct QueueItem<T> {
    payload: T,
    enqueued_at: Instant,
}

/// Mutable queue state, guarded by one mutex.
struct QueueState<T> {
    items: VecDeque<QueueItem<T>>,
    /// True while a drain task is responsible for this queue.
    draining: bool,
    /// Incremented by `clear()`; a drain task stops when it no longer
    /// matches the generation it was spawned for.
    generation: u64,
    dropped: u64,
}

impl<T> QueueState<T> {
    /// Appends an item, evicting the oldest when at capacity.
    ///
    /// Returns the new drop count when an eviction happened.
    fn enqueue(&mut self, payload: T, max_size: usize) -> Option<u64> {
        let mut evicted = None;
        if max_size > 0 && self.items.len() >= max_size {
            self.items.pop_front();
            self.dropped += 1;
            evicted = Some(self.dropped);
        }
        self.items.push_back(QueueItem {
            payload,
            enqueued_at: Instant::now(),
        });
        evicted
    }
}

struct QueueInner<T> {
    /// Name used in log records (`command-queue`, ...).
    name: &'static str,
    interval: Duration,
    max_size: usize,
    state: Mutex<QueueState<T>>,
    processor: Arc<dyn QueueProcessor<T>>,
}

/// A bounded FIFO that dispatches at most one item per `interval`.
///
/// Cloning is cheap and shares the same queue.
pub struct ThrottledQueue<T> {
    inner: Arc<QueueInner<T>>,
}

impl<T> Clone for ThrottledQueue<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Send + 'static> ThrottledQueue<T> {
    /// Creates an idle queue.  `max_size == 0` disables the bound.
    pub fn new(
        name: &'static str,
        interval: Duration,
        max_size: usize,
        processor: Arc<dyn QueueProcessor<T>>,
    ) -> Self {
        Self {
            inner: Arc::new(QueueInner {
                name,
                interval,
                max_size,
                state: Mutex::new(QueueState {
                    items: VecDeque::new(),
                    draining: false,
                    generation: 0,
                    dropped: 0,
                }),
                processor,
            }),
        }
    }

    /// Enqueues an item.
    ///
    /// If the queue is idle, a drain task starts and dispatches this item
    /// immediately; otherwise the item waits its FIFO turn.  Must be called
    /// from within a tokio runtime.
    pub fn add(&self, payload: T) {
        // The generation is captured in the same critical section that claims
        // `draining`, so a drain task spawned before a `clear()` can never be
        // mistaken for the one spawned after it.
        let spawn_drain = {
            let mut state = self.inner.state.lock().expect("queue mutex poisoned");
            if let Some(dropped) = state.enqueue(payload, self.inner.max_size) {
                // Log the 1st and every 100th drop, not every drop.
                if dropped == 1 || dropped % 100 == 0 {
                    warn!(
                        queue = self.inner.name,
                        dropped, "queue at capacity; evicted oldest item"
                    );
                }
            }
            if state.draining {
                None
            } else {
                state.draining = true;
                Some(state.generation)
            }
        };

        if let Some(generation) = spawn_drain {
            let inner = Arc::clone(&self.inner);
            tokio::spawn(drain(inner, generation));
        }
    }

    /// Empties the queue and cancels any pending dispatch timer.
    ///
    /// Safe to call at any time, including while an item is mid-processing;
    /// the in-flight item completes, everything still queued is discarded.
    pub fn clear(&self) {
        let mut state = self.inner.state.lock().expect("queue mutex poisoned");
        let discarded = state.items.len();
        state.items.clear();
        state.generation += 1;
        state.draining = false;
        if discarded > 0 {
            debug!(queue = self.inner.name, discarded, "queue cleared");
        }
    }

    /// Number of items currently waiting.
    pub fn len(&self) -> usize {
        self.inner.state.lock().expect("queue mutex poisoned").items.len()
    }

    /// True when nothing is waiting.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total items evicted since construction.  Never decreases.
    pub fn dropped_count(&self) -> u64 {
        self.inner.state.lock().expect("queue mutex poisoned").dropped
    }
}

/// Drain task: pops one item, processes it, then waits one interval before
/// the next pop.  Exits when the queue empties or the generation changes.
///
/// `generation` is the value observed by the `add` that spawned this task.
/// A task that first runs after a `clear()` sees a newer generation on its
/// first lock and exits without touching the queue, so the drain spawned by
/// a post-clear `add` is always the only one running.
async fn drain<T: Send + 'static>(inner: Arc<QueueInner<T>>, generation: u64) {
    loop {
        let item = {
            let mut state = inner.state.lock().expect("queue mutex poisoned");
            if state.generation != generation {
                // clear() took over; it already reset `draining`.
                return;
            }
            match state.items.pop_front() {
                Some(item) => item,
                None => {
                    state.draining = false;
                    return;
                }
            }
        };

        debug!(
            queue = inner.name,
            queued_for_ms = item.enqueued_at.elapsed().as_millis() as u64,
            "dispatching queue item"
        );
        if let Err(error) = inner.processor.process(item.payload).await {
            warn!(queue = inner.name, %error, "queue processor failed; continuing");
        }

        // No idle timers: if the queue emptied while we processed, exit now
        // instead of arming one more tick.
        {
            let mut state = inner.state.lock().expect("queue mutex poisoned");
            if state.generation != generation {
                return;
            }
            if state.items.is_empty() {
                state.draining = false;
                return;
            }
        }
        tokio::time::sleep(inner.interval).await;
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
