//! Bridge orchestrator: wires the pool, queue, correlation engine, readiness
//! barrier, and broker link into one event loop.
//!
//! The orchestrator owns no protocol logic of its own.  It moves events
//! between components:
//!
//! - framed gateway lines → response routing → correlation engine + broker
//! - broker messages → command queue / correlation engine
//! - link state changes → readiness barrier → one `ready` notification
//!
//! Everything runs on a single event loop task, so readiness flags and
//! per-slot state have exactly one mutator (the orderings in the pool and
//! queue are enforced inside those components).

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use lumen_core::{
    parse_percent, parse_step, percent_to_raw, raw_to_percent, route_line, LevelEvent, Link,
    ReadinessBarrier, RoutedLine, Transition,
};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::application::correlation::CorrelationEngine;
use crate::domain::{BridgeConfig, Command};
use crate::infrastructure::broker::{level_topic, parse_command_topic, CommandVerb};
use crate::infrastructure::{
    BrokerEvent, BrokerLink, ConnectionPool, PoolConfig, PoolEvent, QueueProcessor, ThrottledQueue,
};

/// Which gateway port a pool event originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GatewayPort {
    /// The pooled command port.
    Command,
    /// The single-connection event stream.
    Event,
}

/// Queue processor that dispatches commands through the connection pool and
/// resolves their completion handles.
struct PoolExecutor {
    pool: Arc<ConnectionPool>,
}

#[async_trait]
impl QueueProcessor<Command> for PoolExecutor {
    async fn process(&self, mut command: Command) -> anyhow::Result<()> {
        let outcome = self.pool.execute(&command.line).await.map(|_slot| ());
        command.complete(outcome.clone());
        // Surface the failure to the queue's per-item logging as well; the
        // queue continues either way.
        outcome.map_err(anyhow::Error::from)
    }
}

/// The assembled bridge.  Construct with [`Bridge::new`], drive with
/// [`Bridge::run`].
pub struct Bridge {
    config: BridgeConfig,
    command_pool: Arc<ConnectionPool>,
    event_pool: Arc<ConnectionPool>,
    command_queue: ThrottledQueue<Command>,
    correlation: Arc<CorrelationEngine>,
    broker: Arc<dyn BrokerLink>,
    readiness: ReadinessBarrier,
    ready_tx: mpsc::Sender<()>,
}

impl Bridge {
    /// Wires all components from `config`.
    ///
    /// Returns the bridge plus a channel that receives one message per
    /// (debounced) all-links-connected transition — the hook collaborators
    /// use for bulk state sync and discovery re-publication.
    pub fn new(config: BridgeConfig, broker: Arc<dyn BrokerLink>) -> (Self, mpsc::Receiver<()>) {
        let command_pool = Arc::new(ConnectionPool::new(PoolConfig {
            addr: config.command_addr,
            size: config.pool_size,
            min_healthy: config.min_healthy,
            reconnect_base: config.reconnect_base,
            reconnect_max: config.reconnect_max,
        }));
        // The event stream is one read-only connection with the same
        // reconnect machinery: a pool of size 1.
        let event_pool = Arc::new(ConnectionPool::new(PoolConfig {
            addr: config.event_addr,
            size: 1,
            min_healthy: 1,
            reconnect_base: config.reconnect_base,
            reconnect_max: config.reconnect_max,
        }));
        let command_queue = ThrottledQueue::new(
            "command-queue",
            config.queue_interval,
            config.queue_max_size,
            Arc::new(PoolExecutor {
                pool: Arc::clone(&command_pool),
            }),
        );
        let correlation = CorrelationEngine::new(command_queue.clone(), config.correlation_timeout);
        let readiness = ReadinessBarrier::new(config.ready_debounce);
        let (ready_tx, ready_rx) = mpsc::channel(4);

        (
            Self {
                config,
                command_pool,
                event_pool,
                command_queue,
                correlation,
                broker,
                readiness,
                ready_tx,
            },
            ready_rx,
        )
    }

    /// Handle for submitting commands from collaborators (discovery, admin).
    pub fn command_queue(&self) -> ThrottledQueue<Command> {
        self.command_queue.clone()
    }

    /// Runs the bridge until `shutdown` flips true or every input closes.
    ///
    /// On exit both pools are stopped and the queue is cleared; no timers or
    /// sockets survive.
    pub async fn run(
        mut self,
        mut broker_events: mpsc::Receiver<BrokerEvent>,
        mut shutdown: watch::Receiver<bool>,
    ) -> anyhow::Result<()> {
        let mut command_events = self.command_pool.start();
        let mut event_events = self.event_pool.start();
        let mut broker_open = true;
        info!(
            command = %self.config.command_addr,
            event = %self.config.event_addr,
            "bridge event loop running"
        );

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    // A dropped sender counts as shutdown.
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                maybe = command_events.recv() => match maybe {
                    Some(event) => self.handle_pool_event(GatewayPort::Command, event).await,
                    None => break,
                },
                maybe = event_events.recv() => match maybe {
                    Some(event) => self.handle_pool_event(GatewayPort::Event, event).await,
                    None => break,
                },
                maybe = broker_events.recv(), if broker_open => match maybe {
                    Some(event) => self.handle_broker_event(event).await,
                    None => {
                        warn!("broker event channel closed");
                        broker_open = false;
                        self.apply_link_state(Link::Broker, false);
                    }
                },
            }
        }

        info!("bridge stopping");
        self.command_pool.stop();
        self.event_pool.stop();
        self.command_queue.clear();
        Ok(())
    }

    /// Routes one pool event from either gateway port.
    async fn handle_pool_event(&mut self, port: GatewayPort, event: PoolEvent) {
        match event {
            PoolEvent::Line { slot, line } => self.handle_gateway_line(port, slot, &line).await,
            PoolEvent::SlotConnected { .. } | PoolEvent::SlotDisconnected { .. } => {
                let (link, connected) = match port {
                    GatewayPort::Command => (
                        Link::CommandPool,
                        self.command_pool.healthy_count() >= self.config.min_healthy,
                    ),
                    GatewayPort::Event => (Link::EventStream, self.event_pool.healthy_count() >= 1),
                };
                self.apply_link_state(link, connected);
            }
        }
    }

    /// Routes one complete gateway line by its leading response code.
    async fn handle_gateway_line(&mut self, port: GatewayPort, slot: usize, line: &str) {
        match route_line(line) {
            RoutedLine::ObjectStatus {
                event: Some(level_event),
                ..
            }
            | RoutedLine::Broadcast(level_event) => self.handle_level_event(&level_event).await,
            RoutedLine::ObjectStatus { code, body, .. } => {
                // Status without a parseable level reading; nothing for the
                // correlation engine, and other attributes belong to the
                // parser collaborator.
                debug!(?port, slot, code, %body, "object status without level");
            }
            RoutedLine::Success { code, .. } => {
                debug!(?port, slot, code, "command acknowledged");
            }
            RoutedLine::TreeFragment { code, .. } => {
                debug!(?port, slot, code, "tree fragment (discovery collaborator)");
            }
            RoutedLine::Error { code, body } => {
                warn!(?port, slot, code, %body, "gateway reported an error");
            }
            RoutedLine::Unrecognized(raw) => {
                warn!(?port, slot, line = %raw, "unrecognized line dropped");
            }
        }
    }

    /// Feeds a level reading to the correlation engine and republishes it.
    async fn handle_level_event(&mut self, event: &LevelEvent) {
        self.correlation.on_level_update(&event.address, event.level);

        let topic = level_topic(&self.config.topic_prefix, &event.address);
        let payload = serde_json::json!({
            "level": event.level,
            "percent": raw_to_percent(event.level),
        })
        .to_string();
        if let Err(error) = self.broker.publish(&topic, payload.as_bytes(), true).await {
            warn!(%topic, %error, "broker publish failed");
        }
    }

    /// Handles one event from the broker collaborator.
    async fn handle_broker_event(&mut self, event: BrokerEvent) {
        match event {
            BrokerEvent::Connected => self.apply_link_state(Link::Broker, true),
            BrokerEvent::Closed => self.apply_link_state(Link::Broker, false),
            BrokerEvent::Message { topic, payload } => {
                let Some((address, verb)) =
                    parse_command_topic(&self.config.topic_prefix, &topic)
                else {
                    debug!(%topic, "ignoring foreign topic");
                    return;
                };
                let text = String::from_utf8_lossy(&payload);
                match verb {
                    CommandVerb::Set => match parse_percent(&text) {
                        Ok(percent) => {
                            let raw = percent_to_raw(percent);
                            self.command_queue
                                .add(Command::new(format!("RAMP {address} {raw}")));
                        }
                        Err(error) => {
                            warn!(%topic, payload = %text, %error, "invalid set payload dropped");
                        }
                    },
                    CommandVerb::Adjust => match parse_step(&text) {
                        Ok(step) => self.correlation.adjust(&address, step),
                        Err(error) => {
                            warn!(%topic, payload = %text, %error, "invalid adjust payload dropped");
                        }
                    },
                }
            }
        }
    }

    /// Applies one link state to the readiness barrier and acts on the
    /// transition.
    fn apply_link_state(&mut self, link: Link, connected: bool) {
        match self.readiness.set_connected(link, connected, Instant::now()) {
            Transition::BecameReady => {
                info!("all links connected; bridge ready");
                // A full channel means a previous ready signal is still
                // unconsumed; collapsing them is fine.
                let _ = self.ready_tx.try_send(());
            }
            Transition::LostReady => {
                warn!(?link, "link down; bridge no longer ready");
            }
            Transition::NoChange => {}
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
