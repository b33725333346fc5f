//! Broker link interface and topic conventions.
//!
//! Broker connection management — authentication, TLS, session keep-alive,
//! subscription bookkeeping — is an external collaborator.  The bridge core
//! sees the broker as exactly two things:
//!
//! 1. an outbound sink: [`BrokerLink::publish`];
//! 2. one readiness flag plus inbound messages, delivered as
//!    [`BrokerEvent`]s on an mpsc channel owned by the collaborator.
//!
//! What the core *does* own is the topic convention: level updates go out on
//! `<prefix>/<address>/level`, and commands come in on
//! `<prefix>/<address>/set` (absolute percent) and
//! `<prefix>/<address>/adjust` (signed raw step).

use async_trait::async_trait;
use tracing::info;

/// Events emitted by the broker collaborator to the bridge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrokerEvent {
    /// The broker session is up and subscriptions are in place.
    Connected,
    /// The broker session dropped; the collaborator reconnects on its own.
    Closed,
    /// An inbound message on a subscribed topic.
    Message { topic: String, payload: Vec<u8> },
}

/// Outbound sink towards the broker.
///
/// Publish failures are surfaced to the caller but are never fatal to the
/// bridge; the collaborator owns its own retry/buffer policy.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BrokerLink: Send + Sync {
    async fn publish(&self, topic: &str, payload: &[u8], retain: bool) -> anyhow::Result<()>;
}

/// A stand-in broker link that logs instead of publishing.
///
/// Used by the binary until a real broker collaborator is wired in, and
/// handy for running the bridge against a gateway with no broker at all.
/// Reports `Connected` immediately and never closes.
pub struct LoggingBrokerLink;

impl LoggingBrokerLink {
    /// Returns the link and its (already-connected) event stream.
    pub fn start() -> (Self, tokio::sync::mpsc::Receiver<BrokerEvent>) {
        let (tx, rx) = tokio::sync::mpsc::channel(16);
        // The channel keeps capacity for the one event we send here.
        let _ = tx.try_send(BrokerEvent::Connected);
        // Keep the sender alive so the receiver never reports closure.
        tokio::spawn(async move {
            tx.closed().await;
        });
        (Self, rx)
    }
}

#[async_trait]
impl BrokerLink for LoggingBrokerLink {
    async fn publish(&self, topic: &str, payload: &[u8], retain: bool) -> anyhow::Result<()> {
        info!(
            topic,
            payload = %String::from_utf8_lossy(payload),
            retain,
            "publish (logging broker stand-in)"
        );
        Ok(())
    }
}

// ── Topic conventions ─────────────────────────────────────────────────────────

/// Command verbs the bridge accepts from the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandVerb {
    /// Set an absolute level, payload is a percent `0..=100`.
    Set,
    /// Adjust relative to the current level, payload is a signed raw step.
    Adjust,
}

/// Topic a level update for `address` is published on.
pub fn level_topic(prefix: &str, address: &str) -> String {
    format!("{prefix}/{address}/level")
}

/// Parses an inbound command topic of the form
/// `<prefix>/<address>/set|adjust`.
///
/// The address may itself contain `/` separators, so the prefix and the verb
/// are matched from the ends and whatever sits between is the address.
/// Returns `None` for foreign topics; the caller logs and drops.
pub fn parse_command_topic(prefix: &str, topic: &str) -> Option<(String, CommandVerb)> {
    let rest = topic.strip_prefix(prefix)?.strip_prefix('/')?;
    let (address, verb) = if let Some(address) = rest.strip_suffix("/set") {
        (address, CommandVerb::Set)
    } else if let Some(address) = rest.strip_suffix("/adjust") {
        (address, CommandVerb::Adjust)
    } else {
        return None;
    };
    if address.is_empty() {
        return None;
    }
    Some((address.to_string(), verb))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
