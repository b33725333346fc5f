//! Infrastructure layer for lumen-bridge.
//!
//! Everything that touches a socket, a timer, or a spawned task lives here:
//!
//! - `pool` — persistent, health-checked TCP connections to the gateway
//! - `queue` — the bounded, rate-limited command scheduler
//! - `broker` — the broker link interface (an external collaborator) and the
//!   topic conventions the bridge owns
//!
//! # What does NOT belong here?
//!
//! - Level correlation logic (application layer)
//! - Command and configuration types (domain layer)
//! - Line framing and response routing (`lumen-core`, pure logic)

pub mod broker;
pub mod pool;
pub mod queue;

// Re-export the primary types so the application layer and `main.rs` can
// name them concisely.
pub use broker::{BrokerEvent, BrokerLink, LoggingBrokerLink};
pub use pool::{ConnectionPool, PoolConfig, PoolEvent};
pub use queue::{QueueProcessor, ThrottledQueue};
