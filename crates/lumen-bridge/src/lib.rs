//! lumen-bridge library crate.
//!
//! A long-running bridge between a line-oriented TCP control protocol spoken
//! by a building-automation gateway and a publish/subscribe message broker.
//! Clients issue control commands and receive device-state updates via the
//! broker; the bridge translates between the two.
//!
//! # Architecture (clean architecture)
//!
//! ```text
//! Broker (pub/sub topics)
//!         ↕
//! [lumen-bridge]
//!   ├── domain/           Pure types: Command, BridgeConfig, ExecuteError
//!   ├── application/      Correlation engine, bridge orchestrator
//!   └── infrastructure/
//!         ├── pool/       Pooled TCP connections to the gateway
//!         ├── queue/      Bounded, rate-limited command scheduler
//!         └── broker/     Broker link interface (external collaborator)
//!         ↕
//! Gateway (line protocol over TCP, command port + event port)
//! ```
//!
//! # Layer rules
//!
//! - `domain` has no I/O and no async machinery beyond channel handle types.
//! - `application` depends on `domain` and `lumen-core` only, plus the
//!   queue/pool handles injected into it.
//! - `infrastructure` depends on all other layers plus `tokio`.

/// Domain layer: pure business-logic types (no I/O).
pub mod domain;

/// Application layer: command correlation and orchestration.
pub mod application;

/// Infrastructure layer: connection pool, throttled queue, broker interface.
pub mod infrastructure;
