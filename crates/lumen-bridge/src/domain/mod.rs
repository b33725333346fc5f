//! Domain layer for lumen-bridge.
//!
//! Pure business-logic types with no dependencies on sockets, timers, or the
//! broker client.  Everything here can be constructed and inspected in a
//! plain unit test.
//!
//! # What belongs in the domain layer?
//!
//! - [`Command`] — one outbound protocol line plus its completion handle
//! - [`BridgeConfig`] — the single source of truth for runtime settings
//! - [`ExecuteError`] — the typed dispatch failure callers retry on
//!
//! # What does NOT belong here?
//!
//! - `TcpStream`, reconnect loops, or queue timers (infrastructure)
//! - Level correlation logic (application)

pub mod command;
pub mod config;

pub use command::{Command, ExecuteError};
pub use config::{BridgeConfig, ConfigError, FileConfig};
