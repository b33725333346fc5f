//! # lumen-core
//!
//! Shared library for the Lumen gateway bridge containing the line protocol
//! primitives and the startup readiness state machine.
//!
//! This crate is pure logic: it has zero dependencies on sockets, async
//! runtimes, or the broker client.  Everything in it can be unit tested with
//! plain byte slices and `Instant`s.
//!
//! # What lives here
//!
//! - **`protocol`** – How the gateway's line-oriented protocol is consumed.
//!   A [`LineFramer`] turns an arbitrary chunking of a TCP byte stream into
//!   complete trimmed lines; [`route_line`] classifies each line by its
//!   leading three-digit response code; the `level` module holds the raw
//!   0–255 level arithmetic and percent conversions used on the broker side.
//!
//! - **`readiness`** – A pure synchronizer over the three independent links
//!   the bridge maintains (broker, command pool, event stream).  It decides
//!   when the bridge as a whole counts as "connected", debouncing flapping
//!   reconnects so expensive startup work runs once, not once per flap.

pub mod protocol;
pub mod readiness;

// Re-export the most-used types at the crate root so callers can write
// `lumen_core::LineFramer` instead of `lumen_core::protocol::framing::LineFramer`.
pub use protocol::framing::LineFramer;
pub use protocol::level::{
    clamp_level, parse_percent, parse_step, percent_to_raw, raw_to_percent, LevelError, MAX_LEVEL,
};
pub use protocol::routing::{route_line, LevelEvent, RoutedLine};
pub use readiness::{Link, ReadinessBarrier, Transition};
