//! Protocol module: line framing, response-code routing, and level arithmetic.

pub mod framing;
pub mod level;
pub mod routing;

pub use framing::LineFramer;
pub use level::{
    clamp_level, parse_percent, parse_step, percent_to_raw, raw_to_percent, LevelError, MAX_LEVEL,
};
pub use routing::{route_line, LevelEvent, RoutedLine};
