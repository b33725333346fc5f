//! Raw level arithmetic and percent conversion.
//!
//! The gateway speaks raw levels in `0..=255`; the broker-facing layer speaks
//! percent in `0..=100`.  All relative-command arithmetic happens in raw units
//! and is clamped to the raw range — conversion to and from percent is a
//! presentation concern at the broker boundary.

use thiserror::Error;

/// Maximum raw level the gateway accepts.
pub const MAX_LEVEL: u8 = 255;

/// Errors produced when parsing broker-supplied level values.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LevelError {
    /// The payload was not a decimal integer.
    #[error("not a numeric level value: {0:?}")]
    NotNumeric(String),
    /// The value parsed but falls outside the permitted range.
    #[error("value {value} out of range {min}..={max}")]
    OutOfRange { value: i64, min: i64, max: i64 },
}

/// Clamps an intermediate raw-level computation into `0..=255`.
///
/// Relative commands compute `current + step` in signed arithmetic; the
/// result saturates at the raw bounds rather than wrapping or erroring.
pub fn clamp_level(value: i32) -> u8 {
    value.clamp(0, MAX_LEVEL as i32) as u8
}

/// Converts a broker-facing percentage (`0..=100`) into a raw level.
///
/// Rounds to the nearest raw step: 50% → 128, 100% → 255.
pub fn percent_to_raw(percent: u8) -> u8 {
    let pct = percent.min(100) as u32;
    ((pct * MAX_LEVEL as u32 + 50) / 100) as u8
}

/// Converts a raw level (`0..=255`) into a broker-facing percentage.
///
/// Rounds to the nearest percent: 128 → 50, 255 → 100.
pub fn raw_to_percent(raw: u8) -> u8 {
    ((raw as u32 * 100 + (MAX_LEVEL as u32 / 2)) / MAX_LEVEL as u32) as u8
}

/// Parses a broker `set` payload as a percentage in `0..=100`.
///
/// # Errors
///
/// Returns [`LevelError::NotNumeric`] for non-decimal input and
/// [`LevelError::OutOfRange`] for values above 100 or below 0.
pub fn parse_percent(input: &str) -> Result<u8, LevelError> {
    let value: i64 = input
        .trim()
        .parse()
        .map_err(|_| LevelError::NotNumeric(input.to_string()))?;
    if !(0..=100).contains(&value) {
        return Err(LevelError::OutOfRange {
            value,
            min: 0,
            max: 100,
        });
    }
    Ok(value as u8)
}

/// Parses a broker `adjust` payload as a signed raw step.
///
/// Accepts an optional leading `+`.  The step is bounded to one full raw
/// range in either direction; anything larger is meaningless after clamping.
///
/// # Errors
///
/// Returns [`LevelError::NotNumeric`] or [`LevelError::OutOfRange`].
pub fn parse_step(input: &str) -> Result<i32, LevelError> {
    let trimmed = input.trim();
    let normalized = trimmed.strip_prefix('+').unwrap_or(trimmed);
    let value: i64 = normalized
        .parse()
        .map_err(|_| LevelError::NotNumeric(input.to_string()))?;
    let bound = MAX_LEVEL as i64;
    if !(-bound..=bound).contains(&value) {
        return Err(LevelError::OutOfRange {
            value,
            min: -bound,
            max: bound,
        });
    }
    Ok(value as i32)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
