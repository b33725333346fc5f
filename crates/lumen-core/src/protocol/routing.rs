//! Response-code routing for inbound gateway lines.
//!
//! The bridge owns exactly two pieces of the wire format: the line delimiter
//! (handled by [`super::framing`]) and the convention that a reply on the
//! command port begins with a three-digit numeric code in `100..=699`.  Full
//! translation of lines into structured events belongs to an external parser
//! collaborator; the routing here decides only *where a line goes*:
//!
//! - `1xx`/`2xx`  → command acknowledged, nothing further to do
//! - `3xx`        → object status; may carry an `<address> level=<n>` reading
//! - `343..=347`  → device-tree stream fragment, forwarded to discovery
//! - `4xx`–`6xx`  → command error
//! - no code      → event-stream broadcast, expected to carry address+level
//!
//! Anything that fits none of these is unrecognized: the caller logs it and
//! drops the line.  Protocol errors are never fatal.

/// An address paired with a raw level reading, extracted from a status reply
/// or an event-stream broadcast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LevelEvent {
    /// Gateway object address, e.g. `4/21/7`.
    pub address: String,
    /// Raw level in `0..=255`.
    pub level: u8,
}

/// Classification of one complete inbound line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoutedLine {
    /// `1xx`/`2xx` — the gateway accepted a command.
    Success { code: u16, body: String },
    /// `3xx` — object status.  `event` is present when the body carries a
    /// parseable `<address> level=<n>` reading; a `3xx` without one is legal
    /// (other status attributes) and left to collaborators.
    ObjectStatus {
        code: u16,
        event: Option<LevelEvent>,
        body: String,
    },
    /// `343..=347` — one fragment of the device-tree stream.
    TreeFragment { code: u16, body: String },
    /// `4xx`–`6xx` — the gateway rejected a command.
    Error { code: u16, body: String },
    /// A code-less event-stream line carrying an address and level.
    Broadcast(LevelEvent),
    /// Nothing we know how to route; log and drop.
    Unrecognized(String),
}

/// Routes one complete, trimmed line by the leading response-code convention.
pub fn route_line(line: &str) -> RoutedLine {
    if let Some((code, body)) = split_response_code(line) {
        return match code {
            100..=299 => RoutedLine::Success { code, body },
            343..=347 => RoutedLine::TreeFragment { code, body },
            300..=399 => RoutedLine::ObjectStatus {
                code,
                event: parse_level_event(&body),
                body,
            },
            // split_response_code guarantees 100..=699
            _ => RoutedLine::Error { code, body },
        };
    }

    match parse_level_event(line) {
        Some(event) => RoutedLine::Broadcast(event),
        None => RoutedLine::Unrecognized(line.to_string()),
    }
}

/// Splits `"<code> <body>"` when the first token is a three-digit code in
/// `100..=699`.  Returns `None` otherwise, including for four-digit numbers
/// and codes outside the protocol range.
fn split_response_code(line: &str) -> Option<(u16, String)> {
    let mut parts = line.splitn(2, char::is_whitespace);
    let first = parts.next()?;
    if first.len() != 3 || !first.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let code: u16 = first.parse().ok()?;
    if !(100..=699).contains(&code) {
        return None;
    }
    Some((code, parts.next().unwrap_or("").trim().to_string()))
}

/// Extracts `<address> level=<n>` from a line body.
///
/// The address may carry a trailing `:` separator (`300 4/21/7: level=128`),
/// which is stripped.  A non-numeric or out-of-range level yields `None`; the
/// caller logs and drops — no command is synthesized from a bad reading.
fn parse_level_event(body: &str) -> Option<LevelEvent> {
    let mut parts = body.split_whitespace();
    let address = parts.next()?.trim_end_matches(':');
    if address.is_empty() {
        return None;
    }
    let level_token = parts.find(|t| t.starts_with("level="))?;
    let level: u8 = level_token["level=".len()..].parse().ok()?;
    Some(LevelEvent {
        address: address.to_string(),
        level,
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────
