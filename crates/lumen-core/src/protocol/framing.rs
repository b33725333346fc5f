//! Line framing for the gateway's stream protocol.
//!
//! TCP is a *stream* protocol: a single `read()` call may return less than one
//! complete protocol line, or several lines plus the beginning of the next.
//! [`LineFramer`] accumulates incoming chunks and extracts complete lines, so
//! downstream code only ever sees whole, trimmed lines regardless of how the
//! kernel happened to slice the byte stream.
//!
//! # Ownership
//!
//! The internal buffer is scoped to a single connection.  Sharing one framer
//! across sockets interleaves unrelated partial lines and corrupts line
//! boundaries, so each pooled connection owns its own framer and drops it when
//! that connection is replaced.  This keeps stale partial-line bytes from a
//! dead socket out of its replacement.

use tracing::debug;

/// Accumulates stream chunks and emits complete, trimmed, non-empty lines.
///
/// Lines are delimited by `\n`; a preceding `\r` (and any other surrounding
/// whitespace) is trimmed away.  Empty lines are swallowed.  For any chunking
/// of an identical byte stream the framer emits the identical ordered line
/// sequence.
///
/// # Examples
///
/// ```rust
/// use lumen_core::LineFramer;
///
/// let mut framer = LineFramer::new();
/// let mut lines = Vec::new();
/// framer.process_data(b"300 4/21/7: lev", |l| lines.push(l.to_string()));
/// framer.process_data(b"el=128\r\n200 OK\r\n", |l| lines.push(l.to_string()));
/// assert_eq!(lines, vec!["300 4/21/7: level=128", "200 OK"]);
/// ```
#[derive(Debug, Default)]
pub struct LineFramer {
    /// Bytes received but not yet terminated by a delimiter.
    buf: Vec<u8>,
}

impl LineFramer {
    /// Creates an empty framer.
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }

    /// Appends `chunk` to the internal buffer and invokes `on_line` for every
    /// complete line now available, synchronously and in arrival order.
    ///
    /// Partial trailing data is kept for the next call.  No line is dropped,
    /// reordered, or emitted before its delimiter has arrived.
    ///
    /// Non-UTF-8 bytes are replaced with `U+FFFD` rather than aborting the
    /// line; the gateway protocol is ASCII in practice.
    pub fn process_data<F>(&mut self, chunk: &[u8], mut on_line: F)
    where
        F: FnMut(&str),
    {
        self.buf.extend_from_slice(chunk);

        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            // Take the line plus its delimiter out of the buffer; the
            // remainder shifts to the front and stays pending.
            let raw: Vec<u8> = self.buf.drain(..=pos).collect();
            let text = String::from_utf8_lossy(&raw[..raw.len() - 1]);
            let line = text.trim();
            if !line.is_empty() {
                on_line(line);
            }
        }
    }

    /// Number of buffered bytes still waiting for a delimiter.
    pub fn pending_len(&self) -> usize {
        self.buf.len()
    }

    /// Releases the framer, discarding any trailing partial line.
    ///
    /// A trailing fragment with no terminator is dropped rather than emitted:
    /// the connection died mid-line and the fragment cannot be trusted to be a
    /// complete protocol unit.  Returns the number of bytes discarded so the
    /// caller can account for them.
    pub fn close(self) -> usize {
        let discarded = self.buf.len();
        if discarded > 0 {
            debug!(discarded, "discarding unterminated partial line at close");
        }
        discarded
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
