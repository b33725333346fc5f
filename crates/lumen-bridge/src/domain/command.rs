//! Outbound gateway commands and their dispatch errors.
//!
//! A [`Command`] is an opaque protocol line owned by its submitter until it
//! is handed to the command queue, and by the queue until the pool dispatches
//! it.  Submitters that care about the outcome attach a oneshot completion
//! handle; fire-and-forget submitters (event republication, discovery) do
//! not.

use std::time::Instant;

use thiserror::Error;
use tokio::sync::oneshot;
use uuid::Uuid;

/// A dispatch failure surfaced synchronously by the connection pool.
///
/// The pool makes exactly one attempt per command; callers own their retry
/// policy.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExecuteError {
    /// No pooled connection is currently healthy.  Fail fast rather than
    /// blocking the caller on a reconnect cycle.
    #[error("no healthy gateway connection available")]
    NoHealthyConnection,
    /// The write on the chosen connection failed; the slot has been marked
    /// unhealthy and will reconnect on its own.
    #[error("write failed on connection slot {slot}: {message}")]
    WriteFailed { slot: usize, message: String },
    /// The pool has been stopped.
    #[error("connection pool is stopped")]
    PoolStopped,
}

/// One outbound protocol line, created per action and destroyed on dispatch.
#[derive(Debug)]
pub struct Command {
    /// Identifier used to correlate log records for this command.
    pub id: Uuid,
    /// The raw protocol line, without the trailing delimiter.
    pub line: String,
    /// When the command was created.
    pub created_at: Instant,
    /// Resolved with the dispatch outcome, when the submitter asked for one.
    completion: Option<oneshot::Sender<Result<(), ExecuteError>>>,
}

impl Command {
    /// Creates a fire-and-forget command.
    pub fn new(line: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            line: line.into(),
            created_at: Instant::now(),
            completion: None,
        }
    }

    /// Creates a command whose dispatch outcome the submitter awaits.
    pub fn with_completion(
        line: impl Into<String>,
    ) -> (Self, oneshot::Receiver<Result<(), ExecuteError>>) {
        let (tx, rx) = oneshot::channel();
        let mut cmd = Self::new(line);
        cmd.completion = Some(tx);
        (cmd, rx)
    }

    /// Resolves the completion handle, if any.
    ///
    /// A submitter that dropped its receiver is not an error; the outcome is
    /// simply discarded.
    pub fn complete(&mut self, outcome: Result<(), ExecuteError>) {
        if let Some(tx) = self.completion.take() {
            let _ = tx.send(outcome);
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
