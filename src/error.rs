//! Error types for remote-exec.

use std::io;
use std::time::Duration;

use thiserror::Error;

/// Main error type for command execution.
///
/// Exactly one of these (or success) is produced by each execution.
#[derive(Error, Debug)]
pub enum ExecError {
    /// A required field was missing or invalid. Raised before any I/O.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The transport failed while opening, driving or waiting on a channel.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// The command completed but its exit status is not accepted.
    #[error("process exited with unexpected value {actual} (expected one of {expected:?})")]
    UnexpectedExitStatus {
        /// Accepted exit statuses.
        expected: Vec<i32>,
        /// Status reported by the channel.
        actual: i32,
    },
}

impl ExecError {
    /// Shorthand for a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }
}

/// Transport-level failure kinds. The original cause is kept as the source.
#[derive(Error, Debug)]
pub enum TransportError {
    /// The session refused to open a new exec channel.
    #[error("failed to open exec channel: {0}")]
    Open(#[source] io::Error),

    /// The channel failed to connect (start the remote command).
    #[error("failed to connect exec channel: {0}")]
    Connect(#[source] io::Error),

    /// I/O error while bridging streams or reading the exit status.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The wait for stream completion was interrupted.
    #[error("interrupted while waiting for command completion")]
    Interrupted,

    /// The command did not complete before its deadline.
    #[error("command did not complete within {0:?}")]
    TimedOut(Duration),

    /// The channel closed both streams but reported no exit status.
    #[error("channel reported no exit status")]
    MissingExitStatus,

    /// Internal lock was poisoned.
    #[error("internal lock poisoned")]
    LockPoisoned,

    /// The blocking execution task failed to complete.
    #[error("execution task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Convenience Result type for remote-exec operations.
pub type Result<T> = std::result::Result<T, ExecError>;
