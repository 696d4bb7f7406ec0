//! Error types for fleetcheck-exec

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur while running a command on a node
#[derive(Error, Debug, Clone)]
pub enum ExecError {
    /// Failed to open a connection to the node
    #[error("connection to {host} failed: {reason}")]
    ConnectionFailed {
        /// Host that was dialed
        host: String,
        /// Underlying transport error
        reason: String,
    },

    /// The node rejected our credentials
    #[error("authentication as {user}@{host} failed: {reason}")]
    AuthenticationFailed {
        /// Host that was dialed
        host: String,
        /// User we tried to log in as
        user: String,
        /// Why authentication failed
        reason: String,
    },

    /// Command timed out
    #[error("command timed out after {timeout:?}")]
    Timeout {
        /// Timeout duration that was exceeded
        timeout: Duration,
    },

    /// SSH key could not be loaded
    #[error("SSH key error: {0}")]
    SshKeyError(String),

    /// Process spawn error
    #[error("failed to spawn process: {0}")]
    SpawnError(String),

    /// I/O error during execution
    #[error("I/O error: {0}")]
    IoError(String),

    /// Session was dropped between connect and exec
    #[error("not connected")]
    NotConnected,
}

impl ExecError {
    /// Whether this error means "the node did not answer" rather than
    /// "the node descriptor is broken".
    ///
    /// Key errors and local spawn failures are configuration problems and
    /// must not be reported as an unreachable node.
    #[must_use]
    pub fn is_unreachable(&self) -> bool {
        matches!(
            self,
            ExecError::ConnectionFailed { .. }
                | ExecError::AuthenticationFailed { .. }
                | ExecError::Timeout { .. }
                | ExecError::IoError(_)
                | ExecError::NotConnected
        )
    }
}
