//! Error types for fleetcheck-docker

use fleetcheck_core::ProbeError;
use thiserror::Error;

/// Errors that can occur while talking to a node's container runtime
#[derive(Error, Debug, Clone)]
pub enum ConnectorError {
    /// No executor could be built for the node
    #[error("cannot set up connection to node {node}: {reason}")]
    ExecutorSetup {
        /// Node name
        node: String,
        /// Why setup failed
        reason: String,
    },

    /// The node is not part of the environment the connector was built for
    #[error("node {0} is not known to this connector")]
    UnknownNode(String),

    /// A docker command exited non-zero
    #[error("command failed: {status} - {message}")]
    CommandFailed {
        /// Exit status
        status: i32,
        /// stderr of the command
        message: String,
    },

    /// Execution error from remote executor
    #[error("execution error: {0}")]
    ExecutionError(String),
}

impl ConnectorError {
    /// Attach the node name for the aggregator
    #[must_use]
    pub fn into_probe_error(self, node: &str) -> ProbeError {
        ProbeError::new(node, self.to_string())
    }
}
