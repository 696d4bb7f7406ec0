//! Per-node queries the aggregator depends on
//!
//! Implementations live outside the core (see `fleetcheck-docker`); tests use
//! in-memory mocks.

use async_trait::async_trait;

use crate::environment::Node;
use crate::error::ProbeError;

/// Answers whether a node is reachable.
#[async_trait]
pub trait NodeProbe: Send + Sync {
    /// `Ok(false)` for a node that does not answer. `Err` is reserved for a
    /// descriptor that cannot be probed at all.
    async fn probe(&self, node: &Node) -> Result<bool, ProbeError>;
}

/// Answers whether a given image is currently running on a node.
#[async_trait]
pub trait DeploymentChecker: Send + Sync {
    /// Only called for nodes that probed as reachable.
    async fn is_running(&self, node: &Node, image: &str) -> Result<bool, ProbeError>;
}
