//! fleetcheck-docker: Docker-based node connector
//!
//! Answers the aggregator's per-node questions (is the node up, is this image
//! running) by running the docker CLI on each node through a
//! [`fleetcheck_exec::RemoteExecutor`].

pub mod docker;
pub mod error;
pub mod factory;

pub use docker::{DockerConnector, DockerSettings};
pub use error::ConnectorError;
pub use factory::{DefaultExecutorFactory, ExecutorFactory};
