//! Docker probes over a per-node executor

use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use fleetcheck_core::{DeploymentChecker, Environment, Node, NodeProbe, ProbeError};
use fleetcheck_exec::RemoteExecutor;
use tokio::sync::OnceCell;
use tracing::{debug, instrument, warn};

use crate::error::ConnectorError;
use crate::factory::ExecutorFactory;

/// How the connector talks to docker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DockerSettings {
    /// Docker CLI to invoke, e.g. `docker` or `sudo docker`
    pub docker_bin: String,
    /// Deadline for the reachability probe, including connection setup
    pub probe_timeout: Duration,
    /// Deadline for listing running containers
    pub check_timeout: Duration,
}

impl Default for DockerSettings {
    fn default() -> Self {
        Self {
            docker_bin: "docker".to_string(),
            probe_timeout: Duration::from_secs(10),
            check_timeout: Duration::from_secs(30),
        }
    }
}

/// Connector answering reachability and deployment questions with the
/// docker CLI.
///
/// Executors are created once per node when the connector is built and are
/// shared between the probe and the deployment check, so an SSH node is
/// dialed at most once per run. Running images are listed once per node and
/// reused for every application checked there; build one connector per run.
pub struct DockerConnector {
    nodes: HashMap<String, NodeHandle>,
    settings: DockerSettings,
}

struct NodeHandle {
    executor: Result<Arc<dyn RemoteExecutor>, ConnectorError>,
    running_images: OnceCell<Result<Vec<String>, ConnectorError>>,
}

impl DockerConnector {
    /// Prepare executors for every node of `env`.
    ///
    /// A node whose executor cannot be built is remembered and reported as a
    /// probe error for that node.
    pub fn for_environment(
        env: &Environment,
        factory: &dyn ExecutorFactory,
        settings: DockerSettings,
    ) -> Self {
        let nodes = env
            .nodes()
            .iter()
            .map(|node| {
                let executor = factory.create_executor(node);
                if let Err(e) = &executor {
                    warn!(node = %node.name, error = %e, "cannot create executor");
                }
                let handle = NodeHandle {
                    executor,
                    running_images: OnceCell::new(),
                };
                (node.name.clone(), handle)
            })
            .collect();

        Self { nodes, settings }
    }

    fn handle(&self, node: &Node) -> Result<&NodeHandle, ConnectorError> {
        self.nodes
            .get(&node.name)
            .ok_or_else(|| ConnectorError::UnknownNode(node.name.clone()))
    }

    fn executor(&self, node: &Node) -> Result<&Arc<dyn RemoteExecutor>, ConnectorError> {
        self.handle(node)?.executor.as_ref().map_err(Clone::clone)
    }

    /// Close every open connection
    pub async fn close(&self) {
        for (name, handle) in &self.nodes {
            if let Ok(executor) = &handle.executor
                && let Err(e) = executor.close().await
            {
                warn!(node = %name, error = %e, "failed to close connection");
            }
        }
    }

    fn version_cmd(&self) -> String {
        format!(
            "{} version --format '{{{{.Server.Version}}}}'",
            self.settings.docker_bin
        )
    }

    fn running_images_cmd(&self) -> String {
        format!(
            "{} ps --filter status=running --format '{{{{.Image}}}}'",
            self.settings.docker_bin
        )
    }

    async fn running_images(&self, node: &Node) -> Result<&[String], ConnectorError> {
        let handle = self.handle(node)?;
        let executor = handle.executor.as_ref().map_err(Clone::clone)?;

        handle
            .running_images
            .get_or_init(|| self.list_running_images(executor))
            .await
            .as_deref()
            .map_err(Clone::clone)
    }

    async fn list_running_images(
        &self,
        executor: &Arc<dyn RemoteExecutor>,
    ) -> Result<Vec<String>, ConnectorError> {
        let result = executor
            .run_with_timeout(&self.running_images_cmd(), self.settings.check_timeout)
            .await
            .map_err(|e| ConnectorError::ExecutionError(e.to_string()))?;

        if !result.success() {
            return Err(ConnectorError::CommandFailed {
                status: result.status,
                message: result.stderr.trim().to_string(),
            });
        }

        Ok(result.stdout_lines().map(str::to_string).collect())
    }
}

/// `nginx` and `nginx:latest` name the same image
fn normalize_image(image: &str) -> Cow<'_, str> {
    let image = image.trim();
    let name = image.rsplit('/').next().unwrap_or(image);
    if name.contains(':') || name.contains('@') {
        Cow::Borrowed(image)
    } else {
        Cow::Owned(format!("{image}:latest"))
    }
}

#[async_trait]
impl NodeProbe for DockerConnector {
    #[instrument(skip_all, fields(node = %node.name))]
    async fn probe(&self, node: &Node) -> Result<bool, ProbeError> {
        let executor = self
            .executor(node)
            .map_err(|e| e.into_probe_error(&node.name))?;

        match executor
            .run_with_timeout(&self.version_cmd(), self.settings.probe_timeout)
            .await
        {
            Ok(result) => {
                if !result.success() {
                    debug!(
                        status = result.status,
                        stderr = %result.stderr.trim(),
                        "docker daemon not answering"
                    );
                }
                Ok(result.success())
            }
            Err(e) if e.is_unreachable() => {
                debug!(error = %e, "node unreachable");
                Ok(false)
            }
            Err(e) => Err(ProbeError::new(&node.name, e.to_string())),
        }
    }
}

#[async_trait]
impl DeploymentChecker for DockerConnector {
    #[instrument(skip_all, fields(node = %node.name, image = %image))]
    async fn is_running(&self, node: &Node, image: &str) -> Result<bool, ProbeError> {
        let images = self
            .running_images(node)
            .await
            .map_err(|e| e.into_probe_error(&node.name))?;

        let expected = normalize_image(image);
        let running = images.iter().any(|i| normalize_image(i) == expected);
        debug!(containers = images.len(), running, "listed running images");
        Ok(running)
    }
}
