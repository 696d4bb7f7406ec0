//! Executor factory: picks local or SSH execution per node

use std::sync::Arc;

use fleetcheck_core::Node;
use fleetcheck_exec::{
    ConnectionInfo, DefaultKeys, KeySource, LocalExecutor, RemoteExecutor, SshExecutor,
};
use tracing::debug;

use crate::error::ConnectorError;

/// Creates the executor used to reach a node
pub trait ExecutorFactory: Send + Sync {
    /// Build an executor for `node`
    ///
    /// # Errors
    /// Returns `ConnectorError::ExecutorSetup` if the node's connection
    /// settings are unusable (e.g. its SSH key cannot be resolved)
    fn create_executor(&self, node: &Node) -> Result<Arc<dyn RemoteExecutor>, ConnectorError>;
}

/// Local execution for `localhost` nodes, SSH for everything else
#[derive(Debug, Clone, Default)]
pub struct DefaultExecutorFactory {
    defaults: DefaultKeys,
}

impl DefaultExecutorFactory {
    /// Factory falling back to `~/.ssh` and `$SSH_AUTH_SOCK`
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the fallback for nodes that name no key
    #[must_use]
    pub fn with_default_keys(mut self, defaults: DefaultKeys) -> Self {
        self.defaults = defaults;
        self
    }

    fn key_source(&self, node: &Node) -> KeySource {
        match (&node.ssh_key, &node.ssh_key_env) {
            (Some(path), _) => KeySource::Path(path.clone()),
            (None, Some(var)) => KeySource::Env(var.clone()),
            (None, None) => KeySource::Default(self.defaults.clone()),
        }
    }
}

impl ExecutorFactory for DefaultExecutorFactory {
    fn create_executor(&self, node: &Node) -> Result<Arc<dyn RemoteExecutor>, ConnectorError> {
        if node.is_local() {
            debug!(node = %node.name, "using local executor");
            return Ok(Arc::new(LocalExecutor::new()));
        }

        let conn_info = ConnectionInfo::new(&node.host, &node.user).with_port(node.port);
        let executor = SshExecutor::new(conn_info, &self.key_source(node)).map_err(|e| {
            ConnectorError::ExecutorSetup {
                node: node.name.clone(),
                reason: e.to_string(),
            }
        })?;

        debug!(node = %node.name, host = %node.host, "using SSH executor");
        Ok(Arc::new(executor))
    }
}
