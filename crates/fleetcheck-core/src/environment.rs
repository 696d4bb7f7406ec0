//! Fleet topology: nodes, applications and where they should run

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{AuditError, EnvironmentError};

/// File name of the topology inside the base directory
pub const ENVIRONMENT_FILE: &str = "fleet.toml";

/// One member of the fleet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    /// Unique node name
    pub name: String,
    /// IP address or hostname
    pub host: String,
    /// SSH user (defaults to root)
    #[serde(default = "default_user")]
    pub user: String,
    /// SSH port
    #[serde(default = "default_port")]
    pub port: u16,
    /// Path to SSH private key; falls back to `~/.ssh/id_*`
    #[serde(default)]
    pub ssh_key: Option<PathBuf>,
    /// Environment variable holding a base64 private key
    #[serde(default)]
    pub ssh_key_env: Option<String>,
    /// Labels used by placement policies
    #[serde(default)]
    pub labels: Vec<String>,
}

fn default_user() -> String {
    "root".to_string()
}

fn default_port() -> u16 {
    22
}

impl Node {
    /// Create a node with default SSH settings and no labels
    pub fn new(name: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            host: host.into(),
            user: default_user(),
            port: default_port(),
            ssh_key: None,
            ssh_key_env: None,
            labels: Vec::new(),
        }
    }

    /// Add labels
    #[must_use]
    pub fn with_labels<I, S>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.labels.extend(labels.into_iter().map(Into::into));
        self
    }

    /// Whether the node is this machine
    #[must_use]
    pub fn is_local(&self) -> bool {
        matches!(self.host.as_str(), "localhost" | "127.0.0.1" | "::1")
    }

    /// Whether the node carries `label`
    #[must_use]
    pub fn has_label(&self, label: &str) -> bool {
        self.labels.iter().any(|l| l == label)
    }
}

/// Which nodes an application should run on
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Placement {
    /// Every node in the environment
    #[default]
    All,
    /// Exactly these nodes, in this order
    Nodes(Vec<String>),
    /// Every node carrying at least one of these labels
    Labels(Vec<String>),
}

/// A deployable unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Application {
    /// Unique application name
    pub name: String,
    /// Placement policy
    #[serde(default)]
    pub placement: Placement,
}

impl Application {
    /// Create an application placed on every node
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            placement: Placement::All,
        }
    }

    /// Set placement policy
    #[must_use]
    pub fn with_placement(mut self, placement: Placement) -> Self {
        self.placement = placement;
        self
    }
}

/// On-disk shape of `fleet.toml`
#[derive(Debug, Deserialize)]
struct EnvironmentFile {
    #[serde(default, rename = "node")]
    nodes: Vec<Node>,
    #[serde(default, rename = "application")]
    applications: Vec<Application>,
}

/// Loaded topology. Names are unique within each kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Environment {
    base_dir: PathBuf,
    nodes: Vec<Node>,
    applications: Vec<Application>,
}

impl Environment {
    /// Build an environment, validating names
    ///
    /// # Errors
    /// Returns `EnvironmentError` for duplicate names or empty required fields
    pub fn new(
        base_dir: impl Into<PathBuf>,
        nodes: Vec<Node>,
        applications: Vec<Application>,
    ) -> Result<Self, EnvironmentError> {
        let mut seen = HashSet::new();
        for node in &nodes {
            if node.name.trim().is_empty() {
                return Err(EnvironmentError::InvalidNode {
                    name: node.name.clone(),
                    reason: "name is empty".to_string(),
                });
            }
            if node.host.trim().is_empty() {
                return Err(EnvironmentError::InvalidNode {
                    name: node.name.clone(),
                    reason: "host is empty".to_string(),
                });
            }
            if !seen.insert(node.name.as_str()) {
                return Err(EnvironmentError::DuplicateNode(node.name.clone()));
            }
        }

        let mut seen = HashSet::new();
        for app in &applications {
            if app.name.trim().is_empty() {
                return Err(EnvironmentError::InvalidApplication {
                    name: app.name.clone(),
                    reason: "name is empty".to_string(),
                });
            }
            if !seen.insert(app.name.as_str()) {
                return Err(EnvironmentError::DuplicateApplication(app.name.clone()));
            }
        }

        Ok(Self {
            base_dir: base_dir.into(),
            nodes,
            applications,
        })
    }

    /// Load `fleet.toml` from `base_dir`
    ///
    /// # Errors
    /// Returns `EnvironmentError` if the file is unreadable, malformed or
    /// violates name uniqueness
    pub fn load(base_dir: &Path) -> Result<Self, EnvironmentError> {
        let path = base_dir.join(ENVIRONMENT_FILE);
        let content = std::fs::read_to_string(&path).map_err(|e| EnvironmentError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        let file: EnvironmentFile =
            toml::from_str(&content).map_err(|e| EnvironmentError::Parse {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;

        debug!(
            path = %path.display(),
            nodes = file.nodes.len(),
            applications = file.applications.len(),
            "loaded environment"
        );

        Self::new(base_dir, file.nodes, file.applications)
    }

    /// Directory holding `fleet.toml` and `fleet.lock`
    #[must_use]
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// All nodes, in file order
    #[must_use]
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Look up a node by name
    #[must_use]
    pub fn node(&self, name: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.name == name)
    }

    /// All applications, in file order
    #[must_use]
    pub fn applications(&self) -> &[Application] {
        &self.applications
    }

    /// Look up an application by name
    ///
    /// # Errors
    /// Returns `AuditError::UnknownApplication` if no application has that name
    pub fn application(&self, name: &str) -> Result<&Application, AuditError> {
        self.applications
            .iter()
            .find(|a| a.name == name)
            .ok_or_else(|| AuditError::UnknownApplication(name.to_string()))
    }
}
