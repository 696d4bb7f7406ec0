//! Core error types for fleetcheck-core

use std::time::Duration;

use thiserror::Error;

/// Errors raised while loading `fleet.toml`
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EnvironmentError {
    /// The environment file could not be read
    #[error("cannot read environment file {path}: {reason}")]
    Io {
        /// File that was read
        path: String,
        /// Underlying I/O error
        reason: String,
    },

    /// The environment file is not valid TOML or has the wrong shape
    #[error("cannot parse environment file {path}: {reason}")]
    Parse {
        /// File that was parsed
        path: String,
        /// Parser message
        reason: String,
    },

    /// Two nodes share a name
    #[error("node {0:?} is defined more than once")]
    DuplicateNode(String),

    /// Two applications share a name
    #[error("application {0:?} is defined more than once")]
    DuplicateApplication(String),

    /// A node descriptor is incomplete
    #[error("node {name:?} is invalid: {reason}")]
    InvalidNode {
        /// Node name (may be empty)
        name: String,
        /// What is wrong with it
        reason: String,
    },

    /// An application descriptor is incomplete
    #[error("application {name:?} is invalid: {reason}")]
    InvalidApplication {
        /// Application name (may be empty)
        name: String,
        /// What is wrong with it
        reason: String,
    },
}

/// Errors raised while loading `fleet.lock`
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LockError {
    /// No lock file at all: nothing was ever built
    #[error("lock file {path} not found. Please run the build step first")]
    Missing {
        /// Expected lock file location
        path: String,
    },

    /// The lock file exists but could not be read
    #[error("cannot read lock file {path}: {reason}")]
    Io {
        /// Lock file location
        path: String,
        /// Underlying I/O error
        reason: String,
    },

    /// The lock file is malformed
    #[error("cannot parse lock file {path}: {reason}")]
    Parse {
        /// Lock file location
        path: String,
        /// Parser message
        reason: String,
    },
}

/// A placement policy that cannot be evaluated against the topology
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolutionError {
    /// Placement names a node that does not exist
    #[error("application {app:?} is placed on undefined node {node:?}")]
    UndefinedNode {
        /// Application being resolved
        app: String,
        /// Missing node name
        node: String,
    },

    /// Placement names a label no node carries
    #[error("application {app:?} is placed on label {label:?}, which no node carries")]
    UndefinedLabel {
        /// Application being resolved
        app: String,
        /// Label without members
        label: String,
    },
}

/// A node could not be queried
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("cannot query node {node:?}: {reason}")]
pub struct ProbeError {
    /// Node that was queried
    pub node: String,
    /// Transport or configuration failure
    pub reason: String,
}

impl ProbeError {
    /// Create a probe error for `node`
    pub fn new(node: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            node: node.into(),
            reason: reason.into(),
        }
    }
}

/// Terminal error of a status run.
///
/// Any of these aborts the whole run; no partial report is produced.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuditError {
    /// Topology could not be loaded
    #[error(transparent)]
    Environment(#[from] EnvironmentError),

    /// Lock record could not be loaded
    #[error(transparent)]
    Lock(#[from] LockError),

    /// The requested application is not part of the environment
    #[error("unknown application {0:?}: it is not defined in the environment")]
    UnknownApplication(String),

    /// Target selection failed for an application
    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    /// The application has no lock entry
    #[error(
        "application {0:?} does not have a corresponding lock entry. Please run the build step first"
    )]
    NotBuilt(String),

    /// A node descriptor could not be probed at all
    #[error("reachability probe failed: {0}")]
    NodeProbe(ProbeError),

    /// Checking whether an application runs on a node failed
    #[error("deployment check for application {app:?} failed: {source}")]
    DeploymentCheck {
        /// Application being checked
        app: String,
        /// Underlying probe failure
        source: ProbeError,
    },

    /// The whole run exceeded its deadline
    #[error("status run did not finish within {0:?}")]
    Timeout(Duration),
}

impl AuditError {
    /// Stage of the run that failed
    #[must_use]
    pub fn stage(&self) -> &'static str {
        match self {
            AuditError::Environment(_) => "load-environment",
            AuditError::Lock(_) => "load-lock",
            AuditError::UnknownApplication(_) => "select-applications",
            AuditError::NodeProbe(_) => "probe-nodes",
            AuditError::Resolution(_) => "resolve-targets",
            AuditError::NotBuilt(_) => "expected-version",
            AuditError::DeploymentCheck { .. } => "check-deployment",
            AuditError::Timeout(_) => "deadline",
        }
    }

    /// Name of the node or application responsible, if there is one
    #[must_use]
    pub fn entity(&self) -> Option<&str> {
        match self {
            AuditError::UnknownApplication(app) | AuditError::NotBuilt(app) => Some(app),
            AuditError::Resolution(
                ResolutionError::UndefinedNode { app, .. }
                | ResolutionError::UndefinedLabel { app, .. },
            ) => Some(app),
            AuditError::NodeProbe(err) | AuditError::DeploymentCheck { source: err, .. } => {
                Some(&err.node)
            }
            AuditError::Environment(
                EnvironmentError::DuplicateNode(name)
                | EnvironmentError::DuplicateApplication(name),
            ) => Some(name),
            AuditError::Environment(_) | AuditError::Lock(_) | AuditError::Timeout(_) => None,
        }
    }
}
