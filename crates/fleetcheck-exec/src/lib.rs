//! fleetcheck-exec: Command execution on fleet nodes
//!
//! Runs shell commands either on the local machine or on a remote node over SSH,
//! behind the common [`RemoteExecutor`] trait.

pub mod error;
pub mod keys;
pub mod local;
pub mod result;
pub mod ssh;
pub mod traits;

pub use error::ExecError;
pub use keys::{DefaultKeys, KeyError, KeySource, ResolvedKey};
pub use local::LocalExecutor;
pub use result::{CommandResult, ConnectionInfo};
pub use ssh::SshExecutor;
pub use traits::RemoteExecutor;
