//! Remote executor trait

use std::time::Duration;

use async_trait::async_trait;

use crate::error::ExecError;
use crate::result::CommandResult;

/// Something that can run a shell command on one node.
#[async_trait]
pub trait RemoteExecutor: Send + Sync {
    /// Run a command and collect its output.
    async fn run(&self, cmd: &str) -> Result<CommandResult, ExecError>;

    /// Run a command, giving up after `timeout`.
    ///
    /// The deadline covers connection setup as well as the command itself.
    async fn run_with_timeout(
        &self,
        cmd: &str,
        timeout: Duration,
    ) -> Result<CommandResult, ExecError>;

    /// Release any connection held open between commands.
    async fn close(&self) -> Result<(), ExecError> {
        Ok(())
    }

    /// Short name of the transport, used in logs
    fn executor_type(&self) -> &'static str;
}
