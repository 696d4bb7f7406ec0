//! SSH command execution using russh crate

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
#[cfg(unix)]
use russh::keys::agent::client::AgentClient;
use russh::keys::ssh_key;
use russh::keys::{HashAlg, PrivateKeyWithHashAlg, load_secret_key};
use russh::{ChannelMsg, Disconnect, client};
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{debug, info, instrument, warn};

use crate::error::ExecError;
use crate::keys::{KeySource, ResolvedKey};
use crate::result::{CommandResult, ConnectionInfo};
use crate::traits::RemoteExecutor;

/// SSH client handler for russh
#[derive(Debug)]
struct SshClientHandler;

impl client::Handler for SshClientHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        _server_public_key: &ssh_key::PublicKey,
    ) -> Result<bool, Self::Error> {
        // Read-only audit commands only; host keys are not pinned.
        Ok(true)
    }
}

/// Output of one exec channel, folded from its messages
#[derive(Debug, Default)]
struct ChannelOutput {
    status: Option<u32>,
    stdout: Vec<u8>,
    stderr: Vec<u8>,
}

impl ChannelOutput {
    fn push(&mut self, msg: ChannelMsg) {
        match msg {
            ChannelMsg::Data { data } => self.stdout.extend_from_slice(&data),
            // ext 1 is stderr
            ChannelMsg::ExtendedData { data, ext: 1 } => self.stderr.extend_from_slice(&data),
            ChannelMsg::ExitStatus { exit_status } => self.status = Some(exit_status),
            _ => {}
        }
    }

    /// A channel that closes without reporting a status yields -1
    fn into_result(self, duration: Duration) -> CommandResult {
        CommandResult {
            status: self.status.map_or(-1, u32::cast_signed),
            stdout: String::from_utf8_lossy(&self.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&self.stderr).into_owned(),
            duration,
        }
    }
}

impl FromIterator<ChannelMsg> for ChannelOutput {
    fn from_iter<I: IntoIterator<Item = ChannelMsg>>(iter: I) -> Self {
        let mut output = Self::default();
        for msg in iter {
            output.push(msg);
        }
        output
    }
}

/// Executor for a remote node reached over SSH.
///
/// The session is opened lazily on the first command and then reused, so a
/// reachability probe followed by a deployment check costs one handshake.
pub struct SshExecutor {
    conn_info: ConnectionInfo,
    key: ResolvedKey,
    session: Mutex<Option<client::Handle<SshClientHandler>>>,
}

impl std::fmt::Debug for SshExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SshExecutor")
            .field("conn_info", &self.conn_info)
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

impl SshExecutor {
    /// Create a new SSH executor
    ///
    /// # Errors
    /// Returns `ExecError::SshKeyError` if key resolution fails
    pub fn new(conn_info: ConnectionInfo, key_source: &KeySource) -> Result<Self, ExecError> {
        let key = key_source
            .resolve()
            .map_err(|e| ExecError::SshKeyError(e.to_string()))?;

        Ok(Self {
            conn_info,
            key,
            session: Mutex::new(None),
        })
    }

    fn connection_failed(&self, reason: impl ToString) -> ExecError {
        ExecError::ConnectionFailed {
            host: self.conn_info.host.clone(),
            reason: reason.to_string(),
        }
    }

    fn auth_failed(&self, reason: impl ToString) -> ExecError {
        ExecError::AuthenticationFailed {
            host: self.conn_info.host.clone(),
            user: self.conn_info.user.clone(),
            reason: reason.to_string(),
        }
    }

    #[instrument(skip(self), fields(host = %self.conn_info.host))]
    async fn connect(&self) -> Result<(), ExecError> {
        let mut session_lock = self.session.lock().await;

        if session_lock.is_some() {
            return Ok(());
        }

        debug!(
            port = self.conn_info.port,
            user = %self.conn_info.user,
            "connecting to SSH"
        );

        let config = Arc::new(client::Config::default());

        let mut session = client::connect(
            config,
            (&self.conn_info.host[..], self.conn_info.port),
            SshClientHandler,
        )
        .await
        .map_err(|e| self.connection_failed(e))?;

        let hash_alg = session
            .best_supported_rsa_hash()
            .await
            .ok()
            .flatten()
            .flatten();

        let authenticated = match &self.key {
            ResolvedKey::Path(key_file) | ResolvedKey::Temp(key_file) => {
                let key_pair = load_secret_key(key_file, None)
                    .map_err(|e| ExecError::SshKeyError(e.to_string()))?;
                session
                    .authenticate_publickey(
                        &self.conn_info.user,
                        PrivateKeyWithHashAlg::new(Arc::new(key_pair), hash_alg),
                    )
                    .await
                    .map_err(|e| self.auth_failed(e))?
                    .success()
            }
            ResolvedKey::Agent(socket) => {
                self.authenticate_with_agent(&mut session, socket, hash_alg)
                    .await?
            }
        };

        if !authenticated {
            return Err(self.auth_failed("public key rejected"));
        }

        info!(host = %self.conn_info.host, "SSH session established");

        *session_lock = Some(session);
        Ok(())
    }

    /// Offer each agent identity until the server accepts one
    #[cfg(unix)]
    async fn authenticate_with_agent(
        &self,
        session: &mut client::Handle<SshClientHandler>,
        socket: &Path,
        hash_alg: Option<HashAlg>,
    ) -> Result<bool, ExecError> {
        let mut agent = AgentClient::connect_uds(socket)
            .await
            .map_err(|e| self.auth_failed(format!("ssh-agent at {}: {e}", socket.display())))?;
        let identities = agent
            .request_identities()
            .await
            .map_err(|e| self.auth_failed(format!("ssh-agent: {e}")))?;

        debug!(identities = identities.len(), "authenticating with ssh-agent");

        for key in identities {
            let algorithm = key.algorithm();
            let result = session
                .authenticate_publickey_with(&self.conn_info.user, key, hash_alg, &mut agent)
                .await
                .map_err(|e| self.auth_failed(e))?;
            if result.success() {
                return Ok(true);
            }
            debug!(%algorithm, "agent identity rejected");
        }

        Ok(false)
    }

    #[cfg(not(unix))]
    async fn authenticate_with_agent(
        &self,
        _session: &mut client::Handle<SshClientHandler>,
        _socket: &Path,
        _hash_alg: Option<HashAlg>,
    ) -> Result<bool, ExecError> {
        Err(self.auth_failed("ssh-agent is only supported on unix"))
    }

    async fn execute_remote(&self, cmd: &str) -> Result<CommandResult, ExecError> {
        let mut session_lock = self.session.lock().await;
        let session = session_lock.as_mut().ok_or(ExecError::NotConnected)?;

        let start = Instant::now();

        let mut channel = session
            .channel_open_session()
            .await
            .map_err(|e| ExecError::IoError(e.to_string()))?;

        channel
            .exec(true, cmd)
            .await
            .map_err(|e| ExecError::IoError(e.to_string()))?;

        // The exit status usually follows EOF; read until the channel closes.
        let mut output = ChannelOutput::default();
        while let Some(msg) = channel.wait().await {
            output.push(msg);
        }

        let result = output.into_result(start.elapsed());

        debug!(
            host = %self.conn_info.host,
            command = %cmd,
            status = result.status,
            duration = ?result.duration,
            "remote command completed"
        );

        Ok(result)
    }
}

#[async_trait]
impl RemoteExecutor for SshExecutor {
    #[instrument(skip(self), fields(host = %self.conn_info.host))]
    async fn run(&self, cmd: &str) -> Result<CommandResult, ExecError> {
        self.connect().await?;
        self.execute_remote(cmd).await
    }

    #[instrument(skip(self), fields(host = %self.conn_info.host))]
    async fn run_with_timeout(
        &self,
        cmd: &str,
        timeout_duration: Duration,
    ) -> Result<CommandResult, ExecError> {
        let attempt = async {
            self.connect().await?;
            self.execute_remote(cmd).await
        };

        match timeout(timeout_duration, attempt).await {
            Ok(result) => result,
            Err(_) => {
                warn!(command = %cmd, timeout = ?timeout_duration, "remote command timed out");
                Err(ExecError::Timeout {
                    timeout: timeout_duration,
                })
            }
        }
    }

    async fn close(&self) -> Result<(), ExecError> {
        let mut session_lock = self.session.lock().await;

        if let Some(session) = session_lock.take() {
            session
                .disconnect(Disconnect::ByApplication, "", "English")
                .await
                .map_err(|e| ExecError::IoError(e.to_string()))?;
            debug!(host = %self.conn_info.host, "SSH disconnected");
        }
        Ok(())
    }

    fn executor_type(&self) -> &'static str {
        "ssh"
    }
}
