//! SSH key management and resolution

use std::env;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{debug, warn};

/// Keys tried, in order, when a node does not name one
const DEFAULT_KEY_NAMES: &[&str] = &["id_ed25519", "id_ecdsa", "id_rsa"];

static TEMP_KEY_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Where the private key for a node comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeySource {
    /// Explicit path to key file; a leading `~/` is expanded
    Path(PathBuf),
    /// Base64-encoded key held in the named environment variable
    Env(String),
    /// First of the usual key files that exists, else the running ssh-agent
    Default(DefaultKeys),
}

impl KeySource {
    /// Resolve the source to a key file on disk.
    ///
    /// `Env` keys are decoded and written to a private temp file that is
    /// removed when the returned [`ResolvedKey`] is dropped.
    ///
    /// # Errors
    /// Returns `KeyError` if the key cannot be located, decoded or has
    /// permissions that are too open.
    pub fn resolve(&self) -> Result<ResolvedKey, KeyError> {
        match self {
            KeySource::Path(path) => {
                let path = expand_home(path);
                if !path.exists() {
                    return Err(KeyError::NotFound(path.display().to_string()));
                }
                validate_key_permissions(&path)?;
                Ok(ResolvedKey::Path(path))
            }
            KeySource::Env(var_name) => {
                let encoded =
                    env::var(var_name).map_err(|_| KeyError::EnvNotSet(var_name.clone()))?;
                let key_data = base64_decode(&encoded).map_err(|_| KeyError::InvalidBase64)?;
                Ok(ResolvedKey::Temp(write_temp_key(&key_data)?))
            }
            KeySource::Default(defaults) => defaults.resolve(),
        }
    }
}

/// Where to look for a key when a node does not name one
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefaultKeys {
    /// Directory holding `id_ed25519`, `id_ecdsa`, `id_rsa`
    pub ssh_dir: Option<PathBuf>,
    /// ssh-agent socket
    pub agent_socket: Option<PathBuf>,
}

impl DefaultKeys {
    /// `~/.ssh` and `$SSH_AUTH_SOCK`
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            ssh_dir: dirs::home_dir().map(|home| home.join(".ssh")),
            agent_socket: env::var_os("SSH_AUTH_SOCK")
                .filter(|sock| !sock.is_empty())
                .map(PathBuf::from),
        }
    }

    fn resolve(&self) -> Result<ResolvedKey, KeyError> {
        let key_file = self.ssh_dir.as_ref().and_then(|dir| {
            DEFAULT_KEY_NAMES
                .iter()
                .map(|name| dir.join(name))
                .find(|p| p.exists())
        });

        if let Some(path) = key_file {
            validate_key_permissions(&path)?;
            return Ok(ResolvedKey::Path(path));
        }

        match &self.agent_socket {
            Some(socket) => {
                debug!(socket = %socket.display(), "no default key file, using ssh-agent");
                Ok(ResolvedKey::Agent(socket.clone()))
            }
            None => Err(KeyError::NoDefaultKey(
                self.ssh_dir
                    .as_ref()
                    .map_or_else(|| "~/.ssh".to_string(), |dir| dir.display().to_string()),
            )),
        }
    }
}

impl Default for DefaultKeys {
    fn default() -> Self {
        Self::from_env()
    }
}

/// Resolved key location
#[derive(Debug)]
pub enum ResolvedKey {
    /// Key file owned by the user
    Path(PathBuf),
    /// Temporary file, deleted on drop
    Temp(PathBuf),
    /// Keys held by the ssh-agent listening on this socket
    Agent(PathBuf),
}

impl ResolvedKey {
    /// Private key file, unless the agent signs for us
    #[must_use]
    pub fn key_file(&self) -> Option<&Path> {
        match self {
            ResolvedKey::Path(p) | ResolvedKey::Temp(p) => Some(p),
            ResolvedKey::Agent(_) => None,
        }
    }
}

impl Drop for ResolvedKey {
    fn drop(&mut self) {
        if let ResolvedKey::Temp(path) = self
            && let Err(e) = std::fs::remove_file(&*path)
        {
            warn!(path = %path.display(), error = %e, "failed to remove temp key");
        }
    }
}

/// Key resolution errors
#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    #[error("environment variable {0} not set")]
    EnvNotSet(String),

    #[error("invalid base64 encoding")]
    InvalidBase64,

    #[error("key file permissions too open: {0} (should be 600)")]
    BadPermissions(String),

    #[error("key file not found: {0}")]
    NotFound(String),

    #[error("no SSH key in {0} and SSH_AUTH_SOCK is not set; set ssh_key or ssh_key_env")]
    NoDefaultKey(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn expand_home(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => dirs::home_dir().map_or_else(|| path.to_path_buf(), |home| home.join(rest)),
        Err(_) => path.to_path_buf(),
    }
}

fn base64_decode(input: &str) -> Result<Vec<u8>, base64::DecodeError> {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD.decode(input.trim())
}

#[cfg(unix)]
fn validate_key_permissions(path: &Path) -> Result<(), KeyError> {
    use std::os::unix::fs::PermissionsExt;

    let mode = std::fs::metadata(path)?.permissions().mode();

    // group and other bits must be clear
    if mode & 0o77 != 0 {
        return Err(KeyError::BadPermissions(path.display().to_string()));
    }

    Ok(())
}

#[cfg(not(unix))]
fn validate_key_permissions(_path: &Path) -> Result<(), KeyError> {
    Ok(())
}

fn write_temp_key(key_data: &[u8]) -> Result<PathBuf, KeyError> {
    use std::fs::OpenOptions;
    use std::io::Write;

    let temp_path = std::env::temp_dir().join(format!(
        "fleetcheck_ssh_key_{}_{}",
        std::process::id(),
        TEMP_KEY_COUNTER.fetch_add(1, Ordering::Relaxed)
    ));

    let mut options = OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options.open(&temp_path)?;
    file.write_all(key_data)?;

    debug!(path = %temp_path.display(), "wrote temporary SSH key");

    Ok(temp_path)
}
