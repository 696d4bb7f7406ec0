//! User configuration loading and types

use std::path::{Path, PathBuf};
use std::time::Duration;

use fleetcheck_core::AuditConfig;
use fleetcheck_docker::DockerSettings;
use serde::{Deserialize, Serialize};

/// Environment variable pointing at a config file
pub const CONFIG_ENV: &str = "FLEETCHECK_CONFIG";

/// Environment variable holding the default base directory
pub const BASE_DIR_ENV: &str = "FLEETCHECK_BASE_DIR";

/// Defaults for `fleetcheck`, overridable per invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Maximum number of nodes queried at once
    pub concurrency: usize,
    /// Deadline for a whole status run in seconds; 0 disables it
    pub timeout_secs: u64,
    /// Deadline for a single reachability probe in seconds
    pub probe_timeout_secs: u64,
    /// Docker CLI invoked on each node
    pub docker_bin: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "warn".to_string(),
            concurrency: 8,
            timeout_secs: 120,
            probe_timeout_secs: 10,
            docker_bin: "docker".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from file
    ///
    /// # Errors
    /// Returns error if file cannot be read or parsed
    pub fn load(path: &Path) -> eyre::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| eyre::eyre!("cannot read config {}: {e}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| eyre::eyre!("cannot parse config {}: {e}", path.display()))?;
        Ok(config)
    }

    /// Load from the usual locations, falling back to defaults.
    ///
    /// Returns the file that was used, if any.
    ///
    /// # Errors
    /// Returns error if a config file exists but cannot be loaded
    pub fn load_default() -> eyre::Result<(Self, Option<PathBuf>)> {
        if let Ok(path) = std::env::var(CONFIG_ENV) {
            let path = PathBuf::from(path);
            return Ok((Self::load(&path)?, Some(path)));
        }

        let mut paths = vec![PathBuf::from("fleetcheck.toml")];
        if let Some(dir) = dirs::config_dir() {
            paths.push(dir.join("fleetcheck/config.toml"));
        }

        for path in paths {
            if path.exists() {
                return Ok((Self::load(&path)?, Some(path)));
            }
        }

        Ok((Config::default(), None))
    }

    /// Apply command-line overrides
    pub fn apply_overrides(&mut self, concurrency: Option<usize>, timeout_secs: Option<u64>) {
        if let Some(concurrency) = concurrency {
            self.concurrency = concurrency;
        }
        if let Some(timeout_secs) = timeout_secs {
            self.timeout_secs = timeout_secs;
        }
    }

    /// Run settings for the aggregator
    #[must_use]
    pub fn audit_config(&self) -> AuditConfig {
        let config = AuditConfig::default().with_concurrency(self.concurrency);
        if self.timeout_secs == 0 {
            config
        } else {
            config.with_deadline(Duration::from_secs(self.timeout_secs))
        }
    }

    /// Settings for the docker connector
    #[must_use]
    pub fn docker_settings(&self) -> DockerSettings {
        DockerSettings {
            docker_bin: self.docker_bin.clone(),
            probe_timeout: Duration::from_secs(self.probe_timeout_secs.max(1)),
            ..DockerSettings::default()
        }
    }
}

/// `--base-dir`, else `FLEETCHECK_BASE_DIR`, else the working directory
///
/// # Errors
/// Returns error if the working directory cannot be determined
pub fn resolve_base_dir(flag: Option<PathBuf>) -> eyre::Result<PathBuf> {
    if let Some(dir) = flag {
        return Ok(dir);
    }
    if let Some(dir) = std::env::var_os(BASE_DIR_ENV) {
        return Ok(PathBuf::from(dir));
    }
    Ok(std::env::current_dir()?)
}
