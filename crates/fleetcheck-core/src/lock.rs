//! Build lock record: the image each application's last build produced

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{AuditError, LockError};

/// File name of the lock record inside the base directory
pub const LOCK_FILE: &str = "fleet.lock";

/// Mapping from application name to built image identifier
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockRecord {
    #[serde(default)]
    versions: BTreeMap<String, String>,
}

impl LockRecord {
    /// Build a record from `(application, image)` pairs
    pub fn from_versions<I, A, V>(versions: I) -> Self
    where
        I: IntoIterator<Item = (A, V)>,
        A: Into<String>,
        V: Into<String>,
    {
        Self {
            versions: versions
                .into_iter()
                .map(|(a, v)| (a.into(), v.into()))
                .collect(),
        }
    }

    /// Load `fleet.lock` from `base_dir`
    ///
    /// # Errors
    /// Returns `LockError::Missing` if the file does not exist, which means the
    /// build step was never run, and `Io`/`Parse` for unreadable content.
    pub fn load(base_dir: &Path) -> Result<Self, LockError> {
        let path = base_dir.join(LOCK_FILE);
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(LockError::Missing {
                    path: path.display().to_string(),
                });
            }
            Err(e) => {
                return Err(LockError::Io {
                    path: path.display().to_string(),
                    reason: e.to_string(),
                });
            }
        };

        let record: LockRecord = toml::from_str(&content).map_err(|e| LockError::Parse {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        debug!(path = %path.display(), entries = record.versions.len(), "loaded lock record");
        Ok(record)
    }

    /// Image the last build produced for `app`.
    ///
    /// # Errors
    /// Returns `AuditError::NotBuilt` when `app` has no entry.
    pub fn expected_version(&self, app: &str) -> Result<&str, AuditError> {
        self.versions
            .get(app)
            .map(String::as_str)
            .ok_or_else(|| AuditError::NotBuilt(app.to_string()))
    }

    /// Number of locked applications
    #[must_use]
    pub fn len(&self) -> usize {
        self.versions.len()
    }

    /// Whether nothing is locked
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_lock() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(LOCK_FILE),
            "[versions]\nweb = \"registry.local/web:7\"\napi = \"registry.local/api:3\"\n",
        )
        .unwrap();

        let lock = LockRecord::load(dir.path()).unwrap();

        assert_eq!(lock.len(), 2);
        assert_eq!(lock.expected_version("web").unwrap(), "registry.local/web:7");
    }

    #[test]
    fn test_missing_lock_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = LockRecord::load(dir.path()).unwrap_err();

        assert!(matches!(err, LockError::Missing { .. }));
        assert!(err.to_string().contains("run the build step first"));
    }

    #[test]
    fn test_malformed_lock_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(LOCK_FILE), "versions = 7").unwrap();

        assert!(matches!(
            LockRecord::load(dir.path()),
            Err(LockError::Parse { .. })
        ));
    }

    #[test]
    fn test_not_built() {
        let lock = LockRecord::from_versions([("web", "img:7")]);

        assert_eq!(
            lock.expected_version("api"),
            Err(AuditError::NotBuilt("api".to_string()))
        );
    }

    #[test]
    fn test_empty_lock_file_is_valid() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(LOCK_FILE), "").unwrap();

        assert!(LockRecord::load(dir.path()).unwrap().is_empty());
    }
}
