//! Run-level settings

use std::time::Duration;

/// Settings for one status run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditConfig {
    /// Maximum number of node queries in flight
    pub concurrency: usize,
    /// Deadline for the whole run; `None` waits indefinitely
    pub deadline: Option<Duration>,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            concurrency: 8,
            deadline: None,
        }
    }
}

impl AuditConfig {
    /// Set the concurrency limit (at least 1)
    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Set the whole-run deadline
    #[must_use]
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }
}
