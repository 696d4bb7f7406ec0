//! Run phases and progress reporting

use std::fmt;

/// Phases of a status run.
///
/// A run moves forward only: `Idle → ProbingNodes → CheckingApplications →
/// Done`, and may drop into `Failed` from any non-terminal phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditPhase {
    Idle,
    ProbingNodes,
    CheckingApplications,
    Done,
    Failed,
}

impl AuditPhase {
    /// Whether `next` may follow `self`
    #[must_use]
    pub fn can_transition_to(self, next: AuditPhase) -> bool {
        use AuditPhase::{CheckingApplications, Done, Failed, Idle, ProbingNodes};

        matches!(
            (self, next),
            (Idle, ProbingNodes)
                | (ProbingNodes, CheckingApplications)
                | (CheckingApplications, Done)
                | (Idle | ProbingNodes | CheckingApplications, Failed)
        )
    }

    /// Whether the run is over
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, AuditPhase::Done | AuditPhase::Failed)
    }
}

impl fmt::Display for AuditPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AuditPhase::Idle => "idle",
            AuditPhase::ProbingNodes => "probing_nodes",
            AuditPhase::CheckingApplications => "checking_applications",
            AuditPhase::Done => "done",
            AuditPhase::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Observer for long runs, e.g. a progress bar.
///
/// Callbacks may arrive from concurrent probes in any order; `done` counts are
/// monotonic per phase. Observers never influence the report.
pub trait ProgressObserver: Send + Sync {
    fn phase_changed(&self, _phase: AuditPhase) {}

    fn node_probed(&self, _node: &str, _reachable: bool, _done: usize, _total: usize) {}

    fn application_checked(&self, _app: &str, _done: usize, _total: usize) {}
}

/// Observer that ignores everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl ProgressObserver for NoopObserver {}
