//! Status aggregation across the fleet
//!
//! A run probes every node, resolves each selected application's targets and
//! expected image, then asks each reachable target whether that image is
//! running. Independent queries fan out with bounded concurrency and are
//! joined back in a fixed order, so two runs against the same fleet produce
//! equal reports.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use futures::stream::{self, StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::config::AuditConfig;
use crate::environment::{Application, Environment, Node};
use crate::error::AuditError;
use crate::lock::LockRecord;
use crate::probe::{DeploymentChecker, NodeProbe};
use crate::progress::{AuditPhase, NoopObserver, ProgressObserver};
use crate::resolver::{PlacementResolver, TargetResolver};

/// Which applications a run covers
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum AppSelection {
    /// Every application in the environment
    #[default]
    All,
    /// A single application by name
    Named(String),
}

impl AppSelection {
    /// `None` selects everything
    #[must_use]
    pub fn from_arg(name: Option<String>) -> Self {
        name.map_or(AppSelection::All, AppSelection::Named)
    }
}

/// Inputs of a run, loaded before any node is contacted
#[derive(Debug, Clone)]
pub struct AuditPlan {
    environment: Environment,
    applications: Vec<Application>,
    lock: LockRecord,
}

impl AuditPlan {
    /// Assemble a plan from already loaded parts
    ///
    /// # Errors
    /// Returns `AuditError::UnknownApplication` if the selection names an
    /// application the environment does not define
    pub fn new(
        environment: Environment,
        selection: &AppSelection,
        lock: LockRecord,
    ) -> Result<Self, AuditError> {
        let applications = select_applications(&environment, selection)?;
        Ok(Self {
            environment,
            applications,
            lock,
        })
    }

    /// Load `fleet.toml` and `fleet.lock` from `base_dir`.
    ///
    /// The selection is validated before the lock is read, so asking for an
    /// unknown application is reported even when nothing was built yet.
    ///
    /// # Errors
    /// Returns `AuditError` if either file cannot be loaded or the selection
    /// names an unknown application
    pub fn load(base_dir: &Path, selection: &AppSelection) -> Result<Self, AuditError> {
        let environment = Environment::load(base_dir)?;
        let applications = select_applications(&environment, selection)?;
        let lock = LockRecord::load(environment.base_dir())?;

        Ok(Self {
            environment,
            applications,
            lock,
        })
    }

    /// Topology
    #[must_use]
    pub fn environment(&self) -> &Environment {
        &self.environment
    }

    /// Selected applications, in environment order
    #[must_use]
    pub fn applications(&self) -> &[Application] {
        &self.applications
    }

    /// Lock record
    #[must_use]
    pub fn lock(&self) -> &LockRecord {
        &self.lock
    }
}

fn select_applications(
    environment: &Environment,
    selection: &AppSelection,
) -> Result<Vec<Application>, AuditError> {
    match selection {
        AppSelection::All => Ok(environment.applications().to_vec()),
        AppSelection::Named(name) => Ok(vec![environment.application(name)?.clone()]),
    }
}

/// Point-in-time status of the fleet
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusReport {
    /// Node name → reachable, one entry per node
    pub node_reachable: BTreeMap<String, bool>,
    /// Application name → (target node name → running the locked image)
    pub app_deployment: BTreeMap<String, BTreeMap<String, bool>>,
}

impl StatusReport {
    /// Reachability of `node`, if it is part of the report
    #[must_use]
    pub fn reachable(&self, node: &str) -> Option<bool> {
        self.node_reachable.get(node).copied()
    }

    /// Per-target status of `app`
    #[must_use]
    pub fn deployment(&self, app: &str) -> Option<&BTreeMap<String, bool>> {
        self.app_deployment.get(app)
    }

    /// Whether every target of `app` runs the locked image
    #[must_use]
    pub fn is_fully_deployed(&self, app: &str) -> bool {
        self.deployment(app)
            .is_some_and(|targets| targets.values().all(|running| *running))
    }

    /// Names of unreachable nodes, sorted
    pub fn unreachable_nodes(&self) -> impl Iterator<Item = &str> {
        self.node_reachable
            .iter()
            .filter(|(_, up)| !**up)
            .map(|(name, _)| name.as_str())
    }
}

/// Phase of a single run, forwarded to the observer
struct PhaseTracker<'a> {
    observer: &'a dyn ProgressObserver,
    current: Mutex<AuditPhase>,
}

impl<'a> PhaseTracker<'a> {
    fn new(observer: &'a dyn ProgressObserver) -> Self {
        Self {
            observer,
            current: Mutex::new(AuditPhase::Idle),
        }
    }

    /// Out-of-order changes are logged and dropped
    fn advance(&self, next: AuditPhase) {
        let Ok(mut current) = self.current.lock() else {
            return;
        };
        if !current.can_transition_to(next) {
            let from = *current;
            warn!(%from, to = %next, "ignoring phase change");
            return;
        }
        *current = next;
        drop(current);

        debug!(phase = %next, "entering phase");
        self.observer.phase_changed(next);
    }
}

/// One application, resolved and ready to check
struct AppCheck<'a> {
    app: &'a Application,
    image: &'a str,
    targets: Vec<&'a Node>,
}

/// Computes a [`StatusReport`] from an [`AuditPlan`].
///
/// Stateless between runs; all collaborators are injected.
pub struct StatusAggregator {
    probe: Arc<dyn NodeProbe>,
    checker: Arc<dyn DeploymentChecker>,
    resolver: Arc<dyn TargetResolver>,
    observer: Arc<dyn ProgressObserver>,
    config: AuditConfig,
}

impl StatusAggregator {
    /// Aggregator using placement-based target resolution and no observer
    #[must_use]
    pub fn new(probe: Arc<dyn NodeProbe>, checker: Arc<dyn DeploymentChecker>) -> Self {
        Self {
            probe,
            checker,
            resolver: Arc::new(PlacementResolver),
            observer: Arc::new(NoopObserver),
            config: AuditConfig::default(),
        }
    }

    /// Replace the target resolver
    #[must_use]
    pub fn with_resolver(mut self, resolver: Arc<dyn TargetResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    /// Attach a progress observer
    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn ProgressObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Replace run settings
    #[must_use]
    pub fn with_config(mut self, config: AuditConfig) -> Self {
        self.config = config;
        self
    }

    /// Run the audit once.
    ///
    /// # Errors
    /// Any configuration defect, probe failure or an expired deadline aborts
    /// the run with a single `AuditError`; no partial report is returned.
    #[instrument(skip_all, fields(
        nodes = plan.environment().nodes().len(),
        applications = plan.applications().len()
    ))]
    pub async fn run(&self, plan: &AuditPlan) -> Result<StatusReport, AuditError> {
        let phases = PhaseTracker::new(self.observer.as_ref());
        let result = match self.config.deadline {
            Some(deadline) => tokio::time::timeout(deadline, self.evaluate(plan, &phases))
                .await
                .unwrap_or(Err(AuditError::Timeout(deadline))),
            None => self.evaluate(plan, &phases).await,
        };

        match &result {
            Ok(report) => {
                phases.advance(AuditPhase::Done);
                info!(
                    unreachable = report.unreachable_nodes().count(),
                    "status run finished"
                );
            }
            Err(e) => {
                phases.advance(AuditPhase::Failed);
                warn!(stage = e.stage(), error = %e, "status run aborted");
            }
        }

        result
    }

    async fn evaluate(
        &self,
        plan: &AuditPlan,
        phases: &PhaseTracker<'_>,
    ) -> Result<StatusReport, AuditError> {
        let env = plan.environment();

        phases.advance(AuditPhase::ProbingNodes);
        let reachable = self.probe_nodes(env.nodes()).await?;
        let by_name: HashMap<&str, bool> = env
            .nodes()
            .iter()
            .map(|n| n.name.as_str())
            .zip(reachable.iter().copied())
            .collect();

        phases.advance(AuditPhase::CheckingApplications);

        // Every configuration defect surfaces before the first deployment check.
        let mut checks = Vec::with_capacity(plan.applications().len());
        for app in plan.applications() {
            let targets = self.resolver.resolve_targets(app, env)?;
            let image = plan.lock().expected_version(&app.name)?;
            debug!(app = %app.name, image, targets = targets.len(), "resolved targets");
            checks.push(AppCheck {
                app,
                image,
                targets,
            });
        }

        let app_deployment = self.check_applications(&checks, &by_name).await?;

        Ok(StatusReport {
            node_reachable: env
                .nodes()
                .iter()
                .zip(reachable)
                .map(|(node, up)| (node.name.clone(), up))
                .collect(),
            app_deployment,
        })
    }

    /// Results come back in node order.
    async fn probe_nodes(&self, nodes: &[Node]) -> Result<Vec<bool>, AuditError> {
        let total = nodes.len();
        let done = AtomicUsize::new(0);

        stream::iter(nodes)
            .map(|node| {
                let done = &done;
                async move {
                    let reachable = self
                        .probe
                        .probe(node)
                        .await
                        .map_err(AuditError::NodeProbe)?;
                    debug!(node = %node.name, reachable, "probed node");

                    let done = done.fetch_add(1, Ordering::Relaxed) + 1;
                    self.observer.node_probed(&node.name, reachable, done, total);
                    Ok::<_, AuditError>(reachable)
                }
            })
            .buffered(self.config.concurrency.max(1))
            .try_collect()
            .await
    }

    async fn check_applications(
        &self,
        checks: &[AppCheck<'_>],
        reachable: &HashMap<&str, bool>,
    ) -> Result<BTreeMap<String, BTreeMap<String, bool>>, AuditError> {
        let is_up = |node: &Node| reachable.get(node.name.as_str()).copied().unwrap_or(false);

        // Unreachable targets are recorded as not running and never queried.
        let mut app_deployment: BTreeMap<String, BTreeMap<String, bool>> = checks
            .iter()
            .map(|check| {
                let targets = check
                    .targets
                    .iter()
                    .map(|node| (node.name.clone(), false))
                    .collect();
                (check.app.name.clone(), targets)
            })
            .collect();

        let total = checks.len();
        let finished = AtomicUsize::new(0);
        let remaining: Vec<AtomicUsize> = checks
            .iter()
            .map(|check| AtomicUsize::new(check.targets.iter().filter(|&&n| is_up(n)).count()))
            .collect();
        let complete = |idx: usize| {
            let done = finished.fetch_add(1, Ordering::Relaxed) + 1;
            self.observer
                .application_checked(&checks[idx].app.name, done, total);
        };

        for (idx, pending) in remaining.iter().enumerate() {
            if pending.load(Ordering::Relaxed) == 0 {
                complete(idx);
            }
        }

        let queries: Vec<(usize, &Node)> = checks
            .iter()
            .enumerate()
            .flat_map(|(idx, check)| {
                check
                    .targets
                    .iter()
                    .copied()
                    .filter(|&n| is_up(n))
                    .map(move |node| (idx, node))
            })
            .collect();

        let results: Vec<(usize, &Node, bool)> = stream::iter(queries)
            .map(|(idx, node)| {
                let check = &checks[idx];
                let remaining = &remaining;
                let complete = &complete;
                async move {
                    let running = self
                        .checker
                        .is_running(node, check.image)
                        .await
                        .map_err(|source| AuditError::DeploymentCheck {
                            app: check.app.name.clone(),
                            source,
                        })?;
                    debug!(app = %check.app.name, node = %node.name, running, "checked deployment");

                    if remaining[idx].fetch_sub(1, Ordering::AcqRel) == 1 {
                        complete(idx);
                    }
                    Ok::<_, AuditError>((idx, node, running))
                }
            })
            .buffered(self.config.concurrency.max(1))
            .try_collect()
            .await?;

        for (idx, node, running) in results {
            if let Some(targets) = app_deployment.get_mut(&checks[idx].app.name) {
                targets.insert(node.name.clone(), running);
            }
        }

        Ok(app_deployment)
    }
}
