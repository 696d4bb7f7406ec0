use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use fleetcheck_core::*;

// Mock implementations
#[derive(Default)]
struct MockFleet {
    up: HashSet<String>,
    running: HashMap<String, Vec<String>>,
    broken_probe: Option<String>,
    broken_check: Option<String>,
    delay: Option<Duration>,
    probe_calls: Mutex<Vec<String>>,
    check_calls: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockFleet {
    fn new() -> Self {
        Self::default()
    }

    fn up(mut self, node: &str) -> Self {
        self.up.insert(node.to_string());
        self
    }

    fn running(mut self, node: &str, image: &str) -> Self {
        self.running
            .entry(node.to_string())
            .or_default()
            .push(image.to_string());
        self
    }

    fn delayed(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    fn check_calls(&self) -> Vec<String> {
        self.check_calls.lock().unwrap().clone()
    }

    async fn enter(&self) {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl NodeProbe for MockFleet {
    async fn probe(&self, node: &Node) -> Result<bool, ProbeError> {
        self.probe_calls.lock().unwrap().push(node.name.clone());
        self.enter().await;

        if self.broken_probe.as_deref() == Some(node.name.as_str()) {
            return Err(ProbeError::new(&node.name, "SSH key not found"));
        }
        Ok(self.up.contains(&node.name))
    }
}

#[async_trait]
impl DeploymentChecker for MockFleet {
    async fn is_running(&self, node: &Node, image: &str) -> Result<bool, ProbeError> {
        self.check_calls.lock().unwrap().push(node.name.clone());
        self.enter().await;

        if self.broken_check.as_deref() == Some(node.name.as_str()) {
            return Err(ProbeError::new(&node.name, "docker ps exited with status 1"));
        }
        Ok(self
            .running
            .get(&node.name)
            .is_some_and(|images| images.iter().any(|i| i == image)))
    }
}

#[derive(Default)]
struct RecordingObserver {
    phases: Mutex<Vec<AuditPhase>>,
    nodes: Mutex<Vec<(String, usize, usize)>>,
    apps: Mutex<Vec<(String, usize, usize)>>,
}

impl ProgressObserver for RecordingObserver {
    fn phase_changed(&self, phase: AuditPhase) {
        self.phases.lock().unwrap().push(phase);
    }

    fn node_probed(&self, node: &str, _reachable: bool, done: usize, total: usize) {
        self.nodes
            .lock()
            .unwrap()
            .push((node.to_string(), done, total));
    }

    fn application_checked(&self, app: &str, done: usize, total: usize) {
        self.apps.lock().unwrap().push((app.to_string(), done, total));
    }
}

fn aggregator(fleet: &Arc<MockFleet>) -> StatusAggregator {
    StatusAggregator::new(fleet.clone(), fleet.clone())
}

fn two_node_env(apps: Vec<Application>) -> Environment {
    Environment::new(
        "/srv/fleet",
        vec![Node::new("A", "10.0.0.1"), Node::new("B", "10.0.0.2")],
        apps,
    )
    .unwrap()
}

fn status_map(entries: &[(&str, bool)]) -> BTreeMap<String, bool> {
    entries
        .iter()
        .map(|(name, value)| ((*name).to_string(), *value))
        .collect()
}

#[tokio::test]
async fn test_reachable_and_unreachable_targets() {
    let env = two_node_env(vec![Application::new("web")]);
    let lock = LockRecord::from_versions([("web", "img:7")]);
    let plan = AuditPlan::new(env, &AppSelection::All, lock).unwrap();

    let fleet = Arc::new(MockFleet::new().up("A").running("A", "img:7"));
    let report = aggregator(&fleet).run(&plan).await.unwrap();

    assert_eq!(
        report.node_reachable,
        status_map(&[("A", true), ("B", false)])
    );
    assert_eq!(
        report.app_deployment["web"],
        status_map(&[("A", true), ("B", false)])
    );
    // B is down, so it is never asked what it runs
    assert_eq!(fleet.check_calls(), vec!["A"]);
}

#[tokio::test]
async fn test_one_reachability_entry_per_node() {
    let nodes: Vec<Node> = (0..12)
        .map(|i| Node::new(format!("n{i:02}"), format!("10.0.1.{i}")))
        .collect();
    let env = Environment::new("/srv/fleet", nodes, vec![]).unwrap();
    let plan = AuditPlan::new(env, &AppSelection::All, LockRecord::default()).unwrap();

    let fleet = Arc::new(MockFleet::new().up("n03").up("n07"));
    let report = aggregator(&fleet).run(&plan).await.unwrap();

    assert_eq!(report.node_reachable.len(), 12);
    assert_eq!(
        report.node_reachable.values().filter(|up| **up).count(),
        2
    );
    assert!(report.app_deployment.is_empty());
}

#[tokio::test]
async fn test_deployment_keys_match_resolved_targets() {
    let env = Environment::new(
        "/srv/fleet",
        vec![
            Node::new("a", "10.0.0.1").with_labels(["web"]),
            Node::new("b", "10.0.0.2").with_labels(["db"]),
            Node::new("c", "10.0.0.3").with_labels(["web"]),
        ],
        vec![
            Application::new("web").with_placement(Placement::Labels(vec!["web".to_string()])),
            Application::new("db").with_placement(Placement::Nodes(vec!["b".to_string()])),
        ],
    )
    .unwrap();
    let lock = LockRecord::from_versions([("web", "web:1"), ("db", "db:5")]);
    let plan = AuditPlan::new(env, &AppSelection::All, lock).unwrap();

    let fleet = Arc::new(
        MockFleet::new()
            .up("a")
            .up("b")
            .up("c")
            .running("a", "web:1")
            .running("b", "db:5")
            .running("c", "web:0"),
    );
    let report = aggregator(&fleet).run(&plan).await.unwrap();

    assert_eq!(
        report.app_deployment["web"],
        status_map(&[("a", true), ("c", false)])
    );
    assert_eq!(report.app_deployment["db"], status_map(&[("b", true)]));
    assert!(report.is_fully_deployed("db"));
    assert!(!report.is_fully_deployed("web"));
}

#[tokio::test]
async fn test_unreachable_node_never_checked_for_any_application() {
    let env = two_node_env(vec![
        Application::new("web"),
        Application::new("api"),
        Application::new("agent"),
    ]);
    let lock = LockRecord::from_versions([("web", "w:1"), ("api", "a:1"), ("agent", "g:1")]);
    let plan = AuditPlan::new(env, &AppSelection::All, lock).unwrap();

    let fleet = Arc::new(MockFleet::new().up("A").running("B", "w:1"));
    let report = aggregator(&fleet).run(&plan).await.unwrap();

    for app in ["web", "api", "agent"] {
        assert_eq!(report.app_deployment[app]["B"], false, "{app}");
    }
    assert!(fleet.check_calls().iter().all(|node| node == "A"));
    assert_eq!(fleet.check_calls().len(), 3);
}

#[tokio::test]
async fn test_unknown_application() {
    let env = two_node_env(vec![Application::new("web")]);
    let result = AuditPlan::new(
        env,
        &AppSelection::Named("db".to_string()),
        LockRecord::from_versions([("web", "img:7")]),
    );

    assert_eq!(
        result.map(|_| ()),
        Err(AuditError::UnknownApplication("db".to_string()))
    );
}

#[tokio::test]
async fn test_missing_lock_entry_aborts_whole_run() {
    let env = two_node_env(vec![Application::new("web"), Application::new("api")]);
    let lock = LockRecord::from_versions([("web", "img:7")]);
    let plan = AuditPlan::new(env, &AppSelection::All, lock).unwrap();

    let fleet = Arc::new(MockFleet::new().up("A").up("B").running("A", "img:7"));
    let err = aggregator(&fleet).run(&plan).await.unwrap_err();

    assert_eq!(err, AuditError::NotBuilt("api".to_string()));
    assert!(err.to_string().contains("\"api\""));
    // web was fine, but no deployment check ran before the defect surfaced
    assert!(fleet.check_calls().is_empty());
}

#[tokio::test]
async fn test_resolution_error_aborts_run() {
    let env = two_node_env(vec![
        Application::new("web"),
        Application::new("api").with_placement(Placement::Nodes(vec!["Z".to_string()])),
    ]);
    let lock = LockRecord::from_versions([("web", "w:1"), ("api", "a:1")]);
    let plan = AuditPlan::new(env, &AppSelection::All, lock).unwrap();

    let fleet = Arc::new(MockFleet::new().up("A"));
    let err = aggregator(&fleet).run(&plan).await.unwrap_err();

    assert_eq!(
        err,
        AuditError::Resolution(ResolutionError::UndefinedNode {
            app: "api".to_string(),
            node: "Z".to_string(),
        })
    );
}

#[tokio::test]
async fn test_check_failure_names_application_and_node() {
    let env = two_node_env(vec![Application::new("web")]);
    let plan = AuditPlan::new(
        env,
        &AppSelection::All,
        LockRecord::from_versions([("web", "img:7")]),
    )
    .unwrap();

    let fleet = Arc::new(MockFleet {
        broken_check: Some("B".to_string()),
        ..MockFleet::new().up("A").up("B")
    });
    let err = aggregator(&fleet).run(&plan).await.unwrap_err();

    match err {
        AuditError::DeploymentCheck { app, source } => {
            assert_eq!(app, "web");
            assert_eq!(source.node, "B");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_probe_failure_is_fatal() {
    let env = two_node_env(vec![]);
    let plan = AuditPlan::new(env, &AppSelection::All, LockRecord::default()).unwrap();

    let fleet = Arc::new(MockFleet {
        broken_probe: Some("B".to_string()),
        ..MockFleet::new().up("A")
    });
    let err = aggregator(&fleet).run(&plan).await.unwrap_err();

    assert_eq!(err.stage(), "probe-nodes");
    assert_eq!(err.entity(), Some("B"));
}

#[tokio::test]
async fn test_repeated_runs_are_identical() {
    let env = two_node_env(vec![Application::new("web"), Application::new("api")]);
    let lock = LockRecord::from_versions([("web", "w:2"), ("api", "a:9")]);
    let plan = AuditPlan::new(env, &AppSelection::All, lock).unwrap();

    let fleet = Arc::new(
        MockFleet::new()
            .up("A")
            .up("B")
            .running("A", "w:2")
            .running("B", "a:9")
            .delayed(Duration::from_millis(2)),
    );
    let aggregator = aggregator(&fleet).with_config(AuditConfig::default().with_concurrency(4));

    let first = aggregator.run(&plan).await.unwrap();
    let second = aggregator.run(&plan).await.unwrap();

    assert_eq!(first, second);
}

#[tokio::test]
async fn test_deadline_fails_without_partial_report() {
    let env = two_node_env(vec![]);
    let plan = AuditPlan::new(env, &AppSelection::All, LockRecord::default()).unwrap();

    let fleet = Arc::new(MockFleet::new().up("A").delayed(Duration::from_secs(5)));
    let observer = Arc::new(RecordingObserver::default());
    let deadline = Duration::from_millis(50);
    let result = aggregator(&fleet)
        .with_config(AuditConfig::default().with_deadline(deadline))
        .with_observer(observer.clone())
        .run(&plan)
        .await;

    assert_eq!(result, Err(AuditError::Timeout(deadline)));
    assert_eq!(
        observer.phases.lock().unwrap().last(),
        Some(&AuditPhase::Failed)
    );
}

#[tokio::test]
async fn test_concurrency_is_bounded() {
    let nodes: Vec<Node> = (0..8)
        .map(|i| Node::new(format!("n{i}"), format!("10.0.2.{i}")))
        .collect();
    let env = Environment::new("/srv/fleet", nodes, vec![]).unwrap();
    let plan = AuditPlan::new(env, &AppSelection::All, LockRecord::default()).unwrap();

    let fleet = Arc::new(MockFleet::new().delayed(Duration::from_millis(20)));
    aggregator(&fleet)
        .with_config(AuditConfig::default().with_concurrency(2))
        .run(&plan)
        .await
        .unwrap();

    assert!(fleet.max_in_flight.load(Ordering::SeqCst) <= 2);
    assert_eq!(fleet.probe_calls.lock().unwrap().len(), 8);
}

#[tokio::test]
async fn test_observer_sees_every_phase_and_unit() {
    let env = two_node_env(vec![Application::new("web"), Application::new("api")]);
    let lock = LockRecord::from_versions([("web", "w:1"), ("api", "a:1")]);
    let plan = AuditPlan::new(env, &AppSelection::All, lock).unwrap();

    let fleet = Arc::new(MockFleet::new().up("A").running("A", "w:1"));
    let observer = Arc::new(RecordingObserver::default());
    aggregator(&fleet)
        .with_observer(observer.clone())
        .run(&plan)
        .await
        .unwrap();

    assert_eq!(
        *observer.phases.lock().unwrap(),
        vec![
            AuditPhase::ProbingNodes,
            AuditPhase::CheckingApplications,
            AuditPhase::Done
        ]
    );

    let nodes = observer.nodes.lock().unwrap();
    assert_eq!(nodes.len(), 2);
    assert!(nodes.iter().all(|(_, _, total)| *total == 2));

    let mut apps: Vec<_> = observer
        .apps
        .lock()
        .unwrap()
        .iter()
        .map(|(app, _, _)| app.clone())
        .collect();
    apps.sort();
    assert_eq!(apps, vec!["api", "web"]);
}

#[tokio::test]
async fn test_plan_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("fleet.toml"),
        r#"
[[node]]
name = "A"
host = "10.0.0.1"

[[node]]
name = "B"
host = "10.0.0.2"

[[application]]
name = "web"
"#,
    )
    .unwrap();

    // Unknown application wins over a missing lock file
    let err = AuditPlan::load(dir.path(), &AppSelection::Named("api".to_string())).unwrap_err();
    assert_eq!(err, AuditError::UnknownApplication("api".to_string()));

    let err = AuditPlan::load(dir.path(), &AppSelection::All).unwrap_err();
    assert!(matches!(err, AuditError::Lock(LockError::Missing { .. })));

    std::fs::write(
        dir.path().join("fleet.lock"),
        "[versions]\nweb = \"img:7\"\n",
    )
    .unwrap();
    let plan = AuditPlan::load(dir.path(), &AppSelection::All).unwrap();

    let fleet = Arc::new(MockFleet::new().up("A").running("A", "img:7"));
    let report = aggregator(&fleet).run(&plan).await.unwrap();

    assert_eq!(
        report.app_deployment["web"],
        status_map(&[("A", true), ("B", false)])
    );
}
