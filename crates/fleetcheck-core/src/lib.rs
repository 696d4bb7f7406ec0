//! fleetcheck-core: Fleet deployment status aggregation
//!
//! Loads the fleet topology and the build lock, then answers two questions for
//! a single point in time: which nodes are reachable, and which deployment
//! targets are running the image the last build produced.

pub mod aggregator;
pub mod config;
pub mod environment;
pub mod error;
pub mod lock;
pub mod probe;
pub mod progress;
pub mod resolver;

pub use aggregator::{AppSelection, AuditPlan, StatusAggregator, StatusReport};
pub use config::AuditConfig;
pub use environment::{Application, Environment, Node, Placement};
pub use error::{AuditError, EnvironmentError, LockError, ProbeError, ResolutionError};
pub use lock::LockRecord;
pub use probe::{DeploymentChecker, NodeProbe};
pub use progress::{AuditPhase, NoopObserver, ProgressObserver};
pub use resolver::{PlacementResolver, TargetResolver};
