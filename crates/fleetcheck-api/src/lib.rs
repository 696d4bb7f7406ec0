//! fleetcheck-api: Machine-readable output types
//!
//! Shapes emitted by `fleetcheck status --json`. They carry presentation
//! details (timestamps, ordering by environment) that the core report
//! leaves out.

pub mod responses;

pub use responses::{ApplicationStatus, ErrorResponse, NodeStatus, StatusResponse, TargetStatus};
