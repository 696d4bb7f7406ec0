//! Report rendering: colored text for humans, JSON for tools

use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use crossterm::style::{Color, Stylize};
use fleetcheck_api::{ApplicationStatus, ErrorResponse, NodeStatus, StatusResponse, TargetStatus};
use fleetcheck_core::{AuditError, AuditPlan, StatusReport};

fn up(text: &str, color: bool) -> String {
    if color {
        text.with(Color::Green).to_string()
    } else {
        text.to_string()
    }
}

fn down(text: &str, color: bool) -> String {
    if color {
        text.with(Color::Red).bold().to_string()
    } else {
        text.to_string()
    }
}

/// One line per node, then one line per application:
///
/// ```text
/// Host 10.0.0.1 (node a) is up
/// web: +a -b
/// ```
#[must_use]
pub fn render_human(plan: &AuditPlan, report: &StatusReport, color: bool) -> String {
    let mut out = String::new();

    for node in plan.environment().nodes() {
        let status = if report.reachable(&node.name).unwrap_or(false) {
            up("up", color)
        } else {
            down("down", color)
        };
        let _ = writeln!(out, "Host {} (node {}) is {status}", node.host, node.name);
    }

    for app in plan.applications() {
        let _ = write!(out, "{}:", app.name);
        for (node, running) in report.deployment(&app.name).into_iter().flatten() {
            if *running {
                let _ = write!(out, " {}", up(&format!("+{node}"), color));
            } else {
                let _ = write!(out, " {}", down(&format!("-{node}"), color));
            }
        }
        out.push('\n');
    }

    out
}

/// Document for `--json`: nodes and applications in environment order,
/// targets sorted by node name
#[must_use]
pub fn to_response(
    plan: &AuditPlan,
    report: &StatusReport,
    generated_at: DateTime<Utc>,
) -> StatusResponse {
    let nodes = plan
        .environment()
        .nodes()
        .iter()
        .map(|node| NodeStatus {
            name: node.name.clone(),
            host: node.host.clone(),
            reachable: report.reachable(&node.name).unwrap_or(false),
        })
        .collect();

    let applications = plan
        .applications()
        .iter()
        .map(|app| ApplicationStatus {
            name: app.name.clone(),
            image: plan
                .lock()
                .expected_version(&app.name)
                .map(str::to_string)
                .unwrap_or_default(),
            deployed: report.is_fully_deployed(&app.name),
            targets: report
                .deployment(&app.name)
                .into_iter()
                .flatten()
                .map(|(node, running)| TargetStatus {
                    node: node.clone(),
                    running: *running,
                })
                .collect(),
        })
        .collect();

    StatusResponse {
        generated_at,
        base_dir: plan.environment().base_dir().display().to_string(),
        nodes,
        applications,
    }
}

/// Error document for `--json`
#[must_use]
pub fn to_error_response(error: &AuditError) -> ErrorResponse {
    ErrorResponse {
        stage: error.stage().to_string(),
        entity: error.entity().map(str::to_string),
        message: error.to_string(),
    }
}
