//! `fleetcheck status`

use std::io::IsTerminal;
use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use clap::Args;
use eyre::WrapErr;
use fleetcheck_core::{AppSelection, AuditError, AuditPlan, StatusAggregator, StatusReport};
use fleetcheck_docker::{DefaultExecutorFactory, DockerConnector};
use tracing::{debug, info};

use crate::config::Config;
use crate::progress::ProgressBar;
use crate::render;

#[derive(Args, Debug, Default)]
pub struct StatusArgs {
    /// Only report this application
    pub app: Option<String>,

    /// Show a progress bar on stderr
    #[arg(short = 'p', long)]
    pub progress_bar: bool,

    /// Print a JSON document instead of text
    #[arg(long)]
    pub json: bool,

    /// Deadline for the whole run in seconds, 0 disables it
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Maximum number of nodes queried at once
    #[arg(long, value_name = "N")]
    pub concurrency: Option<usize>,
}

/// Load the plan and run the aggregator against docker on every node
async fn audit(
    base_dir: &Path,
    config: &Config,
    args: &StatusArgs,
) -> Result<(AuditPlan, StatusReport), AuditError> {
    let selection = AppSelection::from_arg(args.app.clone());
    let plan = AuditPlan::load(base_dir, &selection)?;
    debug!(
        nodes = plan.environment().nodes().len(),
        applications = plan.applications().len(),
        "loaded plan"
    );

    let connector = Arc::new(DockerConnector::for_environment(
        plan.environment(),
        &DefaultExecutorFactory::new(),
        config.docker_settings(),
    ));

    let mut aggregator = StatusAggregator::new(connector.clone(), connector.clone())
        .with_config(config.audit_config());
    if args.progress_bar {
        aggregator = aggregator.with_observer(Arc::new(ProgressBar::new()));
    }

    let report = aggregator.run(&plan).await;
    connector.close().await;
    Ok((plan, report?))
}

fn use_color() -> bool {
    std::io::stdout().is_terminal() && std::env::var_os("NO_COLOR").is_none()
}

/// Execute the status command
///
/// # Errors
/// Returns error if the run aborts or the report cannot be written
pub async fn run(base_dir: &Path, mut config: Config, args: StatusArgs) -> eyre::Result<()> {
    config.apply_overrides(args.concurrency, args.timeout);
    info!(base_dir = %base_dir.display(), app = ?args.app, "checking fleet status");

    match audit(base_dir, &config, &args).await {
        Ok((plan, report)) => {
            if args.json {
                let response = render::to_response(&plan, &report, Utc::now());
                let json = serde_json::to_string_pretty(&response)
                    .wrap_err("cannot serialize status")?;
                println!("{json}");
            } else {
                print!("{}", render::render_human(&plan, &report, use_color()));
            }
            Ok(())
        }
        Err(e) => {
            if args.json {
                let response = render::to_error_response(&e);
                let json =
                    serde_json::to_string_pretty(&response).wrap_err("cannot serialize error")?;
                println!("{json}");
            }
            let stage = e.stage();
            Err(e).wrap_err(format!("status check failed in stage {stage}"))
        }
    }
}
