use std::time::Duration;

use dockyard_ops::RealExecutor;

use super::deploy_pipeline::{self, DeployOptions};
use super::Workspace;

/// Execute the deploy pipeline against the real git / docker binaries.
pub async fn deploy(
    workspace: &Workspace,
    options: &DeployOptions,
    tool_timeout: Option<Duration>,
    json: bool,
) -> anyhow::Result<()> {
    let executor = RealExecutor::new().with_timeout(tool_timeout);

    if !json {
        let mode = if options.dry_run { " (dry run)" } else { "" };
        println!("Deploying from {}{mode}...", workspace.root.display());
    }

    let report = deploy_pipeline::run(workspace, options, &executor).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        for step in &report.steps {
            println!("  {step}");
        }
        println!();
        print!("{report}");
    }

    Ok(())
}
