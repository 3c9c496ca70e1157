use crate::commands::load_workflow;
use crate::output;

use std::path::PathBuf;

use clap::Args;
use color_eyre::Result;

/// Validate a workflow YAML file
#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Path to the workflow YAML file
    pub workflow: PathBuf,
}

pub fn execute(args: ValidateArgs) -> Result<()> {
    let config = match load_workflow(&args.workflow, &[]) {
        Ok(config) => config,
        Err(e) => {
            output::error(&format!("{}", e));
            std::process::exit(1);
        }
    };

    output::check("YAML syntax valid");
    output::check(&format!(
        "Structure: {} groups, {} actions",
        config.groups.len(),
        config.actions.len()
    ));

    let plans = match config.plan() {
        Ok(plans) => plans,
        Err(e) => {
            output::error(&format!("{}", e));
            std::process::exit(1);
        }
    };

    for plan in &plans {
        output::check(&format!(
            "Group '{}': {} jobs, {} steps",
            plan.group.label(),
            plan.jobs.len(),
            plan.group.steps.len()
        ));
    }

    eprintln!();
    output::success("Workflow is valid");

    Ok(())
}
