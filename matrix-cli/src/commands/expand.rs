use crate::commands::load_workflow;
use crate::output;

use std::path::PathBuf;

use clap::Args;
use color_eyre::Result;
use serde_json::json;

use matrix_service::GroupPlan;

/// Print the jobs each group expands to
#[derive(Args, Debug)]
pub struct ExpandArgs {
    /// Path to the workflow YAML file
    pub workflow: PathBuf,

    /// Only expand the named group (can be repeated)
    #[arg(long = "group", short = 'g', value_name = "GROUP")]
    pub groups: Vec<String>,

    /// Print the expansion as JSON
    #[arg(long)]
    pub json: bool,
}

pub fn execute(args: ExpandArgs) -> Result<()> {
    let config = load_workflow(&args.workflow, &args.groups)?;
    let plans = config.plan()?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&to_json(&plans))?);
        return Ok(());
    }

    for plan in &plans {
        output::group_header(plan.group.label(), plan.jobs.len());
        for job in &plan.jobs {
            println!("    {}", output::job_label(job));
        }
    }

    Ok(())
}

fn to_json(plans: &[GroupPlan]) -> serde_json::Value {
    plans
        .iter()
        .map(|plan| {
            json!({
                "group": plan.group.id,
                "fail_fast": plan.group.fail_fast,
                "max_parallel": plan.group.max_parallel,
                "jobs": plan.jobs,
            })
        })
        .collect()
}
