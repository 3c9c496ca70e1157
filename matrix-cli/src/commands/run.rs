use crate::commands::load_workflow;
use crate::output;

use std::path::PathBuf;

use clap::Args;
use color_eyre::Result;

use matrix_service::execution::{progress_channel, Verdict};
use matrix_service::{ExecutionEvent, JobScheduler};

/// Run a matrix workflow locally
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Path to the workflow YAML file
    pub workflow: PathBuf,

    /// Run only the named group (can be repeated)
    #[arg(long = "group", short = 'g', value_name = "GROUP")]
    pub groups: Vec<String>,

    /// Override an environment variable (can be repeated, format: NAME=VALUE)
    #[arg(long = "env", short = 'e', value_name = "NAME=VALUE")]
    pub env: Vec<String>,

    /// Directory holding the sources (default: current directory)
    #[arg(long, value_name = "DIR")]
    pub source: Option<PathBuf>,

    /// Write the JSON run report to this file
    #[arg(long, value_name = "FILE")]
    pub report: Option<PathBuf>,

    /// Print the JSON run report instead of progress
    #[arg(long)]
    pub json: bool,
}

/// Parse `NAME=VALUE` pairs, keeping their order
fn parse_overrides(pairs: &[String]) -> Result<Vec<(String, String)>> {
    pairs
        .iter()
        .map(|pair| match pair.split_once('=') {
            Some((name, value)) if !name.is_empty() => Ok((name.to_string(), value.to_string())),
            _ => color_eyre::eyre::bail!("Invalid env format '{}'. Expected NAME=VALUE", pair),
        })
        .collect()
}

pub async fn execute(args: RunArgs) -> Result<()> {
    let overrides = parse_overrides(&args.env)?;
    let config = load_workflow(&args.workflow, &args.groups)?;
    let plans = config.plan()?;

    let source_dir = match args.source {
        Some(dir) => dir,
        None => std::env::current_dir()?,
    };
    if !source_dir.is_dir() {
        color_eyre::eyre::bail!("Source directory not found: {}", source_dir.display());
    }

    let total_jobs: usize = plans.iter().map(|p| p.jobs.len()).sum();
    if !args.json {
        output::info(&format!(
            "Workflow '{}': {} groups, {} jobs",
            config.name.as_deref().unwrap_or("workflow"),
            plans.len(),
            total_jobs
        ));
    }

    let (tx, mut rx) = progress_channel();
    let scheduler = JobScheduler::from_config(&config)
        .with_overrides(overrides.into_iter().collect())
        .with_source_dir(Some(source_dir))
        .with_progress(tx);

    // Spawn execution in background
    let run_handle = tokio::spawn(async move { scheduler.run_all(&plans).await });

    // Process events in the foreground
    while let Some(event) = rx.recv().await {
        if !args.json {
            print_event(&event);
        }
    }

    let report = run_handle.await?;

    if let Some(path) = &args.report {
        std::fs::write(path, report.to_json()?)?;
        if !args.json {
            output::status("Report", &format!("{}", path.display()));
        }
    }

    if args.json {
        println!("{}", report.to_json()?);
    } else {
        output::summary(&report.summary);
    }

    if report.exit_code() != 0 {
        std::process::exit(report.exit_code());
    }

    Ok(())
}

fn print_event(event: &ExecutionEvent) {
    match event {
        ExecutionEvent::RunStarted {
            run_name,
            total_groups,
            ..
        } => {
            eprintln!();
            output::header(&format!("Workflow '{}' ({} groups)", run_name, total_groups));
        }

        ExecutionEvent::RunCompleted {
            verdict, duration, ..
        } => {
            eprintln!();
            if *verdict == Verdict::Success {
                output::success(&format!(
                    "Workflow completed successfully in {:.2}s",
                    duration.as_secs_f64()
                ));
            } else {
                output::failure(&format!(
                    "Workflow failed after {:.2}s",
                    duration.as_secs_f64()
                ));
            }
        }

        ExecutionEvent::GroupStarted {
            group,
            display_name,
            total_jobs,
        } => {
            let label = display_name.as_deref().unwrap_or(group);
            output::group_header(label, *total_jobs);
        }

        ExecutionEvent::GroupCompleted {
            group,
            aborted,
            duration,
        } => output::group_done(group, *aborted, *duration),

        ExecutionEvent::JobStarted {
            job_name,
            total_steps,
            ..
        } => output::job_started(job_name, *total_steps),

        ExecutionEvent::JobCompleted {
            job_name,
            status,
            tolerated,
            duration,
            ..
        } => output::job_done(job_name, *status, *tolerated, *duration),

        ExecutionEvent::JobSkipped {
            job_name, reason, ..
        } => output::job_skipped(job_name, reason),

        ExecutionEvent::StepStarted {
            step_name,
            step_index,
            ..
        } => output::step_started(*step_index, step_name),

        ExecutionEvent::StepOutput {
            output, is_error, ..
        } => {
            for line in output.lines() {
                if *is_error {
                    output::step_error(line);
                } else {
                    output::step_output(line);
                }
            }
        }

        ExecutionEvent::StepCompleted {
            status,
            duration,
            message,
            ..
        } => output::step_done(*status, *duration, message.as_deref()),
    }
}
