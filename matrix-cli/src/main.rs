//! cimatrix - run a matrix CI workflow on the local machine
//!
//! ## Commands
//!
//! - `run`: expand every group and execute its jobs
//! - `validate`: load the workflow and report configuration errors
//! - `expand`: print the jobs each group expands to

mod commands;
mod output;

use clap::{Parser, Subcommand};
use color_eyre::Result;
use tracing::Level;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use commands::expand::ExpandArgs;
use commands::run::RunArgs;
use commands::validate::ValidateArgs;

#[derive(Parser, Debug)]
#[command(name = "cimatrix")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Run a matrix CI workflow locally", long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the workflow's jobs and report pass/fail per combination
    Run(RunArgs),
    /// Validate a workflow file
    Validate(ValidateArgs),
    /// Show the jobs each group expands to
    Expand(ExpandArgs),
}

fn init_tracing(json: bool, level: Level) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));

    if json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr).json())
            .try_init()
            .ok();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .try_init()
            .ok();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    let level = if cli.verbose { Level::DEBUG } else { Level::WARN };
    init_tracing(cli.log_json, level);

    match cli.command {
        Command::Run(args) => commands::run::execute(args).await,
        Command::Validate(args) => commands::validate::execute(args),
        Command::Expand(args) => commands::expand::execute(args),
    }
}
