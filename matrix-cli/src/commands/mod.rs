pub mod expand;
pub mod run;
pub mod validate;

use crate::output;

use std::path::Path;

use color_eyre::Result;
use matrix_service::{CiConfig, WorkflowParser};

/// Load a workflow and keep the requested groups
pub fn load_workflow(path: &Path, groups: &[String]) -> Result<CiConfig> {
    if !path.exists() {
        color_eyre::eyre::bail!("Workflow file not found: {}", path.display());
    }

    output::status("Loading", &format!("{}", path.display()));
    let mut config = WorkflowParser::from_file(path)?;

    for name in groups {
        if config.group(name).is_none() {
            color_eyre::eyre::bail!("Unknown group '{}'", name);
        }
    }
    config.retain_groups(groups);
    Ok(config)
}

