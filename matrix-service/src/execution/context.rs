// Job Execution Context
// Everything an action may observe about its job, passed explicitly

use crate::execution::matrix::JobSpec;
use crate::workflow::config::StepInputs;

use indexmap::IndexMap;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors while substituting `${{ ... }}` references
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InterpolationError {
    #[error("unterminated expression in '{0}'")]
    Unterminated(String),

    #[error("unknown reference '{0}'")]
    UnknownReference(String),
}

/// Context for a single job run.
///
/// Actions read their environment from here instead of the process
/// environment, so a job can be run in isolation with a scripted context.
#[derive(Debug, Clone)]
pub struct JobContext {
    /// The job being executed
    pub job: JobSpec,
    /// Environment visible to actions (workflow, group, overrides, matrix)
    pub env: IndexMap<String, String>,
    /// Per-job sandbox directory, removed when the job ends
    pub workspace: PathBuf,
    /// Directory holding the checked-out sources, if any
    pub source_dir: Option<PathBuf>,
}

impl JobContext {
    pub fn new(job: JobSpec, workspace: impl Into<PathBuf>) -> Self {
        Self {
            job,
            env: IndexMap::new(),
            workspace: workspace.into(),
            source_dir: None,
        }
    }

    /// Layer variables over the current environment; later entries win
    pub fn with_env<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (k, v) in vars {
            self.env.insert(k.into(), v.into());
        }
        self
    }

    pub fn with_source_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.source_dir = dir;
        self
    }

    pub fn group(&self) -> &str {
        &self.job.group
    }

    /// Default working directory for commands: sources if present, else the sandbox
    pub fn working_dir(&self) -> &Path {
        self.source_dir.as_deref().unwrap_or(&self.workspace)
    }

    /// Environment for child processes, including the `CI_*` job variables
    pub fn env_as_strings(&self) -> HashMap<String, String> {
        let mut env: HashMap<String, String> = self
            .env
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        env.insert("CI".to_string(), "true".to_string());
        env.insert("CI_GROUP".to_string(), self.job.group.clone());
        env.insert("CI_JOB".to_string(), self.job.name());
        env.insert(
            "CI_WORKSPACE".to_string(),
            self.workspace.to_string_lossy().to_string(),
        );
        if let Some(source) = &self.source_dir {
            env.insert(
                "CI_SOURCE_DIR".to_string(),
                source.to_string_lossy().to_string(),
            );
        }
        env
    }

    /// Resolve a single reference such as `matrix.os` or `env.HOME`
    pub fn lookup(&self, reference: &str) -> Option<String> {
        if let Some(axis) = reference.strip_prefix("matrix.") {
            return match axis {
                "experimental" => Some(self.job.experimental.to_string()),
                _ => self.job.value(axis).map(String::from),
            };
        }
        if let Some(name) = reference.strip_prefix("env.") {
            return self.env.get(name).cloned();
        }
        match reference {
            "job.group" => Some(self.job.group.clone()),
            "job.name" => Some(self.job.name()),
            "job.workspace" => Some(self.workspace.to_string_lossy().to_string()),
            _ => None,
        }
    }

    /// Substitute every `${{ reference }}` in `template`
    pub fn interpolate(&self, template: &str) -> Result<String, InterpolationError> {
        interpolate_with(template, |reference| self.lookup(reference))
    }

    /// Interpolate string inputs; boolean inputs pass through unchanged
    pub fn interpolate_inputs(&self, inputs: &StepInputs) -> Result<StepInputs, InterpolationError> {
        inputs
            .iter()
            .map(|(key, value)| {
                let value = match value {
                    crate::workflow::config::InputValue::String(s) => self.interpolate(s)?.into(),
                    other => other.clone(),
                };
                Ok((key.clone(), value))
            })
            .collect()
    }
}

/// `MATRIX_<AXIS>` variables exported for each axis assignment
pub fn matrix_env(job: &JobSpec) -> Vec<(String, String)> {
    job.assignments
        .iter()
        .map(|(axis, value)| {
            let name: String = axis
                .chars()
                .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
                .collect();
            (format!("MATRIX_{}", name), value.clone())
        })
        .collect()
}

/// Substitute `${{ reference }}` expressions using `resolve`
pub fn interpolate_with<F>(template: &str, resolve: F) -> Result<String, InterpolationError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut output = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("${{") {
        output.push_str(&rest[..start]);
        let after = &rest[start + 3..];
        let end = after
            .find("}}")
            .ok_or_else(|| InterpolationError::Unterminated(template.to_string()))?;
        let reference = after[..end].trim();
        let value =
            resolve(reference).ok_or_else(|| InterpolationError::UnknownReference(reference.to_string()))?;
        output.push_str(&value);
        rest = &after[end + 2..];
    }

    output.push_str(rest);
    Ok(output)
}
