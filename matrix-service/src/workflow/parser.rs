use crate::error::{ConfigError, ServiceResult};
use crate::runners::RUN_ACTION;
use crate::workflow::config::{
    AxisSet, CiConfig, CommandActionDef, ContinueOnErrorPolicy, ExcludeRule, GroupConfig,
    IncludeRule, InputValue, StepDef, StepInputs, CONTINUE_ON_ERROR_KEY, EXPERIMENTAL_KEY,
};
use crate::workflow::models::{ContinueOnError, Group, Step, Workflow};

use indexmap::IndexMap;
use serde_yaml::Value;
use std::fs;
use std::path::Path;
use tracing::debug;

/// Parser for matrix workflow YAML files.
pub struct WorkflowParser;

impl WorkflowParser {
    /// Load, validate and dry-expand a workflow file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> ServiceResult<CiConfig> {
        let content = fs::read_to_string(path)?;
        Self::parse_and_validate(&content)
    }

    /// Parse a workflow from a YAML string without validating it.
    pub fn parse(content: &str) -> ServiceResult<Workflow> {
        let workflow: Workflow = serde_yaml::from_str(content)?;
        Ok(workflow)
    }

    /// Parse and validate a workflow from a YAML string.
    ///
    /// Every group is expanded once here, so a run never starts with a
    /// configuration that would fail later.
    pub fn parse_and_validate(content: &str) -> ServiceResult<CiConfig> {
        let workflow = Self::parse(content)?;
        let config = Self::validate(&workflow)?;
        config.plan()?;
        Ok(config)
    }

    /// Turn a raw workflow into its typed form.
    pub fn validate(workflow: &Workflow) -> Result<CiConfig, ConfigError> {
        if workflow.jobs.is_empty() {
            return Err(ConfigError::NoGroups);
        }

        let default_fail_fast = workflow.defaults.fail_fast.unwrap_or(true);

        let groups = workflow
            .jobs
            .iter()
            .map(|(id, group)| Self::validate_group(id, group, default_fail_fast))
            .collect::<Result<Vec<_>, _>>()?;

        let actions = workflow
            .actions
            .iter()
            .map(|(id, def)| {
                if def.run.trim().is_empty() {
                    return Err(ConfigError::EmptyActionCommand { action: id.clone() });
                }
                Ok(CommandActionDef {
                    id: id.clone(),
                    run: def.run.clone(),
                    shell: def.shell.clone(),
                    env: def.env.clone(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        debug!(groups = groups.len(), actions = actions.len(), "workflow validated");

        Ok(CiConfig {
            name: workflow.name.clone(),
            env: workflow.env.clone(),
            actions,
            groups,
        })
    }

    fn validate_group(
        id: &str,
        group: &Group,
        default_fail_fast: bool,
    ) -> Result<GroupConfig, ConfigError> {
        if group.steps.is_empty() {
            return Err(ConfigError::EmptyGroup {
                group: id.to_string(),
            });
        }

        let strategy = group.strategy.clone().unwrap_or_default();
        let matrix = strategy.matrix.unwrap_or_default();

        let mut axes = AxisSet::new();
        for (axis, values) in &matrix.dimensions {
            if axis == EXPERIMENTAL_KEY || axis == CONTINUE_ON_ERROR_KEY {
                return Err(ConfigError::ReservedAxis {
                    group: id.to_string(),
                    axis: axis.clone(),
                });
            }
            if values.is_empty() {
                return Err(ConfigError::EmptyAxis {
                    group: id.to_string(),
                    axis: axis.clone(),
                });
            }
            let values = values
                .iter()
                .map(|v| scalar_to_string(v, id, || format!("matrix.{}", axis)))
                .collect::<Result<Vec<_>, _>>()?;
            axes = axes.with_axis(axis.clone(), values);
        }

        let include = matrix
            .include
            .iter()
            .enumerate()
            .map(|(index, entry)| validate_include(id, index, entry))
            .collect::<Result<Vec<_>, _>>()?;

        let exclude = matrix
            .exclude
            .iter()
            .enumerate()
            .map(|(index, entry)| {
                let mut rule = ExcludeRule::new();
                for (axis, value) in entry {
                    let value =
                        scalar_to_string(value, id, || format!("exclude #{}.{}", index, axis))?;
                    rule = rule.assign(axis.clone(), value);
                }
                Ok(rule)
            })
            .collect::<Result<Vec<_>, ConfigError>>()?;

        let continue_on_error =
            parse_continue_on_error(id, &group.continue_on_error, &axes, &include)?;

        let max_parallel = match strategy.max_parallel {
            Some(0) => {
                return Err(ConfigError::ZeroParallelism {
                    group: id.to_string(),
                })
            }
            other => other.map(|n| n as usize),
        };

        let steps = group
            .steps
            .iter()
            .enumerate()
            .map(|(index, step)| validate_step(id, index, step))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(GroupConfig {
            id: id.to_string(),
            display_name: group.name.clone(),
            axes,
            include,
            exclude,
            continue_on_error,
            fail_fast: strategy.fail_fast.unwrap_or(default_fail_fast),
            max_parallel,
            env: group.env.clone(),
            steps,
        })
    }
}

fn validate_include(
    group: &str,
    index: usize,
    entry: &IndexMap<String, Value>,
) -> Result<IncludeRule, ConfigError> {
    let mut rule = IncludeRule::new();
    for (key, value) in entry {
        match key.as_str() {
            EXPERIMENTAL_KEY | CONTINUE_ON_ERROR_KEY => {
                let flag = value.as_bool().ok_or_else(|| ConfigError::InvalidFlag {
                    group: group.to_string(),
                    index,
                    flag: key.clone(),
                })?;
                if key == EXPERIMENTAL_KEY {
                    rule = rule.experimental(flag);
                } else {
                    rule = rule.continue_on_error(flag);
                }
            }
            axis => {
                let value = scalar_to_string(value, group, || {
                    format!("include #{}.{}", index, axis)
                })?;
                rule = rule.assign(axis, value);
            }
        }
    }
    Ok(rule)
}

fn validate_step(group: &str, index: usize, step: &Step) -> Result<StepDef, ConfigError> {
    let name = step.display_name();

    let (action, mut inputs) = match (&step.run, &step.uses) {
        (Some(script), None) => {
            let mut inputs = StepInputs::new();
            inputs.insert("script".to_string(), InputValue::String(script.clone()));
            if let Some(shell) = &step.shell {
                inputs.insert("shell".to_string(), InputValue::String(shell.clone()));
            }
            (RUN_ACTION.to_string(), inputs)
        }
        (None, Some(uses)) => (uses.clone(), StepInputs::new()),
        (None, None) => {
            return Err(ConfigError::StepWithoutAction {
                group: group.to_string(),
                index,
                name,
            })
        }
        (Some(_), Some(_)) => {
            return Err(ConfigError::StepWithBothActions {
                group: group.to_string(),
                index,
                name,
            })
        }
    };

    if let Some(dir) = &step.working_directory {
        inputs.insert(
            "working-directory".to_string(),
            InputValue::String(dir.clone()),
        );
    }

    for (key, value) in &step.with {
        let value = match value {
            Value::Bool(b) => InputValue::Bool(*b),
            other => InputValue::String(scalar_to_string(other, group, || {
                format!("step {} input '{}'", index, key)
            })?),
        };
        inputs.insert(key.clone(), value);
    }

    Ok(StepDef {
        name,
        action,
        inputs,
        env: step.env.clone(),
    })
}

fn parse_continue_on_error(
    group: &str,
    raw: &ContinueOnError,
    axes: &AxisSet,
    include: &[IncludeRule],
) -> Result<ContinueOnErrorPolicy, ConfigError> {
    let expression = match raw {
        ContinueOnError::Bool(b) => return Ok(ContinueOnErrorPolicy::Fixed(*b)),
        ContinueOnError::Expression(expr) => expr,
    };

    let unresolved = || ConfigError::UnresolvedExpression {
        group: group.to_string(),
        expression: expression.clone(),
    };

    let trimmed = expression.trim();
    match trimmed {
        "true" => return Ok(ContinueOnErrorPolicy::Fixed(true)),
        "false" => return Ok(ContinueOnErrorPolicy::Fixed(false)),
        _ => {}
    }

    let inner = trimmed
        .strip_prefix("${{")
        .and_then(|rest| rest.strip_suffix("}}"))
        .map(str::trim)
        .ok_or_else(unresolved)?;
    let key = inner.strip_prefix("matrix.").ok_or_else(unresolved)?;

    // Without axes the include entries carry the assignments
    let include_key = axes.is_empty() && include.iter().any(|r| r.assignments.contains_key(key));

    if key == EXPERIMENTAL_KEY || axes.contains_axis(key) || include_key {
        Ok(ContinueOnErrorPolicy::Matrix(key.to_string()))
    } else {
        Err(unresolved())
    }
}

/// Normalise a YAML scalar to its string form
fn scalar_to_string(
    value: &Value,
    group: &str,
    location: impl FnOnce() -> String,
) -> Result<String, ConfigError> {
    let found = match value {
        Value::String(s) => return Ok(s.clone()),
        Value::Bool(b) => return Ok(b.to_string()),
        Value::Number(n) => return Ok(n.to_string()),
        Value::Null => "null",
        Value::Sequence(_) => "a sequence",
        Value::Mapping(_) => "a mapping",
        Value::Tagged(_) => "a tagged value",
    };
    Err(ConfigError::NonScalarValue {
        group: group.to_string(),
        location: location(),
        found: found.to_string(),
    })
}
