use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_yaml::Value;

/// A matrix CI workflow document as written on disk.
///
/// This is the raw, serde-shaped form. It is turned into a validated
/// [`CiConfig`](crate::workflow::CiConfig) by
/// [`WorkflowParser`](crate::workflow::WorkflowParser) before anything runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    /// The name of the workflow
    #[serde(default)]
    pub name: Option<String>,

    /// Trigger configuration (accepted for compatibility, never evaluated)
    #[serde(default, rename = "on")]
    pub on: Option<Value>,

    /// Workflow-level environment variables
    #[serde(default)]
    pub env: IndexMap<String, String>,

    /// Defaults applied to every group
    #[serde(default)]
    pub defaults: Defaults,

    /// Command-backed actions that `uses:` steps can reference
    #[serde(default)]
    pub actions: IndexMap<String, ActionDefinition>,

    /// The job groups, in declaration order
    #[serde(default, alias = "groups")]
    pub jobs: IndexMap<String, Group>,
}

/// Defaults for groups that do not override them.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Defaults {
    /// Fail-fast policy for groups without an explicit `strategy.fail-fast`
    #[serde(default, rename = "fail-fast")]
    pub fail_fast: Option<bool>,
}

/// A command template registered under an action identifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionDefinition {
    /// Shell command; `${{ inputs.<name> }}` is replaced by the step input
    pub run: String,

    /// Shell to run the command with (`sh` or `bash`)
    #[serde(default)]
    pub shell: Option<String>,

    /// Extra environment for the command
    #[serde(default)]
    pub env: IndexMap<String, String>,
}

/// A group of jobs sharing one matrix, one step list and one fail-fast policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Group {
    /// Display name for the group
    #[serde(default)]
    pub name: Option<String>,

    /// Group-level environment variables
    #[serde(default)]
    pub env: IndexMap<String, String>,

    /// Matrix strategy
    #[serde(default)]
    pub strategy: Option<Strategy>,

    /// Whether failed jobs of this group are tolerated
    #[serde(default, rename = "continue-on-error")]
    pub continue_on_error: ContinueOnError,

    /// The steps every job of this group runs
    #[serde(default)]
    pub steps: Vec<Step>,
}

/// Continue-on-error setting - a boolean or a `${{ matrix.<key> }}` expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ContinueOnError {
    Bool(bool),
    Expression(String),
}

impl Default for ContinueOnError {
    fn default() -> Self {
        ContinueOnError::Bool(false)
    }
}

/// Strategy configuration for matrix builds.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Strategy {
    /// Matrix configuration
    #[serde(default)]
    pub matrix: Option<Matrix>,

    /// Whether to stop launching jobs after the first failure
    #[serde(default, rename = "fail-fast")]
    pub fail_fast: Option<bool>,

    /// Maximum number of jobs of the group running at once
    #[serde(default, rename = "max-parallel")]
    pub max_parallel: Option<u32>,
}

/// Matrix configuration: axes plus include/exclude rules.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Matrix {
    /// Matrix axes, in declaration order
    #[serde(flatten)]
    pub dimensions: IndexMap<String, Vec<Value>>,

    /// Additional or overriding combinations
    #[serde(default)]
    pub include: Vec<IndexMap<String, Value>>,

    /// Combinations removed from the cross-product
    #[serde(default)]
    pub exclude: Vec<IndexMap<String, Value>>,
}

/// A step within a group.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Step {
    /// Display name for the step
    #[serde(default)]
    pub name: Option<String>,

    /// Shell command to run
    #[serde(default)]
    pub run: Option<String>,

    /// Shell to use for the run command
    #[serde(default)]
    pub shell: Option<String>,

    /// Working directory for the run command
    #[serde(default, rename = "working-directory")]
    pub working_directory: Option<String>,

    /// Action to use (e.g., "actions/checkout@v4")
    #[serde(default)]
    pub uses: Option<String>,

    /// Inputs to pass to the action
    #[serde(default)]
    pub with: IndexMap<String, Value>,

    /// Step-level environment variables
    #[serde(default)]
    pub env: IndexMap<String, String>,
}

impl Step {
    /// Get a display name for the step.
    pub fn display_name(&self) -> String {
        if let Some(name) = &self.name {
            name.clone()
        } else if let Some(uses) = &self.uses {
            format!("Run {}", uses)
        } else if let Some(run) = &self.run {
            let first_line = run.lines().next().unwrap_or(run);
            if first_line.chars().count() > 50 {
                let truncated: String = first_line.chars().take(47).collect();
                format!("{}...", truncated)
            } else {
                format!("Run {}", first_line)
            }
        } else {
            "Unnamed step".to_string()
        }
    }
}
