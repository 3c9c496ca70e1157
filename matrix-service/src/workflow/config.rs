// Validated Workflow Configuration
// Typed, checked-once form of the workflow document that the engine consumes

use crate::error::ConfigError;
use crate::execution::matrix::MatrixExpander;
use crate::execution::scheduler::GroupPlan;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Include keys that carry job flags instead of axis values
pub const EXPERIMENTAL_KEY: &str = "experimental";
pub const CONTINUE_ON_ERROR_KEY: &str = "continue-on-error";

/// Ordered mapping from axis name to its candidate values
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AxisSet {
    axes: IndexMap<String, Vec<String>>,
}

impl AxisSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an axis; re-adding an axis replaces its values but keeps its position
    pub fn with_axis<I, S>(mut self, name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.axes
            .insert(name.into(), values.into_iter().map(Into::into).collect());
        self
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.axes.keys().map(String::as_str)
    }

    pub fn values(&self, axis: &str) -> Option<&[String]> {
        self.axes.get(axis).map(Vec::as_slice)
    }

    pub fn contains_axis(&self, axis: &str) -> bool {
        self.axes.contains_key(axis)
    }

    pub fn contains_value(&self, axis: &str, value: &str) -> bool {
        self.values(axis)
            .map(|values| values.iter().any(|v| v == value))
            .unwrap_or(false)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.axes.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.axes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.axes.is_empty()
    }
}

/// An explicit combination layered over the cross-product
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IncludeRule {
    pub assignments: IndexMap<String, String>,
    pub experimental: Option<bool>,
    pub continue_on_error: Option<bool>,
}

impl IncludeRule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn assign(mut self, axis: impl Into<String>, value: impl Into<String>) -> Self {
        self.assignments.insert(axis.into(), value.into());
        self
    }

    pub fn experimental(mut self, experimental: bool) -> Self {
        self.experimental = Some(experimental);
        self
    }

    pub fn continue_on_error(mut self, continue_on_error: bool) -> Self {
        self.continue_on_error = Some(continue_on_error);
        self
    }
}

/// A partial assignment removing matching base combinations
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExcludeRule {
    pub assignments: IndexMap<String, String>,
}

impl ExcludeRule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn assign(mut self, axis: impl Into<String>, value: impl Into<String>) -> Self {
        self.assignments.insert(axis.into(), value.into());
        self
    }
}

/// Group-level continue-on-error, resolved per job after expansion
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ContinueOnErrorPolicy {
    /// Literal `true` / `false`
    Fixed(bool),
    /// `${{ matrix.<key> }}` where key is an axis or `experimental`
    Matrix(String),
}

impl Default for ContinueOnErrorPolicy {
    fn default() -> Self {
        ContinueOnErrorPolicy::Fixed(false)
    }
}

/// A step input value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InputValue {
    Bool(bool),
    String(String),
}

impl fmt::Display for InputValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputValue::Bool(b) => write!(f, "{}", b),
            InputValue::String(s) => f.write_str(s),
        }
    }
}

impl From<&str> for InputValue {
    fn from(s: &str) -> Self {
        InputValue::String(s.to_string())
    }
}

impl From<String> for InputValue {
    fn from(s: String) -> Self {
        InputValue::String(s)
    }
}

impl From<bool> for InputValue {
    fn from(b: bool) -> Self {
        InputValue::Bool(b)
    }
}

/// Step inputs in declaration order
pub type StepInputs = IndexMap<String, InputValue>;

/// A validated step: a name, an opaque action identifier and its inputs
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepDef {
    pub name: String,
    pub action: String,
    pub inputs: StepInputs,
    pub env: IndexMap<String, String>,
}

impl StepDef {
    pub fn new(name: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            action: action.into(),
            inputs: StepInputs::new(),
            env: IndexMap::new(),
        }
    }

    pub fn with_input(mut self, key: impl Into<String>, value: impl Into<InputValue>) -> Self {
        self.inputs.insert(key.into(), value.into());
        self
    }
}

/// A validated job group
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupConfig {
    pub id: String,
    pub display_name: Option<String>,
    pub axes: AxisSet,
    pub include: Vec<IncludeRule>,
    pub exclude: Vec<ExcludeRule>,
    pub continue_on_error: ContinueOnErrorPolicy,
    pub fail_fast: bool,
    pub max_parallel: Option<usize>,
    pub env: IndexMap<String, String>,
    pub steps: Vec<StepDef>,
}

impl GroupConfig {
    /// A single-job group with no matrix and fail-fast enabled
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: None,
            axes: AxisSet::new(),
            include: Vec::new(),
            exclude: Vec::new(),
            continue_on_error: ContinueOnErrorPolicy::default(),
            fail_fast: true,
            max_parallel: None,
            env: IndexMap::new(),
            steps: Vec::new(),
        }
    }

    pub fn label(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.id)
    }
}

/// A command template behind a `uses:` identifier
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandActionDef {
    pub id: String,
    pub run: String,
    pub shell: Option<String>,
    pub env: IndexMap<String, String>,
}

/// The whole validated workflow
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CiConfig {
    pub name: Option<String>,
    pub env: IndexMap<String, String>,
    pub actions: Vec<CommandActionDef>,
    pub groups: Vec<GroupConfig>,
}

impl CiConfig {
    /// Expand every group, failing on the first configuration error
    pub fn plan(&self) -> Result<Vec<GroupPlan>, ConfigError> {
        self.groups
            .iter()
            .map(|group| {
                let jobs = MatrixExpander::expand(group)?;
                Ok(GroupPlan::new(Arc::new(group.clone()), jobs))
            })
            .collect()
    }

    /// Keep only the named groups, preserving declaration order
    pub fn retain_groups(&mut self, names: &[String]) {
        if !names.is_empty() {
            self.groups.retain(|g| names.iter().any(|n| n == &g.id));
        }
    }

    pub fn group(&self, id: &str) -> Option<&GroupConfig> {
        self.groups.iter().find(|g| g.id == id)
    }
}
