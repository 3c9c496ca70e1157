// Runners Module
// The step action boundary and the actions shipped with the service

pub mod checkout;
pub mod shell;

pub use checkout::CheckoutAction;
pub use shell::{CommandAction, ShellAction};

use crate::execution::context::JobContext;
use crate::workflow::config::{CiConfig, StepInputs};

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Action identifier used for `run:` steps
pub const RUN_ACTION: &str = "run";

/// What a successful action reports back
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionOutput {
    /// Diagnostic text (captured stdout, summary line, ...)
    pub message: Option<String>,
}

impl ActionOutput {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn message(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
        }
    }
}

/// Why an action failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureDetail {
    pub message: String,
    pub exit_code: Option<i32>,
}

impl FailureDetail {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            exit_code: None,
        }
    }

    pub fn with_exit_code(mut self, code: Option<i32>) -> Self {
        self.exit_code = code;
        self
    }
}

impl fmt::Display for FailureDetail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.exit_code {
            Some(code) => write!(f, "{} (exit code: {})", self.message, code),
            None => f.write_str(&self.message),
        }
    }
}

impl std::error::Error for FailureDetail {}

/// Receives output lines while an action runs (`is_error` marks stderr)
pub type OutputSink = Arc<dyn Fn(&str, bool) + Send + Sync>;

/// An external collaborator invoked by a step.
///
/// The engine only observes success or failure plus optional text; how
/// the action does its work is its own business.
#[async_trait::async_trait]
pub trait Action: Send + Sync {
    async fn invoke(
        &self,
        action_id: &str,
        inputs: &StepInputs,
        ctx: &JobContext,
        output: Option<OutputSink>,
    ) -> Result<ActionOutput, FailureDetail>;
}

/// Maps action identifiers to their implementations
#[derive(Clone, Default)]
pub struct ActionRegistry {
    actions: HashMap<String, Arc<dyn Action>>,
}

impl ActionRegistry {
    /// An empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with `run` and `actions/checkout`
    pub fn with_builtins() -> Self {
        Self::new()
            .register(RUN_ACTION, ShellAction::new())
            .register("actions/checkout", CheckoutAction)
    }

    /// Builtins plus the command-backed actions declared in the workflow
    pub fn from_config(config: &CiConfig) -> Self {
        config
            .actions
            .iter()
            .fold(Self::with_builtins(), |registry, def| {
                registry.register(def.id.clone(), CommandAction::new(def.clone()))
            })
    }

    pub fn register(mut self, id: impl Into<String>, action: impl Action + 'static) -> Self {
        self.actions.insert(id.into(), Arc::new(action));
        self
    }

    /// Look up an action by exact id, then with its `@version` suffix removed
    pub fn resolve(&self, action_id: &str) -> Option<Arc<dyn Action>> {
        self.actions
            .get(action_id)
            .or_else(|| {
                action_id
                    .rsplit_once('@')
                    .and_then(|(base, _)| self.actions.get(base))
            })
            .cloned()
    }

    pub fn contains(&self, action_id: &str) -> bool {
        self.resolve(action_id).is_some()
    }
}

impl fmt::Debug for ActionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut ids: Vec<_> = self.actions.keys().collect();
        ids.sort();
        f.debug_struct("ActionRegistry").field("actions", &ids).finish()
    }
}
