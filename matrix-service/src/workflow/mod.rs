pub mod config;
pub mod models;
pub mod parser;

pub use config::{
    AxisSet, CiConfig, CommandActionDef, ContinueOnErrorPolicy, ExcludeRule, GroupConfig,
    IncludeRule, InputValue, StepDef, StepInputs,
};
pub use models::{ActionDefinition, ContinueOnError, Defaults, Group, Matrix, Step, Strategy, Workflow};
pub use parser::WorkflowParser;
