// Matrix Service Library
// Core service for matrix workflow parsing, expansion and execution

pub mod error;
pub mod execution;
pub mod runners;
pub mod workflow;

// Re-export commonly used types
pub use error::{ConfigError, ServiceError, ServiceResult};

// Re-export workflow types
pub use workflow::{CiConfig, GroupConfig, StepDef, WorkflowParser};

// Re-export execution types
pub use execution::{
    ExecutionEvent, GroupPlan, JobResult, JobScheduler, JobSpec, JobStatus, MatrixExpander,
    ProgressSender, RunReport, Verdict,
};

// Re-export runner types
pub use runners::{Action, ActionRegistry, FailureDetail};
