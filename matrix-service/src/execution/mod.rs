// Execution Engine Module
// Matrix expansion, per-job step execution, scheduling and result aggregation

pub mod context;
pub mod events;
pub mod matrix;
pub mod report;
pub mod runner;
pub mod scheduler;

// Re-export key types
pub use context::{InterpolationError, JobContext};
pub use events::{progress_channel, ExecutionEvent, ProgressReceiver, ProgressSender};
pub use matrix::{JobSpec, MatrixExpander};
pub use report::{
    aggregate, CollectorError, GroupReport, JobFailure, JobResult, JobStatus, ResultCollector,
    RunReport, StepOutcome, StepStatus, Summary, Verdict,
};
pub use runner::{JobRunner, JobSetup};
pub use scheduler::{GroupPlan, JobScheduler};
