// Execution Events
// Progress reporting while a matrix run is in flight

use crate::execution::report::{JobStatus, StepStatus, Verdict};

use std::time::Duration;
use tokio::sync::mpsc;

/// Sender for execution progress events
pub type ProgressSender = mpsc::UnboundedSender<ExecutionEvent>;

/// Receiver for execution progress events
pub type ProgressReceiver = mpsc::UnboundedReceiver<ExecutionEvent>;

/// Create a new progress channel
pub fn progress_channel() -> (ProgressSender, ProgressReceiver) {
    mpsc::unbounded_channel()
}

/// Events emitted during a run
#[derive(Debug, Clone)]
pub enum ExecutionEvent {
    RunStarted {
        run_name: String,
        total_groups: usize,
        total_jobs: usize,
    },

    RunCompleted {
        run_name: String,
        verdict: Verdict,
        duration: Duration,
    },

    GroupStarted {
        group: String,
        display_name: Option<String>,
        total_jobs: usize,
    },

    GroupCompleted {
        group: String,
        aborted: bool,
        duration: Duration,
    },

    JobStarted {
        group: String,
        job_name: String,
        total_steps: usize,
    },

    JobCompleted {
        group: String,
        job_name: String,
        status: JobStatus,
        tolerated: bool,
        duration: Duration,
    },

    /// Job never launched because its group was aborted
    JobSkipped {
        group: String,
        job_name: String,
        reason: String,
    },

    StepStarted {
        group: String,
        job_name: String,
        step_name: String,
        step_index: usize,
    },

    /// Step output (stdout/stderr)
    StepOutput {
        group: String,
        job_name: String,
        step_index: usize,
        output: String,
        is_error: bool,
    },

    StepCompleted {
        group: String,
        job_name: String,
        step_name: String,
        step_index: usize,
        status: StepStatus,
        duration: Duration,
        message: Option<String>,
    },
}

impl ExecutionEvent {
    pub fn run_started(name: impl Into<String>, total_groups: usize, total_jobs: usize) -> Self {
        Self::RunStarted {
            run_name: name.into(),
            total_groups,
            total_jobs,
        }
    }

    pub fn run_completed(name: impl Into<String>, verdict: Verdict, duration: Duration) -> Self {
        Self::RunCompleted {
            run_name: name.into(),
            verdict,
            duration,
        }
    }

    pub fn job_completed(
        group: impl Into<String>,
        job_name: impl Into<String>,
        status: JobStatus,
        tolerated: bool,
        duration: Duration,
    ) -> Self {
        Self::JobCompleted {
            group: group.into(),
            job_name: job_name.into(),
            status,
            tolerated,
            duration,
        }
    }

    /// Create a step output event
    pub fn step_output(
        group: impl Into<String>,
        job_name: impl Into<String>,
        step_index: usize,
        output: impl Into<String>,
        is_error: bool,
    ) -> Self {
        Self::StepOutput {
            group: group.into(),
            job_name: job_name.into(),
            step_index,
            output: output.into(),
            is_error,
        }
    }
}

/// Helper trait for sending events, ignoring errors (fire-and-forget)
pub trait EventSender {
    fn send_event(&self, event: ExecutionEvent);
}

impl EventSender for ProgressSender {
    fn send_event(&self, event: ExecutionEvent) {
        let _ = self.send(event);
    }
}

impl EventSender for Option<ProgressSender> {
    fn send_event(&self, event: ExecutionEvent) {
        if let Some(sender) = self {
            let _ = sender.send(event);
        }
    }
}
