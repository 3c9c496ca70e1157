// Step Runner
// Runs one job's steps in order inside a private sandbox directory

use crate::execution::context::{matrix_env, JobContext};
use crate::execution::events::{EventSender, ExecutionEvent, ProgressSender};
use crate::execution::matrix::JobSpec;
use crate::execution::report::{JobFailure, JobResult, JobStatus, StepOutcome, StepStatus};
use crate::runners::{ActionOutput, ActionRegistry, FailureDetail, OutputSink};
use crate::workflow::config::StepDef;

use indexmap::IndexMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Inputs shared by every job of a group
#[derive(Debug, Clone, Default)]
pub struct JobSetup {
    /// Workflow env, group env and overrides, already layered
    pub env: IndexMap<String, String>,
    pub source_dir: Option<PathBuf>,
}

/// Executes the steps of a single job
#[derive(Debug, Clone)]
pub struct JobRunner {
    registry: ActionRegistry,
    event_tx: Option<ProgressSender>,
}

impl JobRunner {
    pub fn new(registry: ActionRegistry) -> Self {
        Self {
            registry,
            event_tx: None,
        }
    }

    pub fn with_progress(mut self, tx: Option<ProgressSender>) -> Self {
        self.event_tx = tx;
        self
    }

    /// Run `steps` for `job`.
    ///
    /// The first failing step ends the job; later steps are recorded as not
    /// run. The sandbox is removed on every path.
    pub async fn run(&self, job: JobSpec, steps: &[StepDef], setup: &JobSetup) -> JobResult {
        let start = Instant::now();
        let job_name = job.name();

        let sandbox = match tempfile::Builder::new().prefix("cimatrix-").tempdir() {
            Ok(dir) => dir,
            Err(e) => {
                warn!(job = %job_name, error = %e, "failed to create job sandbox");
                let result = JobResult::aborted(
                    job,
                    steps,
                    format!("failed to create sandbox: {}", e),
                    start.elapsed(),
                );
                self.send_completed(&result, start);
                return result;
            }
        };

        let ctx = JobContext::new(job.clone(), sandbox.path())
            .with_env(setup.env.clone())
            .with_env(matrix_env(&job))
            .with_source_dir(setup.source_dir.clone());

        info!(job = %job_name, steps = steps.len(), "job started");
        self.event_tx.send_event(ExecutionEvent::JobStarted {
            group: job.group.clone(),
            job_name: job_name.clone(),
            total_steps: steps.len(),
        });

        let mut outcomes = Vec::with_capacity(steps.len());
        let mut failure: Option<JobFailure> = None;

        for (index, step) in steps.iter().enumerate() {
            if failure.is_some() {
                outcomes.push(StepOutcome::not_run(step));
                continue;
            }

            self.event_tx.send_event(ExecutionEvent::StepStarted {
                group: job.group.clone(),
                job_name: job_name.clone(),
                step_name: step.name.clone(),
                step_index: index,
            });

            let step_start = Instant::now();
            let result = self.run_step(step, index, &ctx).await;
            let duration = step_start.elapsed();

            let outcome = match result {
                Ok(output) => StepOutcome {
                    name: step.name.clone(),
                    action: step.action.clone(),
                    status: StepStatus::Succeeded,
                    message: output.message,
                    exit_code: None,
                    duration_ms: duration.as_millis() as u64,
                },
                Err(detail) => {
                    debug!(job = %job_name, step = %step.name, error = %detail, "step failed");
                    failure = Some(JobFailure {
                        step_index: Some(index),
                        step_name: Some(step.name.clone()),
                        message: detail.to_string(),
                    });
                    StepOutcome {
                        name: step.name.clone(),
                        action: step.action.clone(),
                        status: StepStatus::Failed,
                        message: Some(detail.message),
                        exit_code: detail.exit_code,
                        duration_ms: duration.as_millis() as u64,
                    }
                }
            };

            self.event_tx.send_event(ExecutionEvent::StepCompleted {
                group: job.group.clone(),
                job_name: job_name.clone(),
                step_name: step.name.clone(),
                step_index: index,
                status: outcome.status,
                duration,
                message: outcome.message.clone(),
            });
            outcomes.push(outcome);
        }

        if let Err(e) = sandbox.close() {
            warn!(job = %job_name, error = %e, "failed to remove job sandbox");
        }

        let result = JobResult {
            job,
            status: if failure.is_some() {
                JobStatus::Failed
            } else {
                JobStatus::Success
            },
            steps: outcomes,
            failure,
            duration_ms: start.elapsed().as_millis() as u64,
        };
        self.send_completed(&result, start);
        result
    }

    async fn run_step(
        &self,
        step: &StepDef,
        index: usize,
        ctx: &JobContext,
    ) -> Result<ActionOutput, FailureDetail> {
        let action = self
            .registry
            .resolve(&step.action)
            .ok_or_else(|| FailureDetail::new(format!("unknown action '{}'", step.action)))?;

        let inputs = ctx
            .interpolate_inputs(&step.inputs)
            .map_err(|e| FailureDetail::new(format!("invalid inputs: {}", e)))?;

        let step_ctx = if step.env.is_empty() {
            None
        } else {
            let env = step
                .env
                .iter()
                .map(|(k, v)| ctx.interpolate(v).map(|v| (k.clone(), v)))
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| FailureDetail::new(format!("invalid step env: {}", e)))?;
            Some(ctx.clone().with_env(env))
        };

        let sink = self.event_tx.clone().map(|tx| {
            let group = ctx.job.group.clone();
            let job_name = ctx.job.name();
            Arc::new(move |line: &str, is_error: bool| {
                tx.send_event(ExecutionEvent::step_output(
                    group.clone(),
                    job_name.clone(),
                    index,
                    line,
                    is_error,
                ));
            }) as OutputSink
        });

        action
            .invoke(&step.action, &inputs, step_ctx.as_ref().unwrap_or(ctx), sink)
            .await
    }

    fn send_completed(&self, result: &JobResult, start: Instant) {
        info!(
            job = %result.job.name(),
            status = %result.status,
            tolerated = result.job.tolerated(),
            "job finished"
        );
        self.event_tx.send_event(ExecutionEvent::job_completed(
            result.job.group.clone(),
            result.job.name(),
            result.status,
            result.job.tolerated(),
            start.elapsed(),
        ));
    }
}
