// Job Scheduler
// Runs groups concurrently and the jobs of each group under fail-fast and max-parallel

use crate::execution::events::{EventSender, ExecutionEvent, ProgressSender};
use crate::execution::matrix::JobSpec;
use crate::execution::report::{aggregate, JobResult, JobStatus, ResultCollector, RunReport};
use crate::execution::runner::{JobRunner, JobSetup};
use crate::runners::ActionRegistry;
use crate::workflow::config::{CiConfig, GroupConfig};

use indexmap::IndexMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

/// A group together with its expanded jobs
#[derive(Debug, Clone)]
pub struct GroupPlan {
    pub group: Arc<GroupConfig>,
    pub jobs: Vec<JobSpec>,
}

impl GroupPlan {
    pub fn new(group: Arc<GroupConfig>, jobs: Vec<JobSpec>) -> Self {
        Self { group, jobs }
    }
}

/// Schedules expanded jobs and collects their results
#[derive(Debug, Clone)]
pub struct JobScheduler {
    registry: ActionRegistry,
    run_name: Option<String>,
    /// Workflow-level env
    env: IndexMap<String, String>,
    /// Overrides applied after group env
    overrides: IndexMap<String, String>,
    source_dir: Option<PathBuf>,
    event_tx: Option<ProgressSender>,
}

impl JobScheduler {
    pub fn new(registry: ActionRegistry) -> Self {
        Self {
            registry,
            run_name: None,
            env: IndexMap::new(),
            overrides: IndexMap::new(),
            source_dir: None,
            event_tx: None,
        }
    }

    /// Scheduler for a loaded workflow: its actions, env and name
    pub fn from_config(config: &CiConfig) -> Self {
        let mut scheduler = Self::new(ActionRegistry::from_config(config));
        scheduler.run_name = config.name.clone();
        scheduler.env = config.env.clone();
        scheduler
    }

    pub fn with_overrides(mut self, overrides: IndexMap<String, String>) -> Self {
        self.overrides = overrides;
        self
    }

    pub fn with_source_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.source_dir = dir;
        self
    }

    /// Set progress event sender
    pub fn with_progress(mut self, tx: ProgressSender) -> Self {
        self.event_tx = Some(tx);
        self
    }

    /// Run every group and aggregate the results.
    ///
    /// Fail-fast only stops jobs still waiting for a slot, so jobs are
    /// reported `Skipped` only in groups bounded by `max-parallel`.
    pub async fn run_all(&self, plans: &[GroupPlan]) -> RunReport {
        let start = Instant::now();
        let run_name = self.run_name.clone().unwrap_or_else(|| "workflow".to_string());
        let total_jobs = plans.iter().map(|p| p.jobs.len()).sum();

        self.event_tx.send_event(ExecutionEvent::run_started(
            &run_name,
            plans.len(),
            total_jobs,
        ));
        info!(groups = plans.len(), jobs = total_jobs, "run started");

        let collector = Arc::new(ResultCollector::new(plans));
        let runner = JobRunner::new(self.registry.clone()).with_progress(self.event_tx.clone());

        let mut groups = JoinSet::new();
        for (index, plan) in plans.iter().enumerate() {
            groups.spawn(run_group(
                index,
                plan.clone(),
                runner.clone(),
                self.job_setup(&plan.group),
                collector.clone(),
                self.event_tx.clone(),
            ));
        }
        while let Some(joined) = groups.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "group task failed");
            }
        }

        let report = aggregate(self.run_name.clone(), collector.finish());

        info!(
            verdict = %report.verdict,
            passed = report.summary.passed,
            failed = report.summary.failed,
            tolerated = report.summary.tolerated,
            skipped = report.summary.skipped,
            "run finished"
        );
        self.event_tx.send_event(ExecutionEvent::run_completed(
            run_name,
            report.verdict,
            start.elapsed(),
        ));
        report
    }

    fn job_setup(&self, group: &GroupConfig) -> JobSetup {
        let mut env = self.env.clone();
        env.extend(group.env.iter().map(|(k, v)| (k.clone(), v.clone())));
        env.extend(self.overrides.iter().map(|(k, v)| (k.clone(), v.clone())));
        JobSetup {
            env,
            source_dir: self.source_dir.clone(),
        }
    }
}

async fn run_group(
    group_index: usize,
    plan: GroupPlan,
    runner: JobRunner,
    setup: JobSetup,
    collector: Arc<ResultCollector>,
    event_tx: Option<ProgressSender>,
) {
    let start = Instant::now();
    let group = plan.group;
    let setup = Arc::new(setup);

    event_tx.send_event(ExecutionEvent::GroupStarted {
        group: group.id.clone(),
        display_name: group.display_name.clone(),
        total_jobs: plan.jobs.len(),
    });

    let limit = group.max_parallel.unwrap_or(plan.jobs.len()).max(1);
    let semaphore = Arc::new(Semaphore::new(limit));
    let abort = Arc::new(AtomicBool::new(false));
    let mut tasks = JoinSet::new();

    for (job_index, job) in plan.jobs.into_iter().enumerate() {
        let permit = if abort.load(Ordering::SeqCst) {
            None
        } else {
            semaphore.clone().acquire_owned().await.ok()
        };

        // The abort flag may have been raised while waiting for a permit
        let permit = match permit {
            Some(permit) if !abort.load(Ordering::SeqCst) => permit,
            _ => {
                event_tx.send_event(ExecutionEvent::JobSkipped {
                    group: group.id.clone(),
                    job_name: job.name(),
                    reason: "fail-fast: an earlier job in the group failed".to_string(),
                });
                record(&collector, group_index, job_index, JobResult::skipped(job, &group.steps));
                continue;
            }
        };

        let runner = runner.clone();
        let group = group.clone();
        let setup = setup.clone();
        let abort = abort.clone();

        tasks.spawn(async move {
            let started = Instant::now();
            let inner = {
                let job = job.clone();
                let group = group.clone();
                tokio::spawn(async move { runner.run(job, &group.steps, &setup).await })
            };

            let result = match inner.await {
                Ok(result) => result,
                Err(e) => {
                    error!(job = %job.name(), error = %e, "job task crashed");
                    JobResult::aborted(
                        job,
                        &group.steps,
                        format!("job task crashed: {}", e),
                        started.elapsed(),
                    )
                }
            };

            if group.fail_fast && result.is_blocking() {
                warn!(group = %group.id, job = %result.job.name(), "fail-fast: aborting group");
                abort.store(true, Ordering::SeqCst);
            }
            drop(permit);
            (job_index, result)
        });
    }

    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((job_index, result)) => record(&collector, group_index, job_index, result),
            Err(e) => error!(group = %group.id, error = %e, "job supervisor failed"),
        }
    }

    let aborted = abort.load(Ordering::SeqCst);
    info!(group = %group.id, aborted, "group finished");
    event_tx.send_event(ExecutionEvent::GroupCompleted {
        group: group.id.clone(),
        aborted,
        duration: start.elapsed(),
    });
}

fn record(collector: &ResultCollector, group_index: usize, job_index: usize, result: JobResult) {
    if result.status == JobStatus::Skipped {
        info!(job = %result.job.name(), "job skipped");
    }
    if let Err(e) = collector.insert(group_index, job_index, result) {
        warn!(error = %e, "dropping job result");
    }
}
