// Run Results
// Step, job and run outcomes plus the fold that turns them into a verdict

use crate::execution::matrix::JobSpec;
use crate::execution::scheduler::GroupPlan;
use crate::workflow::config::StepDef;

use serde::Serialize;
use std::fmt;
use std::sync::Mutex;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

/// Status of a single step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StepStatus {
    Succeeded,
    Failed,
    /// An earlier step failed, or the job never started
    NotRun,
}

/// Status of a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum JobStatus {
    Success,
    Failed,
    /// Never launched because fail-fast aborted its group
    Skipped,
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            JobStatus::Success => "success",
            JobStatus::Failed => "failed",
            JobStatus::Skipped => "skipped",
        })
    }
}

/// Overall verdict of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Verdict {
    Success,
    Failed,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Verdict::Success => "success",
            Verdict::Failed => "failed",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepOutcome {
    pub name: String,
    pub action: String,
    pub status: StepStatus,
    pub message: Option<String>,
    pub exit_code: Option<i32>,
    pub duration_ms: u64,
}

impl StepOutcome {
    pub fn not_run(step: &StepDef) -> Self {
        Self {
            name: step.name.clone(),
            action: step.action.clone(),
            status: StepStatus::NotRun,
            message: None,
            exit_code: None,
            duration_ms: 0,
        }
    }
}

/// Which step broke a job, and why
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobFailure {
    /// `None` when the job failed before its first step
    pub step_index: Option<usize>,
    pub step_name: Option<String>,
    pub message: String,
}

/// The terminal record of one job
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobResult {
    pub job: JobSpec,
    pub status: JobStatus,
    /// One outcome per declared step, in order
    pub steps: Vec<StepOutcome>,
    pub failure: Option<JobFailure>,
    pub duration_ms: u64,
}

impl JobResult {
    /// A job that was never launched
    pub fn skipped(job: JobSpec, steps: &[StepDef]) -> Self {
        Self {
            job,
            status: JobStatus::Skipped,
            steps: steps.iter().map(StepOutcome::not_run).collect(),
            failure: None,
            duration_ms: 0,
        }
    }

    /// A job that failed before any of its steps could run
    pub fn aborted(
        job: JobSpec,
        steps: &[StepDef],
        message: impl Into<String>,
        duration: Duration,
    ) -> Self {
        Self {
            job,
            status: JobStatus::Failed,
            steps: steps.iter().map(StepOutcome::not_run).collect(),
            failure: Some(JobFailure {
                step_index: None,
                step_name: None,
                message: message.into(),
            }),
            duration_ms: duration.as_millis() as u64,
        }
    }

    /// Failed and not tolerated
    pub fn is_blocking(&self) -> bool {
        self.status == JobStatus::Failed && !self.job.tolerated()
    }

    pub fn is_tolerated_failure(&self) -> bool {
        self.status == JobStatus::Failed && self.job.tolerated()
    }
}

/// Results of one group, in expansion order
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupReport {
    pub id: String,
    pub name: Option<String>,
    pub fail_fast: bool,
    pub jobs: Vec<JobResult>,
}

impl GroupReport {
    pub fn verdict(&self) -> Verdict {
        if self.jobs.iter().any(JobResult::is_blocking) {
            Verdict::Failed
        } else {
            Verdict::Success
        }
    }
}

/// Job counts by outcome
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub tolerated: usize,
    pub skipped: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub name: Option<String>,
    pub groups: Vec<GroupReport>,
    pub verdict: Verdict,
    pub summary: Summary,
}

impl RunReport {
    /// Process exit code: 0 on success, 1 otherwise
    pub fn exit_code(&self) -> i32 {
        match self.verdict {
            Verdict::Success => 0,
            Verdict::Failed => 1,
        }
    }

    pub fn jobs(&self) -> impl Iterator<Item = &JobResult> {
        self.groups.iter().flat_map(|g| g.jobs.iter())
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Fold group results into a report.
///
/// The run fails iff some job failed without being tolerated.
pub fn aggregate(name: Option<String>, groups: Vec<GroupReport>) -> RunReport {
    let summary = groups
        .iter()
        .flat_map(|g| g.jobs.iter())
        .fold(Summary::default(), |mut summary, result| {
            summary.total += 1;
            match result.status {
                JobStatus::Success => summary.passed += 1,
                JobStatus::Skipped => summary.skipped += 1,
                JobStatus::Failed if result.job.tolerated() => summary.tolerated += 1,
                JobStatus::Failed => summary.failed += 1,
            }
            summary
        });

    let verdict = if summary.failed > 0 {
        Verdict::Failed
    } else {
        Verdict::Success
    };

    RunReport {
        name,
        groups,
        verdict,
        summary,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CollectorError {
    #[error("a result for '{job}' was already recorded")]
    DuplicateResult { job: String },

    #[error("no job slot {job_index} in group #{group_index}")]
    UnknownSlot { group_index: usize, job_index: usize },
}

struct GroupSlots {
    id: String,
    name: Option<String>,
    fail_fast: bool,
    steps: Vec<StepDef>,
    jobs: Vec<JobSpec>,
    results: Vec<Option<JobResult>>,
}

/// Accepts job results from concurrent tasks in any order.
///
/// Each job has exactly one slot; reports come out in declaration and
/// expansion order regardless of completion order.
pub struct ResultCollector {
    groups: Mutex<Vec<GroupSlots>>,
}

impl ResultCollector {
    pub fn new(plans: &[GroupPlan]) -> Self {
        let groups = plans
            .iter()
            .map(|plan| GroupSlots {
                id: plan.group.id.clone(),
                name: plan.group.display_name.clone(),
                fail_fast: plan.group.fail_fast,
                steps: plan.group.steps.clone(),
                jobs: plan.jobs.clone(),
                results: vec![None; plan.jobs.len()],
            })
            .collect();
        Self {
            groups: Mutex::new(groups),
        }
    }

    pub fn insert(
        &self,
        group_index: usize,
        job_index: usize,
        result: JobResult,
    ) -> Result<(), CollectorError> {
        let mut groups = self.groups.lock().unwrap_or_else(|e| e.into_inner());
        let slot = groups
            .get_mut(group_index)
            .and_then(|g| g.results.get_mut(job_index))
            .ok_or(CollectorError::UnknownSlot {
                group_index,
                job_index,
            })?;

        if slot.is_some() {
            return Err(CollectorError::DuplicateResult {
                job: result.job.name(),
            });
        }
        *slot = Some(result);
        Ok(())
    }

    /// Drain the collected results into group reports.
    ///
    /// A slot nobody filled is reported as a failed job.
    pub fn finish(&self) -> Vec<GroupReport> {
        let mut groups = self.groups.lock().unwrap_or_else(|e| e.into_inner());
        groups
            .iter_mut()
            .map(|group| {
                let steps = &group.steps;
                let jobs = group
                    .results
                    .iter_mut()
                    .zip(&group.jobs)
                    .map(|(slot, job)| {
                        slot.take().unwrap_or_else(|| {
                            warn!(job = %job.name(), "no result recorded for job");
                            JobResult::aborted(
                                job.clone(),
                                steps,
                                "no result was recorded for this job",
                                Duration::ZERO,
                            )
                        })
                    })
                    .collect();
                GroupReport {
                    id: group.id.clone(),
                    name: group.name.clone(),
                    fail_fast: group.fail_fast,
                    jobs,
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::config::GroupConfig;
    use std::sync::Arc;

    fn result(job: JobSpec, status: JobStatus) -> JobResult {
        JobResult {
            job,
            status,
            steps: Vec::new(),
            failure: None,
            duration_ms: 1,
        }
    }

    fn group(jobs: Vec<JobResult>) -> GroupReport {
        GroupReport {
            id: "rust_toolchains".to_string(),
            name: None,
            fail_fast: false,
            jobs,
        }
    }

    fn toolchain(value: &str) -> JobSpec {
        JobSpec::new("rust_toolchains").with("toolchain", value)
    }

    #[test]
    fn test_tolerated_failure_keeps_verdict_green() {
        let mut nightly = toolchain("nightly");
        nightly.experimental = true;

        let report = aggregate(
            Some("CI".to_string()),
            vec![group(vec![
                result(toolchain("stable"), JobStatus::Success),
                result(toolchain("beta"), JobStatus::Success),
                result(nightly, JobStatus::Failed),
            ])],
        );

        assert_eq!(report.verdict, Verdict::Success);
        assert_eq!(report.exit_code(), 0);
        assert_eq!(
            report.summary,
            Summary {
                total: 3,
                passed: 2,
                failed: 0,
                tolerated: 1,
                skipped: 0,
            }
        );
    }

    #[test]
    fn test_blocking_failure_fails_run_and_skips_do_not() {
        let report = aggregate(
            None,
            vec![
                group(vec![result(toolchain("stable"), JobStatus::Skipped)]),
                group(vec![result(toolchain("beta"), JobStatus::Failed)]),
            ],
        );

        assert_eq!(report.verdict, Verdict::Failed);
        assert_eq!(report.exit_code(), 1);
        assert_eq!(report.groups[0].verdict(), Verdict::Success);
        assert_eq!(report.groups[1].verdict(), Verdict::Failed);
        assert_eq!(report.summary.skipped, 1);

        let skipped_only = aggregate(None, vec![group(vec![result(toolchain("stable"), JobStatus::Skipped)])]);
        assert_eq!(skipped_only.verdict, Verdict::Success);
    }

    #[test]
    fn test_skipped_result_marks_every_step_not_run() {
        let steps = vec![
            StepDef::new("checkout", "actions/checkout@v4"),
            StepDef::new("test", "run"),
        ];
        let skipped = JobResult::skipped(toolchain("beta"), &steps);

        assert_eq!(skipped.steps.len(), 2);
        assert!(skipped.steps.iter().all(|s| s.status == StepStatus::NotRun));
        assert!(!skipped.is_blocking());
    }

    #[test]
    fn test_collector_orders_results_and_rejects_duplicates() {
        let mut config = GroupConfig::new("rust_toolchains");
        config.fail_fast = false;
        let jobs = vec![toolchain("stable"), toolchain("beta")];
        let collector = ResultCollector::new(&[GroupPlan::new(Arc::new(config), jobs)]);

        collector
            .insert(0, 1, result(toolchain("beta"), JobStatus::Success))
            .unwrap();
        collector
            .insert(0, 0, result(toolchain("stable"), JobStatus::Failed))
            .unwrap();

        assert_eq!(
            collector.insert(0, 1, result(toolchain("beta"), JobStatus::Failed)),
            Err(CollectorError::DuplicateResult {
                job: "rust_toolchains (beta)".to_string()
            })
        );
        assert!(matches!(
            collector.insert(1, 0, result(toolchain("beta"), JobStatus::Failed)),
            Err(CollectorError::UnknownSlot { .. })
        ));

        let groups = collector.finish();
        assert_eq!(groups.len(), 1);
        assert!(!groups[0].fail_fast);
        assert_eq!(groups[0].jobs[0].job, toolchain("stable"));
        assert_eq!(groups[0].jobs[0].status, JobStatus::Failed);
        assert_eq!(groups[0].jobs[1].status, JobStatus::Success);
    }

    #[test]
    fn test_collector_reports_missing_results_as_failed() {
        let mut config = GroupConfig::new("rustfmt");
        config.steps = vec![
            StepDef::new("install", "toolchain"),
            StepDef::new("fmt", "run"),
        ];
        let collector = ResultCollector::new(&[GroupPlan::new(
            Arc::new(config),
            vec![JobSpec::new("rustfmt")],
        )]);

        let groups = collector.finish();
        let missing = &groups[0].jobs[0];
        assert_eq!(missing.status, JobStatus::Failed);
        assert!(missing.failure.is_some());
        assert_eq!(missing.steps.len(), 2);
        assert!(missing.steps.iter().all(|s| s.status == StepStatus::NotRun));
        assert_eq!(missing.steps[1].name, "fmt");
    }

    #[test]
    fn test_report_serializes_to_json() {
        let report = aggregate(
            Some("CI".to_string()),
            vec![group(vec![result(toolchain("stable"), JobStatus::Success)])],
        );
        let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();

        assert_eq!(json["verdict"], "Success");
        assert_eq!(json["groups"][0]["jobs"][0]["job"]["assignments"]["toolchain"], "stable");
        assert_eq!(json["summary"]["passed"], 1);
    }
}
