// Terminal output for cimatrix
// Progress goes to stderr so stdout stays free for JSON and job listings

use std::time::Duration;

use matrix_service::execution::{JobSpec, JobStatus, StepStatus, Summary};

const RESET: &str = "\x1b[0m";
const BOLD: &str = "\x1b[1m";
const DIM: &str = "\x1b[2m";
const RED: &str = "\x1b[31m";
const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";
const CYAN: &str = "\x1b[36m";

fn paint(color: &str, text: &str) -> String {
    format!("{}{}{}", color, text, RESET)
}

fn secs(duration: Duration) -> String {
    format!("{:.2}s", duration.as_secs_f64())
}

/// Right-aligned label followed by a message, e.g. `      Report ci.json`
pub fn status(label: &str, message: &str) {
    eprintln!("{} {}", paint("\x1b[1;36m", &format!("{:>12}", label)), message);
}

pub fn success(message: &str) {
    eprintln!("{} {}", paint("\x1b[1;32m", "  \u{2713}"), message);
}

pub fn failure(message: &str) {
    eprintln!("{} {}", paint("\x1b[1;31m", "  \u{2717}"), message);
}

/// A passed validation check
pub fn check(message: &str) {
    eprintln!("{} {}", paint(GREEN, "  \u{2713}"), message);
}

pub fn error(message: &str) {
    eprintln!("{} {}", paint("\x1b[1;31m", "error:"), message);
}

pub fn info(message: &str) {
    eprintln!("{} {}", paint(CYAN, "  i"), message);
}

/// Print a header line
pub fn header(message: &str) {
    eprintln!("{}", paint(BOLD, &format!("==> {}", message)));
}

pub fn group_header(name: &str, total_jobs: usize) {
    eprintln!("{} '{}' ({} jobs)", paint("\x1b[1;34m", "  Group"), name, total_jobs);
}

/// Closing line of a group; red when fail-fast cut it short
pub fn group_done(group: &str, aborted: bool, duration: Duration) {
    let line = format!("  Group '{}' done ({})", group, secs(duration));
    if aborted {
        eprintln!("{}", paint(RED, &format!("{}, aborted by fail-fast", line)));
    } else {
        eprintln!("{}", paint(DIM, &line));
    }
}

pub fn job_started(job_name: &str, total_steps: usize) {
    eprintln!("    Job '{}' ({} steps)", job_name, total_steps);
}

fn job_line(job_name: &str, status: JobStatus, tolerated: bool, duration: Duration) -> String {
    let (color, verdict) = match status {
        JobStatus::Success => (GREEN, "OK"),
        JobStatus::Failed if tolerated => (YELLOW, "FAIL (tolerated)"),
        JobStatus::Failed => (RED, "FAIL"),
        JobStatus::Skipped => (DIM, "SKIP"),
    };
    paint(
        color,
        &format!("    Job '{}' {} ({})", job_name, verdict, secs(duration)),
    )
}

/// Tolerated failures print yellow, they do not fail the run
pub fn job_done(job_name: &str, status: JobStatus, tolerated: bool, duration: Duration) {
    eprintln!("{}", job_line(job_name, status, tolerated, duration));
}

pub fn job_skipped(job_name: &str, reason: &str) {
    eprintln!("{} Job '{}' skipped: {}", paint(YELLOW, "    !"), job_name, reason);
}

/// Job name with its tolerance flags, as listed by `expand`
pub fn job_label(job: &JobSpec) -> String {
    let mut flags = Vec::new();
    if job.experimental {
        flags.push("experimental");
    }
    if job.continue_on_error {
        flags.push("continue-on-error");
    }
    if flags.is_empty() {
        job.name()
    } else {
        format!("{} [{}]", job.name(), flags.join(", "))
    }
}

pub fn step_started(index: usize, step_name: &str) {
    eprintln!("      [Step {}] {}", index + 1, step_name);
}

/// Step result; a failing step also prints its failure message
pub fn step_done(status: StepStatus, duration: Duration, message: Option<&str>) {
    if status == StepStatus::Succeeded {
        eprintln!("{}", paint(GREEN, &format!("        OK ({})", secs(duration))));
        return;
    }
    eprintln!("{}", paint(RED, &format!("        FAIL ({})", secs(duration))));
    if let Some(message) = message {
        error(message);
    }
}

/// Print step output (indented)
pub fn step_output(line: &str) {
    eprintln!("        | {}", line);
}

/// Print step error output (indented, red)
pub fn step_error(line: &str) {
    eprintln!("{}", paint(RED, &format!("        | {}", line)));
}

fn summary_line(summary: &Summary) -> String {
    format!(
        "{} jobs: {} passed, {} failed, {} tolerated, {} skipped",
        summary.total, summary.passed, summary.failed, summary.tolerated, summary.skipped
    )
}

pub fn summary(summary: &Summary) {
    info(&summary_line(summary));
}
