// Shell Runner
// Executes `run:` scripts and command-backed actions as child processes

use crate::execution::context::{interpolate_with, JobContext};
use crate::runners::{Action, ActionOutput, FailureDetail, OutputSink};
use crate::workflow::config::{CommandActionDef, InputValue, StepInputs};

use std::collections::HashMap;
use std::path::Path;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::debug;

/// Shell types supported by the runner
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shell {
    /// Default shell (sh on Unix, cmd on Windows)
    Default,
    /// Bash shell
    Bash,
}

impl Shell {
    /// Parse a `shell:` value
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "sh" | "default" => Some(Shell::Default),
            "bash" => Some(Shell::Bash),
            _ => None,
        }
    }

    /// Get the shell executable and arguments
    fn get_command(&self) -> (&'static str, &'static [&'static str]) {
        match self {
            Shell::Default => {
                if cfg!(target_os = "windows") {
                    ("cmd", &["/C"])
                } else {
                    ("sh", &["-c"])
                }
            }
            Shell::Bash => ("bash", &["-e", "-o", "pipefail", "-c"]),
        }
    }
}

/// Output collected during script execution
#[derive(Debug, Clone, Default)]
pub struct ShellOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
    pub success: bool,
}

impl ShellOutput {
    /// Keep only the last non-empty line; full output already went to the sink
    fn into_result(self) -> Result<ActionOutput, FailureDetail> {
        if self.success {
            return Ok(match last_line(&self.stdout) {
                Some(line) => ActionOutput::message(line),
                None => ActionOutput::empty(),
            });
        }

        let message = last_line(&self.stderr).unwrap_or_else(|| "command failed".to_string());
        Err(FailureDetail::new(message).with_exit_code(self.exit_code))
    }
}

fn last_line(text: &str) -> Option<String> {
    text.lines()
        .rev()
        .find(|l| !l.trim().is_empty())
        .map(|l| l.trim().to_string())
}

/// Run a script with the given shell, streaming lines to `sink`
pub async fn run_script(
    shell: Shell,
    script: &str,
    env: &HashMap<String, String>,
    working_dir: &Path,
    sink: Option<OutputSink>,
) -> Result<ShellOutput, FailureDetail> {
    let (shell_cmd, shell_args) = shell.get_command();

    which::which(shell_cmd)
        .map_err(|e| FailureDetail::new(format!("Shell '{}' not found: {}", shell_cmd, e)))?;

    debug!(shell = shell_cmd, dir = %working_dir.display(), "spawning script");

    let mut cmd = Command::new(shell_cmd);
    cmd.args(shell_args);
    cmd.arg(script);
    cmd.current_dir(working_dir);
    cmd.envs(env);
    cmd.stdin(Stdio::null());
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());

    let mut child = cmd.spawn().map_err(|e| {
        FailureDetail::new(format!(
            "Failed to spawn shell process '{}': {}",
            shell_cmd, e
        ))
    })?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| FailureDetail::new("stdout was not captured"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| FailureDetail::new("stderr was not captured"))?;

    let stdout_handle = tokio::spawn(collect_lines(stdout, sink.clone(), false));
    let stderr_handle = tokio::spawn(collect_lines(stderr, sink, true));

    let status = child
        .wait()
        .await
        .map_err(|e| FailureDetail::new(format!("Failed to wait for '{}': {}", shell_cmd, e)))?;

    Ok(ShellOutput {
        stdout: stdout_handle.await.unwrap_or_default(),
        stderr: stderr_handle.await.unwrap_or_default(),
        exit_code: status.code(),
        success: status.success(),
    })
}

async fn collect_lines<R>(reader: R, sink: Option<OutputSink>, is_error: bool) -> String
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    let mut output = String::new();
    while let Ok(Some(line)) = lines.next_line().await {
        if let Some(sink) = &sink {
            sink(&line, is_error);
        }
        if !output.is_empty() {
            output.push('\n');
        }
        output.push_str(&line);
    }
    output
}

fn string_input<'a>(inputs: &'a StepInputs, key: &str) -> Option<&'a str> {
    match inputs.get(key) {
        Some(InputValue::String(s)) => Some(s.as_str()),
        _ => None,
    }
}

fn parse_shell(name: Option<&str>) -> Result<Shell, FailureDetail> {
    match name {
        None => Ok(Shell::Default),
        Some(name) => Shell::from_name(name)
            .ok_or_else(|| FailureDetail::new(format!("Unsupported shell '{}'", name))),
    }
}

/// The builtin `run` action: executes the `script` input
#[derive(Debug, Clone, Default)]
pub struct ShellAction;

impl ShellAction {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait::async_trait]
impl Action for ShellAction {
    async fn invoke(
        &self,
        _action_id: &str,
        inputs: &StepInputs,
        ctx: &JobContext,
        output: Option<OutputSink>,
    ) -> Result<ActionOutput, FailureDetail> {
        let script = string_input(inputs, "script")
            .ok_or_else(|| FailureDetail::new("Missing 'script' input"))?;
        let shell = parse_shell(string_input(inputs, "shell"))?;
        let working_dir = match string_input(inputs, "working-directory") {
            Some(dir) => ctx.working_dir().join(dir),
            None => ctx.working_dir().to_path_buf(),
        };

        run_script(shell, script, &ctx.env_as_strings(), &working_dir, output)
            .await?
            .into_result()
    }
}

/// An action declared in the workflow's `actions:` table
#[derive(Debug, Clone)]
pub struct CommandAction {
    def: CommandActionDef,
}

impl CommandAction {
    pub fn new(def: CommandActionDef) -> Self {
        Self { def }
    }

    /// Substitute `${{ inputs.<name> }}` and job references into the command
    pub fn render(&self, inputs: &StepInputs, ctx: &JobContext) -> Result<String, FailureDetail> {
        interpolate_with(&self.def.run, |reference| match reference.strip_prefix("inputs.") {
            Some(name) => inputs.get(name).map(ToString::to_string),
            None => ctx.lookup(reference),
        })
        .map_err(|e| FailureDetail::new(format!("Action '{}': {}", self.def.id, e)))
    }
}

#[async_trait::async_trait]
impl Action for CommandAction {
    async fn invoke(
        &self,
        _action_id: &str,
        inputs: &StepInputs,
        ctx: &JobContext,
        output: Option<OutputSink>,
    ) -> Result<ActionOutput, FailureDetail> {
        let command = self.render(inputs, ctx)?;
        let shell = parse_shell(self.def.shell.as_deref())?;

        let mut env = ctx.env_as_strings();
        env.extend(self.def.env.iter().map(|(k, v)| (k.clone(), v.clone())));

        run_script(shell, &command, &env, ctx.working_dir(), output)
            .await?
            .into_result()
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::execution::matrix::JobSpec;
    use indexmap::IndexMap;
    use std::sync::{Arc, Mutex};

    fn context(dir: &Path) -> JobContext {
        JobContext::new(JobSpec::new("clippy").with("toolchain", "stable"), dir)
            .with_env([("GREETING", "hello")])
    }

    fn script(s: &str) -> StepInputs {
        let mut inputs = StepInputs::new();
        inputs.insert("script".to_string(), s.into());
        inputs
    }

    #[tokio::test]
    async fn test_shell_action_success_captures_stdout() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path());

        let out = ShellAction::new()
            .invoke("run", &script("echo $GREETING from $CI_GROUP"), &ctx, None)
            .await
            .unwrap();
        assert_eq!(out.message.as_deref(), Some("hello from clippy"));
    }

    #[tokio::test]
    async fn test_shell_action_success_keeps_only_last_stdout_line() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path());

        let out = ShellAction::new()
            .invoke(
                "run",
                &script("for i in $(seq 1 500); do echo \"Compiling crate-$i\"; done; echo 'Finished dev'; echo"),
                &ctx,
                None,
            )
            .await
            .unwrap();
        assert_eq!(out.message.as_deref(), Some("Finished dev"));
    }

    #[tokio::test]
    async fn test_shell_action_failure_reports_exit_code_and_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path());

        let err = ShellAction::new()
            .invoke("run", &script("echo 'lint failed' >&2; exit 3"), &ctx, None)
            .await
            .unwrap_err();
        assert_eq!(err.exit_code, Some(3));
        assert_eq!(err.message, "lint failed");
    }

    #[tokio::test]
    async fn test_shell_action_streams_lines_and_uses_working_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("crate")).unwrap();
        let ctx = context(dir.path());

        let lines = Arc::new(Mutex::new(Vec::new()));
        let captured = lines.clone();
        let sink: OutputSink = Arc::new(move |line: &str, is_error: bool| {
            captured.lock().unwrap().push((line.to_string(), is_error));
        });

        let mut inputs = script("basename \"$(pwd -P)\"; echo warn >&2");
        inputs.insert("working-directory".to_string(), "crate".into());

        ShellAction::new()
            .invoke("run", &inputs, &ctx, Some(sink))
            .await
            .unwrap();

        let lines = lines.lock().unwrap();
        assert!(lines.contains(&("crate".to_string(), false)));
        assert!(lines.contains(&("warn".to_string(), true)));
    }

    #[tokio::test]
    async fn test_shell_action_rejects_missing_script_and_unknown_shell() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path());

        let err = ShellAction::new()
            .invoke("run", &StepInputs::new(), &ctx, None)
            .await
            .unwrap_err();
        assert!(err.message.contains("Missing 'script'"));

        let mut inputs = script("echo hi");
        inputs.insert("shell".to_string(), "fish-9000".into());
        let err = ShellAction::new()
            .invoke("run", &inputs, &ctx, None)
            .await
            .unwrap_err();
        assert!(err.message.contains("Unsupported shell"));
    }

    #[tokio::test]
    async fn test_command_action_renders_inputs() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path());
        let action = CommandAction::new(CommandActionDef {
            id: "local/toolchain".to_string(),
            run: "echo install ${{ inputs.toolchain }} for ${{ matrix.toolchain }} $EXTRA".to_string(),
            shell: None,
            env: IndexMap::from([("EXTRA".to_string(), "minimal".to_string())]),
        });

        let mut inputs = StepInputs::new();
        inputs.insert("toolchain".to_string(), "nightly".into());

        let out = action.invoke("local/toolchain", &inputs, &ctx, None).await.unwrap();
        assert_eq!(out.message.as_deref(), Some("install nightly for stable minimal"));

        let err = action
            .invoke("local/toolchain", &StepInputs::new(), &ctx, None)
            .await
            .unwrap_err();
        assert!(err.message.contains("unknown reference 'inputs.toolchain'"));
    }
}
