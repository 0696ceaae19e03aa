use std::os::fd::OwnedFd;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;

use tokio::io::AsyncReadExt;
use tokio::net::unix::pipe;
use tokio::process::Command;
use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant, timeout_at};
use tokio_util::sync::CancellationToken;

use crate::constants::DRAIN_GRACE;
use crate::domain::{ExecutionResult, WorkspaceMode};
use crate::runner::errors::ExecutionError;
use crate::runner::workspace::Workspace;

/// Settings shared read-only by every runner of one pool.
#[derive(Clone, Debug)]
pub struct RunnerConfig {
    pub executable_path: PathBuf,
    pub timeout: Duration,
    pub mode: WorkspaceMode,
    pub workspace_root: PathBuf,
}

impl RunnerConfig {
    pub fn new<P: AsRef<Path>>(executable_path: P, timeout: Duration) -> Self {
        Self {
            executable_path: executable_path.as_ref().into(),
            timeout,
            mode: WorkspaceMode::default(),
            workspace_root: std::env::temp_dir(),
        }
    }

    pub fn with_mode(self, mode: WorkspaceMode) -> Self {
        Self { mode, ..self }
    }

    pub fn with_workspace_root<P: AsRef<Path>>(self, root: P) -> Self {
        Self {
            workspace_root: root.as_ref().into(),
            ..self
        }
    }
}

/// One interpreter invocation unit.
///
/// Holds nothing but the shared config between calls, so it can be recycled
/// freely once an execution returns.
#[derive(Debug)]
pub struct BasicRunner {
    config: Arc<RunnerConfig>,
}

impl BasicRunner {
    pub fn new(config: Arc<RunnerConfig>) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Runs `code` using the configured workspace mode.
    pub async fn execute(&self, code: &str) -> ExecutionResult {
        match self.config.mode {
            WorkspaceMode::File => self.execute_in_temp_file(code).await,
            WorkspaceMode::Directory => self.execute_in_temp_dir(code).await,
        }
    }

    #[tracing::instrument(skip_all)]
    pub async fn execute_in_temp_file(&self, code: &str) -> ExecutionResult {
        tracing::debug!("Executing code: {:?}", code);
        match Workspace::file(&self.config.workspace_root, code) {
            Ok(workspace) => self.run_in(workspace).await,
            Err(err) => err.into(),
        }
    }

    #[tracing::instrument(skip_all)]
    pub async fn execute_in_temp_dir(&self, code: &str) -> ExecutionResult {
        tracing::debug!("Executing code in private dir: {:?}", code);
        match Workspace::directory(&self.config.workspace_root, code) {
            Ok(workspace) => self.run_in(workspace).await,
            Err(err) => err.into(),
        }
    }

    async fn run_in(&self, workspace: Workspace) -> ExecutionResult {
        let result = self.run_interpreter(&workspace).await;
        workspace.remove();
        result
    }

    async fn run_interpreter(&self, workspace: &Workspace) -> ExecutionResult {
        let (reader, writer) = match merged_pipe() {
            Ok(pipe) => pipe,
            Err(err) => return err.into(),
        };

        let mut cmd = Command::new(&self.config.executable_path);
        cmd.arg(workspace.script())
            .stdin(Stdio::null())
            .stdout(writer.stdout)
            .stderr(writer.stderr)
            .kill_on_drop(true);
        if let Some(dir) = workspace.working_dir() {
            cmd.current_dir(dir);
        }

        let spawned = cmd.spawn();
        // Drop our copies of the write end, otherwise the drain never sees EOF.
        drop(cmd);
        let mut child = match spawned {
            Ok(child) => child,
            Err(e) => {
                tracing::warn!(
                    "Failed to spawn {}: {}",
                    self.config.executable_path.display(),
                    e
                );
                return ExecutionError::SpawnFailure(e).into();
            }
        };
        let deadline = Instant::now() + self.config.timeout;
        tracing::debug!("Spawned interpreter, pid={:?}", child.id());

        let stop_drain = CancellationToken::new();
        let drain = tokio::spawn(drain_output(reader, stop_drain.clone()));

        let status = match timeout_at(deadline, child.wait()).await {
            Ok(status) => Some(status),
            Err(_) => {
                tracing::info!("Interpreter exceeded {:?}, killing it", self.config.timeout);
                if let Err(e) = child.kill().await {
                    tracing::warn!("Failed to kill timed out interpreter: {}", e);
                }
                None
            }
        };

        // A clean exit leaves the rest of the time budget for descendants that
        // still hold the pipe. After a kill only the grace period remains.
        let drain_until = match status {
            Some(_) => deadline.max(Instant::now() + DRAIN_GRACE),
            None => Instant::now() + DRAIN_GRACE,
        };
        let output = join_drain(drain, stop_drain, drain_until).await;
        classify(status, output, self.config.timeout)
    }
}

struct PipeWriters {
    stdout: Stdio,
    stderr: Stdio,
}

/// One pipe for both stdout and stderr, so the two form a single ordered stream.
fn merged_pipe() -> Result<(pipe::Receiver, PipeWriters), ExecutionError> {
    let (reader, writer) = std::io::pipe().map_err(ExecutionError::io("create output pipe"))?;
    let stderr = writer
        .try_clone()
        .map_err(ExecutionError::io("duplicate output pipe"))?;
    let reader = pipe::Receiver::from_owned_fd(OwnedFd::from(reader))
        .map_err(ExecutionError::io("register output pipe"))?;

    Ok((
        reader,
        PipeWriters {
            stdout: writer.into(),
            stderr: stderr.into(),
        },
    ))
}

async fn drain_output(mut reader: pipe::Receiver, stop: CancellationToken) -> Vec<u8> {
    let mut output = Vec::new();
    loop {
        tokio::select! {
            read = reader.read_buf(&mut output) => match read {
                Ok(0) => break,
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!("Failed to read interpreter output: {}", e);
                    break;
                }
            },
            _ = stop.cancelled() => {
                tracing::warn!("Output still open after interpreter exit, dropping the rest");
                break;
            }
        }
    }
    output
}

/// Barrier between process exit and classification.
///
/// Normally the drain hits EOF as soon as the interpreter is gone. A leftover
/// descendant can keep the pipe open, so the wait ends at `until`.
async fn join_drain(
    mut drain: JoinHandle<Vec<u8>>,
    stop: CancellationToken,
    until: Instant,
) -> String {
    let joined = match timeout_at(until, &mut drain).await {
        Ok(joined) => joined,
        Err(_) => {
            stop.cancel();
            drain.await
        }
    };

    match joined {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(e) => {
            tracing::error!("Output drain task failed: {}", e);
            String::new()
        }
    }
}

fn classify(
    status: Option<std::io::Result<ExitStatus>>,
    output: String,
    limit: Duration,
) -> ExecutionResult {
    match status {
        None => ExecutionResult::failure(output, ExecutionError::Timeout { timeout: limit }),
        Some(Err(e)) => ExecutionResult::failure(
            output,
            ExecutionError::ProcessFailure(format!("failed to wait for process: {}", e)),
        ),
        Some(Ok(status)) if status.success() => ExecutionResult::success(output),
        Some(Ok(status)) => {
            ExecutionResult::failure(output, ExecutionError::ProcessFailure(status.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SH: &str = "/bin/sh";
    const CAT: &str = "/bin/cat";

    fn runner(executable: &str, timeout: Duration) -> BasicRunner {
        BasicRunner::new(Arc::new(RunnerConfig::new(executable, timeout)))
    }

    fn dir_runner(executable: &str, timeout: Duration) -> BasicRunner {
        BasicRunner::new(Arc::new(
            RunnerConfig::new(executable, timeout).with_mode(WorkspaceMode::Directory),
        ))
    }

    #[tokio::test]
    async fn test_cat_echoes_code_verbatim() {
        let runner = runner(CAT, Duration::from_secs(5));

        let result = runner.execute("2+2").await;

        assert!(result.is_success(), "{:?}", result.error);
        assert_eq!(result.output, "2+2");
    }

    #[tokio::test]
    async fn test_identical_code_gives_identical_results() {
        let runner = runner(SH, Duration::from_secs(5));
        let code = "echo 4\necho done >&2";

        let first = runner.execute(code).await;
        let second = runner.execute(code).await;

        assert_eq!(first.output, second.output);
        assert_eq!(first.output, "4\ndone\n");
        assert!(first.is_success() && second.is_success());
    }

    #[tokio::test]
    async fn test_stdout_and_stderr_are_merged_in_order() {
        let runner = runner(SH, Duration::from_secs(5));

        let result = runner
            .execute("echo one\necho two >&2\necho three\necho four >&2")
            .await;

        assert!(result.is_success());
        assert_eq!(result.output, "one\ntwo\nthree\nfour\n");
    }

    #[tokio::test]
    async fn test_nonzero_exit_keeps_output() {
        let runner = runner(SH, Duration::from_secs(5));

        let result = runner.execute("echo oops >&2\nexit 3").await;

        assert_eq!(result.output, "oops\n");
        match result.error {
            Some(ExecutionError::ProcessFailure(msg)) => assert!(msg.contains('3'), "{}", msg),
            other => panic!("Expected ProcessFailure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_missing_interpreter_is_spawn_failure() {
        let runner = runner("/nonexistent/interpreter", Duration::from_secs(5));

        let result = runner.execute("2+2").await;

        assert!(result.output.is_empty());
        assert!(matches!(result.error, Some(ExecutionError::SpawnFailure(_))));
    }

    #[tokio::test]
    async fn test_unwritable_workspace_is_io_failure() {
        let marker = tempfile::tempdir().unwrap();
        let runner = BasicRunner::new(Arc::new(
            RunnerConfig::new(SH, Duration::from_secs(5))
                .with_workspace_root("/nonexistent/coderunner-root"),
        ));

        let result = runner
            .execute(&format!("touch {}/spawned", marker.path().display()))
            .await;

        assert!(matches!(result.error, Some(ExecutionError::IoFailure { .. })));
        assert!(result.output.is_empty());
        assert!(!marker.path().join("spawned").exists());
    }

    #[tokio::test]
    async fn test_timeout_kills_and_keeps_flushed_output() {
        let limit = Duration::from_millis(200);
        let runner = runner(SH, limit);

        let started = Instant::now();
        let result = runner.execute("echo partial\nexec sleep 10").await;
        let elapsed = started.elapsed();

        assert!(matches!(
            result.error,
            Some(ExecutionError::Timeout { timeout }) if timeout == limit
        ));
        assert_eq!(result.output, "partial\n");
        assert!(elapsed >= limit, "elapsed {:?}", elapsed);
        assert!(elapsed < limit + Duration::from_millis(800), "elapsed {:?}", elapsed);
    }

    #[tokio::test]
    async fn test_grandchild_holding_output_does_not_wedge_runner() {
        let limit = Duration::from_millis(200);
        let runner = runner(SH, limit);

        let started = Instant::now();
        // `sleep` is a child of the shell and inherits the output pipe.
        let result = runner.execute("echo before\nsleep 10").await;
        let elapsed = started.elapsed();

        assert!(matches!(result.error, Some(ExecutionError::Timeout { .. })));
        assert_eq!(result.output, "before\n");
        assert!(
            elapsed < limit + DRAIN_GRACE + Duration::from_millis(800),
            "elapsed {:?}",
            elapsed
        );
    }

    #[tokio::test]
    async fn test_background_writer_within_timeout_is_captured() {
        let runner = runner(SH, Duration::from_secs(10));

        let result = runner
            .execute("echo first\n(sleep 1.5; echo late) &\n")
            .await;

        assert!(result.is_success(), "{:?}", result.error);
        assert_eq!(result.output, "first\nlate\n");
    }

    #[tokio::test]
    async fn test_background_writer_is_cut_off_at_deadline() {
        let limit = Duration::from_millis(1500);
        let runner = runner(SH, limit);

        let started = Instant::now();
        let result = runner.execute("echo first\n(sleep 10; echo never) &\n").await;
        let elapsed = started.elapsed();

        assert!(result.is_success(), "{:?}", result.error);
        assert_eq!(result.output, "first\n");
        assert!(elapsed >= limit, "elapsed {:?}", elapsed);
        assert!(
            elapsed < limit + DRAIN_GRACE + Duration::from_millis(800),
            "elapsed {:?}",
            elapsed
        );
    }

    #[tokio::test]
    async fn test_temp_file_is_removed_after_success_and_failure() {
        let runner = runner(SH, Duration::from_secs(5));

        for code in ["echo \"$0\"", "echo \"$0\"\nexit 1"] {
            let result = runner.execute(code).await;
            let script = result.output.trim().to_string();

            assert!(script.ends_with(".pf"), "{}", script);
            assert!(!Path::new(&script).exists(), "{} still exists", script);
        }
    }

    #[tokio::test]
    async fn test_temp_file_is_removed_after_timeout() {
        let runner = runner(SH, Duration::from_millis(200));

        let result = runner.execute("echo \"$0\"\nexec sleep 10").await;

        assert!(matches!(result.error, Some(ExecutionError::Timeout { .. })));
        assert!(!Path::new(result.output.trim()).exists());
    }

    #[tokio::test]
    async fn test_temp_file_is_removed_after_spawn_failure() {
        let root = tempfile::tempdir().unwrap();
        let runner = BasicRunner::new(Arc::new(
            RunnerConfig::new("/nonexistent/interpreter", Duration::from_secs(5))
                .with_workspace_root(root.path()),
        ));

        let result = runner.execute("2+2").await;

        assert!(matches!(result.error, Some(ExecutionError::SpawnFailure(_))));
        assert_eq!(std::fs::read_dir(root.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_temp_dir_is_working_dir_and_is_removed() {
        let runner = dir_runner(SH, Duration::from_secs(5));

        let result = runner
            .execute("echo \"$0\"\npwd\necho scratch > aux.tmp")
            .await;

        assert!(result.is_success(), "{:?}", result);
        let lines: Vec<_> = result.output.lines().collect();
        assert_eq!(lines.len(), 2);
        let (script, cwd) = (Path::new(lines[0]), Path::new(lines[1]));
        assert_eq!(script.file_name().unwrap(), "code.pf");
        assert!(!script.exists());
        assert!(!cwd.exists());
    }

    #[tokio::test]
    async fn test_temp_dir_variant_times_out_the_same_way() {
        let runner = dir_runner(SH, Duration::from_millis(200));

        let result = runner.execute("pwd\nexec sleep 10").await;

        assert!(matches!(result.error, Some(ExecutionError::Timeout { .. })));
        assert!(!Path::new(result.output.trim()).exists());
    }

    #[tokio::test]
    async fn test_large_output_is_fully_drained() {
        let runner = runner(SH, Duration::from_secs(10));

        let result = runner
            .execute("i=0\nwhile [ $i -lt 20000 ]; do echo line$i; i=$((i+1)); done")
            .await;

        assert!(result.is_success());
        assert_eq!(result.output.lines().count(), 20000);
        assert_eq!(result.output.lines().last(), Some("line19999"));
    }
}
