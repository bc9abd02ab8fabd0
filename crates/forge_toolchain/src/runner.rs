//! Child-process execution with timeout, cancellation and output capture.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::ToolchainError;
use crate::request::CommandSpec;

/// Number of stderr lines kept for failure reports.
pub const STDERR_TAIL_LINES: usize = 20;

/// Lines kept in memory per stream; the log files hold everything.
const MAX_CAPTURED_LINES: usize = 10_000;

/// How long to wait for output pipes to close after the child is gone.
const DRAIN_GRACE: Duration = Duration::from_secs(2);

/// Execution settings for one child process.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Kill the child after this long.
    pub timeout: Duration,
    /// File that receives every stdout line.
    pub stdout_log: Option<PathBuf>,
    /// File that receives every stderr line.
    pub stderr_log: Option<PathBuf>,
    /// Kills the child when cancelled.
    pub cancel: CancellationToken,
    /// Name attached to streamed log lines.
    pub label: String,
}

impl RunOptions {
    /// Options with the given timeout, no log files and a fresh token.
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            stdout_log: None,
            stderr_log: None,
            cancel: CancellationToken::new(),
            label: String::new(),
        }
    }
}

/// Captured result of a child process that ran to completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutput {
    /// Exit code, or `None` if the process was terminated by a signal.
    pub exit_code: Option<i32>,
    /// Whether the process exited with status 0.
    pub success: bool,
    /// Captured stdout lines.
    pub stdout: Vec<String>,
    /// Captured stderr lines.
    pub stderr: Vec<String>,
    /// Wall-clock run time.
    pub duration: Duration,
}

impl ProcessOutput {
    /// Returns the last [`STDERR_TAIL_LINES`] lines of stderr.
    pub fn stderr_tail(&self) -> Vec<String> {
        tail(&self.stderr)
    }
}

fn tail(lines: &[String]) -> Vec<String> {
    lines[lines.len().saturating_sub(STDERR_TAIL_LINES)..].to_vec()
}

type Captured = Arc<Mutex<VecDeque<String>>>;

enum Ending {
    Exited(std::io::Result<ExitStatus>),
    TimedOut,
    Cancelled,
}

/// Runs toolchain commands.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

impl ProcessRunner {
    /// Runs `spec` to completion.
    ///
    /// A non-zero exit is returned as a normal [`ProcessOutput`]. Timeout and
    /// cancellation kill the child and return [`ToolchainError::Timeout`] or
    /// [`ToolchainError::Cancelled`].
    pub async fn run(
        spec: &CommandSpec,
        options: &RunOptions,
    ) -> Result<ProcessOutput, ToolchainError> {
        if options.cancel.is_cancelled() {
            return Err(ToolchainError::Cancelled);
        }

        let started = Instant::now();
        let mut command = Command::new(&spec.program);
        command
            .args(&spec.args)
            .current_dir(&spec.cwd)
            .envs(&spec.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        // The child leads its own group so a kill reaches the tools it starts.
        #[cfg(unix)]
        command.process_group(0);
        let mut child = command.spawn().map_err(|source| ToolchainError::Spawn {
            program: spec.program.clone(),
            source,
        })?;
        let pid = child.id();
        info!(target_name = %options.label, command = %spec, pid = ?pid, "spawned toolchain");

        let stdout = Captured::default();
        let stderr = Captured::default();
        let mut out_task = tokio::spawn(pump(
            child.stdout.take(),
            options.stdout_log.clone(),
            options.label.clone(),
            "stdout",
            stdout.clone(),
        ));
        let mut err_task = tokio::spawn(pump(
            child.stderr.take(),
            options.stderr_log.clone(),
            options.label.clone(),
            "stderr",
            stderr.clone(),
        ));

        let ending = tokio::select! {
            status = child.wait() => Ending::Exited(status),
            _ = tokio::time::sleep(options.timeout) => Ending::TimedOut,
            _ = options.cancel.cancelled() => Ending::Cancelled,
        };
        if !matches!(ending, Ending::Exited(_)) {
            if let Some(pid) = pid {
                kill_group(pid, &options.label).await;
            }
            if let Err(e) = child.kill().await {
                warn!(target_name = %options.label, error = %e, "failed to kill toolchain process");
            }
        }

        drain(&mut out_task).await;
        drain(&mut err_task).await;
        let stdout = take(&stdout);
        let stderr = take(&stderr);
        let duration = started.elapsed();

        match ending {
            Ending::Exited(Ok(status)) => {
                debug!(
                    target_name = %options.label,
                    code = ?status.code(),
                    elapsed_ms = duration.as_millis() as u64,
                    "toolchain exited"
                );
                Ok(ProcessOutput {
                    exit_code: status.code(),
                    success: status.success(),
                    stdout,
                    stderr,
                    duration,
                })
            }
            Ending::Exited(Err(source)) => Err(ToolchainError::Io {
                path: PathBuf::from(&spec.program),
                source,
            }),
            Ending::TimedOut => {
                warn!(target_name = %options.label, timeout_secs = options.timeout.as_secs(), "toolchain timed out");
                Err(ToolchainError::Timeout {
                    after: options.timeout,
                    stderr_tail: tail(&stderr),
                })
            }
            Ending::Cancelled => {
                info!(target_name = %options.label, "toolchain cancelled");
                Err(ToolchainError::Cancelled)
            }
        }
    }
}

/// Sends SIGKILL to every process in the group led by `pid`.
#[cfg(unix)]
async fn kill_group(pid: u32, label: &str) {
    let group = format!("-{pid}");
    let status = Command::new("kill")
        .args(["-KILL", "--", group.as_str()])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await;
    match status {
        Ok(status) if status.success() => debug!(target_name = %label, pgid = pid, "killed process group"),
        Ok(status) => debug!(target_name = %label, pgid = pid, code = ?status.code(), "process group already gone"),
        Err(e) => warn!(target_name = %label, error = %e, "failed to kill process group"),
    }
}

#[cfg(not(unix))]
async fn kill_group(_pid: u32, _label: &str) {}

/// Waits briefly for a reader task. A grandchild that inherited the pipe can
/// keep it open after the child is killed, so the task is aborted after
/// [`DRAIN_GRACE`].
async fn drain(task: &mut JoinHandle<()>) {
    if tokio::time::timeout(DRAIN_GRACE, &mut *task).await.is_err() {
        task.abort();
    }
}

fn take(captured: &Captured) -> Vec<String> {
    let mut lines = captured.lock().unwrap_or_else(PoisonError::into_inner);
    lines.drain(..).collect()
}

/// Reads lines from a child stream into `sink`, the log file and the
/// `tracing` debug log.
async fn pump<R: AsyncRead + Unpin>(
    reader: Option<R>,
    log: Option<PathBuf>,
    label: String,
    stream: &'static str,
    sink: Captured,
) {
    let Some(reader) = reader else {
        return;
    };

    let mut file = match &log {
        Some(path) => open_log(path).await,
        None => None,
    };

    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                if let Some(f) = file.as_mut() {
                    if let Err(e) = f.write_all(&buf).await {
                        warn!(target_name = %label, stream, error = %e, "log write failed");
                        file = None;
                    }
                }
                let line = String::from_utf8_lossy(&buf)
                    .trim_end_matches(['\n', '\r'])
                    .to_string();
                debug!(target_name = %label, stream, "{line}");

                let mut lines = sink.lock().unwrap_or_else(PoisonError::into_inner);
                if lines.len() == MAX_CAPTURED_LINES {
                    lines.pop_front();
                }
                lines.push_back(line);
            }
            Err(e) => {
                debug!(target_name = %label, stream, error = %e, "stream read failed");
                break;
            }
        }
    }

    if let Some(f) = file.as_mut() {
        if let Err(e) = f.flush().await {
            warn!(target_name = %label, stream, error = %e, "log flush failed");
        }
    }
}

async fn open_log(path: &std::path::Path) -> Option<tokio::fs::File> {
    if let Some(parent) = path.parent() {
        if let Err(e) = tokio::fs::create_dir_all(parent).await {
            warn!(path = %parent.display(), error = %e, "cannot create log directory");
            return None;
        }
    }
    match tokio::fs::File::create(path).await {
        Ok(f) => Some(f),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "cannot create log file");
            None
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str, cwd: &std::path::Path) -> CommandSpec {
        CommandSpec::new("sh", cwd).args(["-c", script])
    }

    #[tokio::test]
    async fn captures_output_and_exit_code() {
        let dir = tempfile::tempdir().unwrap();
        let spec = sh("echo out; echo err >&2; exit 3", dir.path());
        let output = ProcessRunner::run(&spec, &RunOptions::new(Duration::from_secs(10)))
            .await
            .unwrap();
        assert_eq!(output.exit_code, Some(3));
        assert!(!output.success);
        assert_eq!(output.stdout, vec!["out"]);
        assert_eq!(output.stderr, vec!["err"]);
    }

    #[tokio::test]
    async fn passes_env_and_cwd() {
        let dir = tempfile::tempdir().unwrap();
        let spec = sh("echo \"$FORGE_X\"; pwd", dir.path()).env("FORGE_X", "hello");
        let output = ProcessRunner::run(&spec, &RunOptions::new(Duration::from_secs(10)))
            .await
            .unwrap();
        assert!(output.success);
        assert_eq!(output.stdout[0], "hello");
        let cwd = std::fs::canonicalize(dir.path()).unwrap();
        assert_eq!(std::fs::canonicalize(&output.stdout[1]).unwrap(), cwd);
    }

    #[tokio::test]
    async fn writes_log_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut options = RunOptions::new(Duration::from_secs(10));
        options.stdout_log = Some(dir.path().join("logs/out.log"));
        options.stderr_log = Some(dir.path().join("logs/err.log"));
        let spec = sh("echo a; echo b; echo c >&2", dir.path());
        ProcessRunner::run(&spec, &options).await.unwrap();

        assert_eq!(std::fs::read_to_string(dir.path().join("logs/out.log")).unwrap(), "a\nb\n");
        assert_eq!(std::fs::read_to_string(dir.path().join("logs/err.log")).unwrap(), "c\n");
    }

    #[tokio::test]
    async fn stderr_tail_keeps_last_lines() {
        let dir = tempfile::tempdir().unwrap();
        let spec = sh("i=0; while [ $i -lt 30 ]; do echo line$i >&2; i=$((i+1)); done", dir.path());
        let output = ProcessRunner::run(&spec, &RunOptions::new(Duration::from_secs(10)))
            .await
            .unwrap();
        let tail = output.stderr_tail();
        assert_eq!(tail.len(), STDERR_TAIL_LINES);
        assert_eq!(tail[0], "line10");
        assert_eq!(tail[STDERR_TAIL_LINES - 1], "line29");
    }

    #[tokio::test]
    async fn timeout_kills_child() {
        let dir = tempfile::tempdir().unwrap();
        let spec = sh("echo started >&2; exec sleep 30", dir.path());
        let started = Instant::now();
        let err = ProcessRunner::run(&spec, &RunOptions::new(Duration::from_millis(300)))
            .await
            .unwrap_err();
        assert!(started.elapsed() < Duration::from_secs(10));
        match err {
            ToolchainError::Timeout { stderr_tail, .. } => assert_eq!(stderr_tail, vec!["started"]),
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn cancellation_kills_child() {
        let dir = tempfile::tempdir().unwrap();
        let spec = sh("exec sleep 30", dir.path());
        let options = RunOptions::new(Duration::from_secs(60));
        let cancel = options.cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            cancel.cancel();
        });

        let started = Instant::now();
        let err = ProcessRunner::run(&spec, &options).await.unwrap_err();
        assert!(matches!(err, ToolchainError::Cancelled));
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    /// Waits for `pid` to exit. A zombie counts as exited since nothing
    /// may be left to reap it.
    #[cfg(target_os = "linux")]
    async fn wait_gone(pid: &str) -> bool {
        for _ in 0..50 {
            match std::fs::read_to_string(format!("/proc/{pid}/stat")) {
                Err(_) => return true,
                Ok(stat) => {
                    let state = stat.rsplit(')').next().and_then(|rest| rest.split_whitespace().next());
                    if state == Some("Z") {
                        return true;
                    }
                }
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        false
    }

    #[cfg(target_os = "linux")]
    async fn read_pid(path: &std::path::Path) -> String {
        for _ in 0..50 {
            if let Ok(pid) = std::fs::read_to_string(path) {
                if !pid.trim().is_empty() {
                    return pid.trim().to_string();
                }
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        panic!("no pid written to {}", path.display());
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn cancellation_kills_grandchildren() {
        let dir = tempfile::tempdir().unwrap();
        let pid_file = dir.path().join("sleeper.pid");
        let script = format!("sleep 30 & echo $! > '{}'; wait", pid_file.display());
        let spec = sh(&script, dir.path());
        let options = RunOptions::new(Duration::from_secs(60));
        let cancel = options.cancel.clone();

        let run = tokio::spawn(async move { ProcessRunner::run(&spec, &options).await });
        let sleeper = read_pid(&pid_file).await;
        cancel.cancel();

        let started = Instant::now();
        assert!(matches!(run.await.unwrap(), Err(ToolchainError::Cancelled)));
        assert!(started.elapsed() < DRAIN_GRACE);
        assert!(wait_gone(&sleeper).await, "sleep {sleeper} survived cancellation");
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn timeout_kills_grandchildren() {
        let dir = tempfile::tempdir().unwrap();
        let pid_file = dir.path().join("sleeper.pid");
        let script = format!("sleep 30 & echo $! > '{}'; wait", pid_file.display());
        let spec = sh(&script, dir.path());

        let err = ProcessRunner::run(&spec, &RunOptions::new(Duration::from_millis(500)))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolchainError::Timeout { .. }));
        let sleeper = read_pid(&pid_file).await;
        assert!(wait_gone(&sleeper).await, "sleep {sleeper} survived the timeout");
    }

    #[tokio::test]
    async fn already_cancelled_spawns_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("ran");
        let spec = sh(&format!("touch {}", marker.display()), dir.path());
        let options = RunOptions::new(Duration::from_secs(10));
        options.cancel.cancel();
        assert!(matches!(
            ProcessRunner::run(&spec, &options).await,
            Err(ToolchainError::Cancelled)
        ));
        assert!(!marker.exists());
    }

    #[tokio::test]
    async fn spawn_failure_names_program() {
        let dir = tempfile::tempdir().unwrap();
        let spec = CommandSpec::new("forge-test-no-such-program", dir.path());
        let err = ProcessRunner::run(&spec, &RunOptions::new(Duration::from_secs(10)))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("forge-test-no-such-program"));
    }
}
