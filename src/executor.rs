use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use crate::error::EngineError;

/// Everything needed to spawn one process. Commands arrive here already
/// rendered from a registry template; nothing in this struct is built from
/// raw request input.
#[derive(Debug, Clone)]
pub struct ProcessSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: PathBuf,
    pub stdin: String,
    pub timeout: Duration,
}

#[derive(Debug)]
pub struct ProcessOutput {
    pub stdout: String,
    pub stderr: String,
    /// `None` when the process was killed by a signal.
    pub exit_code: Option<i32>,
    pub duration: Duration,
    /// Set when stdout or stderr exceeded the capture cap.
    pub truncated: bool,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

#[derive(Debug)]
pub enum ExecOutcome {
    Completed(ProcessOutput),
    /// Wall-clock budget exceeded; the process group was SIGKILLed.
    TimedOut { duration: Duration },
    /// The caller's cancellation token fired; the process group was killed.
    Cancelled,
}

/// Spawns exactly one OS process per call. Never reuses processes across
/// test cases; the hard wall-clock timeout and the kill-the-whole-group
/// cleanup path are the isolation boundary this engine guarantees.
#[derive(Debug, Clone)]
pub struct ProcessExecutor {
    output_cap: usize,
}

impl ProcessExecutor {
    pub fn new(output_cap: usize) -> Self {
        Self { output_cap }
    }

    pub async fn run(
        &self,
        mut spec: ProcessSpec,
        token: &CancellationToken,
    ) -> Result<ExecOutcome, EngineError> {
        let start = Instant::now();

        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args)
            .current_dir(&spec.cwd)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        // Own process group, so killing the child also kills anything it
        // forked (e.g. `go run` or shell wrappers).
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = cmd.spawn().map_err(|e| {
            EngineError::Infrastructure(format!("failed to spawn `{}`: {e}", spec.program))
        })?;
        let pid = child.id();

        let stdout_pipe = child
            .stdout
            .take()
            .ok_or_else(|| EngineError::Infrastructure("child stdout not captured".into()))?;
        let stderr_pipe = child
            .stderr
            .take()
            .ok_or_else(|| EngineError::Infrastructure("child stderr not captured".into()))?;

        let cap = self.output_cap;
        let stdout_task = tokio::spawn(capture_stream(stdout_pipe, cap));
        let stderr_task = tokio::spawn(capture_stream(stderr_pipe, cap));

        // Feed stdin from its own task and close it so the child sees EOF.
        // A child that never reads stdin leaves the pipe full; the write must
        // not sit between us and the timeout race below. Write failures are
        // expected when the child exits without reading (e.g. crashes).
        if let Some(mut stdin) = child.stdin.take() {
            let input = std::mem::take(&mut spec.stdin);
            let program = spec.program.clone();
            tokio::spawn(async move {
                if !input.is_empty() {
                    if let Err(e) = stdin.write_all(input.as_bytes()).await {
                        log::debug!("stdin write to `{program}` failed: {e}");
                    }
                }
            });
        }

        let status = tokio::select! {
            status = child.wait() => Some(status),
            _ = tokio::time::sleep(spec.timeout) => None,
            _ = token.cancelled() => {
                kill_process_group(pid);
                let _ = child.kill().await;
                return Ok(ExecOutcome::Cancelled);
            }
        };

        let Some(status) = status else {
            kill_process_group(pid);
            let _ = child.kill().await;
            return Ok(ExecOutcome::TimedOut {
                duration: start.elapsed(),
            });
        };

        let status = status
            .map_err(|e| EngineError::infrastructure("waiting for child process", e))?;

        let (stdout, stdout_truncated) = stdout_task
            .await
            .map_err(|e| EngineError::infrastructure("stdout reader task", e))?
            .map_err(|e| EngineError::infrastructure("reading child stdout", e))?;
        let (stderr, stderr_truncated) = stderr_task
            .await
            .map_err(|e| EngineError::infrastructure("stderr reader task", e))?
            .map_err(|e| EngineError::infrastructure("reading child stderr", e))?;

        Ok(ExecOutcome::Completed(ProcessOutput {
            stdout,
            stderr,
            exit_code: status.code(),
            duration: start.elapsed(),
            truncated: stdout_truncated || stderr_truncated,
        }))
    }
}

/// Reads a pipe to EOF, keeping at most `cap` bytes. The pipe is always
/// drained so a chatty child never blocks on a full buffer; everything past
/// the cap is discarded and flagged.
async fn capture_stream<R: AsyncRead + Unpin>(
    mut reader: R,
    cap: usize,
) -> std::io::Result<(String, bool)> {
    let mut buf: Vec<u8> = Vec::new();
    let mut chunk = [0u8; 8192];
    let mut truncated = false;

    loop {
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        if buf.len() < cap {
            let take = n.min(cap - buf.len());
            buf.extend_from_slice(&chunk[..take]);
            if take < n {
                truncated = true;
            }
        } else {
            truncated = true;
        }
    }

    Ok((String::from_utf8_lossy(&buf).into_owned(), truncated))
}

fn kill_process_group(pid: Option<u32>) {
    #[cfg(unix)]
    if let Some(pid) = pid {
        // Negative pid addresses the whole group created at spawn time.
        unsafe {
            libc::kill(-(pid as i32), libc::SIGKILL);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sh(script: &str, timeout_ms: u64) -> ProcessSpec {
        ProcessSpec {
            program: "/bin/sh".to_string(),
            args: vec!["-c".to_string(), script.to_string()],
            cwd: std::env::temp_dir(),
            stdin: String::new(),
            timeout: Duration::from_millis(timeout_ms),
        }
    }

    #[tokio::test]
    async fn captures_stdout_and_stderr_independently() {
        let executor = ProcessExecutor::new(64 * 1024);
        let outcome = executor
            .run(sh("echo out; echo err >&2", 5000), &CancellationToken::new())
            .await
            .unwrap();

        let ExecOutcome::Completed(output) = outcome else {
            panic!("expected completion");
        };
        assert_eq!(output.stdout, "out\n");
        assert_eq!(output.stderr, "err\n");
        assert!(output.success());
        assert!(!output.truncated);
    }

    #[tokio::test]
    async fn reports_nonzero_exit_codes() {
        let executor = ProcessExecutor::new(64 * 1024);
        let outcome = executor
            .run(sh("exit 3", 5000), &CancellationToken::new())
            .await
            .unwrap();

        let ExecOutcome::Completed(output) = outcome else {
            panic!("expected completion");
        };
        assert_eq!(output.exit_code, Some(3));
        assert!(!output.success());
    }

    #[tokio::test]
    async fn feeds_stdin_to_the_child() {
        let executor = ProcessExecutor::new(64 * 1024);
        let mut spec = sh("cat", 5000);
        spec.stdin = "hello".to_string();
        let outcome = executor.run(spec, &CancellationToken::new()).await.unwrap();

        let ExecOutcome::Completed(output) = outcome else {
            panic!("expected completion");
        };
        assert_eq!(output.stdout, "hello");
    }

    #[tokio::test]
    async fn enforces_wall_clock_timeout() {
        let executor = ProcessExecutor::new(64 * 1024);
        let started = Instant::now();
        let outcome = executor
            .run(sh("sleep 30", 300), &CancellationToken::new())
            .await
            .unwrap();

        assert!(matches!(outcome, ExecOutcome::TimedOut { .. }));
        // Must resolve near the budget, not near the child's sleep.
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn timeout_fires_even_when_stdin_is_never_read() {
        // Input far larger than an OS pipe buffer, fed to a child that never
        // reads it. The full pipe must not stall the timeout race.
        let executor = ProcessExecutor::new(64 * 1024);
        let mut spec = sh("sleep 30", 300);
        spec.stdin = "x".repeat(1024 * 1024);

        let started = Instant::now();
        let outcome = executor.run(spec, &CancellationToken::new()).await.unwrap();
        assert!(matches!(outcome, ExecOutcome::TimedOut { .. }));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn missing_binary_is_an_infrastructure_failure() {
        let executor = ProcessExecutor::new(64 * 1024);
        let spec = ProcessSpec {
            program: "/nonexistent/compiler-binary".to_string(),
            args: vec![],
            cwd: std::env::temp_dir(),
            stdin: String::new(),
            timeout: Duration::from_secs(1),
        };
        let err = executor
            .run(spec, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Infrastructure(_)));
    }

    #[tokio::test]
    async fn output_beyond_cap_is_truncated_not_fatal() {
        let executor = ProcessExecutor::new(1024);
        let outcome = executor
            .run(
                sh("i=0; while [ $i -lt 2000 ]; do echo 0123456789; i=$((i+1)); done", 10000),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        let ExecOutcome::Completed(output) = outcome else {
            panic!("expected completion");
        };
        assert!(output.truncated);
        assert!(output.stdout.len() <= 1024);
        assert!(output.success());
    }

    #[tokio::test]
    async fn cancellation_kills_the_child() {
        let executor = ProcessExecutor::new(64 * 1024);
        let token = CancellationToken::new();
        let cancel = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            cancel.cancel();
        });

        let started = Instant::now();
        let outcome = executor.run(sh("sleep 30", 60_000), &token).await.unwrap();
        assert!(matches!(outcome, ExecOutcome::Cancelled));
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
