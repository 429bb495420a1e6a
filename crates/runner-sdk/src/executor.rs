//! Command execution — the runner-side counterpart of a dispatched
//! `spawn_worker` call.
//!
//! A runner's only job is to run whatever command a `JobRequest`
//! carries and report back what happened. [`CommandExecutor`] is the
//! seam a runner author overrides to run commands inside a container,
//! a sandboxed shell, or anything else; [`ShellExecutor`] is the
//! default, and is what `RunnerClient::run` uses unless overridden.

use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::process::Command;

use crate::types::ExecOutcome;

/// Implement this to control how a runner actually executes a
/// dispatched command. The gateway has already run the command string
/// through the worker validator (`spec.md` §4.7) before it reaches the
/// wire — a `CommandExecutor` is not a second line of defense, just the
/// place that runs the (already-approved) command and reports back.
#[async_trait::async_trait]
pub trait CommandExecutor: Send + Sync + 'static {
    async fn execute(&self, command: &str, timeout_secs: u32) -> ExecOutcome;
}

/// Runs `command` through `/bin/sh -c`, capturing stdout/stderr and
/// enforcing `timeout_secs` by killing the child process.
pub struct ShellExecutor;

#[async_trait::async_trait]
impl CommandExecutor for ShellExecutor {
    async fn execute(&self, command: &str, timeout_secs: u32) -> ExecOutcome {
        let started = Instant::now();
        let timeout = Duration::from_secs(timeout_secs.max(1) as u64);

        let spawn_result = Command::new("/bin/sh")
            .arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn();

        let mut child = match spawn_result {
            Ok(child) => child,
            Err(e) => {
                return ExecOutcome::Error {
                    message: format!("failed to spawn command: {e}"),
                    critical: true,
                }
            }
        };

        let wait_result = tokio::time::timeout(timeout, child.wait_with_output()).await;

        match wait_result {
            Ok(Ok(output)) => ExecOutcome::Finished {
                exit_code: output.status.code().unwrap_or(-1),
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                duration_ms: started.elapsed().as_millis() as u64,
            },
            Ok(Err(e)) => ExecOutcome::Error {
                message: format!("command wait failed: {e}"),
                critical: true,
            },
            Err(_) => ExecOutcome::Error {
                message: format!("command timed out after {timeout_secs}s"),
                critical: false,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn shell_executor_captures_stdout_and_exit_code() {
        let outcome = ShellExecutor.execute("echo hello", 5).await;
        match outcome {
            ExecOutcome::Finished { exit_code, stdout, .. } => {
                assert_eq!(exit_code, 0);
                assert_eq!(stdout.trim(), "hello");
            }
            other => panic!("expected Finished, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn shell_executor_reports_nonzero_exit() {
        let outcome = ShellExecutor.execute("exit 7", 5).await;
        match outcome {
            ExecOutcome::Finished { exit_code, .. } => assert_eq!(exit_code, 7),
            other => panic!("expected Finished, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn shell_executor_times_out_long_commands() {
        let outcome = ShellExecutor.execute("sleep 5", 1).await;
        match outcome {
            ExecOutcome::Error { critical, .. } => assert!(!critical),
            other => panic!("expected a non-critical timeout error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn shell_executor_captures_stderr() {
        let outcome = ShellExecutor.execute("echo oops 1>&2", 5).await;
        match outcome {
            ExecOutcome::Finished { stderr, .. } => assert_eq!(stderr.trim(), "oops"),
            other => panic!("expected Finished, got {other:?}"),
        }
    }
}
