//! Shell subprocess execution with optional dry-run and output capture.
//!
//! [`run_command`] holds the spawn + I/O + timeout handling; the
//! `execute_*` helpers layer dry-run and success-code checking on top and
//! are what callers normally use.

use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;

/// Maximum stdout or stderr size captured per stream (10 MiB).
const MAX_OUTPUT_BYTES: usize = 10 * 1024 * 1024;

/// Captured result of a finished child process.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    /// Process exit code (`-1` if killed by signal).
    pub exit_code: i32,
    pub duration_ms: u64,
}

impl CommandOutput {
    /// Stdout followed by stderr, the way a terminal would have shown them
    /// with stderr redirected to stdout.
    pub fn combined(&self) -> String {
        let mut out = self.stdout.clone();
        out.push_str(&self.stderr);
        out
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("empty command")]
    Empty,

    #[error("command '{command}' failed with exit code {exit_code}")]
    Failed { command: String, exit_code: i32 },

    #[error("command '{command}' timed out after {elapsed_ms}ms")]
    Timeout { command: String, elapsed_ms: u64 },

    #[error("I/O error running '{command}': {source}")]
    Io {
        command: String,
        #[source]
        source: std::io::Error,
    },
}

/// Render an argument vector for logs and error messages.
pub fn display_command(args: &[&str]) -> String {
    args.join(" ")
}

/// Spawn `cmd`, capture stdout/stderr and enforce `timeout` if given.
///
/// `command` is only used to label errors.
pub async fn run_command(
    cmd: &mut Command,
    command: &str,
    timeout: Option<Duration>,
) -> Result<CommandOutput, CommandError> {
    // `kill_on_drop(true)` ensures the child is killed when dropped (e.g. on timeout).
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let io_err = |source| CommandError::Io {
        command: command.to_string(),
        source,
    };

    let start = Instant::now();
    let mut child = cmd.spawn().map_err(io_err)?;

    let stdout_handle = child.stdout.take();
    let stderr_handle = child.stderr.take();
    let stdout_task = tokio::spawn(async move { read_stream(stdout_handle).await });
    let stderr_task = tokio::spawn(async move { read_stream(stderr_handle).await });

    let status = match timeout {
        Some(limit) => match tokio::time::timeout(limit, child.wait()).await {
            Ok(result) => result.map_err(io_err)?,
            Err(_elapsed) => {
                return Err(CommandError::Timeout {
                    command: command.to_string(),
                    elapsed_ms: start.elapsed().as_millis() as u64,
                });
            }
        },
        None => child.wait().await.map_err(io_err)?,
    };

    let stdout_bytes = stdout_task.await.unwrap_or_default();
    let stderr_bytes = stderr_task.await.unwrap_or_default();

    Ok(CommandOutput {
        stdout: String::from_utf8_lossy(&stdout_bytes).into_owned(),
        stderr: String::from_utf8_lossy(&stderr_bytes).into_owned(),
        exit_code: status.code().unwrap_or(-1),
        duration_ms: start.elapsed().as_millis() as u64,
    })
}

/// Execute a single command. With `dry_run` the command is only logged.
///
/// Returns the exit code, which is always `success_code` on `Ok`.
pub async fn execute_command(
    args: &[&str],
    dry_run: bool,
    success_code: i32,
) -> Result<i32, CommandError> {
    let command = display_command(args);
    if dry_run {
        tracing::info!("DRY_RUN: {command}");
        return Ok(0);
    }

    let output = spawn_args(args, &command).await?;
    check_exit(&command, output.exit_code, success_code)?;
    Ok(output.exit_code)
}

/// Execute a single command and capture its combined output.
///
/// Each captured line is echoed at debug level. With `dry_run` the command
/// is only logged and `(0, "")` is returned.
pub async fn execute_command_with_capture(
    args: &[&str],
    dry_run: bool,
    success_code: i32,
) -> Result<(i32, String), CommandError> {
    let command = display_command(args);
    if dry_run {
        tracing::info!("DRY_RUN: {command}");
        return Ok((0, String::new()));
    }

    let output = spawn_args(args, &command).await?;
    let combined = output.combined();
    for line in combined.lines() {
        tracing::debug!(command = %command, "{line}");
    }
    check_exit(&command, output.exit_code, success_code)?;
    Ok((output.exit_code, combined))
}

async fn spawn_args(args: &[&str], command: &str) -> Result<CommandOutput, CommandError> {
    let (program, rest) = args.split_first().ok_or(CommandError::Empty)?;
    let mut cmd = Command::new(program);
    cmd.args(rest);
    run_command(&mut cmd, command, None).await
}

fn check_exit(command: &str, exit_code: i32, success_code: i32) -> Result<(), CommandError> {
    if exit_code != success_code {
        return Err(CommandError::Failed {
            command: command.to_string(),
            exit_code,
        });
    }
    Ok(())
}

/// Read an entire output stream into a byte buffer, capped at [`MAX_OUTPUT_BYTES`].
async fn read_stream<R: AsyncRead + Unpin>(handle: Option<R>) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Some(mut h) = handle {
        let _ = (&mut h)
            .take(MAX_OUTPUT_BYTES as u64)
            .read_to_end(&mut buf)
            .await;
    }
    buf
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
