//! External command execution shared by shell actions and the Firebase CLI.

use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::process::Command;

/// Outcome of a finished command.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    /// Program name, for messages.
    pub program: String,

    /// Exit code (-1 when killed by a signal).
    pub exit_code: i32,

    /// Captured stdout.
    pub stdout: String,

    /// Captured stderr.
    pub stderr: String,

    /// Duration in milliseconds.
    pub duration_ms: u64,
}

impl CommandOutput {
    /// Whether the command exited with code 0.
    pub fn passed(&self) -> bool {
        self.exit_code == 0
    }

    /// Last non-empty stderr line (or stdout when stderr is empty), for
    /// error messages.
    pub fn failure_summary(&self) -> String {
        let source = if self.stderr.trim().is_empty() {
            &self.stdout
        } else {
            &self.stderr
        };
        let last = source.lines().rev().find(|l| !l.trim().is_empty()).unwrap_or("");
        format!("{} exited with code {}: {}", self.program, self.exit_code, last.trim())
    }
}

/// Run `argv` to completion, capturing output.
///
/// A `timeout_secs` of 0 waits indefinitely. Spawn failures and timeouts are
/// I/O errors; a non-zero exit is not an error here, callers inspect
/// [`CommandOutput::passed`].
pub async fn run_command(argv: &[String], timeout_secs: u64) -> std::io::Result<CommandOutput> {
    let start = Instant::now();

    let (exe, args) = argv.split_first().ok_or_else(|| {
        std::io::Error::new(std::io::ErrorKind::InvalidInput, "empty command")
    })?;

    let child = Command::new(exe)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()?;

    let output = if timeout_secs > 0 {
        tokio::time::timeout(Duration::from_secs(timeout_secs), child.wait_with_output())
            .await
            .map_err(|_| {
                std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    format!("{exe} timed out after {timeout_secs} seconds"),
                )
            })??
    } else {
        child.wait_with_output().await?
    };

    Ok(CommandOutput {
        program: exe.clone(),
        exit_code: output.status.code().unwrap_or(-1),
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        duration_ms: u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
    })
}
