// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::ffi::OsStr;
use std::process::Stdio;
use tokio::process::Command;
use tokio::time::{timeout, Duration};
use tracing::debug;

use crate::error::CommandError;

/// Bound applied to every command run on the request path.
pub const COMMAND_TIMEOUT: Duration = Duration::from_secs(2);

const MAX_STDERR_CHARS: usize = 200;

/// Runs `program` with `args` and returns its stdout.
///
/// The child is killed if it outlives `limit`. A non-zero exit is an error carrying the first
/// 200 characters of stderr.
pub async fn run_command<P>(program: P, args: &[&str], limit: Duration) -> Result<String, CommandError>
where
    P: AsRef<OsStr>,
{
    let program = program.as_ref();
    let name = program.to_string_lossy().into_owned();

    let output = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .output();

    let output = match timeout(limit, output).await {
        Ok(Ok(output)) => output,
        Ok(Err(source)) => {
            return Err(CommandError::Spawn {
                program: name,
                source,
            })
        }
        Err(_) => {
            debug!("{name} did not finish within {limit:?}, killing it");
            return Err(CommandError::Timeout {
                program: name,
                timeout: limit,
            });
        }
    };

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(CommandError::Exit {
            program: name,
            code: output.status.code(),
            stderr: stderr.trim().chars().take(MAX_STDERR_CHARS).collect(),
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_run_command_returns_stdout() {
        let stdout = run_command("sh", &["-c", "echo hello"], COMMAND_TIMEOUT)
            .await
            .unwrap();
        assert_eq!(stdout, "hello\n");
    }

    #[tokio::test]
    async fn test_run_command_missing_program() {
        let err = run_command("/nonexistent/monitor-probe", &[], COMMAND_TIMEOUT)
            .await
            .unwrap_err();
        assert!(matches!(err, CommandError::Spawn { .. }), "{err:?}");
    }

    #[tokio::test]
    async fn test_run_command_non_zero_exit_truncates_stderr() {
        let script = "printf '%0300d' 0 >&2; exit 3";
        let err = run_command("sh", &["-c", script], COMMAND_TIMEOUT)
            .await
            .unwrap_err();
        match err {
            CommandError::Exit { code, stderr, .. } => {
                assert_eq!(code, Some(3));
                assert_eq!(stderr.len(), 200);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_run_command_timeout() {
        let err = run_command("sleep", &["5"], Duration::from_millis(100))
            .await
            .unwrap_err();
        assert!(matches!(err, CommandError::Timeout { .. }), "{err:?}");
    }
}
