// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::path::PathBuf;
use std::time::Duration;

/// Errors raised while loading or validating configuration. These are the only fatal errors:
/// the server refuses to start when one is returned.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid port: {0}")]
    InvalidPort(i64),

    #[error("Speedtest interval must be at least {min} seconds, got {actual}")]
    IntervalTooShort { min: u64, actual: f64 },
}

/// A cache lookup that could not be served, neither fresh nor stale.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CacheError {
    #[error("{key} unavailable: {reason}")]
    Unavailable { key: String, reason: String },
}

/// Failures running an external command.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} timed out after {timeout:?}")]
    Timeout { program: String, timeout: Duration },

    #[error("{program} exited {}: {stderr}", display_exit_code(.code))]
    Exit {
        program: String,
        code: Option<i32>,
        stderr: String,
    },
}

fn display_exit_code(code: &Option<i32>) -> String {
    code.map_or_else(|| "by signal".to_string(), |code| code.to_string())
}

/// Failures of a single collector. Collectors never surface these to the snapshot; they are
/// logged and turned into default values or stale cache hits.
#[derive(Debug, thiserror::Error)]
pub enum CollectError {
    #[error(transparent)]
    Command(#[from] CommandError),

    #[error("malformed output: {0}")]
    Parse(String),

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Failures of the background bandwidth probe. Rendered into `last_error`.
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("{} not found", .0.display())]
    NotFound(PathBuf),

    #[error("Speedtest timed out")]
    Timeout,

    #[error("speedtest exited {}: {stderr}", display_exit_code(.code))]
    Exit { code: Option<i32>, stderr: String },

    #[error("Invalid speedtest JSON response")]
    InvalidJson(#[source] serde_json::Error),

    #[error("{0}")]
    Io(#[source] std::io::Error),

    #[error("Speedtest task aborted: {0}")]
    Aborted(String),
}

impl From<CommandError> for ProbeError {
    fn from(err: CommandError) -> Self {
        match err {
            CommandError::Spawn { source, .. } => ProbeError::Io(source),
            CommandError::Timeout { .. } => ProbeError::Timeout,
            CommandError::Exit { code, stderr, .. } => ProbeError::Exit { code, stderr },
        }
    }
}
