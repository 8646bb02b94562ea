// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;

use crate::collectors::{round_to, Collector};
use crate::command::{run_command, COMMAND_TIMEOUT};
use crate::error::CollectError;

/// Number of `ps` lines considered before the limit is applied. Includes the header.
const PS_LINES: usize = 20;
const MAX_NAME_CHARS: usize = 50;
pub const DEFAULT_PROCESS_LIMIT: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessInfo {
    pub pid: u32,
    pub name: String,
    /// Share of the whole machine, so 100 means every core is busy.
    pub cpu: f64,
    pub mem: f64,
}

/// Top processes by CPU usage, as reported by `ps aux --sort=-%cpu`.
pub struct ProcessCollector {
    limit: usize,
    cores: usize,
}

impl Default for ProcessCollector {
    fn default() -> Self {
        Self::new(DEFAULT_PROCESS_LIMIT)
    }
}

impl ProcessCollector {
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            cores: num_cpus::get().max(1),
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub async fn try_collect(&self, limit: usize) -> Result<Vec<ProcessInfo>, CollectError> {
        let stdout = run_command("ps", &["aux", "--sort=-%cpu"], COMMAND_TIMEOUT).await?;
        Ok(parse_ps(&stdout, self.cores, limit))
    }
}

/// Splits a `ps aux` line into its ten leading columns and the command, which may contain
/// spaces.
fn split_ps_line(line: &str) -> Option<([&str; 10], &str)> {
    let mut columns = [""; 10];
    let mut rest = line.trim_start();
    for column in columns.iter_mut() {
        let end = rest.find(char::is_whitespace)?;
        *column = &rest[..end];
        rest = rest[end..].trim_start();
    }
    let command = rest.trim_end();
    if command.is_empty() {
        return None;
    }
    Some((columns, command))
}

fn parse_ps_line(line: &str, cores: usize) -> Option<ProcessInfo> {
    let (columns, command) = split_ps_line(line)?;
    let pid = columns[1].parse::<u32>().ok()?;
    let raw_cpu = columns[2].parse::<f64>().ok()?;
    let mem = columns[3].parse::<f64>().ok()?;

    Some(ProcessInfo {
        pid,
        name: command.chars().take(MAX_NAME_CHARS).collect(),
        cpu: round_to(raw_cpu / cores as f64, 1).min(100.0),
        mem: round_to(mem, 1),
    })
}

/// Lines that don't parse, the header included, are skipped.
fn parse_ps(stdout: &str, cores: usize, limit: usize) -> Vec<ProcessInfo> {
    stdout
        .lines()
        .take(PS_LINES)
        .filter_map(|line| parse_ps_line(line, cores))
        .take(limit)
        .collect()
}

#[async_trait]
impl Collector for ProcessCollector {
    type Output = Vec<ProcessInfo>;

    fn name(&self) -> &'static str {
        "processes"
    }

    async fn collect(&self) -> Vec<ProcessInfo> {
        self.try_collect(self.limit).await.unwrap_or_else(|e| {
            debug!("Could not list processes: {e}");
            Vec::new()
        })
    }
}
