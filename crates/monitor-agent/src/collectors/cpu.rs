// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! CPU usage from `/proc/stat` and the current frequency of cpu0.
//!
//! Usage is computed from the difference between two reads of the aggregate `cpu` line, so the
//! collector keeps the previous idle and total jiffies. The first read compares against zero and
//! therefore reports the average since boot.

use async_trait::async_trait;
use serde::Serialize;
use std::fs;
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};
use tracing::debug;

use crate::collectors::{round_to, Collector};

const PROC_STAT_PATH: &str = "/proc/stat";
const CPU_FREQ_PATH: &str = "/sys/devices/system/cpu/cpu0/cpufreq/scaling_cur_freq"; // in kHz

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct CpuStats {
    pub percent: f64,
    /// MHz
    pub freq: u64,
}

#[derive(Debug, Default)]
struct CpuTimes {
    idle: u64,
    total: u64,
}

pub struct CpuCollector {
    stat_path: PathBuf,
    freq_path: PathBuf,
    last: Mutex<CpuTimes>,
}

impl Default for CpuCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl CpuCollector {
    pub fn new() -> Self {
        Self::with_paths(PROC_STAT_PATH, CPU_FREQ_PATH)
    }

    pub fn with_paths(stat_path: impl Into<PathBuf>, freq_path: impl Into<PathBuf>) -> Self {
        Self {
            stat_path: stat_path.into(),
            freq_path: freq_path.into(),
            last: Mutex::new(CpuTimes::default()),
        }
    }

    fn read_percent(&self) -> Option<f64> {
        let contents = fs::read_to_string(&self.stat_path)
            .map_err(|e| debug!("Could not read {}: {e}", self.stat_path.display()))
            .ok()?;
        let Some(current) = parse_cpu_line(&contents) else {
            debug!("No aggregate cpu line in {}", self.stat_path.display());
            return None;
        };

        let mut last = self.last.lock().unwrap_or_else(PoisonError::into_inner);
        let diff_idle = current.idle as f64 - last.idle as f64;
        let diff_total = current.total as f64 - last.total as f64;
        *last = current;

        let percent = if diff_total > 0.0 {
            100.0 * (1.0 - diff_idle / diff_total)
        } else {
            0.0
        };
        Some(round_to(percent, 1))
    }

    fn read_freq(&self) -> Option<u64> {
        fs::read_to_string(&self.freq_path)
            .ok()
            .and_then(|contents| contents.trim().parse::<u64>().ok())
            .map(|khz| khz / 1000)
    }
}

/// Parses the first line, `cpu  user nice system idle iowait irq softirq steal ...`.
/// Idle time is `idle + iowait`; total is the sum of every field.
fn parse_cpu_line(contents: &str) -> Option<CpuTimes> {
    let line = contents.lines().next()?;
    let mut fields = line.split_whitespace();
    if !fields.next()?.starts_with("cpu") {
        return None;
    }
    let values = fields
        .map(str::parse::<u64>)
        .collect::<Result<Vec<_>, _>>()
        .ok()?;
    if values.len() < 5 {
        return None;
    }
    Some(CpuTimes {
        idle: values[3] + values[4],
        total: values.iter().sum(),
    })
}

#[async_trait]
impl Collector for CpuCollector {
    type Output = CpuStats;

    fn name(&self) -> &'static str {
        "cpu"
    }

    async fn collect(&self) -> CpuStats {
        CpuStats {
            percent: self.read_percent().unwrap_or_default(),
            freq: self.read_freq().unwrap_or_default(),
        }
    }
}
