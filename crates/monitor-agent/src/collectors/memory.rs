// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use tracing::debug;

use crate::collectors::{round_to, Collector, KIB_PER_GIB};

const PROC_MEMINFO_PATH: &str = "/proc/meminfo";

/// RAM and swap usage. The swap totals are omitted when `/proc/meminfo` could not be read.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MemoryStats {
    pub percent: f64,
    pub used_gb: f64,
    pub total_gb: f64,
    pub swap_percent: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub swap_total_gb: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub swap_used_gb: Option<f64>,
}

impl Default for MemoryStats {
    fn default() -> Self {
        Self {
            percent: 0.0,
            used_gb: 0.0,
            total_gb: 1.0,
            swap_percent: 0.0,
            swap_total_gb: None,
            swap_used_gb: None,
        }
    }
}

pub struct MemoryCollector {
    path: PathBuf,
}

impl Default for MemoryCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryCollector {
    pub fn new() -> Self {
        Self::with_path(PROC_MEMINFO_PATH)
    }

    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

/// Parses `Key:   value kB` lines into kB values. Lines that don't match are skipped.
fn parse_meminfo(contents: &str) -> HashMap<&str, u64> {
    contents
        .lines()
        .filter_map(|line| {
            let (key, rest) = line.split_once(':')?;
            let value = rest.split_whitespace().next()?.parse::<u64>().ok()?;
            Some((key.trim(), value))
        })
        .collect()
}

fn percent_of(part: f64, whole: f64) -> f64 {
    if whole > 0.0 {
        part / whole * 100.0
    } else {
        0.0
    }
}

fn build_memory_stats(meminfo: &HashMap<&str, u64>) -> Option<MemoryStats> {
    let total_kb = match meminfo.get("MemTotal") {
        Some(&total) if total > 0 => total as f64,
        _ => return None,
    };
    let available_kb = meminfo
        .get("MemAvailable")
        .or_else(|| meminfo.get("MemFree"))
        .copied()
        .unwrap_or(0) as f64;
    let used_kb = total_kb - available_kb;

    let swap_total_kb = meminfo.get("SwapTotal").copied().unwrap_or(0) as f64;
    let swap_free_kb = meminfo.get("SwapFree").copied().unwrap_or(0) as f64;
    let swap_used_kb = swap_total_kb - swap_free_kb;

    Some(MemoryStats {
        percent: round_to(percent_of(used_kb, total_kb), 1),
        used_gb: round_to(used_kb / KIB_PER_GIB, 2),
        total_gb: round_to(total_kb / KIB_PER_GIB, 2),
        swap_percent: round_to(percent_of(swap_used_kb, swap_total_kb), 1),
        swap_total_gb: Some(round_to(swap_total_kb / KIB_PER_GIB, 2)),
        swap_used_gb: Some(round_to(swap_used_kb / KIB_PER_GIB, 2)),
    })
}

#[async_trait]
impl Collector for MemoryCollector {
    type Output = MemoryStats;

    fn name(&self) -> &'static str {
        "memory"
    }

    async fn collect(&self) -> MemoryStats {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) => {
                debug!("Could not read {}: {e}", self.path.display());
                return MemoryStats::default();
            }
        };
        build_memory_stats(&parse_meminfo(&contents)).unwrap_or_else(|| {
            debug!("No usable MemTotal in {}", self.path.display());
            MemoryStats::default()
        })
    }
}
