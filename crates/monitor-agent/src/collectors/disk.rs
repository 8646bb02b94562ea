// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Root filesystem usage from `df /` and block device throughput from `/proc/diskstats`.

use async_trait::async_trait;
use serde::Serialize;
use std::fs;
use std::path::PathBuf;
use tracing::debug;

use crate::collectors::{round_to, Collector, BYTES_PER_MIB, KIB_PER_GIB};
use crate::command::{run_command, COMMAND_TIMEOUT};
use crate::error::CollectError;
use crate::rate::RateTracker;

const PROC_DISKSTATS_PATH: &str = "/proc/diskstats";
const SECTOR_SIZE: u64 = 512;
/// SD card, SATA/SCSI, virtio and NVMe root devices.
const TRACKED_DEVICES: [&str; 4] = ["mmcblk0", "sda", "vda", "nvme0n1"];

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DiskStats {
    pub percent: f64,
    pub used_gb: f64,
    pub total_gb: f64,
    pub read_mb_s: f64,
    pub write_mb_s: f64,
}

impl Default for DiskStats {
    fn default() -> Self {
        Self {
            percent: 0.0,
            used_gb: 0.0,
            total_gb: 100.0,
            read_mb_s: 0.0,
            write_mb_s: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct DiskUsage {
    percent: f64,
    used_gb: f64,
    total_gb: f64,
}

pub struct DiskCollector {
    diskstats_path: PathBuf,
    read_rate: RateTracker,
    write_rate: RateTracker,
}

impl Default for DiskCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl DiskCollector {
    pub fn new() -> Self {
        Self::with_diskstats_path(PROC_DISKSTATS_PATH)
    }

    pub fn with_diskstats_path(path: impl Into<PathBuf>) -> Self {
        Self {
            diskstats_path: path.into(),
            read_rate: RateTracker::new(),
            write_rate: RateTracker::new(),
        }
    }

    async fn read_usage(&self) -> Result<DiskUsage, CollectError> {
        let stdout = run_command("df", &["/"], COMMAND_TIMEOUT).await?;
        parse_df(&stdout)
    }

    /// Returns (read, write) in MiB/s.
    fn read_throughput(&self) -> Option<(f64, f64)> {
        let contents = fs::read_to_string(&self.diskstats_path)
            .map_err(|e| debug!("Could not read {}: {e}", self.diskstats_path.display()))
            .ok()?;
        let (read_bytes, write_bytes) = sum_device_bytes(&contents);
        let read = self.read_rate.sample(read_bytes as f64);
        let write = self.write_rate.sample(write_bytes as f64);
        Some((
            round_to(read / BYTES_PER_MIB, 2),
            round_to(write / BYTES_PER_MIB, 2),
        ))
    }
}

/// Parses the data line of `df /`: `Filesystem 1K-blocks Used Available Use% Mounted on`.
fn parse_df(stdout: &str) -> Result<DiskUsage, CollectError> {
    let line = stdout
        .lines()
        .nth(1)
        .ok_or_else(|| CollectError::Parse("df printed no data line".to_string()))?;
    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() < 5 {
        return Err(CollectError::Parse(format!("unexpected df line: {line}")));
    }
    let parse_kb = |field: &str| {
        field
            .parse::<u64>()
            .map_err(|_| CollectError::Parse(format!("unexpected df size: {field}")))
    };
    let total_kb = parse_kb(fields[1])?;
    let used_kb = parse_kb(fields[2])?;
    let percent = fields[4]
        .trim_end_matches('%')
        .parse::<f64>()
        .map_err(|_| CollectError::Parse(format!("unexpected df percentage: {}", fields[4])))?;

    Ok(DiskUsage {
        percent: round_to(percent, 1),
        used_gb: round_to(used_kb as f64 / KIB_PER_GIB, 2),
        total_gb: round_to(total_kb as f64 / KIB_PER_GIB, 2),
    })
}

/// Sums bytes read and written across the tracked devices. Fields 5 and 9 (zero based) are
/// sectors read and sectors written.
fn sum_device_bytes(contents: &str) -> (u64, u64) {
    contents
        .lines()
        .filter_map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() < 10 || !TRACKED_DEVICES.contains(&fields[2]) {
                return None;
            }
            let read = fields[5].parse::<u64>().ok()?;
            let written = fields[9].parse::<u64>().ok()?;
            Some((read * SECTOR_SIZE, written * SECTOR_SIZE))
        })
        .fold((0, 0), |(read, written), (r, w)| (read + r, written + w))
}

#[async_trait]
impl Collector for DiskCollector {
    type Output = DiskStats;

    fn name(&self) -> &'static str {
        "disk"
    }

    async fn collect(&self) -> DiskStats {
        let mut stats = DiskStats::default();

        match self.read_usage().await {
            Ok(usage) => {
                stats.percent = usage.percent;
                stats.used_gb = usage.used_gb;
                stats.total_gb = usage.total_gb;
            }
            Err(e) => debug!("Could not read disk usage: {e}"),
        }

        if let Some((read_mb_s, write_mb_s)) = self.read_throughput() {
            stats.read_mb_s = read_mb_s;
            stats.write_mb_s = write_mb_s;
        }

        stats
    }
}
