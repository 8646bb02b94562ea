// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use async_trait::async_trait;
use serde::Serialize;
use std::fs;
use std::path::PathBuf;
use tracing::debug;

use crate::collectors::{round_to, Collector, BYTES_PER_GIB, BYTES_PER_MIB};
use crate::rate::RateTracker;

const PROC_NET_DEV_PATH: &str = "/proc/net/dev";
const LOOPBACK: &str = "lo";

/// Throughput in MiB/s and lifetime totals in GiB, summed over every interface except loopback.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct NetworkStats {
    pub rx_mb_s: f64,
    pub tx_mb_s: f64,
    pub rx_total_gb: f64,
    pub tx_total_gb: f64,
}

pub struct NetworkCollector {
    path: PathBuf,
    rx_rate: RateTracker,
    tx_rate: RateTracker,
}

impl Default for NetworkCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl NetworkCollector {
    pub fn new() -> Self {
        Self::with_path(PROC_NET_DEV_PATH)
    }

    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            rx_rate: RateTracker::new(),
            tx_rate: RateTracker::new(),
        }
    }
}

/// `iface: rx_bytes rx_packets ... (8 rx fields) tx_bytes ...`. Header lines have no colon.
fn sum_interface_bytes(contents: &str) -> (u64, u64) {
    contents
        .lines()
        .filter_map(|line| {
            let (iface, counters) = line.split_once(':')?;
            if iface.trim() == LOOPBACK {
                return None;
            }
            let counters: Vec<&str> = counters.split_whitespace().collect();
            if counters.len() < 9 {
                return None;
            }
            let rx = counters[0].parse::<u64>().ok()?;
            let tx = counters[8].parse::<u64>().ok()?;
            Some((rx, tx))
        })
        .fold((0, 0), |(rx, tx), (r, t)| (rx + r, tx + t))
}

#[async_trait]
impl Collector for NetworkCollector {
    type Output = NetworkStats;

    fn name(&self) -> &'static str {
        "network"
    }

    async fn collect(&self) -> NetworkStats {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) => {
                debug!("Could not read {}: {e}", self.path.display());
                return NetworkStats::default();
            }
        };
        let (rx_bytes, tx_bytes) = sum_interface_bytes(&contents);
        let rx = self.rx_rate.sample(rx_bytes as f64);
        let tx = self.tx_rate.sample(tx_bytes as f64);

        NetworkStats {
            rx_mb_s: round_to(rx / BYTES_PER_MIB, 3),
            tx_mb_s: round_to(tx / BYTES_PER_MIB, 3),
            rx_total_gb: round_to(rx_bytes as f64 / BYTES_PER_GIB, 2),
            tx_total_gb: round_to(tx_bytes as f64 / BYTES_PER_GIB, 2),
        }
    }
}
