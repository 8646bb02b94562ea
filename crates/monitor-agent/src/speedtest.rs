// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use async_trait::async_trait;
use serde::Deserialize;
use std::path::PathBuf;
use tokio::time::Duration;
use tracing::debug;

use crate::collectors::round_to;
use crate::command::run_command;
use crate::error::ProbeError;
use crate::probe::{BandwidthProbe, BandwidthSample};

const SPEEDTEST_ARGS: [&str; 3] = ["--accept-license", "--accept-gdpr", "--format=json"];

/// Runs the Ookla `speedtest` CLI in JSON mode.
#[derive(Debug, Clone)]
pub struct SpeedtestCli {
    path: PathBuf,
}

impl SpeedtestCli {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl BandwidthProbe for SpeedtestCli {
    async fn run(&self, timeout: Duration) -> Result<BandwidthSample, ProbeError> {
        if !self.path.exists() {
            return Err(ProbeError::NotFound(self.path.clone()));
        }
        debug!("Running {} with a {timeout:?} limit", self.path.display());
        let stdout = run_command(&self.path, &SPEEDTEST_ARGS, timeout).await?;
        parse_report(&stdout)
    }
}

#[derive(Debug, Default, Deserialize)]
struct Report {
    #[serde(default)]
    ping: Ping,
    #[serde(default)]
    download: Transfer,
    #[serde(default)]
    upload: Transfer,
}

#[derive(Debug, Default, Deserialize)]
struct Ping {
    #[serde(default)]
    latency: f64,
}

/// `bandwidth` is reported in bytes per second.
#[derive(Debug, Default, Deserialize)]
struct Transfer {
    #[serde(default)]
    bandwidth: f64,
}

fn bytes_per_sec_to_mbps(bandwidth: f64) -> f64 {
    round_to(bandwidth * 8.0 / 1_000_000.0, 2)
}

/// Converts the CLI's JSON report into a sample. Missing fields count as zero.
pub fn parse_report(stdout: &str) -> Result<BandwidthSample, ProbeError> {
    let report: Report = serde_json::from_str(stdout).map_err(ProbeError::InvalidJson)?;
    Ok(BandwidthSample {
        ping_ms: round_to(report.ping.latency, 1),
        download_mbps: bytes_per_sec_to_mbps(report.download.bandwidth),
        upload_mbps: bytes_per_sec_to_mbps(report.upload.bandwidth),
    })
}
