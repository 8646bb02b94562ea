// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use async_trait::async_trait;
use serde::Serialize;
use std::fs;
use std::path::PathBuf;
use tracing::debug;

use crate::collectors::Collector;
use crate::command::{run_command, COMMAND_TIMEOUT};

const PROC_UPTIME_PATH: &str = "/proc/uptime";
const PROC_LOADAVG_PATH: &str = "/proc/loadavg";
const UNKNOWN_IP: &str = "-";

/// Host summary. Load averages are preformatted with two decimals.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Overview {
    pub os: String,
    pub uptime: String,
    pub load_1: String,
    pub load_5: String,
    pub load_15: String,
    pub ip: String,
    /// Container status is not collected; always `null`.
    pub docker: Option<serde_json::Value>,
}

impl Default for Overview {
    fn default() -> Self {
        Self {
            os: "Linux".to_string(),
            uptime: format_uptime(0.0),
            load_1: "0.00".to_string(),
            load_5: "0.00".to_string(),
            load_15: "0.00".to_string(),
            ip: UNKNOWN_IP.to_string(),
            docker: None,
        }
    }
}

pub struct OverviewCollector {
    uptime_path: PathBuf,
    loadavg_path: PathBuf,
}

impl Default for OverviewCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl OverviewCollector {
    pub fn new() -> Self {
        Self::with_paths(PROC_UPTIME_PATH, PROC_LOADAVG_PATH)
    }

    pub fn with_paths(uptime_path: impl Into<PathBuf>, loadavg_path: impl Into<PathBuf>) -> Self {
        Self {
            uptime_path: uptime_path.into(),
            loadavg_path: loadavg_path.into(),
        }
    }

    fn read_uptime_secs(&self) -> f64 {
        fs::read_to_string(&self.uptime_path)
            .ok()
            .and_then(|contents| contents.split_whitespace().next()?.parse::<f64>().ok())
            .unwrap_or_else(|| {
                debug!("Could not read uptime from {}", self.uptime_path.display());
                0.0
            })
    }

    fn read_load(&self) -> Option<[f64; 3]> {
        let contents = fs::read_to_string(&self.loadavg_path).ok()?;
        parse_loadavg(&contents)
    }
}

/// Formats seconds as `Xd Yh Zm`, truncating partial minutes.
fn format_uptime(seconds: f64) -> String {
    let total = seconds.max(0.0) as u64;
    let days = total / 86_400;
    let hours = (total % 86_400) / 3_600;
    let minutes = (total % 3_600) / 60;
    format!("{days}d {hours}h {minutes}m")
}

fn parse_loadavg(contents: &str) -> Option<[f64; 3]> {
    let mut fields = contents.split_whitespace().map(str::parse::<f64>);
    Some([
        fields.next()?.ok()?,
        fields.next()?.ok()?,
        fields.next()?.ok()?,
    ])
}

/// First address from `hostname -I` that is not loopback.
fn first_routable_ip(stdout: &str) -> Option<&str> {
    stdout
        .split_whitespace()
        .find(|ip| !ip.starts_with("127.") && !ip.starts_with("::1"))
}

async fn local_ip() -> String {
    match run_command("hostname", &["-I"], COMMAND_TIMEOUT).await {
        Ok(stdout) => first_routable_ip(&stdout)
            .unwrap_or(UNKNOWN_IP)
            .to_string(),
        Err(e) => {
            debug!("Could not resolve local address: {e}");
            UNKNOWN_IP.to_string()
        }
    }
}

#[async_trait]
impl Collector for OverviewCollector {
    type Output = Overview;

    fn name(&self) -> &'static str {
        "overview"
    }

    async fn collect(&self) -> Overview {
        let mut overview = Overview {
            uptime: format_uptime(self.read_uptime_secs()),
            ip: local_ip().await,
            ..Overview::default()
        };
        if let Some([load_1, load_5, load_15]) = self.read_load() {
            overview.load_1 = format!("{load_1:.2}");
            overview.load_5 = format!("{load_5:.2}");
            overview.load_15 = format!("{load_15:.2}");
        }
        overview
    }
}
