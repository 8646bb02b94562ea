// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Tailscale connection status. The CLI is slow enough that the result is memoized for its own
//! TTL, independently of the snapshot.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::time::Duration;
use tracing::debug;

use crate::cache::SingleValueCache;
use crate::collectors::Collector;
use crate::command::{run_command, COMMAND_TIMEOUT};
use crate::error::CollectError;

const TAILSCALE_PROGRAM: &str = "tailscale";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VpnStatus {
    pub tailscale_connected: bool,
    pub tailscale_ip: String,
}

impl Default for VpnStatus {
    fn default() -> Self {
        Self {
            tailscale_connected: false,
            tailscale_ip: "-".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct TailscaleStatus {
    #[serde(rename = "TailscaleIPs", default)]
    tailscale_ips: Vec<String>,
}

pub struct VpnCollector {
    program: PathBuf,
    cache: SingleValueCache<VpnStatus>,
}

impl VpnCollector {
    pub fn new(ttl: Duration) -> Self {
        Self::with_program(TAILSCALE_PROGRAM, ttl)
    }

    pub fn with_program(program: impl Into<PathBuf>, ttl: Duration) -> Self {
        Self {
            program: program.into(),
            cache: SingleValueCache::new(ttl),
        }
    }

    async fn fetch(&self) -> Result<VpnStatus, CollectError> {
        let stdout = run_command(&self.program, &["status", "--json"], COMMAND_TIMEOUT).await?;
        parse_status(&stdout)
    }
}

/// A successful `tailscale status` means connected, even when no address is assigned yet.
fn parse_status(stdout: &str) -> Result<VpnStatus, CollectError> {
    let status: TailscaleStatus = serde_json::from_str(stdout)?;
    Ok(VpnStatus {
        tailscale_connected: true,
        tailscale_ip: status
            .tailscale_ips
            .into_iter()
            .next()
            .unwrap_or_else(|| "-".to_string()),
    })
}

#[async_trait]
impl Collector for VpnCollector {
    type Output = VpnStatus;

    fn name(&self) -> &'static str {
        "tailscale"
    }

    async fn collect(&self) -> VpnStatus {
        self.cache
            .try_get_or_compute(|| self.fetch(), None)
            .await
            .unwrap_or_else(|e| {
                debug!("Falling back to disconnected VPN status: {e}");
                VpnStatus::default()
            })
    }
}
