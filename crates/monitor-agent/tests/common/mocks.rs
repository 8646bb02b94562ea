// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Collectors pointed at fake sources, and a probe that never touches the network

use async_trait::async_trait;
use monitor_agent::aggregator::{Aggregator, Collectors};
use monitor_agent::collectors::{
    CpuCollector, DiskCollector, MemoryCollector, NetworkCollector, OverviewCollector,
    ProcessCollector, SensorsCollector, VpnCollector,
};
use monitor_agent::config::CacheConfig;
use monitor_agent::error::ProbeError;
use monitor_agent::probe::{BandwidthProbe, BandwidthSample, ProbeTrigger, TriggerSettings};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Mock bandwidth probe returning a fixed sample
pub struct MockProbe;

#[async_trait]
impl BandwidthProbe for MockProbe {
    async fn run(&self, _timeout: Duration) -> Result<BandwidthSample, ProbeError> {
        Ok(BandwidthSample {
            ping_ms: 12.3,
            download_mbps: 10.0,
            upload_mbps: 5.0,
        })
    }
}

pub fn mock_trigger(enabled: bool) -> ProbeTrigger {
    ProbeTrigger::new(
        Arc::new(MockProbe),
        TriggerSettings {
            enabled,
            interval: Duration::from_secs(60),
            timeout: Duration::from_secs(60),
        },
    )
}

/// Collectors reading procfs-style files under `root`; missing files exercise the fallbacks.
pub fn collectors_under(root: &Path, cache: &CacheConfig) -> Collectors {
    Collectors {
        overview: OverviewCollector::with_paths(root.join("uptime"), root.join("loadavg")),
        cpu: CpuCollector::with_paths(root.join("stat"), root.join("scaling_cur_freq")),
        memory: MemoryCollector::with_path(root.join("meminfo")),
        disk: DiskCollector::with_diskstats_path(root.join("diskstats")),
        network: NetworkCollector::with_path(root.join("net_dev")),
        sensors: SensorsCollector::with_program(root.join("vcgencmd")),
        processes: ProcessCollector::default(),
        vpn: VpnCollector::with_program(root.join("tailscale"), cache.vpn_ttl),
    }
}

pub fn aggregator_under(root: &Path, cache: CacheConfig) -> Aggregator {
    Aggregator::new(collectors_under(root, &cache), mock_trigger(false), &cache)
}
