// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Composes the collectors into one snapshot.
//!
//! The snapshot is memoized as a whole, so a dashboard polling faster than the snapshot TTL
//! gets the same object back. On a miss every collector runs concurrently. The process list
//! sits behind its own, longer lived cache and the bandwidth probe is never run here: its last
//! published status is copied into the network family.

use serde::Serialize;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::debug;

use crate::cache::{KeyedCache, SingleValueCache};
use crate::collectors::{
    Collector, CpuCollector, CpuStats, DiskCollector, DiskStats, MemoryCollector, MemoryStats,
    NetworkCollector, NetworkStats, Overview, OverviewCollector, ProcessCollector, ProcessInfo,
    SensorsCollector, SensorsStats, VpnCollector, VpnStatus,
};
use crate::config::CacheConfig;
use crate::probe::{ProbeStatus, ProbeTrigger};

/// Network counters plus the last bandwidth probe status.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NetworkFamily {
    #[serde(flatten)]
    pub stats: NetworkStats,
    pub speedtest: ProbeStatus,
    pub ping_ms: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    pub overview: Overview,
    pub cpu: CpuStats,
    pub memory: MemoryStats,
    pub disk: DiskStats,
    pub network: NetworkFamily,
    pub sensors: SensorsStats,
    pub processes: Vec<ProcessInfo>,
    pub tailscale: VpnStatus,
}

/// The leaf readers used to build a snapshot. Fields are public so tests can point individual
/// collectors at fake sources.
pub struct Collectors {
    pub overview: OverviewCollector,
    pub cpu: CpuCollector,
    pub memory: MemoryCollector,
    pub disk: DiskCollector,
    pub network: NetworkCollector,
    pub sensors: SensorsCollector,
    pub processes: ProcessCollector,
    pub vpn: VpnCollector,
}

impl Collectors {
    /// Collectors reading the local host.
    pub fn system(cache: &CacheConfig) -> Self {
        Self {
            overview: OverviewCollector::new(),
            cpu: CpuCollector::new(),
            memory: MemoryCollector::new(),
            disk: DiskCollector::new(),
            network: NetworkCollector::new(),
            sensors: SensorsCollector::new(),
            processes: ProcessCollector::default(),
            vpn: VpnCollector::new(cache.vpn_ttl),
        }
    }
}

pub struct Aggregator {
    collectors: Collectors,
    probe: ProbeTrigger,
    snapshot_cache: SingleValueCache<Arc<Snapshot>>,
    process_cache: KeyedCache<Vec<ProcessInfo>>,
}

impl Aggregator {
    pub fn new(collectors: Collectors, probe: ProbeTrigger, cache: &CacheConfig) -> Self {
        Self {
            collectors,
            probe,
            snapshot_cache: SingleValueCache::new(cache.system_stats_ttl),
            process_cache: KeyedCache::new(cache.process_list_ttl),
        }
    }

    /// Returns the cached snapshot, rebuilding it once its TTL has passed. Concurrent callers
    /// during a rebuild wait for it and share the result.
    pub async fn get_snapshot(&self) -> Arc<Snapshot> {
        self.snapshot_cache
            .get_or_compute(|| self.build_snapshot(), None)
            .await
    }

    pub async fn vpn_status(&self) -> VpnStatus {
        self.collectors.vpn.collect().await
    }

    pub async fn processes(&self, limit: usize) -> Vec<ProcessInfo> {
        let key = format!("top:{limit}");
        self.process_cache
            .try_get_or_compute(&key, || self.collectors.processes.try_collect(limit), None)
            .await
            .unwrap_or_else(|e| {
                debug!("Serving an empty process list: {e}");
                Vec::new()
            })
    }

    async fn build_snapshot(&self) -> Arc<Snapshot> {
        let start = Instant::now();
        let c = &self.collectors;
        let (overview, cpu, memory, disk, network, sensors, processes, tailscale) = tokio::join!(
            timed(&c.overview),
            timed(&c.cpu),
            timed(&c.memory),
            timed(&c.disk),
            timed(&c.network),
            timed(&c.sensors),
            self.processes(c.processes.limit()),
            timed(&c.vpn),
        );

        let speedtest = self.probe.get_status();
        let snapshot = Snapshot {
            overview,
            cpu,
            memory,
            disk,
            network: NetworkFamily {
                stats: network,
                ping_ms: speedtest.ping_ms,
                speedtest,
            },
            sensors,
            processes,
            tailscale,
        };
        debug!("Built snapshot in {} ms", start.elapsed().as_millis());
        Arc::new(snapshot)
    }
}

async fn timed<C: Collector>(collector: &C) -> C::Output {
    let start = Instant::now();
    let output = collector.collect().await;
    debug!(
        "Collected {} in {} ms",
        collector.name(),
        start.elapsed().as_millis()
    );
    output
}
