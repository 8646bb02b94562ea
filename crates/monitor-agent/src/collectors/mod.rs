// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Metric family readers.
//!
//! Each collector reads one family from procfs or a short-lived command and never fails
//! visibly: unreadable sources are logged at debug level and the family falls back to its
//! documented defaults.

use async_trait::async_trait;
use serde::Serialize;

pub mod cpu;
pub mod disk;
pub mod memory;
pub mod network;
pub mod overview;
pub mod process;
pub mod sensors;
pub mod vpn;

pub use cpu::{CpuCollector, CpuStats};
pub use disk::{DiskCollector, DiskStats};
pub use memory::{MemoryCollector, MemoryStats};
pub use network::{NetworkCollector, NetworkStats};
pub use overview::{Overview, OverviewCollector};
pub use process::{ProcessCollector, ProcessInfo};
pub use sensors::{SensorsCollector, SensorsStats, Throttled};
pub use vpn::{VpnCollector, VpnStatus};

pub(crate) const KIB_PER_GIB: f64 = 1024.0 * 1024.0;
pub(crate) const BYTES_PER_MIB: f64 = 1024.0 * 1024.0;
pub(crate) const BYTES_PER_GIB: f64 = 1024.0 * 1024.0 * 1024.0;

#[async_trait]
pub trait Collector: Send + Sync {
    type Output: Serialize + Send;

    /// Used in log lines.
    fn name(&self) -> &'static str;

    async fn collect(&self) -> Self::Output;
}

/// Rounds half away from zero to `digits` decimal places.
pub(crate) fn round_to(value: f64, digits: i32) -> f64 {
    let factor = 10f64.powi(digits);
    (value * factor).round() / factor
}
