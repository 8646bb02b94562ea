// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Background execution of the slow bandwidth probe.
//!
//! The probe runs on its own task and is never awaited by a request. At most one run is in
//! flight: the `in_progress` flag and the published result live behind the same mutex, so the
//! decision to start and the flag update are a single critical section. Readers get a copy of
//! the last completed run and never wait for the running one.

use async_trait::async_trait;
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::ProbeError;

/// One completed bandwidth measurement.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BandwidthSample {
    pub ping_ms: f64,
    pub download_mbps: f64,
    pub upload_mbps: f64,
}

#[async_trait]
pub trait BandwidthProbe: Send + Sync {
    /// Runs one measurement, bounded by `timeout`.
    async fn run(&self, timeout: Duration) -> Result<BandwidthSample, ProbeError>;
}

/// The last published outcome. A failed run only replaces `error`; the sample and timestamp of
/// the last successful run stay visible.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProbeResult {
    pub sample: Option<BandwidthSample>,
    pub timestamp: Option<SystemTime>,
    pub error: Option<String>,
}

/// What readers see: the last completed result plus whether a run is underway.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProbeStatus {
    pub ping_ms: Option<f64>,
    pub download_mbps: Option<f64>,
    pub upload_mbps: Option<f64>,
    pub last_updated_ts: u64,
    pub last_error: Option<String>,
    pub in_progress: bool,
}

impl ProbeStatus {
    fn new(result: &ProbeResult, in_progress: bool) -> Self {
        Self {
            ping_ms: result.sample.map(|sample| sample.ping_ms),
            download_mbps: result.sample.map(|sample| sample.download_mbps),
            upload_mbps: result.sample.map(|sample| sample.upload_mbps),
            last_updated_ts: result
                .timestamp
                .and_then(|ts| ts.duration_since(UNIX_EPOCH).ok())
                .map_or(0, |elapsed| elapsed.as_secs()),
            last_error: result.error.clone(),
            in_progress,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TriggerSettings {
    pub enabled: bool,
    pub interval: Duration,
    pub timeout: Duration,
}

#[derive(Debug, Default)]
struct TriggerState {
    result: ProbeResult,
    in_progress: bool,
    last_attempt: Option<Instant>,
}

struct Inner {
    probe: Arc<dyn BandwidthProbe>,
    settings: TriggerSettings,
    state: Mutex<TriggerState>,
}

/// Cheap to clone; clones share the same probe state.
#[derive(Clone)]
pub struct ProbeTrigger {
    inner: Arc<Inner>,
}

impl ProbeTrigger {
    pub fn new(probe: Arc<dyn BandwidthProbe>, settings: TriggerSettings) -> Self {
        Self {
            inner: Arc::new(Inner {
                probe,
                settings,
                state: Mutex::new(TriggerState::default()),
            }),
        }
    }

    /// Starts a probe run if the trigger is enabled, idle, and at least one interval has passed
    /// since the last attempt (the very first call always qualifies).
    ///
    /// Returns immediately. The handle resolves once the run has published its result; callers
    /// on the request path drop it.
    pub fn maybe_trigger(&self, now: Instant) -> Option<JoinHandle<()>> {
        let settings = self.inner.settings;
        if !settings.enabled {
            return None;
        }

        {
            let mut state = self.inner.lock();
            if state.in_progress {
                return None;
            }
            if let Some(last_attempt) = state.last_attempt {
                if now.saturating_duration_since(last_attempt) < settings.interval {
                    return None;
                }
            }
            state.in_progress = true;
            state.last_attempt = Some(now);
        }

        debug!("Starting bandwidth probe");
        let inner = Arc::clone(&self.inner);
        Some(tokio::spawn(async move {
            let probe = Arc::clone(&inner.probe);
            // A panicking run still has to clear `in_progress`.
            let outcome = tokio::spawn(async move { probe.run(settings.timeout).await })
                .await
                .unwrap_or_else(|err| Err(ProbeError::Aborted(err.to_string())));
            inner.publish(outcome);
        }))
    }

    pub fn get_status(&self) -> ProbeStatus {
        let state = self.inner.lock();
        ProbeStatus::new(&state.result, state.in_progress)
    }

    pub fn last_result(&self) -> ProbeResult {
        self.inner.lock().result.clone()
    }

    /// Calls [`ProbeTrigger::maybe_trigger`] once per interval, starting immediately, until
    /// `cancel` fires. Each attempt is stamped with its scheduled tick, not the wake-up time. A run still in flight at cancellation is left to finish on its own.
    pub fn spawn_scheduler(&self, cancel: CancellationToken) -> JoinHandle<()> {
        let trigger = self.clone();
        tokio::spawn(async move {
            let mut ticker = interval(trigger.inner.settings.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!(
                "Bandwidth probe scheduled every {:?}",
                trigger.inner.settings.interval
            );
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        debug!("Bandwidth probe scheduler stopped");
                        return;
                    }
                    scheduled = ticker.tick() => {
                        trigger.maybe_trigger(scheduled);
                    }
                }
            }
        })
    }
}

impl Inner {
    fn publish(&self, outcome: Result<BandwidthSample, ProbeError>) {
        let mut state = self.lock();
        match outcome {
            Ok(sample) => {
                debug!("Bandwidth probe finished: {sample:?}");
                state.result = ProbeResult {
                    sample: Some(sample),
                    timestamp: Some(SystemTime::now()),
                    error: None,
                };
            }
            Err(err) => {
                warn!("Bandwidth probe failed: {err}");
                state.result.error = Some(err.to_string());
            }
        }
        state.in_progress = false;
    }

    fn lock(&self) -> MutexGuard<'_, TriggerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
